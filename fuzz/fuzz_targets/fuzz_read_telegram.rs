#![no_main]

use dsmr_p1::p1::{read_telegram, verify_crc, FrameStop};
use dsmr_p1::serial::MockSerialPort;
use dsmr_p1::{ObisGrammar, TelegramGrammar};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the buffer size, second the fail limit
    let bufsize = 8 + data[0] as usize;
    let max_fail = data[1] as usize;

    let mut port = MockSerialPort::plain();
    port.queue_rx_data(&data[2..]);
    let mut buf = vec![0u8; bufsize];

    loop {
        let framed = read_telegram(&mut port, &mut buf, max_fail);
        assert!(framed.len <= bufsize);
        if framed.stop != FrameStop::Telegram {
            break;
        }

        let telegram = &buf[..framed.len];
        assert_eq!(telegram[0], b'/');

        let mut grammar = ObisGrammar::new();
        grammar.init();
        grammar.feed(telegram);
        let _ = grammar.finish();
        let _ = verify_crc(telegram, grammar.reported_crc());
    }
});
