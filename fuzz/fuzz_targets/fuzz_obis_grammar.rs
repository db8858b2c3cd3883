#![no_main]

use dsmr_p1::{ObisGrammar, TelegramGrammar};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut whole = ObisGrammar::new();
    whole.init();
    whole.feed(data);
    let status = whole.finish();

    // Chunked input must parse the same as a single feed
    let split = data.len() / 2;
    let mut chunked = ObisGrammar::new();
    chunked.init();
    chunked.feed(&data[..split]);
    chunked.feed(&data[split..]);
    assert_eq!(chunked.finish(), status);
    assert_eq!(chunked.records(), whole.records());
    assert_eq!(chunked.parse_errors(), whole.parse_errors());
});
