#![no_main]

use dsmr_p1::d0::parse_identification;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(id) = parse_identification(data) {
        assert!(id.manufacturer.chars().count() <= 3);
        if let Some(ack) = id.ack() {
            assert_eq!(ack[0], 0x06);
        }
    }
});
