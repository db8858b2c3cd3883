//! Tests for the CRC-16 used by DSMR v4+ telegrams and its verification.

mod telegram_support;

use dsmr_p1::p1::{crc16, telegram_crc, verify_crc, CrcCheck};
use dsmr_p1::P1Error;
use proptest::prelude::*;
use telegram_support::{dsmr5_telegram, new_style, OLD_STYLE};

/// Tests the CRC-16/ARC check value.
#[test]
fn test_check_value() {
    assert_eq!(crc16(b"123456789"), 0xBB3D);
}

/// Tests that the CRC covers the telegram up to and including `!`.
#[test]
fn test_crc_range() {
    let telegram = dsmr5_telegram();
    let bang = telegram.iter().rposition(|&b| b == b'!').unwrap();
    assert_eq!(telegram_crc(&telegram), Some(crc16(&telegram[..=bang])));
}

/// Tests that old-style telegrams are not checked.
#[test]
fn test_old_style_not_applicable() {
    assert_eq!(telegram_crc(OLD_STYLE), None);
    assert_eq!(verify_crc(OLD_STYLE, Some(0x1234)).unwrap(), CrcCheck::NotApplicable);
}

/// Tests that lowercase trailer digits are read the same as uppercase ones.
#[test]
fn test_reported_crc_from_trailer() {
    let telegram = dsmr5_telegram();
    let digits = &telegram[telegram.len() - 6..telegram.len() - 2];
    let lower = dsmr_p1::util::hex::decode_crc16(&digits.to_ascii_lowercase()).unwrap();
    assert_eq!(verify_crc(&telegram, Some(lower)).unwrap(), CrcCheck::Verified(lower));
}

proptest! {
    /// A telegram whose trailer carries its own CRC always verifies.
    #[test]
    fn prop_matching_crc_verifies(body in proptest::collection::vec(0x20u8..0x7f, 0..200)) {
        let mut content = b"/".to_vec();
        content.extend(body.iter().filter(|&&b| b != b'!'));
        let telegram = new_style(&content);
        let crc = telegram_crc(&telegram).unwrap();
        prop_assert_eq!(verify_crc(&telegram, Some(crc)).unwrap(), CrcCheck::Verified(crc));
    }

    /// Flipping any bit of the covered range breaks verification.
    #[test]
    fn prop_bit_flip_detected(index in 0usize..400, bit in 0u8..8) {
        let telegram = dsmr5_telegram();
        let reported = telegram_crc(&telegram).unwrap();
        let covered = telegram.len() - 6;
        let index = index % covered;

        let mut corrupted = telegram.clone();
        corrupted[index] ^= 1 << bit;
        // Corrupting the '!' itself changes the trailer shape, not just the CRC
        prop_assume!(corrupted[covered - 1] == b'!');

        let is_mismatch = matches!(
            verify_crc(&corrupted, Some(reported)),
            Err(P1Error::CrcMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }
}
