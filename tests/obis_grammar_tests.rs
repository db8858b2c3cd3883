//! Tests for the OBIS grammar against complete meter telegrams.

mod telegram_support;

use dsmr_p1::obis::parser::{cosem_value, end_line, obis_code, record_line};
use dsmr_p1::{CosemValue, ObisGrammar, ParseStatus, TelegramGrammar};
use telegram_support::dsmr5_telegram;

fn parse(data: &[u8]) -> (ObisGrammar, ParseStatus) {
    let mut grammar = ObisGrammar::new();
    grammar.init();
    grammar.feed(data);
    let status = grammar.finish();
    (grammar, status)
}

/// Tests parsing a full DSMR v5 telegram.
#[test]
fn test_dsmr5_telegram() {
    let telegram = dsmr5_telegram();
    let (grammar, status) = parse(&telegram);
    assert_eq!(status, ParseStatus::Reached);
    assert_eq!(grammar.parse_errors(), 0);
    assert_eq!(grammar.records().len(), 13);

    let power = grammar.find("1-0:1.7.0").unwrap();
    assert_eq!(
        power.values,
        vec![CosemValue {
            value: "00.420".to_string(),
            unit: Some("kW".to_string()),
        }]
    );

    let log = grammar.find("1-0:99.97.0").unwrap();
    assert_eq!(log.values.len(), 4);
    assert_eq!(log.values[3].unit.as_deref(), Some("s"));

    let gas = grammar.find("0-1:24.2.1").unwrap();
    assert_eq!(gas.values[1].value, "01234.567");
    assert_eq!(gas.values[1].unit.as_deref(), Some("m3"));
}

/// Tests that feeding byte by byte gives the same result as one chunk.
#[test]
fn test_byte_wise_feed() {
    let telegram = dsmr5_telegram();
    let (whole, _) = parse(&telegram);

    let mut grammar = ObisGrammar::new();
    grammar.init();
    for byte in &telegram {
        grammar.feed(std::slice::from_ref(byte));
    }
    assert_eq!(grammar.finish(), ParseStatus::Reached);
    assert_eq!(grammar.records(), whole.records());
    assert_eq!(grammar.reported_crc(), whole.reported_crc());
}

/// Tests a D0 data block with reduced codes and no trailing CR LF.
#[test]
fn test_d0_block() {
    let (grammar, status) = parse(
        b"/LGZ5ZMD3104407.B32\r\nF.F(00000000)\r\nC.1.0(31044071)\r\n1.8.0(000324.6*kWh)\r\n!",
    );
    assert_eq!(status, ParseStatus::Reached);
    assert_eq!(grammar.identification(), Some("LGZ5ZMD3104407.B32"));
    assert_eq!(grammar.find("C.1.0").unwrap().values[0].value, "31044071");
    assert_eq!(grammar.reported_crc(), None);
}

/// Tests that records serialise to JSON with value and unit.
#[test]
fn test_records_serialize() {
    let (grammar, _) = parse(b"/ABC5\r\n1-0:1.8.1(000671.578*kWh)\r\n!\r\n");
    let json = serde_json::to_value(grammar.records()).unwrap();
    assert_eq!(json[0]["code"], "1-0:1.8.1");
    assert_eq!(json[0]["values"][0]["value"], "000671.578");
    assert_eq!(json[0]["values"][0]["unit"], "kWh");
}

/// Tests the individual line parsers.
#[test]
fn test_line_parsers() {
    assert_eq!(obis_code("0-0:96.1.1(1234)"), Ok(("(1234)", "0-0:96.1.1")));
    assert_eq!(
        cosem_value("(00.420*kW)"),
        Ok((
            "",
            CosemValue {
                value: "00.420".to_string(),
                unit: Some("kW".to_string()),
            }
        ))
    );
    assert!(record_line("1-0:1.8.1").is_err());
    assert!(record_line("1-0:1.8.1(1) trailing").is_err());
    assert_eq!(end_line("!").map(|(_, crc)| crc), Ok(None));
    assert_eq!(end_line("!9a3f").map(|(_, crc)| crc), Ok(Some(0x9A3F)));
    assert!(end_line("!12").is_err());
}
