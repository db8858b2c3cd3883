//! Line parsers for OBIS telegram content, built on `nom`.
//!
//! Every parser here works on a single line with CR LF already removed.

use crate::util::hex::decode_crc16;
use nom::{
    bytes::complete::{take_while, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, map, map_res, opt},
    multi::many1,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::Serialize;

/// One parenthesised value, split into value and unit at the first `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CosemValue {
    pub value: String,
    pub unit: Option<String>,
}

impl CosemValue {
    fn from_raw(raw: &str) -> Self {
        match raw.split_once('*') {
            Some((value, unit)) => CosemValue {
                value: value.to_string(),
                unit: Some(unit.to_string()),
            },
            None => CosemValue {
                value: raw.to_string(),
                unit: None,
            },
        }
    }
}

/// An OBIS code with its values, e.g. `1-0:1.8.1(000671.578*kWh)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObisRecord {
    pub code: String,
    pub values: Vec<CosemValue>,
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.' | '*' | '&')
}

/// Full (`1-0:1.8.0`) and reduced (`1.8.0`, `C.1.0`, `F.F`) OBIS codes.
pub fn obis_code(input: &str) -> IResult<&str, &str> {
    take_while1(is_code_char)(input)
}

pub fn cosem_value(input: &str) -> IResult<&str, CosemValue> {
    map(
        delimited(char('('), take_while(|c: char| c != '(' && c != ')'), char(')')),
        CosemValue::from_raw,
    )(input)
}

/// `/XXXZ<ident>`, returning everything after the slash.
pub fn identification_line(input: &str) -> IResult<&str, &str> {
    all_consuming(preceded(char('/'), take_while1(|c: char| !c.is_ascii_control())))(input)
}

pub fn record_line(input: &str) -> IResult<&str, ObisRecord> {
    all_consuming(map(pair(obis_code, many1(cosem_value)), |(code, values)| {
        ObisRecord {
            code: code.to_string(),
            values,
        }
    }))(input)
}

/// A line holding only values, continuing the previous record.
pub fn value_line(input: &str) -> IResult<&str, Vec<CosemValue>> {
    all_consuming(many1(cosem_value))(input)
}

/// `!` optionally followed by the four hex digits of the CRC.
pub fn end_line(input: &str) -> IResult<&str, Option<u16>> {
    all_consuming(preceded(
        char('!'),
        opt(map_res(
            take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()),
            |digits: &str| decode_crc16(digits.as_bytes()),
        )),
    ))(input)
}
