// Shared telegram fixtures for the integration tests
#![allow(dead_code)]

use dsmr_p1::p1::crc16;
use dsmr_p1::util::hex::encode_crc16;

/// DSMR v2 style telegram without CRC
pub const OLD_STYLE: &[u8] = b"/XMX5LGBBFFB231215123\r\n\r\n1-0:1.8.0(000671.578*kWh)\r\n!\r\n";

/// Body of a DSMR v5 telegram, up to but excluding `!`
pub const DSMR5_BODY: &[u8] = b"/ISK5\\2M550T-1012\r\n\
\r\n\
1-3:0.2.8(50)\r\n\
0-0:1.0.0(200102131415W)\r\n\
0-0:96.1.1(4530303434303037313331363930363139)\r\n\
1-0:1.8.1(000876.543*kWh)\r\n\
1-0:1.8.2(001234.567*kWh)\r\n\
1-0:2.8.1(000000.000*kWh)\r\n\
1-0:2.8.2(000000.000*kWh)\r\n\
0-0:96.14.0(0002)\r\n\
1-0:1.7.0(00.420*kW)\r\n\
1-0:2.7.0(00.000*kW)\r\n\
0-0:96.7.21(00006)\r\n\
1-0:99.97.0(1)(0-0:96.7.19)(190911120023S)(0000004315*s)\r\n\
0-1:24.2.1(200102131002W)(01234.567*m3)\r\n";

/// Complete a telegram body with `!`, its CRC and CR LF.
pub fn new_style(body: &[u8]) -> Vec<u8> {
    let mut telegram = body.to_vec();
    telegram.push(b'!');
    let crc = crc16(&telegram);
    telegram.extend_from_slice(encode_crc16(crc).as_bytes());
    telegram.extend_from_slice(b"\r\n");
    telegram
}

/// A valid DSMR v5 telegram
pub fn dsmr5_telegram() -> Vec<u8> {
    new_style(DSMR5_BODY)
}
