//! Message text encoding for text-mode SMS (3GPP TS 27.005)
//!
//! Plain ASCII goes out in the `GSM` character set. Anything else switches
//! the modem to `UCS2`, where destination and body travel as UTF-16BE hex.

use crate::command::{CTRL_Z, ESC};
use crate::error::ParseError;

/// Character set selected with `AT+CSCS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Charset {
    /// GSM default alphabet (ASCII subset)
    Gsm,
    /// UCS-2 as hex digits
    Ucs2,
}

impl Charset {
    /// Pick the charset able to carry `text`
    pub fn for_text(text: &str) -> Self {
        let plain = text.chars().all(|c| {
            c == '\n' || c == '\r' || (c.is_ascii() && !c.is_ascii_control() && c != '`')
        });
        if plain {
            Charset::Gsm
        } else {
            Charset::Ucs2
        }
    }

    /// Name as used in `AT+CSCS="<name>"`
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Gsm => "GSM",
            Charset::Ucs2 => "UCS2",
        }
    }

    /// Encode text for this charset
    pub fn encode(&self, text: &str) -> String {
        match self {
            Charset::Gsm => text
                .chars()
                .filter(|&c| c != CTRL_Z as char && c != ESC as char)
                .collect(),
            Charset::Ucs2 => encode_ucs2_hex(text),
        }
    }
}

/// Encode text as UTF-16BE hex digits
pub fn encode_ucs2_hex(text: &str) -> String {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    hex::encode_upper(bytes)
}

/// Decode UTF-16BE hex digits
pub fn decode_ucs2_hex(digits: &str) -> Result<String, ParseError> {
    let bytes = hex::decode(digits.trim()).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() % 2 != 0 {
        return Err(ParseError::InvalidHex("odd number of bytes".into()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ParseError::InvalidHex(e.to_string()))
}
