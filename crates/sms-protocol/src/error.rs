//! Error types for AT response framing and parsing

use thiserror::Error;

/// Errors produced while splitting a byte stream into lines
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Line grew past the maximum length without a terminator
    #[error("line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },

    /// Line is not valid UTF-8
    #[error("line is not valid UTF-8: {0:02X?}")]
    InvalidUtf8(Vec<u8>),
}

/// Errors that can occur while parsing a response into a value
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Response carried no information line
    #[error("response carried no information")]
    Empty,

    /// Expected prefix not found in any line
    #[error("no line starting with {0:?}")]
    MissingPrefix(String),

    /// Comma separated item index out of range
    #[error("missing item {index} in {line:?}")]
    MissingItem { index: usize, line: String },

    /// Expected a quoted string
    #[error("no quoted string in {0:?}")]
    Unquoted(String),

    /// Invalid numeric value
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// Invalid hexadecimal text
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
