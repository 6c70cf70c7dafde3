//! Error types for modem operations

use sms_protocol::{FinalResult, ParseError};
use thiserror::Error;

/// Errors that can occur while talking to a modem
#[derive(Debug, Error)]
pub enum ModemError {
    /// The physical port could not be opened, or is already in use
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// No complete response within the allotted window
    #[error("timeout after {timeout_ms}ms waiting for response to {command:?}")]
    Timeout {
        command: String,
        timeout_ms: u64,
        /// Lines received before the deadline
        partial: Vec<String>,
    },

    /// Malformed response, after the single retry
    #[error("framing error in response to {command:?}: {reason}")]
    Framing { command: String, reason: String },

    /// The modem answered with an error result code
    #[error("{command:?} rejected: {result}")]
    Rejected { command: String, result: FinalResult },

    /// Response arrived but could not be parsed
    #[error("cannot parse response to {command:?} ({response:?}): {source}")]
    Parse {
        command: String,
        /// Information lines as received
        response: String,
        #[source]
        source: ParseError,
    },

    /// Driver identifier is not registered
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    /// Field name is not in the driver's catalog
    #[error("unknown status field: {0}")]
    UnknownField(String),

    /// Field has no read command
    #[error("status field {0} is write-only")]
    FieldNotReadable(String),

    /// Field has no write command
    #[error("status field {0} is read-only")]
    FieldNotWritable(String),

    /// A status field operation failed
    #[error("status field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<ModemError>,
    },

    /// Caller supplied an unusable argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted on a device that was never opened
    #[error("device is not open")]
    NotOpen,

    /// Operation attempted on, or aborted by, a closed device
    #[error("device closed")]
    Closed,

    /// The peer went away
    #[error("port {0} disconnected")]
    Disconnected(String),

    /// I/O error on an open port
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

impl ModemError {
    /// Strip field context wrappers
    pub fn root(&self) -> &ModemError {
        match self {
            ModemError::Field { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the error comes from a closed device or aborted read
    pub fn is_closed(&self) -> bool {
        matches!(self.root(), ModemError::Closed)
    }

    /// True for `Closed` and `NotOpen`, which say nothing about a field
    pub fn is_lifecycle(&self) -> bool {
        matches!(self.root(), ModemError::Closed | ModemError::NotOpen)
    }

    /// True for response timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), ModemError::Timeout { .. })
    }

    /// Wrap with the name of the status field being accessed
    pub(crate) fn in_field(self, field: &str) -> ModemError {
        match self {
            e @ (ModemError::Closed | ModemError::NotOpen) => e,
            e => ModemError::Field {
                field: field.to_string(),
                source: Box::new(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_context_wraps() {
        let err = ModemError::Timeout {
            command: "AT+CSQ".into(),
            timeout_ms: 2000,
            partial: vec![],
        }
        .in_field("Signal Quality");

        assert!(err.is_timeout());
        assert!(err.to_string().contains("Signal Quality"));
        assert!(err.to_string().contains("AT+CSQ"));
    }

    #[test]
    fn test_closed_is_not_wrapped() {
        let err = ModemError::Closed.in_field("IMEI");
        assert!(matches!(err, ModemError::Closed));
        assert!(err.is_closed());
    }

    #[test]
    fn test_rejected_display() {
        let err = ModemError::Rejected {
            command: "AT+CIMI".into(),
            result: FinalResult::CmeError("10".into()),
        };
        assert_eq!(err.to_string(), "\"AT+CIMI\" rejected: +CME ERROR: 10");
    }
}
