//! Error types for modem detection

use sms_modem::ModemError;
use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Port missing, or held by another transport
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// Something answered, but no driver recognized it
    #[error("no driver matched the modem on {port}")]
    NoDriverMatched { port: String },

    /// Nothing answered any probe
    #[error("timeout: no response from {port}")]
    Timeout { port: String },

    /// Transport failure during a probe
    #[error(transparent)]
    Modem(#[from] ModemError),
}

impl DetectError {
    pub(crate) fn from_open(e: ModemError) -> Self {
        match e {
            ModemError::PortUnavailable { port, reason } => {
                DetectError::PortUnavailable { port, reason }
            }
            other => DetectError::Modem(other),
        }
    }
}
