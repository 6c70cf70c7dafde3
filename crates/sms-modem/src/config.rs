//! Transport and timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default baud rate for SMS modems
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Which port to open and how fast to talk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Port identifier (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

impl TransportConfig {
    /// Create a configuration for a port
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

/// Time limits for device operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Ordinary commands
    pub command_ms: u64,
    /// Message submission, from message body to `+CMGS`
    pub send_ms: u64,
    /// Pause after opening the port before the first command
    pub settle_ms: u64,
}

impl Timeouts {
    /// Timeout for ordinary commands
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    /// Timeout for message submission
    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    /// Delay after open
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_ms: 2_000,
            send_ms: 30_000,
            settle_ms: 50,
        }
    }
}
