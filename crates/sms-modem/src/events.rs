//! Device event stream
//!
//! Line traffic and lifecycle changes go out through one channel per
//! subscriber. A line event is emitted before the engine returns control,
//! so a subscriber always sees a command's sent line before its replies.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use sms_protocol::DriverIdentity;
use tokio::sync::mpsc;

use crate::status::FieldState;

/// Events emitted by a device
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    // -------------------------------------------------------------------------
    // Line traffic
    // -------------------------------------------------------------------------
    /// A command line was written to the modem
    LineSent {
        /// Printable command text
        line: String,
        /// When the write completed
        timestamp: DateTime<Local>,
    },

    /// A line (or the `>` prompt) was read from the modem
    LineReceived {
        /// Line text without its terminator
        line: String,
        /// When the line was framed
        timestamp: DateTime<Local>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// The device opened and ran its init commands
    Opened {
        identity: DriverIdentity,
        port: String,
    },

    /// The device released its port
    Closed { port: String },

    /// A status field's cached state changed
    FieldUpdated { name: String, state: FieldState },
}

impl DeviceEvent {
    /// True for sent/received line events
    pub fn is_traffic(&self) -> bool {
        matches!(
            self,
            DeviceEvent::LineSent { .. } | DeviceEvent::LineReceived { .. }
        )
    }
}

/// Fan-out of device events to any number of subscribers
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DeviceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver an event; subscribers whose receiver was dropped are pruned
    pub fn emit(&self, event: DeviceEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn line_sent(&self, line: impl Into<String>) {
        self.emit(DeviceEvent::LineSent {
            line: line.into(),
            timestamp: Local::now(),
        });
    }

    pub fn line_received(&self, line: impl Into<String>) {
        self.emit(DeviceEvent::LineReceived {
            line: line.into(),
            timestamp: Local::now(),
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
