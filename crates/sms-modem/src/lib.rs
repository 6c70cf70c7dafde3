//! SMS Modem I/O Library
//!
//! This crate puts the protocol types from `sms-protocol` on the wire:
//!
//! - **Ports**: a [`PortOpener`] seam (real serial ports via tokio-serial,
//!   or anything else that yields a byte stream) plus process-wide port
//!   leases so two transports never share a port
//! - **Transport**: a line-framed channel with bounded reads that a
//!   concurrent `close` can abort
//! - **Engine**: writes a command, reads until its terminator policy is met,
//!   retries one framing error, publishes every line as an event
//! - **Registry and Device**: drivers registered by id, bound to a port as a
//!   [`Device`] with a per-field status cache, message sending and raw
//!   command execution
//!
//! # Example
//!
//! ```rust,no_run
//! use sms_modem::{DriverRegistry, PortAccess, Timeouts, TransportConfig};
//!
//! # async fn run() -> Result<(), sms_modem::ModemError> {
//! let registry = DriverRegistry::with_reference_drivers();
//! let access = PortAccess::serial();
//!
//! let device = registry
//!     .open("sim900", TransportConfig::new("/dev/ttyUSB0", 115200), Timeouts::default(), &access)
//!     .await?;
//! for (name, value) in device.read_all_fields().await {
//!     println!("{}: {:?}", name, value);
//! }
//! device.send("+15551234567", "Hello from {device} at {time}").await?;
//! device.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod port;
pub mod registry;
pub mod status;
pub mod transport;

pub use config::{Timeouts, TransportConfig, DEFAULT_BAUD_RATE};
pub use device::{Device, SendReceipt};
pub use engine::CommandEngine;
pub use error::ModemError;
pub use events::{DeviceEvent, EventBus};
pub use port::{DynSerial, PortAccess, PortLease, PortLocks, PortOpener, SerialPortOpener};
pub use registry::{DriverFactory, DriverRegistry};
pub use status::{FieldError, FieldState, FieldValue};
pub use transport::{AbortHandle, Transport, TransportError};
