//! SMS Modem Detection Library
//!
//! This crate provides serial port enumeration and driver probing for SMS
//! modems.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sms_detect::{PortLister, Scanner};
//! use sms_modem::{DriverRegistry, PortAccess};
//!
//! # async fn run() -> Result<(), sms_detect::DetectError> {
//! let scanner = Scanner::new(
//!     Arc::new(DriverRegistry::with_reference_drivers()),
//!     PortAccess::serial(),
//! );
//!
//! for port in PortLister::new().enumerate_ports()? {
//!     match scanner.scan(&port.port, 115200).await {
//!         Ok(found) => println!("{}: {}", port.port, found.identity.display_name),
//!         Err(e) => println!("{}: {}", port.port, e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ports;
pub mod probe;
pub mod usb_ids;

pub use error::DetectError;
pub use ports::{PortLister, PortListerConfig, SerialPortInfo};
pub use probe::{ScanConfig, ScanResult, Scanner};
pub use usb_ids::PortClassification;
