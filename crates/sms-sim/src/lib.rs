//! SMS Modem Simulation Library
//!
//! Virtual modems for exercising the transport, engine and scanner without
//! hardware:
//!
//! - **VirtualModem**: answers AT commands in the SIM900, Huawei, Wavecom or
//!   generic 27.005 dialect, with injectable faults
//! - **VirtualPorts**: named ports that connect to a modem over an in-memory
//!   duplex stream
//!
//! # Example
//!
//! ```rust
//! use sms_sim::{ModemModel, VirtualModem};
//!
//! let modem = VirtualModem::new(ModemModel::Sim900);
//! let mut session = modem.session();
//!
//! let reply = session.process(b"AT+CGMM\r");
//! assert!(String::from_utf8_lossy(&reply).contains("SIM900"));
//! ```

pub mod modem;
pub mod modem_task;

pub use modem::{Fault, ModemModel, ModemSession, SentMessage, VirtualModem, VirtualModemConfig};
pub use modem_task::{run_virtual_modem, VirtualPorts};
