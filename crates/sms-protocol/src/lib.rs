//! SMS Modem Protocol Library
//!
//! This crate holds the I/O-free half of talking to SMS-capable modems
//! over AT commands (ITU-T V.250, 3GPP TS 27.007 and 27.005):
//!
//! - **Line framing**: a streaming codec splitting CR/LF traffic into lines
//!   and the `>` data prompt, reporting malformed input as framing errors
//! - **Commands and responses**: opaque payloads with a terminator policy,
//!   and a collector that applies the policy to incoming frames
//! - **Templates**: `{device}`, `{portName}`, `{baudRate}`, `{time}`,
//!   `{guid}` and `{value}` substitution
//! - **Drivers**: declarative dialect descriptions (probe, status fields,
//!   send profile) plus a small reference set
//!
//! # Example
//!
//! ```rust
//! use sms_protocol::{Collector, Command, Frame, LineCodec};
//!
//! let cmd = Command::at("AT+CSQ");
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"AT+CSQ\r\r\n+CSQ: 18,0\r\n\r\nOK\r\n");
//!
//! let mut collector = Collector::new(&cmd);
//! while let Some(Ok(frame)) = codec.next_frame() {
//!     if collector.accept(frame) {
//!         break;
//!     }
//! }
//! let response = collector.finish();
//! assert!(response.is_success());
//! assert_eq!(response.lines, vec!["+CSQ: 18,0".to_string()]);
//! ```

pub mod command;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod line;
pub mod result_code;
pub mod template;
pub mod text;

pub use command::{Collector, Command, Encoding, Response, Terminator};
pub use driver::{
    Driver, DriverIdentity, FieldParser, Probe, ProbeMatch, SendProfile, StatusField,
};
pub use error::{FrameError, ParseError};
pub use line::{Frame, LineCodec};
pub use result_code::FinalResult;
pub use template::TemplateContext;
pub use text::Charset;
