//! Physical port access
//!
//! Opening goes through the [`PortOpener`] seam so the same transport code
//! runs against a real serial port or an in-memory virtual modem. Every
//! open takes a [`PortLease`] from the shared [`PortLocks`] set, which keeps
//! two transports (a scan and a device, or two devices) off the same port.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::ModemError;

/// Byte stream a transport can run over
pub trait SerialIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialIo for T {}

/// Boxed byte stream
pub type DynSerial = Box<dyn SerialIo>;

/// Opens the byte stream behind a transport
pub trait PortOpener: Send + Sync {
    /// Open the port described by `config`
    fn open(&self, config: &TransportConfig) -> Result<DynSerial, ModemError>;
}

impl<F> PortOpener for F
where
    F: Fn(&TransportConfig) -> Result<DynSerial, ModemError> + Send + Sync,
{
    fn open(&self, config: &TransportConfig) -> Result<DynSerial, ModemError> {
        self(config)
    }
}

/// Opens real serial ports through tokio-serial (8N1, no flow control)
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, config: &TransportConfig) -> Result<DynSerial, ModemError> {
        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| {
                warn!("Failed to open {}: {}", config.port, e);
                ModemError::PortUnavailable {
                    port: config.port.clone(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Box::new(stream))
    }
}

/// Set of ports with a live transport
#[derive(Debug, Clone, Default)]
pub struct PortLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl PortLocks {
    /// Create an empty lock set
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a port, failing with `PortUnavailable` if it is already held
    pub fn acquire(&self, port: &str) -> Result<PortLease, ModemError> {
        let key = port.trim().to_string();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.clone()) {
            return Err(ModemError::PortUnavailable {
                port: key,
                reason: "port is already in use".into(),
            });
        }
        debug!("Acquired lease on {}", key);
        Ok(PortLease {
            port: key,
            held: Arc::clone(&self.held),
        })
    }

    /// Whether a port currently has a live lease
    pub fn is_held(&self, port: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(port.trim())
    }
}

/// Exclusive claim on a port, released on drop
#[derive(Debug)]
pub struct PortLease {
    port: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl PortLease {
    /// The leased port
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
        debug!("Released lease on {}", self.port);
    }
}

/// Opener plus the lock set shared by every transport in the process
#[derive(Clone)]
pub struct PortAccess {
    opener: Arc<dyn PortOpener>,
    locks: PortLocks,
}

impl PortAccess {
    /// Access through a custom opener
    pub fn new(opener: Arc<dyn PortOpener>) -> Self {
        Self {
            opener,
            locks: PortLocks::new(),
        }
    }

    /// Access to real serial ports
    pub fn serial() -> Self {
        Self::new(Arc::new(SerialPortOpener))
    }

    /// Shared lock set
    pub fn locks(&self) -> &PortLocks {
        &self.locks
    }

    /// Lease the port, then open it
    pub fn open(&self, config: &TransportConfig) -> Result<(DynSerial, PortLease), ModemError> {
        let lease = self.locks.acquire(&config.port)?;
        let io = self.opener.open(config)?;
        Ok((io, lease))
    }
}

impl std::fmt::Debug for PortAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAccess")
            .field("opener", &"<opener>")
            .field("locks", &self.locks)
            .finish()
    }
}
