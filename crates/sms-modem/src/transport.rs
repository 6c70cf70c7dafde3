//! Line-framed duplex channel over a port
//!
//! The transport owns the byte stream, the line codec and the port lease.
//! It knows nothing about commands: the engine above it decides what to
//! write and when a response is complete.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use sms_protocol::command::LINE_ENDING;
use sms_protocol::{Frame, FrameError, LineCodec};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace};

use crate::config::TransportConfig;
use crate::port::{DynSerial, PortAccess, PortLease};

/// Low-level transport failures, mapped to `ModemError` by the engine
#[derive(Debug, Error)]
pub enum TransportError {
    /// Nothing complete arrived before the deadline
    #[error("read timed out")]
    Timeout,
    /// Transport closed, or a pending read was aborted by close
    #[error("transport closed")]
    Closed,
    /// Peer hung up
    #[error("peer disconnected")]
    Disconnected,
    /// Malformed line
    #[error("framing error: {0}")]
    Framing(#[from] FrameError),
    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Aborts pending and future reads on a transport
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Fail any pending read promptly with `Closed`
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Line-framed duplex channel bound to one port
pub struct Transport {
    config: TransportConfig,
    io: Option<DynSerial>,
    codec: LineCodec,
    buffer: Vec<u8>,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
    lease: Option<PortLease>,
}

impl Transport {
    /// Lease and open a port
    pub fn open(access: &PortAccess, config: &TransportConfig) -> Result<Self, crate::ModemError> {
        let (io, lease) = access.open(config)?;
        info!("Opened {} at {} baud", config.port, config.baud_rate);
        let mut transport = Self::from_io(io, config.clone());
        transport.lease = Some(lease);
        Ok(transport)
    }

    /// Wrap an already-open stream (no lease)
    pub fn from_io(io: DynSerial, config: TransportConfig) -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            config,
            io: Some(io),
            codec: LineCodec::new(),
            buffer: vec![0u8; 1024],
            abort_tx: Arc::new(abort_tx),
            abort_rx,
            lease: None,
        }
    }

    /// Port identifier
    pub fn port(&self) -> &str {
        &self.config.port
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether the stream is still open and not aborted
    pub fn is_open(&self) -> bool {
        self.io.is_some() && !*self.abort_rx.borrow()
    }

    /// Handle that can abort reads from another task
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: Arc::clone(&self.abort_tx),
        }
    }

    /// Write raw bytes
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if *self.abort_rx.borrow() {
            return Err(TransportError::Closed);
        }
        let io = self.io.as_mut().ok_or(TransportError::Closed)?;
        io.write_all(data).await?;
        io.flush().await?;
        trace!("Wrote {} bytes to {}: {:02X?}", data.len(), self.config.port, data);
        Ok(())
    }

    /// Write bytes followed by the line ending
    pub async fn write_line(&mut self, line: &[u8]) -> Result<(), TransportError> {
        let mut data = line.to_vec();
        data.extend_from_slice(LINE_ENDING);
        self.write(&data).await
    }

    /// Read the next frame, waiting at most `limit`
    pub async fn read_line(&mut self, limit: Duration) -> Result<Frame, TransportError> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(frame) = self.codec.next_frame() {
                return frame.map_err(TransportError::from);
            }
            if *self.abort_rx.borrow() {
                return Err(TransportError::Closed);
            }
            let io = self.io.as_mut().ok_or(TransportError::Closed)?;

            let read = tokio::select! {
                biased;
                _ = self.abort_rx.changed() => return Err(TransportError::Closed),
                result = timeout_at(deadline, io.read(&mut self.buffer)) => result,
            };

            match read {
                Ok(Ok(0)) => return Err(TransportError::Disconnected),
                Ok(Ok(n)) => {
                    trace!(
                        "Read {} bytes from {}: {:?}",
                        n,
                        self.config.port,
                        String::from_utf8_lossy(&self.buffer[..n])
                    );
                    self.codec.push_bytes(&self.buffer[..n]);
                }
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                }
                Ok(Err(e)) => return Err(TransportError::Io(e)),
                Err(_) => return Err(TransportError::Timeout),
            }
        }
    }

    /// Wait for `duration`, or fail with `Closed` as soon as the transport is aborted
    pub async fn pause(&mut self, duration: Duration) -> Result<(), TransportError> {
        if *self.abort_rx.borrow() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.abort_rx.changed() => Err(TransportError::Closed),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drop buffered input and drain whatever is readable right now
    ///
    /// Returns the discarded text so callers can log it.
    pub async fn discard_input(&mut self) -> String {
        let mut discarded = Vec::new();
        if self.codec.has_partial() {
            debug!("Discarding partial line on {}", self.config.port);
        }
        self.codec.clear();

        if let Some(io) = self.io.as_mut() {
            while let Ok(Ok(n)) = timeout(Duration::ZERO, io.read(&mut self.buffer)).await {
                if n == 0 {
                    break;
                }
                discarded.extend_from_slice(&self.buffer[..n]);
            }
        }

        let text = String::from_utf8_lossy(&discarded).trim().to_string();
        if !text.is_empty() {
            debug!("Discarded stale input on {}: {:?}", self.config.port, text);
        }
        text
    }

    /// Close the stream and release the port lease; safe to call twice
    pub async fn close(&mut self) {
        self.abort_tx.send_replace(true);
        if let Some(mut io) = self.io.take() {
            let _ = io.shutdown().await;
            info!("Closed {}", self.config.port);
        }
        self.lease = None;
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}
