//! Virtual modem I/O task
//!
//! Drives a [`ModemSession`] from an async byte stream: whatever the host
//! writes is fed to the session and the session's answer written back.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tracing::{debug, info, warn};

use crate::modem::VirtualModem;

/// Buffer size of the in-memory link between host and virtual modem
const LINK_BUFFER: usize = 4096;

/// Serve one connection until the host hangs up
pub async fn run_virtual_modem<S>(mut stream: S, modem: VirtualModem) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = modem.session();
    let mut buf = [0u8; 1024];
    info!("Starting virtual modem task for {}", modem.id());

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Virtual modem stream closed for {}", modem.id());
                break;
            }
            Ok(n) => {
                let reply = session.process(&buf[..n]);
                if !reply.is_empty() {
                    stream.write_all(&reply).await?;
                    stream.flush().await?;
                }
            }
            Err(e) => {
                warn!("Virtual modem {} stream error: {}", modem.id(), e);
                return Err(e);
            }
        }
    }

    info!("Virtual modem task ended for {}", modem.id());
    Ok(())
}

/// Named virtual ports, each backed by a virtual modem
#[derive(Debug, Clone, Default)]
pub struct VirtualPorts {
    modems: Arc<Mutex<HashMap<String, VirtualModem>>>,
}

impl VirtualPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a modem to a port name, replacing any previous one
    pub fn add(&self, port: impl Into<String>, modem: VirtualModem) {
        self.lock().insert(port.into(), modem);
    }

    /// The modem behind a port
    pub fn get(&self, port: &str) -> Option<VirtualModem> {
        self.lock().get(port).cloned()
    }

    /// Port names, sorted
    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connect to a port; spawns the modem task on the current runtime
    pub fn open(&self, port: &str) -> io::Result<DuplexStream> {
        let modem = self.get(port).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no virtual modem on {}", port))
        })?;
        let (host, device) = duplex(LINK_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = run_virtual_modem(device, modem).await {
                warn!("Virtual modem task failed: {}", e);
            }
        });
        Ok(host)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VirtualModem>> {
        self.modems.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::ModemModel;

    #[tokio::test]
    async fn test_task_answers_over_stream() {
        let ports = VirtualPorts::new();
        ports.add("SIM0", VirtualModem::new(ModemModel::Wavecom));

        let mut host = ports.open("SIM0").unwrap();
        host.write_all(b"AT+CGMI\r").await.unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        while !collected.ends_with(b"OK\r\n") {
            let n = host.read(&mut buf).await.unwrap();
            collected.extend_from_slice(&buf[..n]);
        }
        assert!(String::from_utf8_lossy(&collected).contains("WAVECOM MODEM"));
    }

    #[tokio::test]
    async fn test_unknown_port() {
        let ports = VirtualPorts::new();
        let err = ports.open("NOPE").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_state_shared_across_connections() {
        let ports = VirtualPorts::new();
        let modem = VirtualModem::new(ModemModel::Generic);
        ports.add("SIM1", modem.clone());

        let mut first = ports.open("SIM1").unwrap();
        first
            .write_all(b"AT+CSCA=\"+4412345\"\r")
            .await
            .unwrap();
        let mut buf = [0u8; 256];
        let mut collected = Vec::new();
        while !collected.ends_with(b"OK\r\n") {
            let n = first.read(&mut buf).await.unwrap();
            collected.extend_from_slice(&buf[..n]);
        }
        drop(first);

        assert_eq!(ports.get("SIM1").unwrap().service_center(), "+4412345");
        assert_eq!(ports.port_names(), vec!["SIM1"]);
    }
}
