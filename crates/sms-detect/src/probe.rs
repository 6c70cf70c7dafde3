//! Driver probing
//!
//! A scan is a self-contained transport session: lease and open the port,
//! send each registered driver's probe in registration order, and stop at
//! the first driver whose predicate accepts the answer. Input is drained
//! before every probe so one probe's late reply never leaks into the next.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sms_modem::{
    CommandEngine, DeviceEvent, DriverRegistry, EventBus, ModemError, PortAccess, Transport,
    TransportConfig,
};
use sms_protocol::DriverIdentity;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DetectError;

/// Configuration for probing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Timeout for each probe
    pub probe_timeout_ms: u64,
    /// Delay between probes
    pub inter_probe_delay_ms: u64,
    /// Pause after opening the port
    pub settle_delay_ms: u64,
}

impl ScanConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn inter_probe_delay(&self) -> Duration {
        Duration::from_millis(self.inter_probe_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
            inter_probe_delay_ms: 100,
            settle_delay_ms: 50,
        }
    }
}

/// A recognized modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Matched driver
    pub identity: DriverIdentity,
    pub port: String,
    pub baud_rate: u32,
    /// Information lines of the matching probe response
    pub response: Vec<String>,
}

/// Identifies which registered driver speaks to a port
pub struct Scanner {
    registry: Arc<DriverRegistry>,
    access: PortAccess,
    config: ScanConfig,
    events: EventBus,
}

impl Scanner {
    /// Create a scanner with default configuration
    pub fn new(registry: Arc<DriverRegistry>, access: PortAccess) -> Self {
        Self::with_config(registry, access, ScanConfig::default())
    }

    /// Create a scanner with custom configuration
    pub fn with_config(registry: Arc<DriverRegistry>, access: PortAccess, config: ScanConfig) -> Self {
        Self {
            registry,
            access,
            config,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Line traffic of every probe
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Probe `port` at `baud_rate` with every registered driver
    ///
    /// Returns `Timeout` only if no probe received a single line; a port that
    /// answered but matched nothing is `NoDriverMatched`.
    pub async fn scan(&self, port: &str, baud_rate: u32) -> Result<ScanResult, DetectError> {
        let config = TransportConfig::new(port, baud_rate);
        let transport = Transport::open(&self.access, &config).map_err(DetectError::from_open)?;
        let mut engine = CommandEngine::new(transport, self.events.clone());
        info!("Scanning {} at {} baud", port, baud_rate);

        let outcome = self.probe_all(&mut engine, port, baud_rate).await;
        engine.close().await;
        outcome
    }

    async fn probe_all(
        &self,
        engine: &mut CommandEngine,
        port: &str,
        baud_rate: u32,
    ) -> Result<ScanResult, DetectError> {
        tokio::time::sleep(self.config.settle_delay()).await;

        let mut heard_anything = false;
        for (i, driver) in self.registry.drivers().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.inter_probe_delay()).await;
            }

            let command = driver.probe.to_command();
            match engine.execute(&command, self.config.probe_timeout()).await {
                Ok(response) => {
                    heard_anything = true;
                    if driver.probe.matches(&response) {
                        info!("Identified {} on {}", driver.display_name, port);
                        return Ok(ScanResult {
                            identity: driver.identity(),
                            port: port.to_string(),
                            baud_rate,
                            response: response.lines,
                        });
                    }
                    debug!(
                        "{} probe {} answered {:?}, no match",
                        driver.id,
                        command,
                        response.text()
                    );
                }
                Err(ModemError::Timeout { partial, .. }) => {
                    heard_anything |= !partial.is_empty();
                    debug!("{} probe timed out on {} ({} lines)", driver.id, port, partial.len());
                }
                Err(e @ ModemError::Framing { .. }) => {
                    heard_anything = true;
                    warn!("{} probe on {}: {}", driver.id, port, e);
                }
                Err(e) => {
                    warn!("Scan of {} aborted: {}", port, e);
                    return Err(e.into());
                }
            }
        }

        let port = port.to_string();
        if heard_anything {
            info!("No driver matched {}", port);
            Err(DetectError::NoDriverMatched { port })
        } else {
            info!("No response from {}", port);
            Err(DetectError::Timeout { port })
        }
    }

    /// Scan at each baud rate in turn until one identifies the modem
    ///
    /// `PortUnavailable` stops immediately. Otherwise the most telling
    /// failure is returned: `NoDriverMatched` over `Timeout`.
    pub async fn scan_baud_rates(
        &self,
        port: &str,
        baud_rates: &[u32],
    ) -> Result<ScanResult, DetectError> {
        let mut failure = None;
        for &baud in baud_rates {
            match self.scan(port, baud).await {
                Ok(result) => return Ok(result),
                Err(e @ DetectError::PortUnavailable { .. }) => return Err(e),
                Err(e) => {
                    let keep_previous = matches!(failure, Some(DetectError::NoDriverMatched { .. }))
                        && matches!(e, DetectError::Timeout { .. });
                    if !keep_previous {
                        failure = Some(e);
                    }
                }
            }
        }
        Err(failure.unwrap_or_else(|| DetectError::Timeout {
            port: port.to_string(),
        }))
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
