//! Console settings
//!
//! Optional JSON file; every key may be omitted.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sms_detect::ScanConfig;
use sms_modem::Timeouts;
use sms_sim::{ModemModel, VirtualModemConfig};

/// Baud rates tried, in order, when a scan is not given one
pub const DEFAULT_SCAN_BAUD_RATES: [u32; 5] = [115200, 9600, 19200, 38400, 57600];

/// A virtual modem attached to a named port in `--virtual` mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPortSettings {
    pub port: String,
    #[serde(default)]
    pub modem: VirtualModemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeouts: Timeouts,
    pub scan: ScanConfig,
    pub baud_rates: Vec<u32>,
    pub virtual_ports: Vec<VirtualPortSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            scan: ScanConfig::default(),
            baud_rates: DEFAULT_SCAN_BAUD_RATES.to_vec(),
            virtual_ports: default_virtual_ports(),
        }
    }
}

fn default_virtual_ports() -> Vec<VirtualPortSettings> {
    [
        ("VIRTUAL0", ModemModel::Sim900),
        ("VIRTUAL1", ModemModel::Huawei),
        ("VIRTUAL2", ModemModel::Wavecom),
        ("VIRTUAL3", ModemModel::Generic),
    ]
    .into_iter()
    .map(|(port, model)| VirtualPortSettings {
        port: port.to_string(),
        modem: VirtualModemConfig {
            model,
            ..VirtualModemConfig::default()
        },
    })
    .collect()
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }
}
