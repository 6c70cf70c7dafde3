//! Serial port enumeration
//!
//! Lists the system's serial ports and annotates USB ones with what their
//! vendor/product IDs suggest.

use serde::Serialize;
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::DetectError;
use crate::usb_ids::{self, PortClassification};

/// A serial port, with USB descriptor strings when it has them
#[derive(Debug, Clone, Serialize)]
pub struct SerialPortInfo {
    /// OS name, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let SerialPortType::UsbPort(usb) = info.port_type else {
            return Self::named(info.port_name);
        };
        Self {
            port: info.port_name,
            vid: Some(usb.vid),
            pid: Some(usb.pid),
            serial_number: usb.serial_number,
            manufacturer: usb.manufacturer,
            product: usb.product,
        }
    }
}

impl SerialPortInfo {
    /// A port known only by name
    pub fn named(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    pub fn classification(&self) -> PortClassification {
        PortClassification::classify(self.vid, self.pid)
    }

    /// Short description from the USB IDs, e.g. "Huawei modem" or "CH340 bridge"
    pub fn hint(&self) -> Option<String> {
        let vid = self.vid?;
        if let Some(vendor) = usb_ids::modem_vendor(vid) {
            return Some(format!("{} modem", vendor));
        }
        usb_ids::adapter_name(vid).map(|name| format!("{} bridge", name))
    }

    /// Driver id the USB vendor suggests
    pub fn suggested_driver(&self) -> Option<&'static str> {
        usb_ids::suggest_driver(self.vid)
    }
}

/// Port lister configuration
#[derive(Debug, Clone, Default)]
pub struct PortListerConfig {
    /// Skip ports whose name contains any of these
    pub skip_patterns: Vec<String>,
}

/// Serial port lister
pub struct PortLister {
    config: PortListerConfig,
}

impl PortLister {
    pub fn new() -> Self {
        Self {
            config: PortListerConfig {
                skip_patterns: vec![
                    // Bluetooth ports on macOS
                    "Bluetooth".to_string(),
                    "debug".to_string(),
                ],
            },
        }
    }

    pub fn with_config(config: PortListerConfig) -> Self {
        Self { config }
    }

    /// List the system's serial ports, likely modems first
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        let found = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;
        let ports = self.filter(found.into_iter().map(SerialPortInfo::from).collect());

        info!("{} serial port(s) available", ports.len());
        for port in &ports {
            debug!("{}: {}", port.port, port.hint().as_deref().unwrap_or("no USB hint"));
        }
        Ok(ports)
    }

    /// Drop skipped ports and put likely modems first
    fn filter(&self, ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
        let mut ports: Vec<_> = ports
            .into_iter()
            .filter(|p| !self.is_skipped(p))
            .collect();
        ports.sort_by_key(|p| p.classification());
        ports
    }

    fn is_skipped(&self, port: &SerialPortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
    }
}

impl Default for PortLister {
    fn default() -> Self {
        Self::new()
    }
}
