//! USB Vendor/Product ID tables for modems and serial bridges
//!
//! USB GSM modems usually enumerate several serial interfaces under the
//! vendor's own VID; industrial modules like the SIM900 sit behind a
//! USB-serial bridge. Either way the IDs only give a hint: the driver is
//! decided by probing.

/// A USB-serial bridge chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialBridge {
    pub name: &'static str,
    pub vid: u16,
    pub pids: &'static [u16],
}

/// A modem manufacturer exposing its own USB interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemVendor {
    pub name: &'static str,
    pub vid: u16,
    /// Registry id of the driver most likely to match
    pub driver: &'static str,
}

pub const SERIAL_BRIDGES: &[SerialBridge] = &[
    SerialBridge {
        name: "FTDI",
        vid: 0x0403,
        pids: &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
    },
    SerialBridge {
        name: "CP210x",
        vid: 0x10C4,
        pids: &[0xEA60, 0xEA70, 0xEA71],
    },
    SerialBridge {
        name: "CH340",
        vid: 0x1A86,
        pids: &[0x7523, 0x5523],
    },
    SerialBridge {
        name: "PL2303",
        vid: 0x067B,
        pids: &[0x2303],
    },
];

pub const MODEM_VENDORS: &[ModemVendor] = &[
    ModemVendor {
        name: "SIMCom",
        vid: 0x1E0E,
        driver: "sim900",
    },
    ModemVendor {
        name: "Huawei",
        vid: 0x12D1,
        driver: "huawei",
    },
    // Owner of the Wavecom line
    ModemVendor {
        name: "Sierra Wireless",
        vid: 0x1199,
        driver: "wavecom",
    },
    ModemVendor {
        name: "Quectel",
        vid: 0x2C7C,
        driver: "generic",
    },
];

fn bridge(vid: u16) -> Option<&'static SerialBridge> {
    SERIAL_BRIDGES.iter().find(|b| b.vid == vid)
}

fn vendor(vid: u16) -> Option<&'static ModemVendor> {
    MODEM_VENDORS.iter().find(|v| v.vid == vid)
}

/// Check if a VID/PID is a known USB-serial bridge
pub fn is_known_serial_adapter(vid: u16, pid: u16) -> bool {
    bridge(vid).is_some_and(|b| b.pids.contains(&pid))
}

/// Modem vendor for a VID
pub fn modem_vendor(vid: u16) -> Option<&'static str> {
    vendor(vid).map(|v| v.name)
}

/// Bridge chip name for a VID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    bridge(vid).map(|b| b.name)
}

/// Driver id worth probing first for a vendor, if any
pub fn suggest_driver(vid: Option<u16>) -> Option<&'static str> {
    vendor(vid?).map(|v| v.driver)
}

/// How likely a port is to have a modem behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortClassification {
    /// Modem vendor USB interface
    KnownModem,
    /// USB-serial bridge; may be a modem module or anything else
    KnownAdapter,
    Unknown,
}

impl PortClassification {
    pub fn classify(vid: Option<u16>, pid: Option<u16>) -> Self {
        match (vid, pid) {
            (Some(vid), _) if vendor(vid).is_some() => Self::KnownModem,
            (Some(vid), Some(pid)) if is_known_serial_adapter(vid, pid) => Self::KnownAdapter,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_adapters() {
        assert!(is_known_serial_adapter(0x0403, 0x6001));
        assert!(is_known_serial_adapter(0x1A86, 0x7523));
        assert!(!is_known_serial_adapter(0x1A86, 0x0001));
        assert_eq!(adapter_name(0x067B), Some("PL2303"));
        assert_eq!(adapter_name(0x12D1), None);
    }

    #[test]
    fn test_modem_vendors() {
        assert_eq!(modem_vendor(0x12D1), Some("Huawei"));
        assert_eq!(suggest_driver(Some(0x12D1)), Some("huawei"));
        assert_eq!(suggest_driver(Some(0x1199)), Some("wavecom"));
        assert_eq!(suggest_driver(Some(0x0403)), None);
        assert_eq!(suggest_driver(None), None);
    }

    #[test]
    fn test_suggested_drivers_are_registered() {
        let ids = ["sim900", "huawei", "wavecom", "generic"];
        assert!(MODEM_VENDORS.iter().all(|v| ids.contains(&v.driver)));
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            PortClassification::classify(Some(0x1E0E), Some(0x0020)),
            PortClassification::KnownModem
        );
        assert_eq!(
            PortClassification::classify(Some(0x10C4), Some(0xEA60)),
            PortClassification::KnownAdapter
        );
        assert_eq!(PortClassification::classify(None, None), PortClassification::Unknown);
    }
}
