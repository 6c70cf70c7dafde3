//! Integration tests for driver scanning
//!
//! Each reference driver must be recognized by its own virtual modem, and
//! the failure outcomes must tell a silent port from one that answered but
//! matched nothing.

use std::sync::Arc;

use sms_detect::{DetectError, ScanConfig, Scanner};
use sms_modem::{DeviceEvent, DriverRegistry, DynSerial, ModemError, PortAccess, TransportConfig};
use sms_sim::{Fault, ModemModel, VirtualModem, VirtualPorts};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub fn access(ports: &VirtualPorts) -> PortAccess {
        let ports = ports.clone();
        PortAccess::new(Arc::new(
            move |config: &TransportConfig| -> Result<DynSerial, ModemError> {
                let stream = ports
                    .open(&config.port)
                    .map_err(|e| ModemError::PortUnavailable {
                        port: config.port.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Box::new(stream))
            },
        ))
    }

    pub fn fast() -> ScanConfig {
        ScanConfig {
            probe_timeout_ms: 200,
            inter_probe_delay_ms: 10,
            settle_delay_ms: 0,
        }
    }

    /// Scanner over one virtual port named `SIM0`
    pub fn scanner_for(modem: VirtualModem) -> (Scanner, PortAccess) {
        let ports = VirtualPorts::new();
        ports.add("SIM0", modem);
        let access = access(&ports);
        let scanner = Scanner::with_config(
            Arc::new(DriverRegistry::with_reference_drivers()),
            access.clone(),
            fast(),
        );
        (scanner, access)
    }
}

use helpers::*;

// ============================================================================
// Identification
// ============================================================================

#[tokio::test]
async fn test_each_reference_driver_is_identified() {
    let cases = [
        (ModemModel::Sim900, "sim900"),
        (ModemModel::Huawei, "huawei"),
        (ModemModel::Wavecom, "wavecom"),
        (ModemModel::Generic, "generic"),
    ];

    for (model, expected) in cases {
        let (scanner, _) = scanner_for(VirtualModem::new(model));
        let result = scanner.scan("SIM0", 115200).await.unwrap();
        assert_eq!(result.identity.id, expected, "model {:?}", model);
        assert_eq!(result.port, "SIM0");
        assert_eq!(result.baud_rate, 115200);
    }
}

#[tokio::test]
async fn test_later_driver_wins_when_earlier_probes_answer_wrong() {
    // The SIM900 and Huawei probes get answers, just not theirs
    let (scanner, _) = scanner_for(VirtualModem::new(ModemModel::Wavecom));
    let mut rx = scanner.subscribe();

    let result = scanner.scan("SIM0", 9600).await.unwrap();
    assert_eq!(result.identity.id, "wavecom");
    assert_eq!(result.identity.display_name, "Wavecom Fastrack");
    assert_eq!(result.response, vec!["WAVECOM MODEM"]);

    let sent: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|event| match event {
            DeviceEvent::LineSent { line, .. } => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["AT+CGMM", "AT+CGMI", "AT+CGMI"]);
}

#[tokio::test]
async fn test_scan_releases_port() {
    let (scanner, access) = scanner_for(VirtualModem::new(ModemModel::Sim900));
    scanner.scan("SIM0", 115200).await.unwrap();
    assert!(!access.locks().is_held("SIM0"));

    // The same port can be scanned again
    assert!(scanner.scan("SIM0", 115200).await.is_ok());
}

// ============================================================================
// Failure outcomes
// ============================================================================

#[tokio::test]
async fn test_no_driver_matched() {
    let (scanner, access) = scanner_for(VirtualModem::rejecting());
    let err = scanner.scan("SIM0", 115200).await.unwrap_err();
    assert!(matches!(err, DetectError::NoDriverMatched { port } if port == "SIM0"));
    assert!(!access.locks().is_held("SIM0"));
}

#[tokio::test]
async fn test_echo_alone_counts_as_heard() {
    // Every command is echoed and then left unanswered
    let modem = VirtualModem::new(ModemModel::Sim900);
    modem.inject_fault("AT", Fault::Silent);
    let (scanner, _) = scanner_for(modem);
    let mut rx = scanner.subscribe();

    let err = scanner.scan("SIM0", 115200).await.unwrap_err();
    assert!(matches!(err, DetectError::NoDriverMatched { .. }));

    let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|event| match event {
            DeviceEvent::LineReceived { line, .. } => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(received, vec!["AT+CGMM", "AT+CGMI", "AT+CGMI", "AT"]);
}

#[tokio::test]
async fn test_silent_port_times_out() {
    let (scanner, _) = scanner_for(VirtualModem::unresponsive());
    let err = scanner.scan("SIM0", 115200).await.unwrap_err();
    assert!(matches!(err, DetectError::Timeout { .. }));
}

#[tokio::test]
async fn test_port_in_use() {
    let (scanner, access) = scanner_for(VirtualModem::new(ModemModel::Generic));
    let _lease = access.locks().acquire("SIM0").unwrap();

    let err = scanner.scan("SIM0", 115200).await.unwrap_err();
    assert!(matches!(err, DetectError::PortUnavailable { .. }));
}

#[tokio::test]
async fn test_missing_port() {
    let (scanner, _) = scanner_for(VirtualModem::new(ModemModel::Generic));
    let err = scanner.scan("COM42", 115200).await.unwrap_err();
    assert!(matches!(err, DetectError::PortUnavailable { port, .. } if port == "COM42"));
}

#[tokio::test]
async fn test_scan_baud_rates_prefers_no_match_over_timeout() {
    let (scanner, _) = scanner_for(VirtualModem::rejecting());
    let err = scanner
        .scan_baud_rates("SIM0", &[9600, 115200])
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::NoDriverMatched { .. }));

    let (scanner, _) = scanner_for(VirtualModem::new(ModemModel::Huawei));
    let found = scanner
        .scan_baud_rates("SIM0", &[9600, 115200])
        .await
        .unwrap();
    assert_eq!(found.identity.id, "huawei");
    assert_eq!(found.baud_rate, 9600);
}
