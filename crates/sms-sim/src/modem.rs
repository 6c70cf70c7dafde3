//! Virtual modem simulation
//!
//! A [`VirtualModem`] answers AT commands the way the reference dialects
//! do: optional echo, CR/LF framed information lines, V.250 final result
//! codes and the 27.005 `>` prompt for message text. State is shared by
//! every session on the modem, so a value written through one connection is
//! read back through the next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sms_protocol::command::{CTRL_Z, ESC};
use sms_protocol::text::decode_ucs2_hex;
use tracing::{debug, info};

/// Dialect the virtual modem imitates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModemModel {
    /// SIMCom SIM900
    Sim900,
    /// Huawei E1550
    Huawei,
    /// Wavecom Fastrack
    Wavecom,
    /// Plain 27.005 modem that no vendor probe recognizes
    Generic,
}

impl ModemModel {
    /// `AT+CGMI` answer
    pub fn manufacturer(&self) -> &'static str {
        match self {
            ModemModel::Sim900 => "SIMCOM_Ltd",
            ModemModel::Huawei => "huawei",
            ModemModel::Wavecom => "WAVECOM MODEM",
            ModemModel::Generic => "Quectel",
        }
    }

    /// `AT+CGMM` answer
    pub fn model(&self) -> &'static str {
        match self {
            ModemModel::Sim900 => "SIMCOM_SIM900",
            ModemModel::Huawei => "E1550",
            ModemModel::Wavecom => "MULTIBAND  900E  1800",
            ModemModel::Generic => "M35",
        }
    }

    /// `AT+CGMR` answer
    pub fn revision(&self) -> &'static str {
        match self {
            ModemModel::Sim900 => "Revision:1137B13SIM900M64_ST",
            ModemModel::Huawei => "11.608.12.02.143",
            ModemModel::Wavecom => "R7.46.0.201108091301.FXT009",
            ModemModel::Generic => "M35FAR02A07",
        }
    }
}

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualModemConfig {
    pub model: ModemModel,
    /// Echo commands back until `ATE0`
    pub echo: bool,
    pub imei: String,
    pub imsi: String,
    pub operator: String,
    pub service_center: String,
    /// `+CSQ` rssi index
    pub rssi: u8,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            model: ModemModel::Generic,
            echo: true,
            imei: "861234567890123".into(),
            imsi: "460001234567890".into(),
            operator: "Virtual Mobile".into(),
            service_center: "+15550000000".into(),
            rssi: 20,
        }
    }
}

/// Misbehavior injected for commands starting with a given prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Answer `+CME ERROR: 3`
    Reject,
    /// Echo, then say nothing
    Silent,
    /// Send this many lines of invalid UTF-8 before the real answer
    Garble(usize),
    /// Carry the command out but lose everything it sends back
    Lost,
}

/// A message accepted through `AT+CMGS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub reference: u32,
    /// Destination as the caller meant it (UCS2 decoded)
    pub destination: String,
    /// Text as the caller meant it (UCS2 decoded)
    pub text: String,
    /// `AT+CSCS` character set in effect
    pub charset: String,
}

#[derive(Debug)]
struct ModemState {
    config: VirtualModemConfig,
    echo: bool,
    responsive: bool,
    rejecting: bool,
    text_mode: bool,
    charset: String,
    clock: String,
    network_mode: String,
    band: String,
    faults: Vec<(String, Fault)>,
    sent: Vec<SentMessage>,
    next_reference: u32,
}

impl ModemState {
    fn fault_for(&self, upper: &str) -> Option<Fault> {
        self.faults
            .iter()
            .find(|(prefix, _)| upper.starts_with(prefix.as_str()))
            .map(|(_, f)| f.clone())
    }
}

/// A simulated modem, cheap to clone; clones share state
#[derive(Debug, Clone)]
pub struct VirtualModem {
    id: String,
    state: Arc<Mutex<ModemState>>,
}

impl VirtualModem {
    /// Create a modem of the given model with default settings
    pub fn new(model: ModemModel) -> Self {
        Self::from_config(VirtualModemConfig {
            model,
            ..Default::default()
        })
    }

    /// Create a modem from configuration
    pub fn from_config(config: VirtualModemConfig) -> Self {
        let id = format!("virtual-{}", config.model.model());
        Self {
            id,
            state: Arc::new(Mutex::new(ModemState {
                echo: config.echo,
                responsive: true,
                rejecting: false,
                text_mode: false,
                charset: "IRA".into(),
                clock: "24/01/01,12:00:00+00".into(),
                network_mode: "2,2,3FFFFFFF,1,2".into(),
                band: "4".into(),
                faults: Vec::new(),
                sent: Vec::new(),
                next_reference: 1,
                config,
            })),
        }
    }

    /// A port that never answers anything
    pub fn unresponsive() -> Self {
        let modem = Self::new(ModemModel::Generic);
        modem.state().responsive = false;
        modem
    }

    /// A modem that answers `ERROR` to everything
    pub fn rejecting() -> Self {
        let modem = Self::new(ModemModel::Generic);
        modem.state().rejecting = true;
        modem
    }

    /// Get the modem's identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> ModemModel {
        self.state().config.model
    }

    /// Misbehave on every command starting with `prefix` (case-insensitive)
    pub fn inject_fault(&self, prefix: &str, fault: Fault) {
        let prefix = prefix.to_ascii_uppercase();
        let mut state = self.state();
        state.faults.retain(|(p, _)| *p != prefix);
        state.faults.push((prefix, fault));
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Messages accepted so far
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Whether commands are currently echoed
    pub fn echo(&self) -> bool {
        self.state().echo
    }

    /// Service center number currently stored
    pub fn service_center(&self) -> String {
        self.state().config.service_center.clone()
    }

    /// Start a connection; input buffering is per session
    pub fn session(&self) -> ModemSession {
        ModemSession {
            modem: self.clone(),
            input: Vec::new(),
            pending_destination: None,
        }
    }

    fn fault_for(&self, line: &str) -> Option<Fault> {
        self.state().fault_for(&line.to_ascii_uppercase())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ModemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connection to a virtual modem
#[derive(Debug)]
pub struct ModemSession {
    modem: VirtualModem,
    input: Vec<u8>,
    /// Set between the `>` prompt and Ctrl-Z
    pending_destination: Option<String>,
}

impl ModemSession {
    /// Feed bytes written by the host; returns the bytes the modem sends back
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        self.input.extend_from_slice(data);
        let mut out = Vec::new();

        loop {
            if let Some(destination) = self.pending_destination.clone() {
                let Some(end) = self.input.iter().position(|&b| b == CTRL_Z || b == ESC) else {
                    break;
                };
                let body: Vec<u8> = self.input.drain(..=end).collect();
                self.pending_destination = None;
                if body[end] == ESC {
                    debug!("{}: message cancelled", self.modem.id);
                    push_final(&mut out, "OK");
                } else {
                    let text = String::from_utf8_lossy(&body[..end]).to_string();
                    self.submit(&destination, &text, &mut out);
                }
                continue;
            }

            // ESC only means something during message entry
            self.input.retain(|&b| b != ESC);
            let Some(end) = self.input.iter().position(|&b| b == b'\r') else {
                break;
            };
            let raw: Vec<u8> = self.input.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end])
                .trim_matches(|c| c == '\n' || c == ' ')
                .to_string();
            if line.is_empty() {
                continue;
            }

            let mark = out.len();
            self.command(&line, &mut out);
            if self.modem.fault_for(&line) == Some(Fault::Lost) {
                out.truncate(mark);
            }
        }
        out
    }

    fn command(&mut self, line: &str, out: &mut Vec<u8>) {
        let mut state = self.modem.state();
        if !state.responsive {
            return;
        }
        if state.echo {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\r');
        }
        debug!("{}: {}", self.modem.id, line);

        let upper = line.to_ascii_uppercase();
        if state.rejecting {
            push_final(out, "ERROR");
            return;
        }
        let fault = state.fault_for(&upper);
        match fault {
            Some(Fault::Silent) => return,
            Some(Fault::Reject) => {
                push_final(out, "+CME ERROR: 3");
                return;
            }
            Some(Fault::Garble(n)) => {
                for _ in 0..n {
                    out.extend_from_slice(b"\r\n\xFF\xFE\xFD\r\n");
                }
            }
            Some(Fault::Lost) | None => {}
        }

        let model = state.config.model;
        let arg = line.split_once('=').map(|(_, v)| v.trim().to_string());
        let (name, _) = upper.split_once('=').unwrap_or((upper.as_str(), ""));

        let reply: Result<Vec<String>, &str> = match name {
            "AT" | "AT+CMEE" => Ok(vec![]),
            "ATE0" => {
                state.echo = false;
                Ok(vec![])
            }
            "ATE1" => {
                state.echo = true;
                Ok(vec![])
            }
            "ATI" => Ok(vec![
                model.manufacturer().into(),
                model.model().into(),
                model.revision().into(),
            ]),
            "AT+CGMI" => Ok(vec![model.manufacturer().into()]),
            "AT+CGMM" => Ok(vec![model.model().into()]),
            "AT+CGMR" => Ok(vec![model.revision().into()]),
            "AT+CGSN" => Ok(vec![state.config.imei.clone()]),
            "AT+CIMI" => Ok(vec![state.config.imsi.clone()]),
            "AT+CSQ" => Ok(vec![format!("+CSQ: {},0", state.config.rssi)]),
            "AT+COPS?" => Ok(vec![format!("+COPS: 0,0,\"{}\"", state.config.operator)]),
            "AT+CSCA?" => Ok(vec![format!("+CSCA: \"{}\",145", state.config.service_center)]),
            "AT+CSCA" => match arg.as_deref().and_then(first_quoted) {
                Some(number) => {
                    state.config.service_center = number;
                    Ok(vec![])
                }
                None => Err("+CME ERROR: 50"),
            },
            "AT+CMGF?" => Ok(vec![format!("+CMGF: {}", u8::from(state.text_mode))]),
            "AT+CMGF" => match arg.as_deref() {
                Some("0") => {
                    state.text_mode = false;
                    Ok(vec![])
                }
                Some("1") => {
                    state.text_mode = true;
                    Ok(vec![])
                }
                _ => Err("+CMS ERROR: 304"),
            },
            "AT+CSCS?" => Ok(vec![format!("+CSCS: \"{}\"", state.charset)]),
            "AT+CSCS" => match arg.as_deref().and_then(first_quoted).as_deref() {
                Some(cs @ ("GSM" | "UCS2" | "IRA")) => {
                    state.charset = cs.to_string();
                    Ok(vec![])
                }
                _ => Err("+CME ERROR: 4"),
            },
            "AT+CCLK?" => Ok(vec![format!("+CCLK: \"{}\"", state.clock)]),
            "AT+CCLK" => match arg.as_deref().and_then(first_quoted) {
                Some(clock) => {
                    state.clock = clock;
                    Ok(vec![])
                }
                None => Err("+CME ERROR: 50"),
            },
            "AT+CBC" => Ok(vec!["+CBC: 0,85,4012".into()]),
            "AT^SYSINFO" if model == ModemModel::Huawei => {
                Ok(vec!["^SYSINFO: 2,3,0,5,1,,4".into()])
            }
            "AT^SYSCFG?" if model == ModemModel::Huawei => {
                Ok(vec![format!("^SYSCFG: {}", state.network_mode)])
            }
            "AT^SYSCFG" if model == ModemModel::Huawei => match arg {
                Some(mode) if !mode.is_empty() => {
                    state.network_mode = mode;
                    Ok(vec![])
                }
                _ => Err("ERROR"),
            },
            "AT^CURC" if model == ModemModel::Huawei => Ok(vec![]),
            "AT+WMBS?" if model == ModemModel::Wavecom => {
                Ok(vec![format!("+WMBS: {},0", state.band)])
            }
            "AT+WMBS" if model == ModemModel::Wavecom => match arg {
                Some(band) if !band.is_empty() => {
                    state.band = band;
                    Ok(vec![])
                }
                _ => Err("+CME ERROR: 3"),
            },
            "AT+CMGS" => {
                if !state.text_mode {
                    Err("+CMS ERROR: 302")
                } else {
                    match arg.as_deref().and_then(first_quoted) {
                        Some(destination) => {
                            drop(state);
                            self.pending_destination = Some(destination);
                            out.extend_from_slice(b"\r\n> ");
                            return;
                        }
                        None => Err("+CMS ERROR: 304"),
                    }
                }
            }
            _ => Err("ERROR"),
        };

        match reply {
            Ok(lines) => {
                for l in lines {
                    push_line(out, &l);
                }
                push_final(out, "OK");
            }
            Err(code) => push_final(out, code),
        }
    }

    fn submit(&mut self, destination: &str, body: &str, out: &mut Vec<u8>) {
        let mut state = self.modem.state();
        let charset = state.charset.clone();
        let decoded = if charset == "UCS2" {
            decode_ucs2_hex(destination).and_then(|d| decode_ucs2_hex(body).map(|t| (d, t)))
        } else {
            Ok((destination.to_string(), body.to_string()))
        };

        let Ok((destination, text)) = decoded else {
            push_final(out, "+CMS ERROR: 304");
            return;
        };

        let reference = state.next_reference;
        state.next_reference = (state.next_reference + 1) % 256;
        info!("{}: message {} to {}: {:?}", self.modem.id, reference, destination, text);
        state.sent.push(SentMessage {
            reference,
            destination,
            text,
            charset,
        });
        push_line(out, &format!("+CMGS: {}", reference));
        push_final(out, "OK");
    }
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn push_final(out: &mut Vec<u8>, code: &str) {
    push_line(out, code);
}

fn first_quoted(s: &str) -> Option<String> {
    let start = s.find('"')? + 1;
    let len = s[start..].find('"')?;
    Some(s[start..start + len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[test]
    fn test_echo_and_identity() {
        let modem = VirtualModem::new(ModemModel::Sim900);
        let mut session = modem.session();

        let out = text(session.process(b"AT+CGMM\r"));
        assert_eq!(out, "AT+CGMM\r\r\nSIMCOM_SIM900\r\n\r\nOK\r\n");

        session.process(b"ATE0\r");
        assert!(!modem.echo());
        let out = text(session.process(b"AT+CGMI\r"));
        assert_eq!(out, "\r\nSIMCOM_Ltd\r\n\r\nOK\r\n");
    }

    #[test]
    fn test_split_input() {
        let modem = VirtualModem::new(ModemModel::Huawei);
        let mut session = modem.session();
        assert!(session.process(b"AT+CG").is_empty());
        assert!(text(session.process(b"MI\r")).contains("huawei"));
    }

    #[test]
    fn test_vendor_commands_per_model() {
        let mut huawei = VirtualModem::new(ModemModel::Huawei).session();
        assert!(text(huawei.process(b"AT^SYSINFO\r")).contains("^SYSINFO:"));

        let mut generic = VirtualModem::new(ModemModel::Generic).session();
        assert!(text(generic.process(b"AT^SYSINFO\r")).ends_with("\r\nERROR\r\n"));
    }

    #[test]
    fn test_service_center_round_trip() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"AT+CSCA=\"+8613800100500\"\r");
        assert_eq!(modem.service_center(), "+8613800100500");
        assert!(text(session.process(b"AT+CSCA?\r")).contains("+CSCA: \"+8613800100500\",145"));
    }

    #[test]
    fn test_message_submission() {
        let modem = VirtualModem::new(ModemModel::Sim900);
        let mut session = modem.session();
        session.process(b"ATE0\r");

        // Text mode is required
        assert!(text(session.process(b"AT+CMGS=\"10086\"\r")).contains("+CMS ERROR: 302"));

        session.process(b"AT+CMGF=1\r");
        assert_eq!(text(session.process(b"AT+CMGS=\"10086\"\r")), "\r\n> ");
        let out = text(session.process(b"hello\x1A"));
        assert_eq!(out, "\r\n+CMGS: 1\r\n\r\nOK\r\n");

        let sent = modem.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "10086");
        assert_eq!(sent[0].text, "hello");
    }

    #[test]
    fn test_ucs2_submission_is_decoded() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"ATE0\rAT+CMGF=1\rAT+CSCS=\"UCS2\"\r");
        session.process(b"AT+CMGS=\"00310030\"\r");
        session.process(b"4F60597D\x1A");

        let sent = modem.sent_messages();
        assert_eq!(sent[0].destination, "10");
        assert_eq!(sent[0].text, "你好");
        assert_eq!(sent[0].charset, "UCS2");
    }

    #[test]
    fn test_escape_cancels_message() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"ATE0\rAT+CMGF=1\rAT+CMGS=\"1\"\r");
        assert_eq!(text(session.process(b"abc\x1B")), "\r\nOK\r\n");
        assert!(modem.sent_messages().is_empty());
    }

    #[test]
    fn test_faults() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"ATE0\r");

        modem.inject_fault("at+csq", Fault::Reject);
        assert_eq!(text(session.process(b"AT+CSQ\r")), "\r\n+CME ERROR: 3\r\n");

        modem.inject_fault("AT+CSQ", Fault::Silent);
        assert!(session.process(b"AT+CSQ\r").is_empty());

        modem.inject_fault("AT+CSQ", Fault::Garble(2));
        let out = session.process(b"AT+CSQ\r");
        assert_eq!(out.iter().filter(|&&b| b == 0xFF).count(), 2);

        modem.clear_faults();
        assert!(text(session.process(b"AT+CSQ\r")).contains("+CSQ: 20,0"));
    }

    #[test]
    fn test_lost_reply_still_takes_effect() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"ATE0\rAT+CMGF=1\r");

        modem.inject_fault("AT+CMGS", Fault::Lost);
        assert!(session.process(b"AT+CMGS=\"1\"\r").is_empty());
        // Still waiting for message text
        assert_eq!(text(session.process(b"\x1B")), "\r\nOK\r\n");
        assert!(modem.sent_messages().is_empty());
    }

    #[test]
    fn test_stray_escape_is_ignored() {
        let modem = VirtualModem::new(ModemModel::Generic);
        let mut session = modem.session();
        session.process(b"ATE0\r");
        assert_eq!(text(session.process(b"\x1BAT\r")), "\r\nOK\r\n");
    }

    #[test]
    fn test_unresponsive_and_rejecting() {
        let mut mute = VirtualModem::unresponsive().session();
        assert!(mute.process(b"AT\r").is_empty());

        let mut rejecting = VirtualModem::rejecting().session();
        assert_eq!(text(rejecting.process(b"AT\r")), "AT\r\r\nERROR\r\n");
    }
}
