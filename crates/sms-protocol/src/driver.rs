//! Declarative modem dialect descriptions
//!
//! A [`Driver`] is data: the probe used to recognize the dialect, the
//! commands run when a port is opened, the [`StatusField`] catalog and the
//! [`SendProfile`] for submitting messages. Adding a dialect means building
//! one of these, not writing new I/O code.

use crate::command::{Command, Response, Terminator};
use crate::error::ParseError;
use crate::template::TemplateContext;

/// Driver identifier and display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverIdentity {
    /// Registry key, e.g. `sim900`
    pub id: String,
    /// Human-readable name, e.g. `SIMCom SIM900`
    pub display_name: String,
}

/// Predicate applied to a probe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMatch {
    /// Some information line contains the text
    Contains(String),
    /// Some information line contains the text, ignoring ASCII case
    ContainsIgnoreCase(String),
    /// The response ended with `OK`
    FinalOk,
}

/// Probe command and its expected answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// AT command sent while scanning
    pub command: String,
    /// Predicate deciding whether the answer belongs to this dialect
    pub expect: ProbeMatch,
}

impl Probe {
    /// Probe completed by a final result code
    pub fn new(command: impl Into<String>, expect: ProbeMatch) -> Self {
        Self {
            command: command.into(),
            expect,
        }
    }

    /// The command to issue
    pub fn to_command(&self) -> Command {
        Command::at(self.command.clone())
    }

    /// Test a response against the predicate
    pub fn matches(&self, response: &Response) -> bool {
        match &self.expect {
            ProbeMatch::Contains(needle) => response.lines.iter().any(|l| l.contains(needle.as_str())),
            ProbeMatch::ContainsIgnoreCase(needle) => {
                let needle = needle.to_ascii_lowercase();
                response
                    .lines
                    .iter()
                    .any(|l| l.to_ascii_lowercase().contains(&needle))
            }
            ProbeMatch::FinalOk => response.is_success(),
        }
    }
}

/// How a status field's raw response becomes a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldParser {
    /// First information line, verbatim
    Raw,
    /// Text after a `+XXX:` prefix
    Prefixed(String),
    /// First quoted string after a prefix
    Quoted(String),
    /// Comma-separated item after a prefix (zero-based)
    Csv { prefix: String, index: usize },
    /// `+CSQ: <rssi>,<ber>` rendered as dBm
    SignalQuality,
}

impl FieldParser {
    /// Parse a successful response
    pub fn parse(&self, response: &Response) -> Result<String, ParseError> {
        match self {
            FieldParser::Raw => response
                .first_line()
                .map(|l| l.trim().to_string())
                .ok_or(ParseError::Empty),
            FieldParser::Prefixed(prefix) => response
                .find_prefixed(prefix)
                .map(str::to_string)
                .ok_or_else(|| ParseError::MissingPrefix(prefix.clone())),
            FieldParser::Quoted(prefix) => {
                let rest = response
                    .find_prefixed(prefix)
                    .ok_or_else(|| ParseError::MissingPrefix(prefix.clone()))?;
                first_quoted(rest).ok_or_else(|| ParseError::Unquoted(rest.to_string()))
            }
            FieldParser::Csv { prefix, index } => {
                let rest = response
                    .find_prefixed(prefix)
                    .ok_or_else(|| ParseError::MissingPrefix(prefix.clone()))?;
                rest.split(',')
                    .nth(*index)
                    .map(|item| item.trim().trim_matches('"').to_string())
                    .ok_or_else(|| ParseError::MissingItem {
                        index: *index,
                        line: rest.to_string(),
                    })
            }
            FieldParser::SignalQuality => {
                let rest = response
                    .find_prefixed("+CSQ:")
                    .ok_or_else(|| ParseError::MissingPrefix("+CSQ:".into()))?;
                let rssi = rest.split(',').next().unwrap_or_default().trim();
                let rssi: i32 = rssi
                    .parse()
                    .map_err(|_| ParseError::InvalidNumber(rssi.to_string()))?;
                Ok(signal_quality_display(rssi))
            }
        }
    }
}

/// Render a `+CSQ` rssi index (27.007 §8.5)
pub fn signal_quality_display(rssi: i32) -> String {
    match rssi {
        0..=31 => format!("{} dBm ({}/31)", -113 + 2 * rssi, rssi),
        _ => "unknown".to_string(),
    }
}

fn first_quoted(s: &str) -> Option<String> {
    let start = s.find('"')? + 1;
    let len = s[start..].find('"')?;
    Some(s[start..start + len].to_string())
}

/// A named, independently readable and writable device attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusField {
    /// Display name, also the cache key
    pub name: String,
    /// Read command template, absent for write-only fields
    pub read: Option<String>,
    /// Write command template (uses `{value}`), absent for read-only fields
    pub write: Option<String>,
    /// Response parser for reads
    pub parser: FieldParser,
}

impl StatusField {
    /// Read-only field
    pub fn read_only(name: &str, read: &str, parser: FieldParser) -> Self {
        Self {
            name: name.to_string(),
            read: Some(read.to_string()),
            write: None,
            parser,
        }
    }

    /// Readable and writable field
    pub fn read_write(name: &str, read: &str, write: &str, parser: FieldParser) -> Self {
        Self {
            name: name.to_string(),
            read: Some(read.to_string()),
            write: Some(write.to_string()),
            parser,
        }
    }

    /// Render the read command, if the field is readable
    pub fn read_command(&self, ctx: &TemplateContext) -> Option<Command> {
        self.read.as_deref().map(|t| Command::at(ctx.render(t)))
    }

    /// Render the write command, if the field is writable
    pub fn write_command(&self, ctx: &TemplateContext) -> Option<Command> {
        self.write.as_deref().map(|t| Command::at(ctx.render(t)))
    }
}

/// Commands used to submit a text-mode message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendProfile {
    /// Switches the modem to text mode
    pub text_mode: String,
    /// Charset selection template, `{value}` is the charset name
    pub charset: String,
    /// Submit template, `{value}` is the (encoded) destination
    pub submit: String,
    /// Prefix of the line carrying the message reference
    pub reference_prefix: String,
}

impl SendProfile {
    /// 3GPP TS 27.005 text mode
    pub fn text_mode() -> Self {
        Self {
            text_mode: "AT+CMGF=1".into(),
            charset: "AT+CSCS=\"{value}\"".into(),
            submit: "AT+CMGS=\"{value}\"".into(),
            reference_prefix: "+CMGS:".into(),
        }
    }

    /// Render the submit command; it completes on the `>` prompt
    pub fn submit_command(&self, ctx: &TemplateContext) -> Command {
        Command::at(ctx.render(&self.submit)).with_terminator(Terminator::Prompt)
    }
}

/// A modem dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    /// Registry key
    pub id: String,
    /// Human-readable name, substituted for `{device}`
    pub display_name: String,
    /// Detection probe
    pub probe: Probe,
    /// Commands run after the port opens
    pub init: Vec<String>,
    /// Ordered status field catalog
    pub fields: Vec<StatusField>,
    /// Message submission commands
    pub send: SendProfile,
}

impl Driver {
    /// Identity used in scan results
    pub fn identity(&self) -> DriverIdentity {
        DriverIdentity {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&StatusField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in catalog order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_code::FinalResult;

    fn ok(lines: &[&str]) -> Response {
        Response {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            final_result: Some(FinalResult::Ok),
            prompt: false,
        }
    }

    #[test]
    fn test_probe_contains() {
        let probe = Probe::new("AT+CGMM", ProbeMatch::Contains("SIM900".into()));
        assert!(probe.matches(&ok(&["SIM900 R11.0"])));
        assert!(!probe.matches(&ok(&["E1550"])));
        assert_eq!(probe.to_command().encode(), b"AT+CGMM\r");
    }

    #[test]
    fn test_probe_ignore_case() {
        let probe = Probe::new("AT+CGMI", ProbeMatch::ContainsIgnoreCase("HUAWEI".into()));
        assert!(probe.matches(&ok(&["huawei"])));
        assert!(!probe.matches(&ok(&["WAVECOM MODEM"])));
    }

    #[test]
    fn test_probe_final_ok() {
        let probe = Probe::new("AT", ProbeMatch::FinalOk);
        assert!(probe.matches(&ok(&[])));
        let err = Response {
            final_result: Some(FinalResult::Error),
            ..Default::default()
        };
        assert!(!probe.matches(&err));
    }

    #[test]
    fn test_parsers() {
        assert_eq!(FieldParser::Raw.parse(&ok(&["SIMCOM_Ltd"])), Ok("SIMCOM_Ltd".into()));
        assert_eq!(FieldParser::Raw.parse(&ok(&[])), Err(ParseError::Empty));

        let cops = ok(&["+COPS: 0,0,\"CHINA MOBILE\""]);
        assert_eq!(
            FieldParser::Quoted("+COPS:".into()).parse(&cops),
            Ok("CHINA MOBILE".into())
        );
        assert_eq!(
            FieldParser::Csv {
                prefix: "+COPS:".into(),
                index: 2
            }
            .parse(&cops),
            Ok("CHINA MOBILE".into())
        );
        assert!(matches!(
            FieldParser::Csv {
                prefix: "+COPS:".into(),
                index: 5
            }
            .parse(&cops),
            Err(ParseError::MissingItem { index: 5, .. })
        ));
        assert_eq!(
            FieldParser::Prefixed("+CMGF:".into()).parse(&ok(&["+CMGF: 1"])),
            Ok("1".into())
        );
        assert_eq!(
            FieldParser::Quoted("+CSCA:".into()).parse(&ok(&["+CSCA: 145"])),
            Err(ParseError::Unquoted("145".into()))
        );
    }

    #[test]
    fn test_signal_quality() {
        let parser = FieldParser::SignalQuality;
        assert_eq!(parser.parse(&ok(&["+CSQ: 20,0"])), Ok("-73 dBm (20/31)".into()));
        assert_eq!(parser.parse(&ok(&["+CSQ: 99,99"])), Ok("unknown".into()));
        assert!(matches!(
            parser.parse(&ok(&["+CSQ: x,0"])),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_field_commands() {
        let field = StatusField::read_write(
            "Service Center",
            "AT+CSCA?",
            "AT+CSCA=\"{value}\"",
            FieldParser::Quoted("+CSCA:".into()),
        );
        let ctx = TemplateContext::new("SIM900", "COM3", 115200).with_value("+8613800100500");
        assert_eq!(
            field.write_command(&ctx).unwrap().encode(),
            b"AT+CSCA=\"+8613800100500\"\r"
        );
        assert_eq!(field.read_command(&ctx).unwrap().encode(), b"AT+CSCA?\r");

        let ro = StatusField::read_only("IMEI", "AT+CGSN", FieldParser::Raw);
        assert!(ro.write_command(&ctx).is_none());
    }

    #[test]
    fn test_submit_command_waits_for_prompt() {
        let ctx = TemplateContext::new("SIM900", "COM3", 115200).with_value("10086");
        let cmd = SendProfile::text_mode().submit_command(&ctx);
        assert_eq!(cmd.encode(), b"AT+CMGS=\"10086\"\r");
        assert_eq!(cmd.terminator(), Terminator::Prompt);
    }
}
