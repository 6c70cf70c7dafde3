//! Token substitution for command and message templates
//!
//! Recognized tokens:
//!
//! | Token        | Replaced with                          |
//! |--------------|----------------------------------------|
//! | `{device}`   | driver display name                    |
//! | `{portName}` | serial port identifier                 |
//! | `{baudRate}` | baud rate                              |
//! | `{time}`     | local time, `YYYY-MM-DD HH:MM:SS`      |
//! | `{guid}`     | 32 hex digit unique identifier         |
//! | `{value}`    | value being written (write templates)  |
//!
//! Anything else in braces is left untouched. Substituted text is never
//! scanned again, so a value containing `{time}` stays literal.

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Format used for `{time}`
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values available to a template
#[derive(Debug, Clone)]
pub struct TemplateContext {
    device: String,
    port_name: String,
    baud_rate: u32,
    value: Option<String>,
    now: DateTime<Local>,
    guid: String,
}

impl TemplateContext {
    /// Context for a device, stamped with the current time and a fresh guid
    pub fn new(device: impl Into<String>, port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            port_name: port_name.into(),
            baud_rate,
            value: None,
            now: Local::now(),
            guid: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Set the `{value}` token
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Pin the `{time}` token
    pub fn at(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    /// The guid substituted for `{guid}`
    pub fn guid(&self) -> &str {
        &self.guid
    }

    fn lookup(&self, token: &str) -> Option<String> {
        match token {
            "device" => Some(self.device.clone()),
            "portName" => Some(self.port_name.clone()),
            "baudRate" => Some(self.baud_rate.to_string()),
            "time" => Some(self.now.format(TIME_FORMAT).to_string()),
            "guid" => Some(self.guid.clone()),
            "value" => self.value.clone(),
            _ => None,
        }
    }

    /// Render a template
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find(['{', '}']) {
                Some(close) if after.as_bytes()[close] == b'}' => {
                    let token = &after[..close];
                    match self.lookup(token) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(token);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    // Unclosed or nested brace: keep it literal and move on
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn context() -> TemplateContext {
        TemplateContext::new("SIM900", "COM3", 115200)
    }

    #[test]
    fn test_default_message_template() {
        let rendered = context().render("{device}({portName},{baudRate}),{time}");
        assert!(rendered.starts_with("SIM900(COM3,115200),"));

        let time = &rendered["SIM900(COM3,115200),".len()..];
        assert!(chrono::NaiveDateTime::parse_from_str(time, TIME_FORMAT).is_ok());
    }

    #[test]
    fn test_pinned_time() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 8, 5, 1).unwrap();
        let rendered = context().at(now).render("at {time}");
        assert_eq!(rendered, "at 2024-03-09 08:05:01");
    }

    #[test]
    fn test_guid_is_fresh_per_context() {
        let a = context();
        let b = context();
        assert_eq!(a.guid().len(), 32);
        assert!(a.guid().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.guid(), b.guid());
        assert_eq!(a.render("{guid}"), a.guid());
    }

    #[test]
    fn test_unrecognized_tokens_stay_literal() {
        let rendered = context().render("{device} {nope} {value} {} {unclosed");
        assert_eq!(rendered, "SIM900 {nope} {value} {} {unclosed");
    }

    #[test]
    fn test_nested_braces() {
        assert_eq!(context().render("{{device}}"), "{SIM900}");
    }

    #[test]
    fn test_value_token() {
        let rendered = context().with_value("+8613800100500").render("AT+CSCA=\"{value}\"");
        assert_eq!(rendered, "AT+CSCA=\"+8613800100500\"");
    }

    #[test]
    fn test_substituted_text_not_rescanned() {
        let rendered = context().with_value("{device}").render("{value}");
        assert_eq!(rendered, "{device}");
    }

    proptest! {
        #[test]
        fn prop_text_without_braces_is_unchanged(s in "[^{}]{0,64}") {
            prop_assert_eq!(context().render(&s), s);
        }

        #[test]
        fn prop_tokens_substitute_independently(prefix in "[a-z ]{0,8}", suffix in "[a-z ]{0,8}") {
            let template = format!("{}{{portName}}{}{{baudRate}}", prefix, suffix);
            prop_assert_eq!(
                context().render(&template),
                format!("{}COM3{}115200", prefix, suffix)
            );
        }
    }
}
