//! Final result codes (ITU-T V.250 and 3GPP TS 27.007/27.005)

use std::fmt;

/// A final result code ending a modem response
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FinalResult {
    /// `OK`
    Ok,
    /// Plain `ERROR`
    Error,
    /// `+CME ERROR: <err>` (equipment error)
    CmeError(String),
    /// `+CMS ERROR: <err>` (message service error)
    CmsError(String),
    /// `NO CARRIER`
    NoCarrier,
    /// `BUSY`
    Busy,
    /// `NO DIALTONE`
    NoDialtone,
    /// `NO ANSWER`
    NoAnswer,
}

impl FinalResult {
    /// Recognize a final result code line
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(code) = line.strip_prefix("+CME ERROR:") {
            return Some(FinalResult::CmeError(code.trim().to_string()));
        }
        if let Some(code) = line.strip_prefix("+CMS ERROR:") {
            return Some(FinalResult::CmsError(code.trim().to_string()));
        }
        match line {
            "OK" => Some(FinalResult::Ok),
            "ERROR" => Some(FinalResult::Error),
            "NO CARRIER" => Some(FinalResult::NoCarrier),
            "BUSY" => Some(FinalResult::Busy),
            "NO DIALTONE" => Some(FinalResult::NoDialtone),
            "NO ANSWER" => Some(FinalResult::NoAnswer),
            _ => None,
        }
    }

    /// True only for `OK`
    pub fn is_success(&self) -> bool {
        matches!(self, FinalResult::Ok)
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalResult::Ok => write!(f, "OK"),
            FinalResult::Error => write!(f, "ERROR"),
            FinalResult::CmeError(code) => write!(f, "+CME ERROR: {}", code),
            FinalResult::CmsError(code) => write!(f, "+CMS ERROR: {}", code),
            FinalResult::NoCarrier => write!(f, "NO CARRIER"),
            FinalResult::Busy => write!(f, "BUSY"),
            FinalResult::NoDialtone => write!(f, "NO DIALTONE"),
            FinalResult::NoAnswer => write!(f, "NO ANSWER"),
        }
    }
}
