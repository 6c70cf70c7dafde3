//! Commands, terminator policies and collected responses
//!
//! A [`Command`] is an opaque payload plus the [`Terminator`] policy that
//! decides when its response is complete. The [`Collector`] applies that
//! policy to the frames read back, independent of any I/O.

use std::fmt;
use std::str::FromStr;

use crate::line::Frame;
use crate::result_code::FinalResult;

/// Line ending appended to AT commands
pub const LINE_ENDING: &[u8] = b"\r";

/// Ctrl-Z, ends message text after the `>` prompt
pub const CTRL_Z: u8 = 0x1A;

/// ESC, aborts message text after the `>` prompt
pub const ESC: u8 = 0x1B;

/// When a response counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// A final result code
    FinalResult,
    /// A final result code or the `>` data prompt
    Prompt,
    /// The given number of information lines, or a final result code
    Lines(usize),
    /// Whatever arrives until a final result code or the window elapses
    Settle,
}

impl Terminator {
    /// Whether running out of time ends the response normally
    pub fn window_is_complete(&self) -> bool {
        matches!(self, Terminator::Settle)
    }
}

/// How a raw payload is put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// Payload text as-is
    #[default]
    Text,
    /// Payload text converted to uppercase hexadecimal digits
    Hex,
}

impl Encoding {
    /// Apply this encoding to a payload
    pub fn apply(&self, payload: &str) -> String {
        match self {
            Encoding::Text => payload.to_string(),
            Encoding::Hex => hex::encode_upper(payload.as_bytes()),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Encoding::Text),
            "hex" => Ok(Encoding::Hex),
            other => Err(format!("unknown encoding: {}", other)),
        }
    }
}

/// A command to issue to a modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    payload: Vec<u8>,
    terminator: Terminator,
    line_ending: bool,
}

impl Command {
    /// An AT command line, completed by a final result code
    pub fn at(text: impl Into<String>) -> Self {
        Self {
            payload: text.into().into_bytes(),
            terminator: Terminator::FinalResult,
            line_ending: true,
        }
    }

    /// Raw bytes written without a line ending
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: bytes.into(),
            terminator: Terminator::FinalResult,
            line_ending: false,
        }
    }

    /// Message text followed by Ctrl-Z
    pub fn message_body(text: &str) -> Self {
        let mut payload = text.as_bytes().to_vec();
        payload.push(CTRL_Z);
        Self::raw(payload)
    }

    /// A lone ESC, which abandons message text entry
    ///
    /// Outside text entry modems ignore it, so the response is collected
    /// with the `Settle` policy.
    pub fn escape() -> Self {
        Self::raw(vec![ESC]).with_terminator(Terminator::Settle)
    }

    /// Replace the terminator policy
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Terminator policy for this command
    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Payload bytes without the line ending
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes to write to the transport
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.payload.clone();
        if self.line_ending {
            out.extend_from_slice(LINE_ENDING);
        }
        out
    }

    /// Printable form for logs and line events
    pub fn display_text(&self) -> String {
        self.payload
            .iter()
            .map(|&b| match b {
                CTRL_Z => "<SUB>".to_string(),
                ESC => "<ESC>".to_string(),
                b if b.is_ascii_graphic() || b == b' ' => (b as char).to_string(),
                b => format!("<{:02X}>", b),
            })
            .collect()
    }

    /// Whether a received line is the modem echoing this command back
    pub fn is_echo(&self, line: &str) -> bool {
        let payload = String::from_utf8_lossy(&self.payload);
        let payload = payload.trim_end_matches(CTRL_Z as char).trim();
        !payload.is_empty() && line.trim() == payload
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

/// A complete (or settled) response to a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Information lines, excluding echo and the final result code
    pub lines: Vec<String>,
    /// Final result code, when one was received
    pub final_result: Option<FinalResult>,
    /// Whether the `>` prompt was received
    pub prompt: bool,
}

impl Response {
    /// True when the modem ended with `OK`, or issued a prompt without error
    pub fn is_success(&self) -> bool {
        match &self.final_result {
            Some(result) => result.is_success(),
            None => self.prompt,
        }
    }

    /// First information line
    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    /// First information line starting with `prefix`, with the prefix removed
    pub fn find_prefixed(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
            .map(str::trim)
    }

    /// All information lines joined for display
    pub fn text(&self) -> String {
        self.lines.join(" | ")
    }
}

/// Applies a command's terminator policy to incoming frames
#[derive(Debug)]
pub struct Collector<'a> {
    command: &'a Command,
    response: Response,
    seen: usize,
    echo_pending: bool,
}

impl<'a> Collector<'a> {
    /// Start collecting the response to `command`
    pub fn new(command: &'a Command) -> Self {
        Self {
            command,
            response: Response::default(),
            seen: 0,
            echo_pending: true,
        }
    }

    /// Feed one frame; returns true once the response is complete
    pub fn accept(&mut self, frame: Frame) -> bool {
        self.seen += 1;
        match frame {
            Frame::Prompt => {
                self.response.prompt = true;
                matches!(self.command.terminator(), Terminator::Prompt)
            }
            Frame::Line(line) => {
                if self.echo_pending {
                    self.echo_pending = false;
                    if self.command.is_echo(&line) {
                        return false;
                    }
                }
                if let Some(result) = FinalResult::parse(&line) {
                    self.response.final_result = Some(result);
                    return true;
                }
                self.response.lines.push(line);
                match self.command.terminator() {
                    Terminator::Lines(n) => self.response.lines.len() >= n,
                    _ => false,
                }
            }
        }
    }

    /// Number of frames received so far, echo included
    pub fn frames_seen(&self) -> usize {
        self.seen
    }

    /// Information lines received so far
    pub fn partial_lines(&self) -> &[String] {
        &self.response.lines
    }

    /// Finish and return what was collected
    pub fn finish(self) -> Response {
        self.response
    }
}
