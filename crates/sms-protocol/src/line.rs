//! Line framing for AT command traffic
//!
//! Modems answer with lines terminated by CR, LF or CRLF. Blank lines are
//! padding and are dropped. The only frame without a line ending is the
//! `>` prompt that `AT+CMGS` emits when it is ready for message text.
//!
//! # Example
//!
//! ```rust
//! use sms_protocol::line::{Frame, LineCodec};
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"\r\n+CSQ: 21,0\r\n\r\nOK\r\n");
//!
//! assert_eq!(codec.next_frame(), Some(Ok(Frame::Line("+CSQ: 21,0".into()))));
//! assert_eq!(codec.next_frame(), Some(Ok(Frame::Line("OK".into()))));
//! assert_eq!(codec.next_frame(), None);
//! ```

use tracing::{trace, warn};

use crate::error::FrameError;

/// Maximum line length before the codec reports a framing error
pub const MAX_LINE_LEN: usize = 1024;

/// One frame read from a modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete text line, without its terminator
    Line(String),
    /// The `>` data prompt
    Prompt,
}

impl Frame {
    /// Text of the frame as it would be shown in a log
    pub fn text(&self) -> &str {
        match self {
            Frame::Line(line) => line,
            Frame::Prompt => ">",
        }
    }
}

/// Streaming line codec
#[derive(Debug)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Append raw bytes read from the transport
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next frame, if one is complete
    ///
    /// Framing errors consume the offending bytes so the stream can resync.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        let skip = self
            .buffer
            .iter()
            .take_while(|&&b| is_line_end(b))
            .count();
        self.buffer.drain(..skip);

        if self.buffer.is_empty() {
            return None;
        }

        match self.buffer.iter().position(|&b| is_line_end(b)) {
            Some(end) => {
                let bytes: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
                if bytes.len() > MAX_LINE_LEN {
                    warn!("Dropping {} byte line (max {})", bytes.len(), MAX_LINE_LEN);
                    return Some(Err(FrameError::LineTooLong {
                        len: bytes.len(),
                        max: MAX_LINE_LEN,
                    }));
                }
                match String::from_utf8(bytes) {
                    Ok(line) => Some(Ok(Frame::Line(line.trim_end().to_string()))),
                    Err(e) => {
                        warn!("Dropping line with invalid UTF-8: {}", e.utf8_error());
                        Some(Err(FrameError::InvalidUtf8(e.into_bytes())))
                    }
                }
            }
            None => {
                if self.buffer == b">" || self.buffer == b"> " {
                    self.buffer.clear();
                    trace!("Data prompt");
                    return Some(Ok(Frame::Prompt));
                }
                if self.buffer.len() > MAX_LINE_LEN {
                    let len = self.buffer.len();
                    warn!("Dropping {} buffered bytes without a line end", len);
                    self.buffer.clear();
                    return Some(Err(FrameError::LineTooLong {
                        len,
                        max: MAX_LINE_LEN,
                    }));
                }
                None
            }
        }
    }

    /// True when bytes of an unterminated line are buffered
    pub fn has_partial(&self) -> bool {
        self.buffer.iter().any(|&b| !is_line_end(b))
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn is_line_end(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(s: &str) -> Option<Result<Frame, FrameError>> {
        Some(Ok(Frame::Line(s.to_string())))
    }

    #[test]
    fn test_crlf_lines() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"AT+CGMM\r\r\nSIM900\r\n\r\nOK\r\n");

        assert_eq!(codec.next_frame(), line("AT+CGMM"));
        assert_eq!(codec.next_frame(), line("SIM900"));
        assert_eq!(codec.next_frame(), line("OK"));
        assert_eq!(codec.next_frame(), None);
    }

    #[test]
    fn test_streaming_parse() {
        let mut codec = LineCodec::new();

        codec.push_bytes(b"\r\n+CSQ: 1");
        assert!(codec.next_frame().is_none());
        assert!(codec.has_partial());

        codec.push_bytes(b"8,0\r\n");
        assert_eq!(codec.next_frame(), line("+CSQ: 18,0"));
        assert!(!codec.has_partial());
    }

    #[test]
    fn test_prompt_without_line_end() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"\r\n> ");
        assert_eq!(codec.next_frame(), Some(Ok(Frame::Prompt)));
        assert_eq!(codec.next_frame(), None);
    }

    #[test]
    fn test_invalid_utf8_is_framing_error() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&[0xFF, 0xFE, b'\r', b'\n', b'O', b'K', b'\r', b'\n']);

        assert!(matches!(
            codec.next_frame(),
            Some(Err(FrameError::InvalidUtf8(_)))
        ));
        // Codec resyncs on the following line
        assert_eq!(codec.next_frame(), line("OK"));
    }

    #[test]
    fn test_overlong_line_is_framing_error() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&vec![b'A'; MAX_LINE_LEN + 1]);

        assert!(matches!(
            codec.next_frame(),
            Some(Err(FrameError::LineTooLong { .. }))
        ));
        assert!(!codec.has_partial());
    }

    #[test]
    fn test_clear() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"stale noise");
        codec.clear();
        codec.push_bytes(b"OK\r\n");
        assert_eq!(codec.next_frame(), line("OK"));
    }

    proptest! {
        #[test]
        fn prop_lines_survive_arbitrary_chunking(
            lines in prop::collection::vec("[A-Za-z0-9+:, ]{1,40}", 1..8),
            split in 0usize..64,
        ) {
            let lines: Vec<String> = lines
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty() && l != ">")
                .collect();
            let wire: Vec<u8> = lines
                .iter()
                .flat_map(|l| format!("{}\r\n", l).into_bytes())
                .collect();

            let mut codec = LineCodec::new();
            let split = split.min(wire.len());
            let mut out = Vec::new();
            for chunk in [&wire[..split], &wire[split..]] {
                codec.push_bytes(chunk);
                while let Some(Ok(Frame::Line(l))) = codec.next_frame() {
                    out.push(l);
                }
            }
            prop_assert_eq!(out, lines);
        }
    }
}
