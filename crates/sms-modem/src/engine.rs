//! Command protocol engine
//!
//! Writes one command, then reads frames until the command's terminator
//! policy is satisfied or its deadline passes. Every line written or read is
//! published on the event bus before control returns to the caller.

use std::time::Duration;

use sms_protocol::{Collector, Command, FinalResult, Response};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ModemError;
use crate::events::EventBus;
use crate::transport::{AbortHandle, Transport, TransportError};

/// Executes commands over an open transport
#[derive(Debug)]
pub struct CommandEngine {
    transport: Transport,
    events: EventBus,
}

impl CommandEngine {
    pub fn new(transport: Transport, events: EventBus) -> Self {
        Self { transport, events }
    }

    /// Port the engine talks to
    pub fn port(&self) -> &str {
        self.transport.port()
    }

    /// Handle that aborts pending reads
    pub fn abort_handle(&self) -> AbortHandle {
        self.transport.abort_handle()
    }

    /// Issue a command and collect its response
    ///
    /// A single framing error skips the broken line and keeps reading; a
    /// second one within the same command fails with `Framing`. For the
    /// `Settle` terminator the deadline ends the response normally.
    pub async fn execute(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Response, ModemError> {
        let text = command.display_text();
        let port = self.transport.port().to_string();
        self.transport.discard_input().await;

        self.transport
            .write(&command.encode())
            .await
            .map_err(|e| map_transport(e, &port, &text, timeout, Vec::new()))?;
        debug!("{} >> {}", port, text);
        self.events.line_sent(text.clone());

        let deadline = Instant::now() + timeout;
        let mut collector = Collector::new(command);
        let mut received = Vec::new();
        let mut framing_retried = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.transport.read_line(remaining).await {
                Ok(frame) => {
                    let line = frame.text().to_string();
                    debug!("{} << {}", port, line);
                    self.events.line_received(line.clone());
                    received.push(line);
                    if collector.accept(frame) {
                        break;
                    }
                }
                Err(TransportError::Framing(e)) if !framing_retried => {
                    warn!("Framing error on {} for {:?}, retrying read: {}", port, text, e);
                    framing_retried = true;
                }
                Err(TransportError::Timeout) if command.terminator().window_is_complete() => {
                    debug!(
                        "{} settled after {} frames for {:?}",
                        port,
                        collector.frames_seen(),
                        text
                    );
                    break;
                }
                Err(e) => return Err(map_transport(e, &port, &text, timeout, received)),
            }
        }

        Ok(collector.finish())
    }

    /// Sleep for `duration`; a concurrent abort ends it early with `Closed`
    pub async fn pause(&mut self, duration: Duration) -> Result<(), ModemError> {
        let port = self.transport.port().to_string();
        self.transport
            .pause(duration)
            .await
            .map_err(|e| map_transport(e, &port, "", duration, Vec::new()))
    }

    /// Close the underlying transport; safe to call twice
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

fn map_transport(
    e: TransportError,
    port: &str,
    command: &str,
    timeout: Duration,
    partial: Vec<String>,
) -> ModemError {
    match e {
        TransportError::Timeout => ModemError::Timeout {
            command: command.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            partial,
        },
        TransportError::Closed => ModemError::Closed,
        TransportError::Disconnected => ModemError::Disconnected(port.to_string()),
        TransportError::Framing(e) => ModemError::Framing {
            command: command.to_string(),
            reason: e.to_string(),
        },
        TransportError::Io(source) => ModemError::Io {
            port: port.to_string(),
            source,
        },
    }
}

/// Turn an unsuccessful response into `Rejected`
pub fn require_success(command: &Command, response: Response) -> Result<Response, ModemError> {
    if response.is_success() {
        return Ok(response);
    }
    let result = response
        .final_result
        .clone()
        .unwrap_or(FinalResult::Error);
    Err(ModemError::Rejected {
        command: command.display_text(),
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::events::DeviceEvent;
    use sms_protocol::Terminator;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn engine() -> (CommandEngine, DuplexStream, EventBus) {
        let (client, server) = duplex(4096);
        let transport = Transport::from_io(Box::new(client), TransportConfig::new("TEST", 9600));
        let events = EventBus::new();
        (CommandEngine::new(transport, events.clone()), server, events)
    }

    /// Answer the next command with a canned reply
    fn reply(mut peer: DuplexStream, bytes: &'static [u8]) -> tokio::task::JoinHandle<DuplexStream> {
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let _ = peer.read(&mut buf).await.unwrap();
            peer.write_all(bytes).await.unwrap();
            peer
        })
    }

    #[tokio::test]
    async fn test_execute_collects_lines() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"AT+CSQ\r\r\n+CSQ: 18,0\r\n\r\nOK\r\n");

        let response = engine
            .execute(&Command::at("AT+CSQ"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.lines, vec!["+CSQ: 18,0"]);
        assert_eq!(response.final_result, Some(FinalResult::Ok));
    }

    #[tokio::test]
    async fn test_timeout_carries_partial_lines() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"\r\n+CSQ: 18,0\r\n");

        let err = engine
            .execute(&Command::at("AT+CSQ"), Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            ModemError::Timeout { partial, command, .. } => {
                assert_eq!(command, "AT+CSQ");
                assert_eq!(partial, vec!["+CSQ: 18,0"]);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_echo_only_reply_is_partial() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"AT+CGMM\r");

        let err = engine
            .execute(&Command::at("AT+CGMM"), Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            ModemError::Timeout { partial, .. } => assert_eq!(partial, vec!["AT+CGMM"]),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_millis_saturate() {
        let err = map_transport(TransportError::Timeout, "TEST", "AT", Duration::MAX, Vec::new());
        assert!(matches!(err, ModemError::Timeout { timeout_ms: u64::MAX, .. }));
    }

    #[tokio::test]
    async fn test_settle_window_is_not_an_error() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"\r\nsomething\r\n");

        let cmd = Command::at("AT+XYZ").with_terminator(Terminator::Settle);
        let response = engine.execute(&cmd, Duration::from_millis(100)).await.unwrap();
        assert_eq!(response.lines, vec!["something"]);
        assert_eq!(response.final_result, None);
    }

    #[tokio::test]
    async fn test_single_framing_error_is_retried() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"\xFF\xFE\r\nOK\r\n");

        let response = engine
            .execute(&Command::at("AT"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_second_framing_error_surfaces() {
        let (mut engine, peer, _) = engine();
        let _peer = reply(peer, b"\xFF\r\n\xFE\r\nOK\r\n");

        let err = engine
            .execute(&Command::at("AT"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ModemError::Framing { .. }));
    }

    #[tokio::test]
    async fn test_sent_event_precedes_received() {
        let (mut engine, peer, events) = engine();
        let mut rx = events.subscribe();
        let _peer = reply(peer, b"\r\nOK\r\n");

        engine
            .execute(&Command::at("AT"), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), DeviceEvent::LineSent { line, .. } if line == "AT"));
        assert!(matches!(rx.try_recv().unwrap(), DeviceEvent::LineReceived { line, .. } if line == "OK"));
    }

    #[test]
    fn test_require_success() {
        let cmd = Command::at("AT+CIMI");
        let rejected = Response {
            final_result: Some(FinalResult::CmeError("10".into())),
            ..Default::default()
        };
        let err = require_success(&cmd, rejected).unwrap_err();
        assert!(matches!(
            err,
            ModemError::Rejected { result: FinalResult::CmeError(_), .. }
        ));
    }
}
