//! Device façade
//!
//! A [`Device`] binds one driver to one port. All transport traffic goes
//! through a single async mutex, so the operations of one device never
//! interleave on the wire. Closing aborts whatever read is pending.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use sms_protocol::{
    Charset, Command, Driver, DriverIdentity, Encoding, FinalResult, Response, StatusField,
    TemplateContext, Terminator,
};
use tracing::{debug, info, warn};

use crate::config::{Timeouts, TransportConfig};
use crate::engine::{require_success, CommandEngine};
use crate::error::ModemError;
use crate::events::{DeviceEvent, EventBus};
use crate::port::PortAccess;
use crate::status::{FieldError, FieldState, FieldValue, StatusCache};
use crate::transport::{AbortHandle, Transport};

/// How long to wait for the modem to acknowledge an escape
const ESCAPE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug)]
enum Lifecycle {
    Idle,
    /// Port open, settle pause and init commands still running
    Opening(AbortHandle),
    Open(AbortHandle),
    Closed,
}

/// Outcome of a submitted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// Message reference from `+CMGS`, when the modem reported one
    pub reference: Option<String>,
    /// Rendered message text
    pub content: String,
    /// Character set the message went out in
    pub charset: Charset,
}

/// A modem bound to a driver and a port
pub struct Device {
    driver: Arc<Driver>,
    config: TransportConfig,
    timeouts: Timeouts,
    access: PortAccess,
    engine: tokio::sync::Mutex<Option<CommandEngine>>,
    lifecycle: Mutex<Lifecycle>,
    cache: Mutex<StatusCache>,
    events: EventBus,
}

impl Device {
    /// Bind a driver to a port; nothing is opened yet
    pub fn new(driver: Driver, config: TransportConfig, access: PortAccess) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            timeouts: Timeouts::default(),
            access,
            engine: tokio::sync::Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::Idle),
            cache: Mutex::new(StatusCache::default()),
            events: EventBus::new(),
        }
    }

    /// Replace the default time limits
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn identity(&self) -> DriverIdentity {
        self.driver.identity()
    }

    /// Driver display name
    pub fn name(&self) -> &str {
        &self.driver.display_name
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Open(_))
    }

    /// Receive line traffic and lifecycle events
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Status field names in driver order
    pub fn status_fields(&self) -> Vec<String> {
        self.driver.field_names()
    }

    /// Cached state of every field, available after close
    pub fn status(&self) -> Vec<(String, FieldState)> {
        self.cache().snapshot()
    }

    /// Open the port and run the driver's init commands
    ///
    /// Does nothing if the device is already open. If an init command fails
    /// the port is released again and the error returned. A `close()` while
    /// this is in progress aborts it with `Closed` and leaves the port free.
    pub async fn open(&self) -> Result<(), ModemError> {
        let mut slot = self.engine.lock().await;
        if slot.is_some() && self.is_open() {
            return Ok(());
        }

        let transport = Transport::open(&self.access, &self.config)?;
        let mut engine = CommandEngine::new(transport, self.events.clone());
        let was_closed = {
            let mut lifecycle = self.lifecycle();
            let was_closed = matches!(*lifecycle, Lifecycle::Closed);
            *lifecycle = Lifecycle::Opening(engine.abort_handle());
            was_closed
        };

        if let Err(e) = self.initialize(&mut engine).await {
            warn!("Opening {} failed: {}", self.config.port, e);
            engine.close().await;
            let mut lifecycle = self.lifecycle();
            if matches!(*lifecycle, Lifecycle::Opening(_)) {
                *lifecycle = if was_closed {
                    Lifecycle::Closed
                } else {
                    Lifecycle::Idle
                };
            }
            return Err(e);
        }

        let cancelled = {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Opening(_) => {
                    *lifecycle = Lifecycle::Open(engine.abort_handle());
                    false
                }
                _ => true,
            }
        };
        if cancelled {
            info!("Open of {} cancelled by close", self.config.port);
            engine.close().await;
            return Err(ModemError::Closed);
        }

        self.cache().reset(self.driver.field_names());
        *slot = Some(engine);
        drop(slot);

        info!(
            "Opened {} on {} at {} baud",
            self.driver.display_name, self.config.port, self.config.baud_rate
        );
        self.events.emit(DeviceEvent::Opened {
            identity: self.identity(),
            port: self.config.port.clone(),
        });
        Ok(())
    }

    async fn initialize(&self, engine: &mut CommandEngine) -> Result<(), ModemError> {
        engine.pause(self.timeouts.settle()).await?;

        let ctx = self.context();
        for template in &self.driver.init {
            let command = Command::at(ctx.render(template));
            let response = engine.execute(&command, self.timeouts.command()).await?;
            require_success(&command, response)?;
        }
        Ok(())
    }

    /// Read one status field and cache the outcome
    pub async fn read_field(&self, name: &str) -> Result<String, ModemError> {
        let field = self.field(name)?;
        let command = field
            .read_command(&self.context())
            .ok_or_else(|| ModemError::FieldNotReadable(name.to_string()))?;

        let result = self
            .execute_checked(&command, self.timeouts.command())
            .await
            .and_then(|response| parse_field(field, &command, &response))
            .map_err(|e| e.in_field(name));

        match &result {
            Ok(value) => {
                debug!("{} = {:?}", name, value);
                let state = self.cache().store_value(name, value);
                self.field_updated(name, state);
            }
            Err(e) if e.is_lifecycle() => {}
            Err(e) => {
                let state = self.cache().store_error(name, FieldError::from(e));
                self.field_updated(name, state);
            }
        }
        result
    }

    /// Read every readable field in order, isolating failures per field
    pub async fn read_all_fields(&self) -> Vec<(String, FieldValue)> {
        let mut results = Vec::with_capacity(self.driver.fields.len());
        for field in self.driver.fields.iter().filter(|f| f.read.is_some()) {
            let value = match self.read_field(&field.name).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("Reading {} failed: {}", field.name, e);
                    Err(FieldError::from(&e))
                }
            };
            results.push((field.name.clone(), value));
        }
        results
    }

    /// Write a status field; on success the cache holds exactly `value`
    pub async fn write_field(&self, name: &str, value: &str) -> Result<(), ModemError> {
        let field = self.field(name)?;
        let command = field
            .write_command(&self.context().with_value(value))
            .ok_or_else(|| ModemError::FieldNotWritable(name.to_string()))?;

        self.execute_checked(&command, self.timeouts.command())
            .await
            .map_err(|e| e.in_field(name))?;

        info!("{} set to {:?}", name, value);
        let state = self.cache().store_value(name, value);
        self.field_updated(name, state);
        Ok(())
    }

    /// Render `template` and submit it as a text-mode message
    pub async fn send(&self, destination: &str, template: &str) -> Result<SendReceipt, ModemError> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(ModemError::InvalidInput("destination is empty".into()));
        }

        let ctx = self.context();
        let content = ctx.render(template);
        let charset = Charset::for_text(&content);
        let profile = &self.driver.send;
        let command_timeout = self.timeouts.command();

        let mut slot = self.engine.lock().await;
        let engine = slot.as_mut().ok_or_else(|| self.unavailable())?;

        let text_mode = Command::at(ctx.render(&profile.text_mode));
        let response = engine.execute(&text_mode, command_timeout).await?;
        require_success(&text_mode, response)?;

        let select = Command::at(ctx.clone().with_value(charset.name()).render(&profile.charset));
        let response = engine.execute(&select, command_timeout).await?;
        require_success(&select, response)?;

        let submit = profile.submit_command(&ctx.clone().with_value(charset.encode(destination)));
        let submitted = match engine.execute(&submit, command_timeout).await {
            Ok(response) if response.prompt => Ok(response),
            Ok(response) => Err(ModemError::Rejected {
                command: submit.display_text(),
                result: response.final_result.unwrap_or(FinalResult::Error),
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = submitted {
            if !e.is_lifecycle() {
                // A prompt that arrives late would take the next command as message text
                if let Err(escape_err) = engine.execute(&Command::escape(), ESCAPE_WINDOW).await {
                    debug!("Escape after failed submit: {}", escape_err);
                }
            }
            return Err(e);
        }

        let body = Command::message_body(&charset.encode(&content));
        let response = engine.execute(&body, self.timeouts.send()).await?;
        let response = require_success(&body, response)?;
        drop(slot);

        let reference = response
            .find_prefixed(&profile.reference_prefix)
            .map(str::to_string);
        info!(
            "Message to {} submitted on {} (ref {:?}, {})",
            destination,
            self.config.port,
            reference,
            charset.name()
        );
        Ok(SendReceipt {
            reference,
            content,
            charset,
        })
    }

    /// Issue a payload as-is, hex-encoded first if requested
    ///
    /// The response is collected until a final result or the command timeout
    /// and returned without interpretation.
    pub async fn execute_command(
        &self,
        payload: &str,
        encoding: Encoding,
    ) -> Result<Response, ModemError> {
        let command = Command::at(encoding.apply(payload)).with_terminator(Terminator::Settle);
        let mut slot = self.engine.lock().await;
        let engine = slot.as_mut().ok_or_else(|| self.unavailable())?;
        engine.execute(&command, self.timeouts.command()).await
    }

    /// Release the port; safe to call more than once
    ///
    /// A pending operation fails promptly with `Closed`. The status cache is
    /// kept.
    pub async fn close(&self) {
        let abort = {
            let mut lifecycle = self.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
                Lifecycle::Open(handle) | Lifecycle::Opening(handle) => handle,
                Lifecycle::Idle => {
                    *lifecycle = Lifecycle::Idle;
                    return;
                }
                Lifecycle::Closed => return,
            }
        };
        abort.abort();

        // An open in progress holds the engine lock until it has backed out
        let engine = self.engine.lock().await.take();
        let Some(mut engine) = engine else {
            return;
        };
        engine.close().await;

        info!("Closed {} on {}", self.driver.display_name, self.config.port);
        self.events.emit(DeviceEvent::Closed {
            port: self.config.port.clone(),
        });
    }

    fn field(&self, name: &str) -> Result<&StatusField, ModemError> {
        self.driver
            .field(name)
            .ok_or_else(|| ModemError::UnknownField(name.to_string()))
    }

    fn context(&self) -> TemplateContext {
        TemplateContext::new(
            self.driver.display_name.clone(),
            self.config.port.clone(),
            self.config.baud_rate,
        )
    }

    async fn execute_checked(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Response, ModemError> {
        let mut slot = self.engine.lock().await;
        let engine = slot.as_mut().ok_or_else(|| self.unavailable())?;
        let response = engine.execute(command, timeout).await?;
        require_success(command, response)
    }

    fn unavailable(&self) -> ModemError {
        match *self.lifecycle() {
            Lifecycle::Idle => ModemError::NotOpen,
            _ => ModemError::Closed,
        }
    }

    fn field_updated(&self, name: &str, state: FieldState) {
        self.events.emit(DeviceEvent::FieldUpdated {
            name: name.to_string(),
            state,
        });
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, StatusCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_field(
    field: &StatusField,
    command: &Command,
    response: &Response,
) -> Result<String, ModemError> {
    field
        .parser
        .parse(response)
        .map_err(|source| ModemError::Parse {
            command: command.display_text(),
            response: response.text(),
            source,
        })
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver.id)
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_protocol::drivers;

    fn unopened() -> Device {
        Device::new(
            drivers::generic(),
            TransportConfig::new("COM7", 9600),
            PortAccess::serial(),
        )
    }

    #[tokio::test]
    async fn test_operations_before_open() {
        let device = unopened();
        assert!(!device.is_open());

        let err = device.read_field("IMEI").await.unwrap_err();
        assert!(matches!(err, ModemError::NotOpen));
        assert!(device.status().is_empty());

        let err = device.execute_command("AT", Encoding::Text).await.unwrap_err();
        assert!(matches!(err, ModemError::NotOpen));
    }

    #[tokio::test]
    async fn test_unknown_and_read_only_fields() {
        let device = unopened();
        assert!(matches!(
            device.read_field("Altitude").await,
            Err(ModemError::UnknownField(_))
        ));
        assert!(matches!(
            device.write_field("IMEI", "1").await,
            Err(ModemError::FieldNotWritable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_destination_rejected() {
        let device = unopened();
        assert!(matches!(
            device.send("  ", "hello").await,
            Err(ModemError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_close_unopened_is_noop() {
        let device = unopened();
        device.close().await;
        device.close().await;

        // Never opened, so still NotOpen rather than Closed
        let err = device.read_field("IMEI").await.unwrap_err();
        assert!(matches!(err, ModemError::NotOpen));
    }

    #[test]
    fn test_status_fields_follow_driver() {
        let device = unopened();
        assert_eq!(device.status_fields(), drivers::generic().field_names());
        assert_eq!(device.name(), "Generic GSM Modem");
    }
}
