//! Driver registry
//!
//! Drivers are registered once at startup as factories keyed by identifier.
//! Registration order is the order the scanner probes them in.

use std::sync::Arc;

use sms_protocol::{drivers, Driver};
use tracing::{debug, warn};

use crate::config::{Timeouts, TransportConfig};
use crate::device::Device;
use crate::error::ModemError;
use crate::port::PortAccess;

/// Builds a driver description
pub type DriverFactory = Arc<dyn Fn() -> Driver + Send + Sync>;

/// Ordered set of known drivers
#[derive(Clone, Default)]
pub struct DriverRegistry {
    entries: Vec<(String, DriverFactory)>,
}

impl DriverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference drivers in probe order
    pub fn with_reference_drivers() -> Self {
        let mut registry = Self::new();
        for driver in drivers::reference_drivers() {
            registry.register_driver(driver);
        }
        registry
    }

    /// Register a factory under `id`
    ///
    /// Registering an id twice replaces the factory but keeps its position.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Driver + Send + Sync + 'static,
    {
        let id = id.into();
        let factory: DriverFactory = Arc::new(factory);
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == id) {
            warn!("Driver {} registered twice, replacing", id);
            entry.1 = factory;
        } else {
            debug!("Registered driver {}", id);
            self.entries.push((id, factory));
        }
    }

    /// Register a fixed driver description under its own id
    pub fn register_driver(&mut self, driver: Driver) {
        let id = driver.id.clone();
        self.register(id, move || driver.clone());
    }

    /// Build the driver registered as `id`
    pub fn driver(&self, id: &str) -> Result<Driver, ModemError> {
        self.entries
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, factory)| factory())
            .ok_or_else(|| ModemError::UnknownDriver(id.to_string()))
    }

    /// All drivers in registration order
    pub fn drivers(&self) -> Vec<Driver> {
        self.entries.iter().map(|(_, factory)| factory()).collect()
    }

    /// Registered ids in order
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind driver `id` to a port without opening it
    pub fn create(
        &self,
        id: &str,
        config: TransportConfig,
        access: &PortAccess,
    ) -> Result<Device, ModemError> {
        let driver = self.driver(id)?;
        Ok(Device::new(driver, config, access.clone()))
    }

    /// Create and open a device
    pub async fn open(
        &self,
        id: &str,
        config: TransportConfig,
        timeouts: Timeouts,
        access: &PortAccess,
    ) -> Result<Device, ModemError> {
        let device = self.create(id, config, access)?.with_timeouts(timeouts);
        device.open().await?;
        Ok(device)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_order() {
        let registry = DriverRegistry::with_reference_drivers();
        assert_eq!(registry.ids(), vec!["sim900", "huawei", "wavecom", "generic"]);
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::with_reference_drivers();
        let err = registry.driver("nokia").unwrap_err();
        assert!(matches!(err, ModemError::UnknownDriver(id) if id == "nokia"));

        let access = PortAccess::serial();
        assert!(registry
            .create("nokia", TransportConfig::new("COM1", 9600), &access)
            .is_err());
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut registry = DriverRegistry::with_reference_drivers();
        registry.register("sim900", || {
            let mut driver = drivers::sim900();
            driver.display_name = "Custom SIM900".into();
            driver
        });

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.ids()[0], "sim900");
        assert_eq!(registry.driver("sim900").unwrap().display_name, "Custom SIM900");
    }
}
