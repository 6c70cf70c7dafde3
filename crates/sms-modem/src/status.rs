//! Per-device status field cache
//!
//! Every field declared by the driver has an entry as soon as the device
//! opens. Entries start empty and are overwritten by each read or write.

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::error::ModemError;

/// Snapshot of a field failure, kept in the cache and cloned into results
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{0}")]
pub struct FieldError(pub String);

impl From<&ModemError> for FieldError {
    fn from(e: &ModemError) -> Self {
        FieldError(e.to_string())
    }
}

/// Outcome of one field in a batch read
pub type FieldValue = Result<String, FieldError>;

/// Last-known state of a status field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldState {
    /// Last value read or written successfully
    pub value: Option<String>,
    /// Error from the most recent read, cleared by the next success
    pub error: Option<FieldError>,
    /// When the entry last changed
    pub updated: Option<DateTime<Local>>,
}

impl FieldState {
    /// Never read nor written
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.error.is_none()
    }
}

/// Ordered map from field name to state
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusCache {
    entries: Vec<(String, FieldState)>,
}

impl StatusCache {
    /// Empty-but-present entries for every field
    pub fn reset(&mut self, names: Vec<String>) {
        self.entries = names.into_iter().map(|n| (n, FieldState::default())).collect();
    }

    fn entry(&mut self, name: &str) -> &mut FieldState {
        let index = match self.entries.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                self.entries.push((name.to_string(), FieldState::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    /// Record a successful read or write
    pub fn store_value(&mut self, name: &str, value: &str) -> FieldState {
        let state = self.entry(name);
        state.value = Some(value.to_string());
        state.error = None;
        state.updated = Some(Local::now());
        state.clone()
    }

    /// Record a failed read; the last good value is kept
    pub fn store_error(&mut self, name: &str, error: FieldError) -> FieldState {
        let state = self.entry(name);
        state.error = Some(error);
        state.updated = Some(Local::now());
        state.clone()
    }

    pub fn snapshot(&self) -> Vec<(String, FieldState)> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_creates_empty_entries() {
        let mut cache = StatusCache::default();
        cache.reset(vec!["IMEI".into(), "Operator".into()]);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, "IMEI");
        assert!(snapshot.iter().all(|(_, s)| s.is_empty()));
    }

    #[test]
    fn test_error_keeps_last_value() {
        let mut cache = StatusCache::default();
        cache.reset(vec!["Clock".into()]);
        cache.store_value("Clock", "24/01/01,00:00:00+00");
        let state = cache.store_error("Clock", FieldError("timeout".into()));

        assert_eq!(state.value.as_deref(), Some("24/01/01,00:00:00+00"));
        assert_eq!(state.error, Some(FieldError("timeout".into())));

        let state = cache.store_value("Clock", "later");
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_field_state_serializes_timestamp() {
        let mut cache = StatusCache::default();
        cache.reset(vec!["IMEI".into()]);
        let state = cache.store_value("IMEI", "490154203237518");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["value"], "490154203237518");
        assert!(json["error"].is_null());
        let updated = json["updated"].as_str().unwrap();
        let parsed = DateTime::parse_from_rfc3339(updated).unwrap();
        assert_eq!(parsed, state.updated.unwrap());
    }
}
