//! Append-only log of applied updates

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::types::RegistryType;
use crate::version::classifier::UpdateClassification;
use crate::version::error::CacheError;
use crate::version::store::KeyValueStore;

const HISTORY_NAMESPACE: &str = "history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub package_name: String,
    pub environment_id: String,
    pub from_constraint: String,
    pub to_version: String,
    pub classification: UpdateClassification,
    /// Milliseconds since the UNIX epoch
    pub applied_at: i64,
}

impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied_at = DateTime::<Utc>::from_timestamp_millis(self.applied_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.applied_at.to_string());
        write!(
            f,
            "{}  {:<8} {} {} -> {} ({})",
            applied_at,
            self.environment_id,
            self.package_name,
            self.from_constraint,
            self.to_version,
            self.classification
        )
    }
}

/// Update log stored per environment under the `history` namespace
pub struct UpdateHistory<S: KeyValueStore> {
    store: Arc<S>,
    // Serializes read-modify-write appends
    append_lock: Mutex<()>,
}

impl<S: KeyValueStore> UpdateHistory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            append_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, event: UpdateEvent) -> Result<(), CacheError> {
        let _guard = self.append_lock.lock().map_err(|_| CacheError::LockPoisoned)?;

        let mut events = self.load(&event.environment_id)?;
        let key = event.environment_id.clone();
        events.push(event);
        self.store
            .update(HISTORY_NAMESPACE, &key, serde_json::to_value(&events)?)
    }

    pub fn append_all(&self, events: Vec<UpdateEvent>) -> Result<(), CacheError> {
        events.into_iter().try_for_each(|event| self.append(event))
    }

    /// Most recent events across all environments, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<UpdateEvent>, CacheError> {
        let mut events = Vec::new();
        for registry_type in RegistryType::ALL {
            events.extend(self.load(registry_type.as_str())?);
        }

        // Stable sort keeps insertion order for identical timestamps; reverse
        // afterwards so later appends come first
        events.sort_by_key(|e| e.applied_at);
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    fn load(&self, environment_id: &str) -> Result<Vec<UpdateEvent>, CacheError> {
        match self.store.get(HISTORY_NAMESPACE, environment_id)? {
            Some(Value::Array(items)) => Ok(serde_json::from_value(Value::Array(items))?),
            _ => Ok(Vec::new()),
        }
    }
}
