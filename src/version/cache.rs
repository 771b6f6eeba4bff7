use std::sync::Arc;

use tracing::{debug, warn};

use crate::parser::types::RegistryType;
use crate::version::error::CacheError;
use crate::version::store::KeyValueStore;
use crate::version::types::{VersionMetadata, now_ms};

/// Version metadata cache partitioned per environment
///
/// Entries are keyed by `(environment id, package name)`. An entry is fresh
/// while it has a latest version and is younger than `refresh_interval` ms.
pub struct MetadataCache<S: KeyValueStore> {
    store: Arc<S>,
    refresh_interval: i64,
}

impl<S: KeyValueStore> MetadataCache<S> {
    pub fn new(store: Arc<S>, refresh_interval: i64) -> Self {
        Self {
            store,
            refresh_interval,
        }
    }

    pub fn refresh_interval(&self) -> i64 {
        self.refresh_interval
    }

    pub fn get_cached(
        &self,
        registry_type: RegistryType,
        package_name: &str,
    ) -> Result<Option<VersionMetadata>, CacheError> {
        match self.store.get(registry_type.as_str(), package_name)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store metadata; `fetched_at` never moves backwards for a key
    pub fn put_cached(
        &self,
        registry_type: RegistryType,
        package_name: &str,
        mut metadata: VersionMetadata,
    ) -> Result<(), CacheError> {
        if let Ok(Some(existing)) = self.get_cached(registry_type, package_name)
            && existing.fetched_at > metadata.fetched_at
        {
            debug!(
                "Keeping newer fetchedAt for {}/{}",
                registry_type.as_str(),
                package_name
            );
            metadata.fetched_at = existing.fetched_at;
        }

        let value = serde_json::to_value(&metadata)?;
        self.store
            .update(registry_type.as_str(), package_name, value)
    }

    pub fn is_fresh(&self, metadata: &VersionMetadata) -> bool {
        metadata.is_fresh(now_ms(), self.refresh_interval)
    }

    /// Whether the package has no usable cached metadata
    ///
    /// Unreadable entries count as missing.
    pub fn needs_fetch(&self, registry_type: RegistryType, package_name: &str) -> bool {
        match self.get_cached(registry_type, package_name) {
            Ok(Some(metadata)) => !self.is_fresh(&metadata),
            Ok(None) => true,
            Err(e) => {
                warn!(
                    "Unreadable cache entry for {}/{}: {}",
                    registry_type.as_str(),
                    package_name,
                    e
                );
                true
            }
        }
    }

    /// Cached packages of an environment whose metadata is stale
    pub fn stale_packages(&self, registry_type: RegistryType) -> Result<Vec<String>, CacheError> {
        let names = self.store.keys(registry_type.as_str())?;
        Ok(names
            .into_iter()
            .filter(|name| self.needs_fetch(registry_type, name))
            .collect())
    }
}
