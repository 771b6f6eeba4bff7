//! Cache-first metadata lookup for one environment

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::config::FETCH_TIMEOUT_MS;
use crate::parser::types::RegistryType;
use crate::version::cache::MetadataCache;
use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::store::KeyValueStore;
use crate::version::types::{PackageMetadata, VersionMetadata, now_ms};

/// Fetches package metadata through the environment's cache partition
///
/// Failed fetches are logged and never written to the cache, so the package
/// is retried on the next refresh.
pub struct RegistryClient<S: KeyValueStore> {
    registry: Arc<dyn Registry>,
    cache: Arc<MetadataCache<S>>,
    timeout: Duration,
}

impl<S: KeyValueStore> RegistryClient<S> {
    pub fn new(registry: Arc<dyn Registry>, cache: Arc<MetadataCache<S>>) -> Self {
        Self {
            registry,
            cache,
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry_type(&self) -> RegistryType {
        self.registry.registry_type()
    }

    pub fn cache(&self) -> &MetadataCache<S> {
        &self.cache
    }

    /// Cached metadata regardless of freshness
    pub fn get_cached(&self, package_name: &str) -> Option<VersionMetadata> {
        self.cache
            .get_cached(self.registry_type(), package_name)
            .inspect_err(|e| {
                error!(
                    "Failed to read cache for {}/{}: {}",
                    self.registry_type().as_str(),
                    package_name,
                    e
                )
            })
            .ok()
            .flatten()
    }

    pub fn put_cached(&self, package_name: &str, metadata: VersionMetadata) {
        let _ = self
            .cache
            .put_cached(self.registry_type(), package_name, metadata)
            .inspect_err(|e| {
                error!(
                    "Failed to save metadata for {}/{}: {}",
                    self.registry_type().as_str(),
                    package_name,
                    e
                )
            });
    }

    pub fn needs_fetch(&self, package_name: &str) -> bool {
        self.cache.needs_fetch(self.registry_type(), package_name)
    }

    /// Fresh cached metadata, or a new fetch from the registry
    ///
    /// Returns `None` when the registry could not deliver a version.
    pub async fn fetch_latest(&self, package_name: &str) -> Option<VersionMetadata> {
        if let Some(cached) = self.get_cached(package_name)
            && self.cache.is_fresh(&cached)
        {
            debug!(
                "Cache hit for {}/{}",
                self.registry_type().as_str(),
                package_name
            );
            return Some(cached);
        }

        let registry_type = self.registry_type().as_str();

        match self.fetch_with_timeout(package_name).await {
            Ok(package) => {
                let metadata = VersionMetadata::from_package(package, now_ms());
                info!(
                    "Fetched {}/{}: {:?}",
                    registry_type, package_name, metadata.latest_version
                );
                self.put_cached(package_name, metadata.clone());
                Some(metadata)
            }
            Err(e) => {
                error!(
                    "Failed to fetch latest version for {}/{}: {}",
                    registry_type, package_name, e
                );
                None
            }
        }
    }

    async fn fetch_with_timeout(
        &self,
        package_name: &str,
    ) -> Result<PackageMetadata, RegistryError> {
        match timeout(self.timeout, self.registry.fetch_latest(package_name)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
