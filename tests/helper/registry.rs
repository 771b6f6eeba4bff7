//! Registry and store test utilities

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use manifest_lens::config::DEFAULT_REFRESH_INTERVAL_MS;
use manifest_lens::lsp::resolver::PackageResolver;
use manifest_lens::parser::composer_json::ComposerJsonParser;
use manifest_lens::parser::package_json::PackageJsonParser;
use manifest_lens::parser::types::RegistryType;
use manifest_lens::version::cache::MetadataCache;
use manifest_lens::version::error::RegistryError;
use manifest_lens::version::registry::Registry;
use manifest_lens::version::store::SqliteStore;
use manifest_lens::version::types::{PackageMetadata, VersionMetadata, now_ms};

/// Registry answering from a fixed table of latest versions
pub struct MockRegistry {
    registry_type: RegistryType,
    latest: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
}

impl MockRegistry {
    pub fn new(registry_type: RegistryType) -> Self {
        Self {
            registry_type,
            latest: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_latest(mut self, package: &str, version: &str) -> Self {
        self.latest.insert(package.to_string(), version.to_string());
        self
    }

    /// Counter of fetches served, shared with the registry
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Registry for MockRegistry {
    fn registry_type(&self) -> RegistryType {
        self.registry_type
    }

    async fn fetch_latest(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.latest.get(package_name) {
            Some(version) => Ok(PackageMetadata {
                version: version.clone(),
                description: Some(format!("{package_name} description")),
                author_name: None,
            }),
            None => Err(RegistryError::NotFound(package_name.to_string())),
        }
    }
}

/// Create a test resolver for the given environment with a mock registry
pub fn create_test_resolver(
    registry_type: RegistryType,
    mock_registry: MockRegistry,
) -> PackageResolver {
    match registry_type {
        RegistryType::Npm => PackageResolver::new(
            Arc::new(PackageJsonParser::new()),
            Arc::new(mock_registry),
        ),
        RegistryType::Composer => PackageResolver::new(
            Arc::new(ComposerJsonParser::new()),
            Arc::new(mock_registry),
        ),
    }
}

/// Create a test store with fresh cached latest versions
pub fn create_test_store(
    registry_type: RegistryType,
    latest: &[(&str, &str)],
) -> (TempDir, Arc<SqliteStore>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());

    let cache = MetadataCache::new(store.clone(), DEFAULT_REFRESH_INTERVAL_MS);
    for (package_name, version) in latest {
        cache
            .put_cached(
                registry_type,
                package_name,
                VersionMetadata {
                    latest_version: Some(version.to_string()),
                    description: None,
                    author_name: None,
                    fetched_at: now_ms(),
                },
            )
            .unwrap();
    }

    (temp_dir, store)
}
