use serde::Deserialize;
use std::path::PathBuf;

use crate::parser::types::RegistryType;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default refresh interval in milliseconds (24 hours)
pub const DEFAULT_REFRESH_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

/// Timeout for a single registry fetch in milliseconds (10 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// Batching and history
// =============================================================================

/// Number of packages fetched concurrently before waiting for the batch to settle
pub const FETCH_BATCH_SIZE: usize = 20;

/// Number of update history entries returned for display
pub const HISTORY_LIMIT: usize = 100;

/// LSP configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LspConfig {
    pub cache: CacheConfig,
    pub registries: RegistriesConfig,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache refresh interval in milliseconds
    pub refresh_interval: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

/// Registry-specific configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RegistriesConfig {
    pub npm: RegistryConfig,
    pub composer: RegistryConfig,
}

impl RegistriesConfig {
    pub fn get(&self, registry_type: RegistryType) -> &RegistryConfig {
        match registry_type {
            RegistryType::Npm => &self.npm,
            RegistryType::Composer => &self.composer,
        }
    }
}

/// Individual registry configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: bool,
    /// Base URL override (e.g. a private mirror)
    pub url: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
        }
    }
}

/// Returns the path to the data directory for manifest-lens.
/// Uses $XDG_DATA_HOME/manifest-lens if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/manifest-lens,
/// or ./manifest-lens if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the store database file.
pub fn db_path() -> PathBuf {
    data_dir().join("store.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("manifest-lens.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("manifest-lens")
}
