//! Packagist (composer) p2 metadata API implementation

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::parser::types::RegistryType;
use crate::version::error::RegistryError;
use crate::version::registries::http_client::{check_status, create_shared_client};
use crate::version::registry::Registry;
use crate::version::semver::{coerce_version, parse_exact};
use crate::version::types::PackageMetadata;

/// Default base URL for Packagist
pub const DEFAULT_BASE_URL: &str = "https://repo.packagist.org";

/// Marker for a field removed relative to the previous entry in minified output
const UNSET_MARKER: &str = "__unset";

/// Response from `GET /p2/{vendor}/{package}.json`
#[derive(Debug, Deserialize)]
struct PackagistResponse {
    packages: HashMap<String, Vec<Map<String, Value>>>,
}

/// Registry implementation for the Packagist p2 API
pub struct PackagistRegistry {
    client: Arc<Client>,
    base_url: String,
}

impl PackagistRegistry {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        Ok(Self::with_client(create_shared_client()?, base_url))
    }

    pub fn with_client(client: Arc<Client>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Registry for PackagistRegistry {
    fn registry_type(&self) -> RegistryType {
        RegistryType::Composer
    }

    async fn fetch_latest(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        // Package name format: vendor/package
        if !package_name.contains('/') {
            return Err(RegistryError::NotFound(package_name.to_string()));
        }

        let url = format!("{}/p2/{}.json", self.base_url, package_name);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, package_name)?;

        let mut body: PackagistResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Packagist response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        let entries = body
            .packages
            .remove(package_name)
            .ok_or_else(|| RegistryError::NotFound(package_name.to_string()))?;

        select_latest(expand_minified(entries))
            .ok_or_else(|| {
                debug!("No release candidates for {}", package_name);
                RegistryError::NotFound(package_name.to_string())
            })
    }
}

/// Rebuild full entries from minified output: each entry inherits every field
/// of the previous one unless it overrides or unsets it.
fn expand_minified(entries: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    let mut expanded = Vec::with_capacity(entries.len());
    let mut previous = Map::new();

    for entry in entries {
        let mut current = previous.clone();
        for (key, value) in entry {
            if value.as_str() == Some(UNSET_MARKER) {
                current.remove(&key);
            } else {
                current.insert(key, value);
            }
        }
        previous = current.clone();
        expanded.push(current);
    }

    expanded
}

/// Newest stable release, or the newest pre-release when nothing is stable
fn select_latest(entries: Vec<Map<String, Value>>) -> Option<PackageMetadata> {
    let mut candidates: Vec<_> = entries
        .into_iter()
        .filter_map(|entry| {
            let raw = entry.get("version")?.as_str()?;
            if is_dev_version(raw) {
                return None;
            }
            let version = raw.strip_prefix('v').unwrap_or(raw).to_string();
            let order = coerce_version(&version)?;
            Some((is_stable(&version), order, version, entry))
        })
        .collect();

    // Stable first, then by numeric core descending
    candidates.sort_by(|(a_stable, a, _, _), (b_stable, b, _, _)| {
        b_stable.cmp(a_stable).then_with(|| b.cmp(a))
    });

    let (_, _, version, entry) = candidates.into_iter().next()?;

    Some(PackageMetadata {
        version,
        description: entry
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        author_name: entry
            .get("authors")
            .and_then(Value::as_array)
            .and_then(|authors| authors.first())
            .and_then(|author| author.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Check if a version is a dev version (e.g., dev-master, 2.x-dev)
fn is_dev_version(version: &str) -> bool {
    version.starts_with("dev-") || version.ends_with("-dev")
}

fn is_stable(version: &str) -> bool {
    match parse_exact(version) {
        Some(parsed) => parsed.pre.is_empty(),
        None => !version.contains('-'),
    }
}
