//! npm registry API implementation

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::parser::types::RegistryType;
use crate::version::error::RegistryError;
use crate::version::registries::http_client::{check_status, create_shared_client};
use crate::version::registry::Registry;
use crate::version::types::PackageMetadata;

/// Default base URL for npm registry
pub const DEFAULT_BASE_URL: &str = "https://registry.npmjs.org";

/// Response from `GET /{package}/latest`
#[derive(Debug, Deserialize)]
struct NpmLatestResponse {
    version: String,
    description: Option<String>,
    author: Option<NpmAuthor>,
}

/// `author` is either a person object or a "Name <email> (url)" string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NpmAuthor {
    Name(String),
    Person { name: Option<String> },
}

impl NpmAuthor {
    fn into_name(self) -> Option<String> {
        let name = match self {
            NpmAuthor::Name(raw) => raw
                .split(['<', '('])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            NpmAuthor::Person { name } => name?.trim().to_string(),
        };
        (!name.is_empty()).then_some(name)
    }
}

/// Registry implementation for npm registry API
pub struct NpmRegistry {
    client: Arc<Client>,
    base_url: String,
}

impl NpmRegistry {
    /// Creates a new NpmRegistry with a custom base URL
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        Ok(Self::with_client(create_shared_client()?, base_url))
    }

    pub fn with_client(client: Arc<Client>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Encode package name for URL (handles scoped packages)
    fn encode_package_name(package_name: &str) -> String {
        if package_name.starts_with('@') {
            // Scoped package: @scope/name -> @scope%2Fname
            package_name.replace('/', "%2F")
        } else {
            package_name.to_string()
        }
    }
}

#[async_trait::async_trait]
impl Registry for NpmRegistry {
    fn registry_type(&self) -> RegistryType {
        RegistryType::Npm
    }

    async fn fetch_latest(&self, package_name: &str) -> Result<PackageMetadata, RegistryError> {
        let encoded_name = Self::encode_package_name(package_name);
        let url = format!("{}/{}/latest", self.base_url, encoded_name);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, package_name)?;

        let latest: NpmLatestResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse npm registry response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        Ok(PackageMetadata {
            version: latest.version,
            description: latest.description,
            author_name: latest.author.and_then(NpmAuthor::into_name),
        })
    }
}
