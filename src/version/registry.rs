//! Registry trait for fetching package metadata from remote sources

#[cfg(test)]
use mockall::automock;

use crate::parser::types::RegistryType;
use crate::version::error::RegistryError;
use crate::version::types::PackageMetadata;

/// Trait for fetching the newest release of a package from a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Returns the type of registry this implementation handles
    fn registry_type(&self) -> RegistryType;

    /// Fetches metadata of the newest release of a package
    ///
    /// # Arguments
    /// * `package_name` - The name of the package (e.g., "lodash", "symfony/console")
    ///
    /// # Returns
    /// * `Ok(PackageMetadata)` - Version, description and author of the newest release
    /// * `Err(RegistryError)` - If the fetch fails
    async fn fetch_latest(&self, package_name: &str) -> Result<PackageMetadata, RegistryError>;
}
