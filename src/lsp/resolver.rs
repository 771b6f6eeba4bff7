//! Per-environment capability table
//!
//! Groups the parser and registry that together detect, parse, fetch and
//! mutate dependencies of one manifest ecosystem.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::RegistriesConfig;
use crate::parser::composer_json::ComposerJsonParser;
use crate::parser::package_json::PackageJsonParser;
use crate::parser::traits::Parser;
use crate::parser::types::{DependencySection, RegistryType};
use crate::update::mutator::{
    BulkUpdatePlan, MutationError, Replacement, plan_bulk_update, plan_update,
};
use crate::update::view::UpdateAction;
use crate::version::error::RegistryError;
use crate::version::registries::{
    NpmRegistry, PackagistRegistry, create_shared_client, npm, packagist,
};
use crate::version::registry::Registry;

/// Groups all components needed to resolve package versions for one environment.
pub struct PackageResolver {
    parser: Arc<dyn Parser>,
    registry: Arc<dyn Registry>,
}

impl PackageResolver {
    pub fn new(parser: Arc<dyn Parser>, registry: Arc<dyn Registry>) -> Self {
        Self { parser, registry }
    }

    /// Get the parser for this environment
    pub fn parser(&self) -> &Arc<dyn Parser> {
        &self.parser
    }

    /// Get the registry for fetching metadata
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Whether this environment handles the document at `uri`
    pub fn detect(&self, uri: &str) -> bool {
        self.parser.can_parse(uri)
    }

    /// Plan the edit that moves `name` in `section` to `new_version`
    pub fn plan_update(
        &self,
        content: &str,
        name: &str,
        section: DependencySection,
        new_version: &str,
    ) -> Result<Replacement, MutationError> {
        plan_update(&*self.parser, content, name, section, new_version)
    }

    /// Plan edits for every target; failures are reported per package
    pub fn plan_bulk_update(&self, content: &str, targets: &[UpdateAction]) -> BulkUpdatePlan {
        plan_bulk_update(&*self.parser, content, targets)
    }
}

/// Create resolvers for every enabled environment, sharing one HTTP client
pub fn create_default_resolvers(
    config: &RegistriesConfig,
) -> Result<HashMap<RegistryType, PackageResolver>, RegistryError> {
    let client = create_shared_client()?;
    let mut resolvers = HashMap::new();

    for registry_type in RegistryType::ALL {
        let registry_config = config.get(registry_type);
        if !registry_config.enabled {
            info!("Registry {} disabled by configuration", registry_type.as_str());
            continue;
        }

        let resolver = match registry_type {
            RegistryType::Npm => {
                let base_url = registry_config.url.as_deref().unwrap_or(npm::DEFAULT_BASE_URL);
                PackageResolver::new(
                    Arc::new(PackageJsonParser::new()),
                    Arc::new(NpmRegistry::with_client(client.clone(), base_url)),
                )
            }
            RegistryType::Composer => {
                let base_url = registry_config
                    .url
                    .as_deref()
                    .unwrap_or(packagist::DEFAULT_BASE_URL);
                PackageResolver::new(
                    Arc::new(ComposerJsonParser::new()),
                    Arc::new(PackagistRegistry::with_client(client.clone(), base_url)),
                )
            }
        };
        resolvers.insert(registry_type, resolver);
    }

    Ok(resolvers)
}
