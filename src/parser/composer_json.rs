//! composer.json parser

use crate::parser::json::JsonManifestLayout;
use crate::parser::traits::{ParseError, Parser};
use crate::parser::types::{DependencySection, PackageInfo, RegistryType};

/// Parser for composer.json files
pub struct ComposerJsonParser {
    layout: JsonManifestLayout,
}

impl ComposerJsonParser {
    const DEPENDENCY_FIELDS: &'static [(&'static str, DependencySection)] = &[
        ("require", DependencySection::Primary),
        ("require-dev", DependencySection::Development),
    ];

    pub fn new() -> Self {
        Self {
            layout: JsonManifestLayout {
                registry_type: RegistryType::Composer,
                sections: Self::DEPENDENCY_FIELDS,
                skip_package: is_platform_package,
            },
        }
    }
}

impl Default for ComposerJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ComposerJsonParser {
    fn can_parse(&self, uri: &str) -> bool {
        uri.ends_with("/composer.json")
    }

    fn parse(&self, content: &str) -> Result<Vec<PackageInfo>, ParseError> {
        self.layout.parse(content)
    }
}

/// Platform requirements are provided by the runtime, not by Packagist
fn is_platform_package(name: &str) -> bool {
    matches!(
        name,
        "php" | "hhvm" | "composer" | "composer-plugin-api" | "composer-runtime-api"
    ) || name.starts_with("php-")
        || name.starts_with("ext-")
        || name.starts_with("lib-")
}
