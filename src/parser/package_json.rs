//! package.json parser

use crate::parser::json::JsonManifestLayout;
use crate::parser::traits::{ParseError, Parser};
use crate::parser::types::{DependencySection, PackageInfo, RegistryType};

/// Parser for package.json files
pub struct PackageJsonParser {
    layout: JsonManifestLayout,
}

impl PackageJsonParser {
    /// Dependency field names to extract
    const DEPENDENCY_FIELDS: &'static [(&'static str, DependencySection)] = &[
        ("dependencies", DependencySection::Primary),
        ("devDependencies", DependencySection::Development),
        ("peerDependencies", DependencySection::Peer),
        ("optionalDependencies", DependencySection::Optional),
    ];

    pub fn new() -> Self {
        Self {
            layout: JsonManifestLayout {
                registry_type: RegistryType::Npm,
                sections: Self::DEPENDENCY_FIELDS,
                skip_package: |_| false,
            },
        }
    }
}

impl Default for PackageJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PackageJsonParser {
    fn can_parse(&self, uri: &str) -> bool {
        uri.ends_with("/package.json")
    }

    fn parse(&self, content: &str) -> Result<Vec<PackageInfo>, ParseError> {
        self.layout.parse(content)
    }
}
