//! Common types for parsers

use serde::{Deserialize, Serialize};

/// Type of package registry (the environment a manifest belongs to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryType {
    /// npm registry (package.json)
    Npm,
    /// Packagist (composer.json)
    Composer,
}

impl RegistryType {
    /// All supported registry types
    pub const ALL: [RegistryType; 2] = [RegistryType::Npm, RegistryType::Composer];

    /// Returns the string representation of the registry type
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Npm => "npm",
            RegistryType::Composer => "composer",
        }
    }
}

impl std::str::FromStr for RegistryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(RegistryType::Npm),
            "composer" => Ok(RegistryType::Composer),
            _ => Err(()),
        }
    }
}

/// Logical grouping of a dependency within its manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencySection {
    /// Runtime dependencies (`dependencies`, `require`)
    Primary,
    /// Development-only dependencies (`devDependencies`, `require-dev`)
    Development,
    /// `peerDependencies`
    Peer,
    /// `optionalDependencies`
    Optional,
}

impl DependencySection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencySection::Primary => "primary",
            DependencySection::Development => "development",
            DependencySection::Peer => "peer",
            DependencySection::Optional => "optional",
        }
    }
}

/// Zero-indexed location of a version value in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Information about a package dependency found in a file
///
/// Re-parsing a document produces a fresh set; records are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Package name (e.g., "lodash", "symfony/console")
    pub name: String,
    /// Raw version constraint as declared (e.g., "^1.2.0", "latest", a git URL)
    pub version: String,
    /// Section the declaration belongs to
    pub section: DependencySection,
    /// Type of registry this package belongs to
    pub registry_type: RegistryType,
    /// Constraint is a URL or repository shorthand; never fetched from the registry
    pub is_url: bool,
    /// Byte offset of the version string in the source (start)
    pub start_offset: usize,
    /// Byte offset of the version string in the source (end)
    pub end_offset: usize,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed, UTF-16 code units)
    pub column: usize,
}

impl PackageInfo {
    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }
}
