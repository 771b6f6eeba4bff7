//! Parser layer
//! - traits.rs: Parser trait definition
//! - types.rs: Common types (PackageInfo, RegistryType, DependencySection)
//! - json.rs: Shared tree-sitter walker for JSON manifests
//! - package_json.rs: package.json parser
//! - composer_json.rs: composer.json parser

pub mod composer_json;
mod json;
pub mod package_json;
pub mod traits;
pub mod types;

pub use composer_json::ComposerJsonParser;
pub use package_json::PackageJsonParser;
pub use traits::{ParseError, Parser};
pub use types::{DependencySection, PackageInfo, Position, RegistryType};
