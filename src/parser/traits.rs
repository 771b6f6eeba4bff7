//! Parser trait definition

#[cfg(test)]
use mockall::automock;

use crate::parser::types::{DependencySection, PackageInfo, Position};

/// Trait for parsing package manifest files
#[cfg_attr(test, automock)]
pub trait Parser: Send + Sync {
    /// Check if this parser can handle the given URI
    fn can_parse(&self, uri: &str) -> bool;

    /// Parse the content and extract package information
    ///
    /// A malformed document is an error, never a partial list.
    fn parse(&self, content: &str) -> Result<Vec<PackageInfo>, ParseError>;

    /// Find the declaration of `name` inside `section`
    ///
    /// Identically-named keys in other sections do not match.
    fn find_package(
        &self,
        content: &str,
        name: &str,
        section: DependencySection,
    ) -> Result<Option<PackageInfo>, ParseError> {
        Ok(self
            .parse(content)?
            .into_iter()
            .find(|p| p.name == name && p.section == section))
    }

    /// Locate the version value of `name` inside `section`
    ///
    /// Returns `None` when the declaration cannot be found (including when the
    /// document does not parse), which callers treat as "no annotation".
    fn locate(&self, content: &str, name: &str, section: DependencySection) -> Option<Position> {
        self.find_package(content, name, section)
            .ok()
            .flatten()
            .map(|p| p.position())
    }
}

/// Error type for parsing operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Failed to parse the file structure
    #[error("Failed to parse file: {0}")]
    ParseFailed(String),

    /// Invalid syntax in the file
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    /// Tree-sitter related error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}
