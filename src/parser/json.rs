//! Shared tree-sitter walker for JSON manifests (package.json, composer.json)

use crate::parser::traits::ParseError;
use crate::parser::types::{DependencySection, PackageInfo, RegistryType};
use crate::version::semver::is_url_dependency;
use tracing::warn;

/// Layout of a JSON manifest: which top-level keys hold dependency objects
pub(crate) struct JsonManifestLayout {
    pub registry_type: RegistryType,
    pub sections: &'static [(&'static str, DependencySection)],
    /// Keys inside a section that are not registry packages
    pub skip_package: fn(&str) -> bool,
}

impl JsonManifestLayout {
    pub fn parse(&self, content: &str) -> Result<Vec<PackageInfo>, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_json::LANGUAGE;
        parser.set_language(&language.into()).map_err(|e| {
            warn!("Failed to set JSON language for tree-sitter: {}", e);
            ParseError::TreeSitter(e.to_string())
        })?;

        let tree = parser.parse(content, None).ok_or_else(|| {
            warn!("Failed to parse JSON content");
            ParseError::ParseFailed("Failed to parse JSON".to_string())
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let point = first_error_position(root).unwrap_or(root.start_position());
            return Err(ParseError::InvalidSyntax(format!(
                "malformed JSON near line {}, column {}",
                point.row + 1,
                point.column + 1
            )));
        }

        let mut results = Vec::new();

        // Find the root object
        if let Some(document) = root.child(0)
            && document.kind() == "object"
        {
            self.extract_dependencies(document, content, &mut results);
        }

        Ok(results)
    }

    /// Extract dependencies from the root object
    fn extract_dependencies(
        &self,
        object_node: tree_sitter::Node,
        content: &str,
        results: &mut Vec<PackageInfo>,
    ) {
        let mut cursor = object_node.walk();

        for child in object_node.children(&mut cursor) {
            if child.kind() != "pair" {
                continue;
            }

            let Some(key_node) = child.child_by_field_name("key") else {
                continue;
            };

            let key_text = get_string_value(key_node, content);

            let Some(&(_, section)) = self
                .sections
                .iter()
                .find(|(field, _)| *field == key_text.as_str())
            else {
                continue;
            };

            let Some(value_node) = child.child_by_field_name("value") else {
                continue;
            };

            if value_node.kind() == "object" {
                self.extract_packages_from_object(value_node, section, content, results);
            }
        }
    }

    /// Extract packages from a dependency object (e.g., "dependencies": { ... })
    fn extract_packages_from_object(
        &self,
        object_node: tree_sitter::Node,
        section: DependencySection,
        content: &str,
        results: &mut Vec<PackageInfo>,
    ) {
        let mut cursor = object_node.walk();

        for child in object_node.children(&mut cursor) {
            if child.kind() != "pair" {
                continue;
            }

            let Some(key_node) = child.child_by_field_name("key") else {
                continue;
            };

            let Some(value_node) = child.child_by_field_name("value") else {
                continue;
            };

            if value_node.kind() != "string" {
                continue;
            }

            let name = get_string_value(key_node, content);
            if (self.skip_package)(&name) {
                continue;
            }

            let version = get_string_value(value_node, content);
            let start_point = value_node.start_position();
            let line_start = value_node.start_byte() - start_point.column;

            // The version starts after the opening quote and ends before the closing one
            results.push(PackageInfo {
                is_url: is_url_dependency(&version),
                name,
                version,
                section,
                registry_type: self.registry_type,
                start_offset: value_node.start_byte() + 1,
                end_offset: value_node.end_byte() - 1,
                line: start_point.row,
                column: utf16_len(&content[line_start..value_node.start_byte()]) + 1,
            });
        }
    }
}

/// Get the string value from a string node (removes quotes)
fn get_string_value(node: tree_sitter::Node, content: &str) -> String {
    let text = &content[node.byte_range()];
    text.trim()
        .trim_start_matches('"')
        .trim_end_matches('"')
        .to_string()
}

/// Length in UTF-16 code units, the unit of LSP `character` offsets
fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

fn first_error_position(node: tree_sitter::Node) -> Option<tree_sitter::Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }

    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| child.has_error())
        .find_map(first_error_position)
}
