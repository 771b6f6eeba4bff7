//! Writes accepted updates back into manifest text
//!
//! Edits replace only the version value; everything outside it is untouched.

use thiserror::Error;
use tracing::{debug, warn};

use crate::parser::traits::{ParseError, Parser};
use crate::parser::types::{DependencySection, PackageInfo, RegistryType};
use crate::update::view::UpdateAction;
use crate::version::classifier::{UpdateClassification, classify};
use crate::version::semver::{
    coerce_version, core_precision, parse_exact, parse_range_for, split_range_prefix,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("{name} not found in {} dependencies", .section.as_str())]
    NotFound {
        name: String,
        section: DependencySection,
    },

    #[error("Refusing to write invalid version expression: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Minimal text edit replacing one version value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub name: String,
    pub section: DependencySection,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Zero-indexed line of the value
    pub line: usize,
    /// Zero-indexed column where the value starts
    pub column: usize,
    pub old_text: String,
    pub new_text: String,
}

impl Replacement {
    fn new(package: &PackageInfo, new_text: String) -> Self {
        Self {
            name: package.name.clone(),
            section: package.section,
            start_offset: package.start_offset,
            end_offset: package.end_offset,
            line: package.line,
            column: package.column,
            old_text: package.version.clone(),
            new_text,
        }
    }

    /// Column just past the old value
    pub fn end_column(&self) -> usize {
        self.column + (self.end_offset - self.start_offset)
    }
}

/// Which buckets a bulk update accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateFilter {
    accepted: &'static [UpdateClassification],
}

impl UpdateFilter {
    /// Every actionable bucket, including updates outside the declared range
    pub fn all() -> Self {
        Self {
            accepted: &[
                UpdateClassification::Patch,
                UpdateClassification::Minor,
                UpdateClassification::Major,
                UpdateClassification::OutOfRange,
            ],
        }
    }

    /// Updates that keep the declared major version
    pub fn compatible() -> Self {
        Self {
            accepted: &[UpdateClassification::Patch, UpdateClassification::Minor],
        }
    }

    pub fn accepts(&self, classification: UpdateClassification) -> bool {
        self.accepted.contains(&classification)
    }
}

/// Outcome of planning many updates against one document
#[derive(Debug, Default)]
pub struct BulkUpdatePlan {
    pub replacements: Vec<Replacement>,
    pub failures: Vec<(String, MutationError)>,
}

impl BulkUpdatePlan {
    pub fn applied(&self) -> usize {
        self.replacements.len()
    }
}

/// Constraint to write when moving `current` to `new_version`
///
/// Major bumps drop the `^`/`~` prefix and pin the new version. Other updates
/// keep the prefix, provided the result is still a valid range.
pub fn new_constraint(current: &str, new_version: &str) -> Result<String, MutationError> {
    new_constraint_for(RegistryType::Npm, current, new_version)
}

/// [`new_constraint`] for the range semantics of `registry_type`
///
/// A Composer `~` keeps the written precision (never below `major.minor`), so
/// `~6.3` moves to `~6.4` instead of narrowing to `~6.4.1`.
pub fn new_constraint_for(
    registry_type: RegistryType,
    current: &str,
    new_version: &str,
) -> Result<String, MutationError> {
    let new_version = new_version.trim();
    let clean_new = new_version
        .strip_prefix('v')
        .or_else(|| new_version.strip_prefix('='))
        .unwrap_or(new_version);

    let Some(parsed) = parse_exact(clean_new) else {
        return Err(MutationError::InvalidFormat(new_version.to_string()));
    };

    let (prefix, rest) = split_range_prefix(current);

    let is_major = coerce_version(rest)
        .is_some_and(|base| classify(&base.to_string(), clean_new) == UpdateClassification::Major);

    if prefix.is_empty() || is_major {
        return Ok(clean_new.to_string());
    }

    let version = match (registry_type, prefix) {
        (RegistryType::Composer, "~") if core_precision(rest).unwrap_or(3) < 3 => {
            format!("{}.{}", parsed.major, parsed.minor)
        }
        _ => clean_new.to_string(),
    };

    let constraint = format!("{prefix}{version}");
    if parse_range_for(registry_type, &constraint).is_none() {
        return Err(MutationError::InvalidFormat(constraint));
    }
    Ok(constraint)
}

/// Plan the edit that moves `name` in `section` to `new_version`
pub fn plan_update(
    parser: &dyn Parser,
    content: &str,
    name: &str,
    section: DependencySection,
    new_version: &str,
) -> Result<Replacement, MutationError> {
    let package = parser
        .find_package(content, name, section)?
        .ok_or_else(|| MutationError::NotFound {
            name: name.to_string(),
            section,
        })?;

    let constraint = new_constraint_for(package.registry_type, &package.version, new_version)?;
    debug!(
        "Planned {} {} -> {} in {}",
        name,
        package.version,
        constraint,
        section.as_str()
    );
    Ok(Replacement::new(&package, constraint))
}

/// Apply non-overlapping replacements planned against `content`
pub fn apply_replacements(content: &str, replacements: &[Replacement]) -> String {
    let mut ordered: Vec<&Replacement> = replacements.iter().collect();
    // Back to front so earlier offsets stay valid
    ordered.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));

    let mut updated = content.to_string();
    for replacement in ordered {
        updated.replace_range(
            replacement.start_offset..replacement.end_offset,
            &replacement.new_text,
        );
    }
    updated
}

/// Update a single dependency and return the new document text
pub fn apply_update(
    parser: &dyn Parser,
    content: &str,
    name: &str,
    new_version: &str,
    section: DependencySection,
) -> Result<String, MutationError> {
    let replacement = plan_update(parser, content, name, section, new_version)?;
    Ok(apply_replacements(content, std::slice::from_ref(&replacement)))
}

/// Plan every target against the same original text
///
/// Failures are collected per package and never stop the remaining targets.
pub fn plan_bulk_update(
    parser: &dyn Parser,
    content: &str,
    targets: &[UpdateAction],
) -> BulkUpdatePlan {
    let mut plan = BulkUpdatePlan::default();

    for target in targets {
        match plan_update(parser, content, &target.name, target.section, &target.version) {
            Ok(replacement) => plan.replacements.push(replacement),
            Err(e) => {
                warn!("Skipping update of {}: {}", target.name, e);
                plan.failures.push((target.name.clone(), e));
            }
        }
    }

    plan
}

/// Update every target and return the new text with the plan that produced it
pub fn apply_bulk_update(
    parser: &dyn Parser,
    content: &str,
    targets: &[UpdateAction],
) -> (String, BulkUpdatePlan) {
    let plan = plan_bulk_update(parser, content, targets);
    (apply_replacements(content, &plan.replacements), plan)
}
