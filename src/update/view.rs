//! Per-document view model: parsed dependencies with their metadata and bucket

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::types::{DependencySection, PackageInfo, RegistryType};
use crate::version::classifier::{UpdateClassification, classify_for};
use crate::version::types::VersionMetadata;

/// A dependency as currently shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyView {
    pub package: PackageInfo,
    pub metadata: Option<VersionMetadata>,
    /// `None` while metadata is still pending
    pub classification: Option<UpdateClassification>,
}

impl DependencyView {
    fn new(package: PackageInfo) -> Self {
        let mut view = Self {
            package,
            metadata: None,
            classification: None,
        };
        view.reclassify();
        view
    }

    /// Recompute the bucket from the current constraint
    fn reclassify(&mut self) {
        self.classification = if self.package.is_url {
            Some(UpdateClassification::Url)
        } else {
            self.metadata
                .as_ref()
                .and_then(|m| m.latest_version.as_deref())
                .map(|latest| {
                    classify_for(self.package.registry_type, &self.package.version, latest)
                })
        };
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.metadata.as_ref()?.latest_version.as_deref()
    }

    /// The update the user can apply, if the bucket allows one
    pub fn update_action(&self) -> Option<UpdateAction> {
        if !self.classification?.is_update() {
            return None;
        }
        Some(UpdateAction {
            name: self.package.name.clone(),
            section: self.package.section,
            version: self.latest_version()?.to_string(),
        })
    }

    fn title(&self) -> Option<String> {
        let classification = self.classification?;
        let title = match classification {
            UpdateClassification::Latest => "latest".to_string(),
            UpdateClassification::Url => "url dependency".to_string(),
            UpdateClassification::Invalid => "invalid version".to_string(),
            UpdateClassification::InvalidLatest => "invalid latest version".to_string(),
            _ => format!("{}: {}", classification, self.latest_version()?),
        };
        Some(title)
    }

    fn tooltip(&self) -> String {
        let mut lines = Vec::new();
        if let Some(latest) = self.latest_version() {
            lines.push(format!("{} {}", self.package.name, latest));
        }
        if let Some(metadata) = &self.metadata {
            if let Some(description) = &metadata.description {
                lines.push(description.clone());
            }
            if let Some(author) = &metadata.author_name {
                lines.push(format!("by {}", author));
            }
        }
        if lines.is_empty() {
            lines.push(self.package.name.clone());
        }
        lines.join("\n")
    }
}

/// Payload routed back to the mutator when the user accepts an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAction {
    pub name: String,
    pub section: DependencySection,
    /// Candidate version reported by the registry
    pub version: String,
}

/// Inline indicator for one dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub line: usize,
    pub column: usize,
    /// Column just past the version value
    pub end_column: usize,
    pub title: String,
    pub tooltip: String,
    pub action: Option<UpdateAction>,
}

/// Aggregate counts after a refresh settles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub total: usize,
    /// Dependencies without metadata (fetch failed or not attempted)
    pub pending: usize,
    pub counts: BTreeMap<UpdateClassification, usize>,
}

impl RefreshSummary {
    pub fn count(&self, classification: UpdateClassification) -> usize {
        self.counts.get(&classification).copied().unwrap_or(0)
    }

    pub fn updatable(&self) -> usize {
        self.counts
            .iter()
            .filter(|(c, _)| c.is_update())
            .map(|(_, n)| n)
            .sum()
    }
}

impl fmt::Display for RefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dependencies", self.total)?;
        for (classification, count) in &self.counts {
            write!(f, ", {} {}", count, classification)?;
        }
        if self.pending > 0 {
            write!(f, ", {} pending", self.pending)?;
        }
        Ok(())
    }
}

/// View of every dependency declared in one manifest
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentView {
    pub registry_type: RegistryType,
    dependencies: Vec<DependencyView>,
}

impl DocumentView {
    pub fn new(registry_type: RegistryType, packages: Vec<PackageInfo>) -> Self {
        Self {
            registry_type,
            dependencies: packages.into_iter().map(DependencyView::new).collect(),
        }
    }

    pub fn empty(registry_type: RegistryType) -> Self {
        Self::new(registry_type, Vec::new())
    }

    pub fn dependencies(&self) -> &[DependencyView] {
        &self.dependencies
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn get(&self, name: &str, section: DependencySection) -> Option<&DependencyView> {
        self.dependencies
            .iter()
            .find(|d| d.package.name == name && d.package.section == section)
    }

    /// Attach metadata to every entry named `name` (any section)
    pub fn apply_metadata(&mut self, name: &str, metadata: &VersionMetadata) {
        for dependency in self.dependencies.iter_mut().filter(|d| d.package.name == name) {
            dependency.metadata = Some(metadata.clone());
            dependency.reclassify();
        }
    }

    /// Record that `name` in `section` now declares `constraint`
    ///
    /// Returns false when the entry is not in the view.
    pub fn mark_updated(&mut self, name: &str, section: DependencySection, constraint: &str) -> bool {
        let Some(dependency) = self
            .dependencies
            .iter_mut()
            .find(|d| d.package.name == name && d.package.section == section)
        else {
            return false;
        };

        dependency.package = PackageInfo {
            version: constraint.to_string(),
            end_offset: dependency.package.start_offset + constraint.len(),
            ..dependency.package.clone()
        };
        dependency.reclassify();
        true
    }

    /// Updates accepted by `accepts`, in document order
    pub fn update_targets(
        &self,
        accepts: impl Fn(UpdateClassification) -> bool,
    ) -> Vec<(UpdateAction, UpdateClassification)> {
        self.dependencies
            .iter()
            .filter_map(|d| {
                let classification = d.classification?;
                if !accepts(classification) {
                    return None;
                }
                Some((d.update_action()?, classification))
            })
            .collect()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.dependencies
            .iter()
            .filter_map(|d| {
                Some(Annotation {
                    line: d.package.line,
                    column: d.package.column,
                    end_column: d.package.column + d.package.end_offset
                        - d.package.start_offset,
                    title: d.title()?,
                    tooltip: d.tooltip(),
                    action: d.update_action(),
                })
            })
            .collect()
    }

    pub fn summary(&self) -> RefreshSummary {
        let mut summary = RefreshSummary {
            total: self.dependencies.len(),
            ..Default::default()
        };
        for dependency in &self.dependencies {
            match dependency.classification {
                Some(c) => *summary.counts.entry(c).or_default() += 1,
                None => summary.pending += 1,
            }
        }
        summary
    }
}
