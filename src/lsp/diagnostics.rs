//! Diagnostics generation from the document view

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range};

use crate::parser::types::PackageInfo;
use crate::update::view::{DependencyView, DocumentView};
use crate::version::classifier::UpdateClassification;

const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Generate diagnostics for every classified dependency in the view
pub fn generate_diagnostics(view: &DocumentView) -> Vec<Diagnostic> {
    view.dependencies()
        .iter()
        .filter_map(create_diagnostic)
        .collect()
}

/// Range covering the version value of a package
pub fn version_range(package: &PackageInfo) -> Range {
    Range {
        start: Position {
            line: package.line as u32,
            character: package.column as u32,
        },
        end: Position {
            line: package.line as u32,
            character: (package.column + package.end_offset - package.start_offset) as u32,
        },
    }
}

/// Returns None when no diagnostic should be shown (pending, latest, url)
fn create_diagnostic(dependency: &DependencyView) -> Option<Diagnostic> {
    let classification = dependency.classification?;
    let latest = dependency.latest_version()?;
    let current = &dependency.package.version;

    let (severity, message) = match classification {
        UpdateClassification::Latest | UpdateClassification::Url => return None,
        UpdateClassification::OutOfRange => (
            DiagnosticSeverity::WARNING,
            format!("Latest version {latest} is outside the declared range {current}"),
        ),
        UpdateClassification::Major => (
            DiagnosticSeverity::INFORMATION,
            format!("Major update available: {current} -> {latest}"),
        ),
        UpdateClassification::Minor => (
            DiagnosticSeverity::INFORMATION,
            format!("Minor update available: {current} -> {latest}"),
        ),
        UpdateClassification::Patch => (
            DiagnosticSeverity::INFORMATION,
            format!("Patch update available: {current} -> {latest}"),
        ),
        UpdateClassification::Invalid => (
            DiagnosticSeverity::WARNING,
            format!("Cannot compare version {current} with latest {latest}"),
        ),
        UpdateClassification::InvalidLatest => (
            DiagnosticSeverity::WARNING,
            format!("Registry reported an invalid latest version: {latest}"),
        ),
    };

    Some(Diagnostic {
        range: version_range(&dependency.package),
        severity: Some(severity),
        message,
        source: Some(PACKAGE_NAME.to_string()),
        code: Some(NumberOrString::String(
            classification.as_str().replace(' ', "-"),
        )),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{DependencySection, RegistryType};
    use crate::version::types::VersionMetadata;
    use rstest::rstest;

    fn view_with(version: &str, latest: Option<&str>) -> DocumentView {
        let package = PackageInfo {
            name: "lodash".to_string(),
            version: version.to_string(),
            section: DependencySection::Primary,
            registry_type: RegistryType::Npm,
            is_url: crate::version::semver::is_url_dependency(version),
            start_offset: 40,
            end_offset: 40 + version.len(),
            line: 5,
            column: 14,
        };
        let mut view = DocumentView::new(RegistryType::Npm, vec![package]);
        if let Some(latest) = latest {
            view.apply_metadata(
                "lodash",
                &VersionMetadata {
                    latest_version: Some(latest.to_string()),
                    description: None,
                    author_name: None,
                    fetched_at: 0,
                },
            );
        }
        view
    }

    #[rstest]
    #[case(
        "^4.0.0",
        "5.0.0",
        DiagnosticSeverity::WARNING,
        "Latest version 5.0.0 is outside the declared range ^4.0.0"
    )]
    #[case(
        "4.0.0",
        "5.0.0",
        DiagnosticSeverity::INFORMATION,
        "Major update available: 4.0.0 -> 5.0.0"
    )]
    #[case(
        "^4.0.0",
        "4.1.0",
        DiagnosticSeverity::INFORMATION,
        "Minor update available: ^4.0.0 -> 4.1.0"
    )]
    #[case(
        "~4.17.0",
        "4.17.21",
        DiagnosticSeverity::INFORMATION,
        "Patch update available: ~4.17.0 -> 4.17.21"
    )]
    #[case(
        "5.0.0",
        "4.17.21",
        DiagnosticSeverity::WARNING,
        "Cannot compare version 5.0.0 with latest 4.17.21"
    )]
    #[case(
        "latest",
        "not-a-version",
        DiagnosticSeverity::WARNING,
        "Registry reported an invalid latest version: not-a-version"
    )]
    fn generate_diagnostics_returns_expected_diagnostic(
        #[case] version: &str,
        #[case] latest: &str,
        #[case] expected_severity: DiagnosticSeverity,
        #[case] expected_message: &str,
    ) {
        let diagnostics = generate_diagnostics(&view_with(version, Some(latest)));

        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.severity, Some(expected_severity));
        assert_eq!(diagnostic.message, expected_message);
        assert_eq!(diagnostic.range.start, Position { line: 5, character: 14 });
        assert_eq!(
            diagnostic.range.end,
            Position {
                line: 5,
                character: 14 + version.len() as u32
            }
        );
        assert_eq!(diagnostic.source.as_deref(), Some(PACKAGE_NAME));
    }

    #[rstest]
    #[case::latest("4.17.21", Some("4.17.21"))]
    #[case::pending("4.17.0", None)]
    #[case::url("git+https://github.com/lodash/lodash.git", Some("4.17.21"))]
    fn generate_diagnostics_returns_empty(#[case] version: &str, #[case] latest: Option<&str>) {
        assert!(generate_diagnostics(&view_with(version, latest)).is_empty());
    }
}
