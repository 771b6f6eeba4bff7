use std::sync::LazyLock;

use regex::Regex;
use semver::{Version, VersionReq};

use crate::parser::types::RegistryType;

/// Constraint value meaning "whatever the registry calls latest"
pub const LATEST_SENTINEL: &str = "latest";

static NUMERIC_CORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("numeric core pattern is valid")
});

static URL_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"https?://",
        r"|git(?:\+(?:ssh|https|file))?://",
        r"|git@",
        r"|(?:workspace|file|link|portal|npm|github):",
        r"|\.{1,2}/",
        r"|[A-Za-z0-9][\w.-]*/[\w.-]+(?:#\S*)?$",
        r")",
    ))
    .expect("url dependency pattern is valid")
});

/// Parse an exact version, tolerating a leading `v` or `=`.
///
/// Partial versions ("1.2") are not exact versions.
pub fn parse_exact(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version
        .strip_prefix('=')
        .or_else(|| version.strip_prefix('v'))
        .unwrap_or(version);
    Version::parse(version).ok()
}

/// Parse a caret or tilde range (`^1.2.0`, `~1.2`)
pub fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();
    if !is_range(range) {
        return None;
    }
    VersionReq::parse(range).ok()
}

/// Parse a caret or tilde range as the environment's package manager reads it
///
/// Composer's tilde lets the last given component move: `~1.2` is
/// `>=1.2.0, <2.0.0` and `~1.2.3` is `>=1.2.3, <1.3.0`. npm keeps `~1.2`
/// below 1.3.0.
pub fn parse_range_for(registry_type: RegistryType, range: &str) -> Option<VersionReq> {
    let range = range.trim();
    match (registry_type, range.strip_prefix('~')) {
        (RegistryType::Composer, Some(rest)) => parse_composer_tilde(rest),
        _ => parse_range(range),
    }
}

fn parse_composer_tilde(rest: &str) -> Option<VersionReq> {
    VersionReq::parse(&format!("~{rest}")).ok()?;
    let base = coerce_version(rest)?;
    let upper = if core_precision(rest)? >= 3 {
        Version::new(base.major, base.minor + 1, 0)
    } else {
        Version::new(base.major + 1, 0, 0)
    };
    VersionReq::parse(&format!(">={base}, <{upper}")).ok()
}

/// Whether the constraint uses a `^` or `~` range operator
pub fn is_range(constraint: &str) -> bool {
    constraint.starts_with('^') || constraint.starts_with('~')
}

/// Split a constraint into its range operator (`^`, `~` or empty) and the rest
pub fn split_range_prefix(constraint: &str) -> (&str, &str) {
    let constraint = constraint.trim();
    if is_range(constraint) {
        constraint.split_at(1)
    } else {
        ("", constraint)
    }
}

/// Extract the first numeric `major[.minor[.patch]]` core of a string.
///
/// Missing components are zero; operators, pre-release and build metadata are
/// dropped. "^1.2" -> 1.2.0, "v2.0.0-beta.1" -> 2.0.0.
pub fn coerce_version(version: &str) -> Option<Version> {
    let captures = NUMERIC_CORE.captures(version)?;
    let component = |i: usize| -> Option<u64> {
        match captures.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version::new(component(1)?, component(2)?, component(3)?))
}

/// Number of components written in the first numeric core ("6.3" -> 2)
pub fn core_precision(version: &str) -> Option<usize> {
    let captures = NUMERIC_CORE.captures(version)?;
    Some((1..=3).filter(|&i| captures.get(i).is_some()).count())
}

/// Whether a constraint points at a URL or repository instead of a registry version
///
/// Matches http(s) and git schemes, the `git@` SSH shorthand, local paths,
/// the `owner/repo` shorthand and npm protocols (`workspace:`, `file:`,
/// `link:`, `portal:`, `github:`, and `npm:` aliases).
pub fn is_url_dependency(constraint: &str) -> bool {
    URL_DEPENDENCY.is_match(constraint.trim())
}
