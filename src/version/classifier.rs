//! Update classification between a declared constraint and a candidate version
//!
//! Pure functions: no I/O, no cache access. The same inputs always produce the
//! same bucket.

use serde::{Deserialize, Serialize};

use crate::parser::types::RegistryType;
use crate::version::semver::{
    LATEST_SENTINEL, coerce_version, is_range, is_url_dependency, parse_exact, parse_range_for,
};

/// Update severity assigned to a (constraint, candidate) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateClassification {
    /// The constraint already points at the candidate
    Latest,
    Patch,
    Minor,
    Major,
    /// The candidate falls outside the declared `^`/`~` range
    OutOfRange,
    /// The constraint or candidate cannot be compared, or the candidate is older
    Invalid,
    /// The constraint is the `latest` sentinel but the candidate does not parse
    InvalidLatest,
    /// URL or repository dependency; never updated through the registry
    Url,
}

impl UpdateClassification {
    /// All buckets, in display order
    pub const ALL: [UpdateClassification; 8] = [
        UpdateClassification::Latest,
        UpdateClassification::Patch,
        UpdateClassification::Minor,
        UpdateClassification::Major,
        UpdateClassification::OutOfRange,
        UpdateClassification::Invalid,
        UpdateClassification::InvalidLatest,
        UpdateClassification::Url,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateClassification::Latest => "latest",
            UpdateClassification::Patch => "patch",
            UpdateClassification::Minor => "minor",
            UpdateClassification::Major => "major",
            UpdateClassification::OutOfRange => "out of range",
            UpdateClassification::Invalid => "invalid",
            UpdateClassification::InvalidLatest => "invalid latest",
            UpdateClassification::Url => "url",
        }
    }

    /// Whether applying the candidate is a meaningful update
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            UpdateClassification::Patch
                | UpdateClassification::Minor
                | UpdateClassification::Major
                | UpdateClassification::OutOfRange
        )
    }
}

impl std::fmt::Display for UpdateClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the update from `current` (declared constraint) to `candidate`
/// (latest version reported by the registry).
///
/// Ranges are read with npm semantics; see [`classify_for`].
pub fn classify(current: &str, candidate: &str) -> UpdateClassification {
    classify_for(RegistryType::Npm, current, candidate)
}

/// Classify with the range semantics of `registry_type`'s package manager
pub fn classify_for(
    registry_type: RegistryType,
    current: &str,
    candidate: &str,
) -> UpdateClassification {
    let current = current.trim();
    let candidate = candidate.trim();

    if current.is_empty() {
        return UpdateClassification::Invalid;
    }

    // URL constraints never parse as versions, so they are recognized first
    if is_url_dependency(current) || is_url_dependency(candidate) {
        return UpdateClassification::Url;
    }

    let ranged = is_range(current);
    let latest_sentinel = current == LATEST_SENTINEL;

    let range = if ranged {
        parse_range_for(registry_type, current)
    } else {
        None
    };
    let current_valid =
        latest_sentinel || range.is_some() || (!ranged && parse_exact(current).is_some());
    if !current_valid {
        return UpdateClassification::Invalid;
    }

    if parse_exact(candidate).is_none() {
        return if latest_sentinel {
            UpdateClassification::InvalidLatest
        } else {
            UpdateClassification::Invalid
        };
    }

    // The sentinel's baseline is the candidate itself
    if latest_sentinel {
        return UpdateClassification::Latest;
    }

    let (Some(current_core), Some(candidate_core)) =
        (coerce_version(current), coerce_version(candidate))
    else {
        return UpdateClassification::Invalid;
    };

    // Candidate is older than what is declared: downgrade or bad registry data
    if current_core > candidate_core {
        return UpdateClassification::Invalid;
    }

    if let Some(range) = range
        && !range.matches(&candidate_core)
    {
        return UpdateClassification::OutOfRange;
    }

    if current_core.major != candidate_core.major {
        UpdateClassification::Major
    } else if current_core.minor != candidate_core.minor {
        UpdateClassification::Minor
    } else if current_core.patch != candidate_core.patch {
        UpdateClassification::Patch
    } else {
        UpdateClassification::Latest
    }
}
