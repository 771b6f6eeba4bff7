//! Version metadata records

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the UNIX epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// What a registry reports about the newest release of a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub version: String,
    pub description: Option<String>,
    pub author_name: Option<String>,
}

/// Cached metadata for one package in one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub latest_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Milliseconds since the UNIX epoch
    pub fetched_at: i64,
}

impl VersionMetadata {
    pub fn from_package(metadata: PackageMetadata, fetched_at: i64) -> Self {
        Self {
            latest_version: Some(metadata.version),
            description: metadata.description,
            author_name: metadata.author_name,
            fetched_at,
        }
    }

    /// Fresh entries have a version and were fetched within `refresh_interval` ms
    pub fn is_fresh(&self, now: i64, refresh_interval: i64) -> bool {
        self.latest_version.is_some() && now - self.fetched_at < refresh_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DAY_MS: i64 = 86_400_000;

    fn metadata(latest_version: Option<&str>, fetched_at: i64) -> VersionMetadata {
        VersionMetadata {
            latest_version: latest_version.map(str::to_string),
            description: None,
            author_name: None,
            fetched_at,
        }
    }

    #[rstest]
    #[case(Some("1.0.0"), 0, DAY_MS - 1, true)]
    #[case(Some("1.0.0"), 0, DAY_MS, false)]
    #[case(Some("1.0.0"), 1_000, 1_000, true)]
    #[case(None, 0, 1, false)]
    fn is_fresh_returns_expected(
        #[case] latest_version: Option<&str>,
        #[case] fetched_at: i64,
        #[case] now: i64,
        #[case] expected: bool,
    ) {
        assert_eq!(
            metadata(latest_version, fetched_at).is_fresh(now, DAY_MS),
            expected
        );
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(VersionMetadata {
            latest_version: Some("2.0.0".to_string()),
            description: Some("A library".to_string()),
            author_name: None,
            fetched_at: 42,
        })
        .unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "latestVersion": "2.0.0",
                "description": "A library",
                "fetchedAt": 42
            })
        );
    }
}
