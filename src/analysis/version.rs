//! Update-size and staleness analysis.

use chrono::{DateTime, Utc};
use semver::Version;

use crate::model::{StalenessTag, UpdateType};

/// Releases at least this old are `stale_minor`.
pub const STALE_MINOR_DAYS: i64 = 365;
/// Releases at least this old are `stale_major`.
pub const STALE_MAJOR_DAYS: i64 = 730;

/// Parses a version leniently as a semantic version.
///
/// Accepts an optional leading `v`, one to three numeric components (missing
/// ones are padded with zero) and an optional `-pre` / `+build` suffix.
/// Returns `None` for anything else (`1.0.post1`, `2023.10a1`, ...).
pub fn parse_version(raw: &str) -> Option<Version> {
    let text = raw.trim();
    let text = text.strip_prefix(['v', 'V']).unwrap_or(text);

    let core_end = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(core_end);

    let components: Vec<&str> = core.split('.').collect();
    if components.is_empty()
        || components.len() > 3
        || components
            .iter()
            .any(|c| c.is_empty() || !c.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = components.join(".");
    for _ in components.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}

/// Classifies the jump from `current` to `latest`.
///
/// Never fails: unparseable input is `Unknown` unless both strings are equal.
pub fn update_type(current: &str, latest: &str) -> UpdateType {
    let (Some(current_v), Some(latest_v)) = (parse_version(current), parse_version(latest)) else {
        return if current.trim() == latest.trim() {
            UpdateType::None
        } else {
            UpdateType::Unknown
        };
    };

    if latest_v <= current_v {
        UpdateType::None
    } else if latest_v.major != current_v.major {
        UpdateType::Major
    } else if latest_v.minor != current_v.minor {
        UpdateType::Minor
    } else {
        // Same numeric core but a newer pre-release also counts as a patch
        UpdateType::Patch
    }
}

/// Tags a package by the age of its most recent release.
pub fn staleness(last_release: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<StalenessTag> {
    let age_days = (now - last_release?).num_days();
    if age_days >= STALE_MAJOR_DAYS {
        Some(StalenessTag::StaleMajor)
    } else if age_days >= STALE_MINOR_DAYS {
        Some(StalenessTag::StaleMinor)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_update_type_by_highest_component() {
        assert_eq!(update_type("2.0.0", "3.0.0"), UpdateType::Major);
        assert_eq!(update_type("2.25.0", "2.31.0"), UpdateType::Minor);
        assert_eq!(update_type("1.26.5", "1.26.18"), UpdateType::Patch);
        assert_eq!(update_type("1.2.3", "1.2.3"), UpdateType::None);
        assert_eq!(update_type("1.0.0-rc.1", "1.0.0"), UpdateType::Patch);
    }

    #[test]
    fn test_short_versions_are_padded() {
        assert_eq!(parse_version("4.2"), Some(Version::new(4, 2, 0)));
        assert_eq!(parse_version("v3"), Some(Version::new(3, 0, 0)));
        assert_eq!(update_type("4.2", "5.0"), UpdateType::Major);
    }

    #[test]
    fn test_non_semantic_versions_are_unknown() {
        assert_eq!(parse_version("1.0.post1"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
        assert_eq!(update_type("2023.10a1", "2024.1"), UpdateType::Unknown);
        assert_eq!(update_type("weird-build", "weird-build"), UpdateType::None);
        assert_eq!(update_type("", "1.0.0"), UpdateType::Unknown);
    }

    #[test]
    fn test_newer_current_is_not_an_update() {
        assert_eq!(update_type("3.1.0", "3.0.0"), UpdateType::None);
    }

    #[test]
    fn test_staleness_thresholds() {
        let now = Utc::now();
        assert_eq!(staleness(Some(now - Duration::days(240)), now), None);
        assert_eq!(
            staleness(Some(now - Duration::days(400)), now),
            Some(StalenessTag::StaleMinor)
        );
        assert_eq!(
            staleness(Some(now - Duration::days(800)), now),
            Some(StalenessTag::StaleMajor)
        );
        assert_eq!(staleness(None, now), None);
    }
}
