//! Canonical data model shared by the parser, analyzers and report builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::RegistryStats;

// ============================================================================
// Names
// ============================================================================

/// Normalizes a package name into its canonical registry key.
///
/// Lower-cases the name and collapses every run of `-`, `_` and `.` into a
/// single `-`, so `Flask_Pkg`, `flask.pkg` and `flask-pkg` share one key.
/// Applying it twice yields the same result as applying it once.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }
    out
}

// ============================================================================
// Enumerations
// ============================================================================

/// Size of the version jump between the installed and the latest release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    None,
    Patch,
    Minor,
    Major,
    /// Either version could not be parsed semantically.
    Unknown,
}

/// Release-age tag, independent of whether an update exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessTag {
    /// Last release at least one year ago.
    StaleMinor,
    /// Last release at least two years ago.
    StaleMajor,
}

/// Vulnerability severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a severity label case-insensitively (`"HIGH"`, `"High"`, ...).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Critical and high findings are the ones that block a build.
    pub fn is_blocking(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Coarse licence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseCategory {
    Permissive,
    Copyleft,
    Unknown,
}

/// Final health classification of a dependency.
///
/// Chosen by priority: vulnerable > deprecated > outdated > healthy.
/// `Unknown` is used for dependencies the registry could not resolve and that
/// have no known vulnerability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Outdated,
    Vulnerable,
    Deprecated,
    Unknown,
}

/// How registry metadata for a dependency was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionState {
    /// Fresh cache entry or a successful network fetch.
    Fresh,
    /// Expired cache entry used as a fallback.
    Stale,
    /// No metadata available.
    Unresolved,
}

// ============================================================================
// Records
// ============================================================================

/// A canonical dependency declared by the project.
///
/// Created by the manifest parser, enriched by the analyzers and finalized by
/// the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Normalized package name (see [`normalize_name`]).
    pub name: String,

    /// Declared constraint as written (e.g. `">=2.0,<3"`, `"==1.4.2"`, `""`).
    pub constraint: String,

    /// Version in use: the pin, or the lower bound of a range.
    pub current_version: Option<String>,

    /// Manifest file that supplied the winning declaration.
    pub source: String,

    /// Declared only in a dev/optional section.
    pub is_dev: bool,

    pub latest_version: Option<String>,
    pub update_type: UpdateType,
    pub staleness: Option<StalenessTag>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub license: Option<String>,
    pub license_category: LicenseCategory,
    pub deprecation_notice: Option<String>,
    pub resolution: ResolutionState,
    pub health_status: HealthStatus,

    /// Score in `0..=100`.
    pub health_score: u8,
}

impl Dependency {
    /// Creates an un-enriched dependency as produced by the parser.
    pub fn declared(
        name: &str,
        constraint: impl Into<String>,
        current_version: Option<String>,
        source: impl Into<String>,
        is_dev: bool,
    ) -> Self {
        Self {
            name: normalize_name(name),
            constraint: constraint.into(),
            current_version,
            source: source.into(),
            is_dev,
            latest_version: None,
            update_type: UpdateType::Unknown,
            staleness: None,
            vulnerabilities: Vec::new(),
            license: None,
            license_category: LicenseCategory::Unknown,
            deprecation_notice: None,
            resolution: ResolutionState::Unresolved,
            health_status: HealthStatus::Unknown,
            health_score: 100,
        }
    }

    /// Whether any critical or high vulnerability affects this dependency.
    pub fn has_blocking_vulnerability(&self) -> bool {
        self.vulnerabilities.iter().any(|v| v.severity.is_blocking())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution != ResolutionState::Unresolved
    }
}

/// Registry metadata for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub latest_version: String,

    /// All published versions, oldest release first.
    pub all_versions: Vec<String>,

    pub license: Option<String>,
    pub deprecated: bool,

    /// Free-form deprecation message, when the registry provides one.
    #[serde(default)]
    pub deprecation_message: Option<String>,

    /// Normalized names of declared requirements (cycle detection only).
    pub requires: Vec<String>,

    pub last_release: Option<DateTime<Utc>>,
}

/// A vulnerability affecting the current version of a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// Advisory identifier (e.g. `CVE-2023-30861`, `GHSA-...`).
    pub id: String,
    pub severity: Severity,

    /// Affected-version predicate as written in the database.
    pub affected: String,
    pub fixed_version: Option<String>,
    pub description: String,
}

/// An incompatible licence pairing between two dependencies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LicenseConflict {
    pub dependency_a: String,
    pub dependency_b: String,
    pub reason: String,
}

/// Count of dependencies per status. Every dependency is counted exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub total: usize,
    pub healthy: usize,
    pub outdated: usize,
    pub vulnerable: usize,
    pub deprecated: usize,
    pub unknown: usize,

    /// Dependencies without registry metadata (overlaps the status counts).
    pub unresolved: usize,
}

impl ReportTotals {
    pub fn tally(dependencies: &[Dependency]) -> Self {
        let mut totals = Self {
            total: dependencies.len(),
            ..Self::default()
        };
        for dep in dependencies {
            match dep.health_status {
                HealthStatus::Healthy => totals.healthy += 1,
                HealthStatus::Outdated => totals.outdated += 1,
                HealthStatus::Vulnerable => totals.vulnerable += 1,
                HealthStatus::Deprecated => totals.deprecated += 1,
                HealthStatus::Unknown => totals.unknown += 1,
            }
            if !dep.is_resolved() {
                totals.unresolved += 1;
            }
        }
        totals
    }
}

/// The final health report for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealthReport {
    pub totals: ReportTotals,

    /// Mean score of resolved dependencies; `None` when nothing resolved.
    pub overall_health_score: Option<f64>,

    pub dependencies: Vec<Dependency>,
    pub license_conflicts: Vec<LicenseConflict>,

    /// Each cycle starts at its lexicographically smallest package.
    pub cycles: Vec<Vec<String>>,

    pub recommendations: Vec<String>,

    /// Recovered problems (malformed manifest lines, bad database rules).
    pub warnings: Vec<String>,

    pub registry_stats: RegistryStats,
    pub generated_at: DateTime<Utc>,
}

impl DependencyHealthReport {
    /// Dependencies carrying at least one critical or high vulnerability.
    pub fn blocking_vulnerability_count(&self) -> usize {
        self.dependencies
            .iter()
            .filter(|d| d.has_blocking_vulnerability())
            .count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_variants_share_key() {
        assert_eq!(normalize_name("Flask"), "flask");
        assert_eq!(normalize_name("flask"), "flask");
        assert_eq!(normalize_name("Flask_Pkg"), "flask-pkg");
        assert_eq!(normalize_name("flask-pkg"), "flask-pkg");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a__-.b"), "a-b");
    }

    #[test]
    fn test_normalize_name_is_idempotent() {
        for raw in ["Flask_Pkg", "  Django ", "ruamel.yaml.clib", "_private", "x--y__"] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_severity_ordering_and_parse() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("moderate"), Some(Severity::Medium));
        assert_eq!(Severity::parse("severe"), None);
    }

    #[test]
    fn test_totals_count_each_dependency_once() {
        let mut a = Dependency::declared("a", "", None, "requirements.txt", false);
        a.health_status = HealthStatus::Vulnerable;
        let mut b = Dependency::declared("b", "", None, "requirements.txt", false);
        b.health_status = HealthStatus::Healthy;
        b.resolution = ResolutionState::Fresh;
        let c = Dependency::declared("c", "", None, "requirements.txt", false);

        let totals = ReportTotals::tally(&[a, b, c]);
        assert_eq!(totals.total, 3);
        assert_eq!(
            totals.healthy + totals.outdated + totals.vulnerable + totals.deprecated + totals.unknown,
            3
        );
        assert_eq!(totals.unresolved, 2);
    }

    #[test]
    fn test_update_type_serialization() {
        let json = serde_json::to_string(&UpdateType::Major).unwrap();
        assert_eq!(json, "\"major\"");
        let tag = serde_json::to_string(&StalenessTag::StaleMajor).unwrap();
        assert_eq!(tag, "\"stale_major\"");
    }
}
