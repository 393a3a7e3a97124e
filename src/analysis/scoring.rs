//! Per-dependency health score and status.
//!
//! Starting from 100, four independent deduction groups apply:
//!
//! | Group         | Deduction                                   | Cumulation               |
//! |---------------|---------------------------------------------|--------------------------|
//! | vulnerability | 30 critical / 20 high / 10 medium / 5 low   | summed per vulnerability |
//! | deprecation   | 25                                          | once                     |
//! | outdated      | 15 major / 8 minor / 3 patch                | highest category only    |
//! | staleness     | 10 `stale_major` / 5 `stale_minor`          | larger tag only          |
//!
//! The score never goes below zero.

use serde::{Deserialize, Serialize};

use crate::model::{Dependency, HealthStatus, Severity, StalenessTag, UpdateType};

/// Deduction weights, one field per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub deprecated: u32,
    pub major_update: u32,
    pub minor_update: u32,
    pub patch_update: u32,
    pub stale_major: u32,
    pub stale_minor: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            critical: 30,
            high: 20,
            medium: 10,
            low: 5,
            deprecated: 25,
            major_update: 15,
            minor_update: 8,
            patch_update: 3,
            stale_major: 10,
            stale_minor: 5,
        }
    }
}

impl ScoringWeights {
    pub fn severity(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// `Unknown` and `None` updates cost nothing.
    pub fn update(&self, update: UpdateType) -> u32 {
        match update {
            UpdateType::Major => self.major_update,
            UpdateType::Minor => self.minor_update,
            UpdateType::Patch => self.patch_update,
            UpdateType::None | UpdateType::Unknown => 0,
        }
    }

    pub fn staleness(&self, tag: Option<StalenessTag>) -> u32 {
        match tag {
            Some(StalenessTag::StaleMajor) => self.stale_major,
            Some(StalenessTag::StaleMinor) => self.stale_minor,
            None => 0,
        }
    }
}

/// Computes the 0..=100 score of an enriched dependency.
pub fn score(dep: &Dependency, weights: &ScoringWeights) -> u8 {
    let vulnerabilities: u32 = dep
        .vulnerabilities
        .iter()
        .map(|v| weights.severity(v.severity))
        .sum();
    let deprecation = if dep.deprecation_notice.is_some() {
        weights.deprecated
    } else {
        0
    };

    let deductions = vulnerabilities
        .saturating_add(deprecation)
        .saturating_add(weights.update(dep.update_type))
        .saturating_add(weights.staleness(dep.staleness));

    // bounded by 100, so the cast is lossless
    100u32.saturating_sub(deductions) as u8
}

/// Chooses the status by priority: vulnerable, deprecated, outdated, healthy.
///
/// An unresolved dependency without known vulnerabilities is `Unknown`.
pub fn classify(dep: &Dependency) -> HealthStatus {
    if !dep.vulnerabilities.is_empty() {
        HealthStatus::Vulnerable
    } else if !dep.is_resolved() {
        HealthStatus::Unknown
    } else if dep.deprecation_notice.is_some() {
        HealthStatus::Deprecated
    } else if matches!(
        dep.update_type,
        UpdateType::Major | UpdateType::Minor | UpdateType::Patch
    ) {
        HealthStatus::Outdated
    } else {
        HealthStatus::Healthy
    }
}

/// Sets `health_score` and `health_status` in place.
pub fn finalize(dep: &mut Dependency, weights: &ScoringWeights) {
    dep.health_score = score(dep, weights);
    dep.health_status = classify(dep);
}

/// Mean score of resolved dependencies, `None` when none resolved.
pub fn overall_score(dependencies: &[Dependency]) -> Option<f64> {
    let scores: Vec<f64> = dependencies
        .iter()
        .filter(|d| d.is_resolved())
        .map(|d| f64::from(d.health_score))
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
