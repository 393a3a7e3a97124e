//! Error taxonomy.
//!
//! Only [`CheckError`] ever reaches the caller of
//! [`HealthChecker::check_health`](crate::checker::HealthChecker::check_health).
//! Every other error is recovered where it happens and degrades a single
//! dependency, manifest line or database rule.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::DependencyHealthReport;

// ============================================================================
// Manifest parsing
// ============================================================================

/// Errors raised while reading a manifest. Recovered as warnings.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A single declaration could not be understood
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A table or list entry has an unexpected shape
    #[error("entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    /// The file is not valid TOML
    #[error("invalid TOML: {0}")]
    InvalidToml(#[from] toml::de::Error),

    /// The file is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Registry
// ============================================================================

/// Errors raised by a [`RegistrySource`](crate::traits::RegistrySource).
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry has no such package
    #[error("package '{0}' not found on registry")]
    NotFound(String),

    /// Transient failure (5xx, 429)
    #[error("registry unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The request did not complete within the configured timeout
    #[error("registry request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport-level failure (DNS, connection refused, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a body we could not interpret
    #[error("failed to decode registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    /// `NotFound` is permanent; everything else may succeed later.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// Errors raised by the on-disk metadata cache. Logged, never fatal.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    /// Atomic rename of the temporary file failed
    #[error("failed to persist cache entry: {0}")]
    Persist(#[from] tempfile::PersistError),
}

// ============================================================================
// Local databases
// ============================================================================

/// A vulnerability database entry that cannot be used. Only that rule is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulnerabilityRuleError {
    #[error("rule #{index} for '{package}' is missing field '{field}'")]
    MissingField {
        package: String,
        index: usize,
        field: &'static str,
    },

    #[error("rule #{index} for '{package}' has unknown severity '{severity}'")]
    InvalidSeverity {
        package: String,
        index: usize,
        severity: String,
    },

    #[error("rule #{index} for '{package}' has invalid range '{range}'")]
    InvalidRange {
        package: String,
        index: usize,
        range: String,
    },

    #[error("entry for '{package}' is not a list of rules")]
    NotAList { package: String },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment extraction or merge error
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Conditions surfaced to the caller of a health check.
#[derive(Error, Debug)]
pub enum CheckError {
    /// `fail_on_vulnerable` is set and a critical/high vulnerability exists.
    ///
    /// Raised only after the report is complete; the report travels with it.
    #[error("{count} package(s) have critical or high severity vulnerabilities")]
    CriticalVulnerabilityDetected {
        count: usize,
        report: Box<DependencyHealthReport>,
    },

    /// An explicitly configured local database could not be loaded
    #[error("failed to load database '{}': {reason}", path.display())]
    Database { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The registry client could not be constructed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CheckError {
    /// Returns the report carried by a post-report failure, if any.
    pub fn into_report(self) -> Option<DependencyHealthReport> {
        match self {
            Self::CriticalVulnerabilityDetected { report, .. } => Some(*report),
            _ => None,
        }
    }
}
