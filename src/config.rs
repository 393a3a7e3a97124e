//! Checker configuration.
//!
//! Sources, in priority order (highest wins):
//! 1. Environment variables (`DEP_HEALTH_` prefix, e.g. `DEP_HEALTH_OFFLINE_MODE=true`)
//! 2. Project-level `.dep-health.toml`
//! 3. User-level `~/.config/dep-health/config.toml`
//! 4. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::ScoringWeights;
use crate::error::ConfigError;

/// Default registry endpoint (PyPI JSON API).
pub const DEFAULT_REGISTRY_URL: &str = "https://pypi.org/pypi";

const fn default_true() -> bool {
    true
}

const fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_rate_limit_secs() -> f64 {
    1.0
}

const fn default_timeout_secs() -> f64 {
    10.0
}

const fn default_max_concurrency() -> usize {
    4
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

/// Options recognized by [`HealthChecker`](crate::checker::HealthChecker).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckerConfig {
    /// Never touch the network; answer from cache only.
    #[serde(default)]
    pub offline_mode: bool,

    #[serde(default = "default_true")]
    pub check_vulnerabilities: bool,

    /// Overrides the default `~/.cache/dep-health/pypi` directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Minimum spacing between two outbound registry calls.
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: f64,

    /// Upper bound for one registry call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Signal a failure after the report is built when a critical/high
    /// vulnerability is present.
    #[serde(default)]
    pub fail_on_vulnerable: bool,

    #[serde(default)]
    pub include_dev: bool,

    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// JSON vulnerability index; none means no vulnerability data.
    #[serde(default)]
    pub vulnerability_db: Option<PathBuf>,

    /// JSON licence classification overrides.
    #[serde(default)]
    pub license_table: Option<PathBuf>,

    /// Dependencies analyzed in parallel (registry calls stay rate-gated).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Score deductions; a `[scoring]` table may override single weights.
    #[serde(default)]
    pub scoring: ScoringWeights,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            offline_mode: false,
            check_vulnerabilities: true,
            cache_dir: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            rate_limit_secs: default_rate_limit_secs(),
            timeout_secs: default_timeout_secs(),
            fail_on_vulnerable: false,
            include_dev: false,
            registry_url: default_registry_url(),
            vulnerability_db: None,
            license_table: None,
            max_concurrency: default_max_concurrency(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl CheckerConfig {
    /// Loads configuration from all sources, relative to `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(project_dir).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the provider chain. Public so callers can layer extra providers.
    pub fn figment(project_dir: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = project_dir.join(".dep-health.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("DEP_HEALTH_"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dep-health").join("config.toml"))
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("rate_limit_secs", self.rate_limit_secs),
            ("timeout_secs", self.timeout_secs),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("expected a non-negative number of seconds, got {value}"),
                });
            }
        }
        if self.timeout_secs == 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dep-health")
                .join("pypi")
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_limit_secs).unwrap_or(Duration::MAX)
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    // Builder-style setters for programmatic use.

    pub fn with_offline_mode(mut self, offline: bool) -> Self {
        self.offline_mode = offline;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit_secs = interval.as_secs_f64();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_fail_on_vulnerable(mut self, fail: bool) -> Self {
        self.fail_on_vulnerable = fail;
        self
    }

    pub fn with_include_dev(mut self, include: bool) -> Self {
        self.include_dev = include;
        self
    }

    pub fn with_check_vulnerabilities(mut self, check: bool) -> Self {
        self.check_vulnerabilities = check;
        self
    }

    pub fn with_vulnerability_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.vulnerability_db = Some(path.into());
        self
    }

    pub fn with_license_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.license_table = Some(path.into());
        self
    }

    pub fn with_scoring(mut self, weights: ScoringWeights) -> Self {
        self.scoring = weights;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_correct() {
        let config = CheckerConfig::default();
        assert!(!config.offline_mode);
        assert!(config.check_vulnerabilities);
        assert!(!config.include_dev);
        assert!(!config.fail_on_vulnerable);
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.rate_limit(), Duration::from_secs(1));
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
        assert!(config.cache_dir().ends_with("dep-health/pypi"));
    }

    #[test]
    fn project_file_and_env_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                ".dep-health.toml",
                r#"
offline_mode = true
cache_ttl_secs = 60
include_dev = true
"#,
            )?;
            jail.set_env("DEP_HEALTH_CACHE_TTL_SECS", "120");

            let config = CheckerConfig::load(jail.directory()).map_err(|e| e.to_string())?;
            assert!(config.offline_mode);
            assert!(config.include_dev);
            assert_eq!(config.cache_ttl_secs, 120);
            Ok(())
        });
    }

    #[test]
    fn scoring_table_overrides_single_weights() {
        Jail::expect_with(|jail| {
            jail.create_file(
                ".dep-health.toml",
                r#"
[scoring]
critical = 50
"#,
            )?;

            let config = CheckerConfig::load(jail.directory()).map_err(|e| e.to_string())?;
            assert_eq!(config.scoring.critical, 50);
            assert_eq!(config.scoring.high, ScoringWeights::default().high);
            Ok(())
        });
    }

    #[test]
    fn validate_rejects_negative_rate_limit() {
        let config = CheckerConfig {
            rate_limit_secs: -1.0,
            ..CheckerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "rate_limit_secs"));
    }

    #[test]
    fn validate_rejects_seconds_beyond_duration_range() {
        let config = CheckerConfig {
            rate_limit_secs: 1e20,
            ..CheckerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "rate_limit_secs"));
        assert_eq!(config.rate_limit(), Duration::MAX);

        let config = CheckerConfig {
            timeout_secs: f64::NAN,
            ..CheckerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.timeout(), Duration::MAX);
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = CheckerConfig {
            timeout_secs: 0.0,
            ..CheckerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "timeout_secs"));
        assert!(CheckerConfig::default().with_rate_limit(Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let config = CheckerConfig {
            max_concurrency: 0,
            ..CheckerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
