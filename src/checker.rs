//! Health check orchestration.
//!
//! [`HealthChecker::check_health`] drives one run end to end:
//! parse manifests, resolve each dependency through the shared registry
//! client, run the per-dependency analyzers, then the whole-set passes
//! (cycles, licence conflicts) and finally the report and recommendations.
//!
//! Per-dependency work runs concurrently, bounded by a semaphore. Registry
//! traffic still funnels through the client's single rate gate.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::analysis::{
    cycles, license, scoring, version, LicenseTable, ScoringWeights, VulnerabilityDatabase,
};
use crate::config::CheckerConfig;
use crate::error::CheckError;
use crate::manifest;
use crate::model::{
    Dependency, DependencyHealthReport, LicenseConflict, PackageMetadata, ReportTotals,
    ResolutionState, StalenessTag, UpdateType,
};
use crate::registry::{RegistryClient, Resolution};

const DEFAULT_DEPRECATION_NOTICE: &str = "package is marked as deprecated by its maintainers";

// ============================================================================
// Checker
// ============================================================================

/// Runs dependency health checks against one configuration.
pub struct HealthChecker {
    config: CheckerConfig,
    registry: Arc<RegistryClient>,
    context: AnalysisContext,
    semaphore: Arc<Semaphore>,
}

/// Read-only analyzer state shared by all per-dependency tasks.
#[derive(Clone)]
struct AnalysisContext {
    vulnerabilities: Arc<VulnerabilityDatabase>,
    licenses: Arc<LicenseTable>,
    weights: ScoringWeights,
    check_vulnerabilities: bool,
}

impl HealthChecker {
    /// Builds a checker backed by the configured `PyPI` registry.
    pub fn new(config: CheckerConfig) -> Result<Self, CheckError> {
        config.validate()?;
        let registry = RegistryClient::from_config(&config)?;
        Self::with_registry(config, registry)
    }

    /// Builds a checker around an existing registry client.
    ///
    /// Fails only when an explicitly configured database file cannot be read.
    pub fn with_registry(config: CheckerConfig, registry: RegistryClient) -> Result<Self, CheckError> {
        config.validate()?;

        let vulnerabilities = match &config.vulnerability_db {
            Some(path) => VulnerabilityDatabase::load(path)?,
            None => VulnerabilityDatabase::empty(),
        };
        let licenses = match &config.license_table {
            Some(path) => LicenseTable::with_overrides(path)?,
            None => LicenseTable::default(),
        };

        let context = AnalysisContext {
            vulnerabilities: Arc::new(vulnerabilities),
            licenses: Arc::new(licenses),
            weights: config.scoring,
            check_vulnerabilities: config.check_vulnerabilities,
        };

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            registry: Arc::new(registry),
            context,
            config,
        })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Analyzes the project at `project` (a directory or a single manifest).
    ///
    /// Manifest and registry problems degrade into warnings and unresolved
    /// dependencies. The call only fails when `fail_on_vulnerable` is set and
    /// a blocking vulnerability was found; the finished report then travels
    /// inside [`CheckError::CriticalVulnerabilityDetected`].
    #[instrument(skip(self), fields(project = %project.display()))]
    pub async fn check_health(&self, project: &Path) -> Result<DependencyHealthReport, CheckError> {
        let now = Utc::now();
        let parsed = manifest::parse_project(project);

        let mut warnings: Vec<String> = parsed.warnings.iter().map(ToString::to_string).collect();
        warnings.extend(
            self.context
                .vulnerabilities
                .rejected()
                .iter()
                .map(|e| format!("vulnerability database: {e}")),
        );

        let declared: Vec<Dependency> = parsed
            .dependencies
            .into_iter()
            .filter(|dep| self.config.include_dev || !dep.is_dev)
            .collect();
        info!(
            manifests = parsed.files.len(),
            dependencies = declared.len(),
            "Starting health check"
        );

        let mut analyzed = self.analyze_all(declared, now, &mut warnings).await;
        analyzed.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));

        let cycles = cycles::detect_cycles(
            analyzed
                .iter()
                .map(|(dep, meta)| (dep.name.as_str(), meta.as_ref())),
        );
        let dependencies: Vec<Dependency> = analyzed.into_iter().map(|(dep, _)| dep).collect();
        let license_conflicts = license::find_conflicts(&self.context.licenses, &dependencies);

        let totals = ReportTotals::tally(&dependencies);
        let overall_health_score = scoring::overall_score(&dependencies);
        let recommendations = recommendations(&dependencies, &license_conflicts);

        let report = DependencyHealthReport {
            totals,
            overall_health_score,
            dependencies,
            license_conflicts,
            cycles,
            recommendations,
            warnings,
            registry_stats: self.registry.stats(),
            generated_at: now,
        };

        info!(
            total = report.totals.total,
            healthy = report.totals.healthy,
            vulnerable = report.totals.vulnerable,
            unresolved = report.totals.unresolved,
            cycles = report.cycles.len(),
            score = ?report.overall_health_score,
            "Health check finished"
        );

        if self.config.fail_on_vulnerable {
            let count = report.blocking_vulnerability_count();
            if count > 0 {
                warn!(count, "Blocking vulnerabilities found");
                return Err(CheckError::CriticalVulnerabilityDetected {
                    count,
                    report: Box::new(report),
                });
            }
        }
        Ok(report)
    }

    /// Resolves and analyzes every dependency, `max_concurrency` at a time.
    async fn analyze_all(
        &self,
        declared: Vec<Dependency>,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Vec<(Dependency, Option<PackageMetadata>)> {
        let mut tasks = JoinSet::new();
        for dep in declared {
            let semaphore = Arc::clone(&self.semaphore);
            let registry = Arc::clone(&self.registry);
            let context = self.context.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                let resolution = registry.resolve(&dep.name).await;
                let dep = analyze(dep, &resolution, &context, now);
                let metadata = match resolution {
                    Resolution::Fresh(meta) | Resolution::Stale(meta) => Some(meta),
                    Resolution::Unresolved(_) => None,
                };
                (dep, metadata)
            });
        }

        let mut analyzed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => analyzed.push(result),
                Err(e) => {
                    warn!(error = %e, "Dependency analysis task failed");
                    warnings.push(format!("analysis task failed: {e}"));
                }
            }
        }
        analyzed
    }
}

// ============================================================================
// Per-dependency analysis
// ============================================================================

fn analyze(
    mut dep: Dependency,
    resolution: &Resolution,
    context: &AnalysisContext,
    now: DateTime<Utc>,
) -> Dependency {
    dep.resolution = match resolution {
        Resolution::Fresh(_) => ResolutionState::Fresh,
        Resolution::Stale(_) => ResolutionState::Stale,
        Resolution::Unresolved(_) => ResolutionState::Unresolved,
    };

    if let Some(meta) = resolution.metadata() {
        dep.update_type = match &dep.current_version {
            Some(current) => version::update_type(current, &meta.latest_version),
            None => UpdateType::Unknown,
        };
        dep.latest_version = Some(meta.latest_version.clone());
        dep.staleness = version::staleness(meta.last_release, now);

        dep.license = meta.license.clone();
        if let Some(license) = &dep.license {
            dep.license_category = context.licenses.classify(license).category;
        }

        if meta.deprecated {
            dep.deprecation_notice = Some(
                meta.deprecation_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEPRECATION_NOTICE.to_string()),
            );
        }
    }

    if context.check_vulnerabilities {
        if let Some(current) = &dep.current_version {
            dep.vulnerabilities = context.vulnerabilities.scan(&dep.name, current);
        }
    }

    scoring::finalize(&mut dep, &context.weights);
    dep
}

// ============================================================================
// Recommendations
// ============================================================================

/// Builds recommendations, most urgent first.
fn recommendations(dependencies: &[Dependency], conflicts: &[LicenseConflict]) -> Vec<String> {
    let mut out = Vec::new();

    let blocking = names(dependencies, |d| d.has_blocking_vulnerability());
    if !blocking.is_empty() {
        out.push(format!(
            "Urgent: fix {} package(s) with critical vulnerabilities: {}",
            blocking.len(),
            blocking.join(", ")
        ));
    }

    let major = names(dependencies, |d| d.update_type == UpdateType::Major);
    if !major.is_empty() {
        out.push(format!(
            "Plan major upgrades for {} package(s): {}",
            major.len(),
            major.join(", ")
        ));
    }

    if !conflicts.is_empty() {
        out.push(format!("Resolve {} license conflict(s)", conflicts.len()));
    }

    let deprecated = names(dependencies, |d| d.deprecation_notice.is_some());
    if !deprecated.is_empty() {
        out.push(format!(
            "Replace {} deprecated package(s): {}",
            deprecated.len(),
            deprecated.join(", ")
        ));
    }

    let stale = names(dependencies, |d| d.staleness.is_some());
    if !stale.is_empty() {
        let abandoned = dependencies
            .iter()
            .filter(|d| d.staleness == Some(StalenessTag::StaleMajor))
            .count();
        out.push(format!(
            "Review {} stale package(s) without a release in over a year ({abandoned} in over two years): {}",
            stale.len(),
            stale.join(", ")
        ));
    }

    let unresolved = names(dependencies, |d| !d.is_resolved());
    if !unresolved.is_empty() {
        out.push(format!(
            "Could not resolve {} package(s); their results are incomplete: {}",
            unresolved.len(),
            unresolved.join(", ")
        ));
    }

    if out.is_empty() {
        out.push("All dependencies are healthy".to_string());
    }
    out
}

fn names(dependencies: &[Dependency], pred: impl Fn(&Dependency) -> bool) -> Vec<&str> {
    dependencies
        .iter()
        .filter(|d| pred(d))
        .map(|d| d.name.as_str())
        .collect()
}
