//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use dep_health::{
    CheckerConfig, HealthChecker, PackageMetadata, RegistryClient, RegistryError, RegistrySource,
};

/// In-memory registry that counts fetches.
pub struct StaticRegistry {
    packages: HashMap<String, PackageMetadata>,
    calls: AtomicUsize,
}

impl StaticRegistry {
    pub fn new(packages: Vec<PackageMetadata>) -> Arc<Self> {
        Arc::new(Self {
            packages: packages.into_iter().map(|p| (p.name.clone(), p)).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for StaticRegistry {
    fn registry_id(&self) -> &str {
        "static"
    }

    async fn fetch(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}

/// Registry metadata whose last release was `age_days` ago.
pub fn package(name: &str, latest: &str, license: &str, age_days: i64) -> PackageMetadata {
    PackageMetadata {
        name: name.to_string(),
        latest_version: latest.to_string(),
        all_versions: vec![latest.to_string()],
        license: Some(license.to_string()),
        deprecated: false,
        deprecation_message: None,
        requires: Vec::new(),
        last_release: Some(Utc::now() - ChronoDuration::days(age_days)),
    }
}

pub fn requiring(mut meta: PackageMetadata, requires: &[&str]) -> PackageMetadata {
    meta.requires = requires.iter().map(|r| (*r).to_string()).collect();
    meta
}

/// Creates a project directory holding the given files.
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// Configuration with an isolated cache and no rate limiting.
pub fn config(cache_dir: &Path) -> CheckerConfig {
    CheckerConfig::default()
        .with_cache_dir(cache_dir)
        .with_rate_limit(Duration::ZERO)
        .with_timeout(Duration::from_secs(2))
}

pub fn checker(config: CheckerConfig, registry: Arc<StaticRegistry>) -> HealthChecker {
    let client = RegistryClient::with_source(registry, &config);
    HealthChecker::with_registry(config, client).unwrap()
}
