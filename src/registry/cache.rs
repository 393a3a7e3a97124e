//! On-disk registry metadata cache.
//!
//! One JSON file per package. Writes go to a temporary file in the cache
//! directory which is then renamed over the target, so concurrent writers
//! never leave a half-written entry behind (last writer wins).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::model::{normalize_name, PackageMetadata};

/// A cached registry response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized package key
    pub package: String,
    pub fetched_at: DateTime<Utc>,
    /// TTL in effect when the entry was written
    pub ttl_secs: u64,
    pub payload: PackageMetadata,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(CacheEntry),
    /// Older than the TTL; still usable as a fallback
    Stale(CacheEntry),
    Miss,
}

/// Directory-backed cache keyed by normalized package name.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entry_path(&self, package: &str) -> PathBuf {
        self.dir.join(format!("{}.json", normalize_name(package)))
    }

    /// Looks up `package`, classifying the entry against the configured TTL.
    ///
    /// Unreadable or corrupt entries are reported as [`CacheLookup::Miss`].
    pub fn lookup(&self, package: &str) -> CacheLookup {
        self.lookup_at(package, Utc::now())
    }

    pub fn lookup_at(&self, package: &str, now: DateTime<Utc>) -> CacheLookup {
        match self.read(package) {
            Ok(Some(entry)) if entry.age(now) < self.ttl => CacheLookup::Fresh(entry),
            Ok(Some(entry)) => CacheLookup::Stale(entry),
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                warn!(package, error = %e, "Ignoring unreadable cache entry");
                CacheLookup::Miss
            }
        }
    }

    fn read(&self, package: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(package);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Stores freshly fetched metadata stamped with the current time.
    pub fn store(&self, package: &str, payload: &PackageMetadata) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            package: normalize_name(package),
            fetched_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
            payload: payload.clone(),
        };
        self.write_entry(&entry)?;
        Ok(entry)
    }

    /// Writes an entry atomically (temp file + rename).
    pub fn write_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut temp, entry)?;
        temp.flush()?;
        temp.persist(self.entry_path(&entry.package))?;
        debug!(package = %entry.package, "Cache entry written");
        Ok(())
    }

    /// Removes every cached entry. Returns how many were deleted.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
