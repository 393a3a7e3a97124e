//! Offline vulnerability index.
//!
//! The database is a JSON object mapping package names to rule lists:
//!
//! ```json
//! {
//!   "flask": [
//!     { "id": "CVE-2023-30861", "severity": "high", "affected": "<2.3.2",
//!       "fixed_version": "2.3.2", "description": "Session cookie disclosure" }
//!   ]
//! }
//! ```
//!
//! `affected` is a comparator list: `,` joins comparators that must all hold,
//! `||` separates alternatives, `*` matches every version.

use semver::Version;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::version::parse_version;
use crate::error::{CheckError, VulnerabilityRuleError};
use crate::model::{normalize_name, Severity, VulnerabilityRecord};

// ============================================================================
// Version predicates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, candidate: &Version) -> bool {
        let ordering = candidate.cmp(&self.version);
        match self.op {
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Gt => ordering == Ordering::Greater,
            Op::Ge => ordering != Ordering::Less,
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
        }
    }
}

/// Disjunction of conjunctions of comparators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPredicate {
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionPredicate {
    /// Parses `"<2.3.2"`, `">=1.0, <1.5 || >=2.0, <2.1"`, `"*"`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut alternatives = Vec::new();
        for alternative in text.split("||") {
            let alternative = alternative.trim();
            if alternative == "*" {
                alternatives.push(Vec::new());
                continue;
            }
            let mut comparators = Vec::new();
            for part in alternative.split(',') {
                comparators.push(parse_comparator(part.trim())?);
            }
            alternatives.push(comparators);
        }
        Some(Self { alternatives })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|all| all.iter().all(|c| c.matches(candidate)))
    }
}

fn parse_comparator(text: &str) -> Option<Comparator> {
    const OPS: [(&str, Op); 7] = [
        ("<=", Op::Le),
        (">=", Op::Ge),
        ("==", Op::Eq),
        ("!=", Op::Ne),
        ("<", Op::Lt),
        (">", Op::Gt),
        ("=", Op::Eq),
    ];
    let (op, rest) = OPS
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))?;
    let version = parse_version(rest)?;
    Some(Comparator { op, version })
}

// ============================================================================
// Database
// ============================================================================

/// One usable rule from the database.
#[derive(Debug, Clone)]
pub struct VulnerabilityRule {
    pub id: String,
    pub severity: Severity,
    pub affected: String,
    predicate: VersionPredicate,
    pub fixed_version: Option<String>,
    pub description: String,
}

/// Local vulnerability index keyed by normalized package name.
#[derive(Debug, Default)]
pub struct VulnerabilityDatabase {
    rules: HashMap<String, Vec<VulnerabilityRule>>,
    rejected: Vec<VulnerabilityRuleError>,
}

impl VulnerabilityDatabase {
    /// An index with no rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the index from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CheckError> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckError::Database {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let db = Self::from_json(&content).map_err(|e| CheckError::Database {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(
            path = %path.display(),
            packages = db.rules.len(),
            rejected = db.rejected.len(),
            "Vulnerability database loaded"
        );
        Ok(db)
    }

    /// Parses the index. Only a document that is not a JSON object fails;
    /// malformed rules are skipped and kept in [`Self::rejected`].
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut db = Self::default();

        for (package, entries) in raw {
            let key = normalize_name(&package);
            let Some(entries) = entries.as_array() else {
                db.reject(VulnerabilityRuleError::NotAList { package });
                continue;
            };
            for (index, entry) in entries.iter().enumerate() {
                match parse_rule(&package, index, entry) {
                    Ok(rule) => db.rules.entry(key.clone()).or_default().push(rule),
                    Err(e) => db.reject(e),
                }
            }
        }
        Ok(db)
    }

    fn reject(&mut self, error: VulnerabilityRuleError) {
        warn!(error = %error, "Skipping malformed vulnerability rule");
        self.rejected.push(error);
    }

    /// Rules that were skipped while loading.
    pub fn rejected(&self) -> &[VulnerabilityRuleError] {
        &self.rejected
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Returns every rule whose range matches `version` of `package`.
    pub fn scan(&self, package: &str, version: &str) -> Vec<VulnerabilityRecord> {
        let Some(rules) = self.rules.get(&normalize_name(package)) else {
            return Vec::new();
        };
        let Some(candidate) = parse_version(version) else {
            debug!(package, version, "Version is not semantic; rules cannot be evaluated");
            return Vec::new();
        };

        rules
            .iter()
            .filter(|rule| rule.predicate.matches(&candidate))
            .map(|rule| VulnerabilityRecord {
                id: rule.id.clone(),
                severity: rule.severity,
                affected: rule.affected.clone(),
                fixed_version: rule.fixed_version.clone(),
                description: rule.description.clone(),
            })
            .collect()
    }
}

fn parse_rule(
    package: &str,
    index: usize,
    entry: &serde_json::Value,
) -> Result<VulnerabilityRule, VulnerabilityRuleError> {
    let field = |name: &'static str| {
        entry
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VulnerabilityRuleError::MissingField {
                package: package.to_string(),
                index,
                field: name,
            })
    };

    let id = field("id")?;
    let severity_label = field("severity")?;
    let severity =
        Severity::parse(severity_label).ok_or_else(|| VulnerabilityRuleError::InvalidSeverity {
            package: package.to_string(),
            index,
            severity: severity_label.to_string(),
        })?;
    let affected = field("affected")?;
    let predicate =
        VersionPredicate::parse(affected).ok_or_else(|| VulnerabilityRuleError::InvalidRange {
            package: package.to_string(),
            index,
            range: affected.to_string(),
        })?;

    let optional = |name: &str| {
        entry
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };

    Ok(VulnerabilityRule {
        id: id.to_string(),
        severity,
        affected: affected.to_string(),
        predicate,
        fixed_version: optional("fixed_version"),
        description: optional("description").unwrap_or_default(),
    })
}
