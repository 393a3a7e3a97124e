//! Licence classification and pairwise conflict detection.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

use crate::error::CheckError;
use crate::model::{Dependency, LicenseCategory, LicenseConflict};

// ============================================================================
// Classification
// ============================================================================

/// Copyleft licence families; compatibility is decided per family pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyleftFamily {
    Gpl2Only,
    Gpl2OrLater,
    Gpl3,
    Agpl3,
    Lgpl,
    Mpl,
    Epl,
    /// Copyleft without a determinable version (e.g. bare "GPL")
    Ambiguous,
}

impl CopyleftFamily {
    fn is_weak(self) -> bool {
        matches!(self, Self::Lgpl | Self::Mpl)
    }

    fn is_gpl_like(self) -> bool {
        matches!(self, Self::Gpl2Only | Self::Gpl2OrLater | Self::Gpl3 | Self::Agpl3)
    }

    /// Whether code under both families can be combined.
    pub fn compatible_with(self, other: Self) -> bool {
        use CopyleftFamily::*;
        if self == other {
            return true;
        }
        let pair = |a, b| (self == a && other == b) || (self == b && other == a);

        ((self.is_weak() && other.is_gpl_like()) || (other.is_weak() && self.is_gpl_like()))
            || (self.is_weak() && other.is_weak())
            || pair(Gpl2OrLater, Gpl2Only)
            || pair(Gpl2OrLater, Gpl3)
            || pair(Gpl2OrLater, Agpl3)
            || pair(Gpl3, Agpl3)
    }
}

/// Full classification of one licence string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseClass {
    pub category: LicenseCategory,
    pub family: Option<CopyleftFamily>,
    /// Proprietary / commercial terms
    pub proprietary: bool,
    /// The string matched a known entry
    pub recognized: bool,
}

impl LicenseClass {
    const fn permissive() -> Self {
        Self {
            category: LicenseCategory::Permissive,
            family: None,
            proprietary: false,
            recognized: true,
        }
    }

    const fn copyleft(family: CopyleftFamily) -> Self {
        Self {
            category: LicenseCategory::Copyleft,
            family: Some(family),
            proprietary: false,
            recognized: true,
        }
    }

    const fn proprietary() -> Self {
        Self {
            category: LicenseCategory::Unknown,
            family: None,
            proprietary: true,
            recognized: true,
        }
    }

    const fn unrecognized() -> Self {
        Self {
            category: LicenseCategory::Unknown,
            family: None,
            proprietary: false,
            recognized: false,
        }
    }
}

const BUILTIN: &[(&str, LicenseClass)] = &[
    ("mit", LicenseClass::permissive()),
    ("mit license", LicenseClass::permissive()),
    ("mit-0", LicenseClass::permissive()),
    ("bsd", LicenseClass::permissive()),
    ("bsd license", LicenseClass::permissive()),
    ("bsd-2-clause", LicenseClass::permissive()),
    ("bsd-3-clause", LicenseClass::permissive()),
    ("new bsd", LicenseClass::permissive()),
    ("new bsd license", LicenseClass::permissive()),
    ("apache-2.0", LicenseClass::permissive()),
    ("apache 2.0", LicenseClass::permissive()),
    ("apache license 2.0", LicenseClass::permissive()),
    ("apache license, version 2.0", LicenseClass::permissive()),
    ("apache software license", LicenseClass::permissive()),
    ("isc", LicenseClass::permissive()),
    ("isc license", LicenseClass::permissive()),
    ("isc license (iscl)", LicenseClass::permissive()),
    ("psf", LicenseClass::permissive()),
    ("psf-2.0", LicenseClass::permissive()),
    ("python-2.0", LicenseClass::permissive()),
    ("python software foundation license", LicenseClass::permissive()),
    ("unlicense", LicenseClass::permissive()),
    ("the unlicense (unlicense)", LicenseClass::permissive()),
    ("zlib", LicenseClass::permissive()),
    ("0bsd", LicenseClass::permissive()),
    ("cc0-1.0", LicenseClass::permissive()),
    ("hpnd", LicenseClass::permissive()),
    ("gpl-2.0-only", LicenseClass::copyleft(CopyleftFamily::Gpl2Only)),
    ("gpl-2.0", LicenseClass::copyleft(CopyleftFamily::Gpl2Only)),
    ("gplv2", LicenseClass::copyleft(CopyleftFamily::Gpl2Only)),
    ("gnu general public license v2 (gplv2)", LicenseClass::copyleft(CopyleftFamily::Gpl2Only)),
    ("gpl-2.0-or-later", LicenseClass::copyleft(CopyleftFamily::Gpl2OrLater)),
    ("gpl-2.0+", LicenseClass::copyleft(CopyleftFamily::Gpl2OrLater)),
    ("gplv2+", LicenseClass::copyleft(CopyleftFamily::Gpl2OrLater)),
    (
        "gnu general public license v2 or later (gplv2+)",
        LicenseClass::copyleft(CopyleftFamily::Gpl2OrLater),
    ),
    ("gpl-3.0", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("gpl-3.0-only", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("gpl-3.0-or-later", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("gplv3", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("gplv3+", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("gnu general public license v3 (gplv3)", LicenseClass::copyleft(CopyleftFamily::Gpl3)),
    ("agpl-3.0", LicenseClass::copyleft(CopyleftFamily::Agpl3)),
    ("agpl-3.0-only", LicenseClass::copyleft(CopyleftFamily::Agpl3)),
    ("agpl-3.0-or-later", LicenseClass::copyleft(CopyleftFamily::Agpl3)),
    ("agplv3", LicenseClass::copyleft(CopyleftFamily::Agpl3)),
    (
        "gnu affero general public license v3",
        LicenseClass::copyleft(CopyleftFamily::Agpl3),
    ),
    ("lgpl", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-2.1", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-2.1-only", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-2.1-or-later", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-3.0", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-3.0-only", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgpl-3.0-or-later", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("lgplv3", LicenseClass::copyleft(CopyleftFamily::Lgpl)),
    ("mpl-2.0", LicenseClass::copyleft(CopyleftFamily::Mpl)),
    ("mozilla public license 2.0 (mpl 2.0)", LicenseClass::copyleft(CopyleftFamily::Mpl)),
    ("epl-1.0", LicenseClass::copyleft(CopyleftFamily::Epl)),
    ("epl-2.0", LicenseClass::copyleft(CopyleftFamily::Epl)),
    ("gpl", LicenseClass::copyleft(CopyleftFamily::Ambiguous)),
    ("gnu gpl", LicenseClass::copyleft(CopyleftFamily::Ambiguous)),
    ("proprietary", LicenseClass::proprietary()),
    ("commercial", LicenseClass::proprietary()),
    ("other/proprietary license", LicenseClass::proprietary()),
    ("all rights reserved", LicenseClass::proprietary()),
];

/// Label accepted in a user-supplied licence table file.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TableLabel {
    Permissive,
    Copyleft,
    Proprietary,
    Unknown,
}

/// Static licence lookup table, optionally extended from a JSON file.
#[derive(Debug, Clone)]
pub struct LicenseTable {
    entries: HashMap<String, LicenseClass>,
}

impl Default for LicenseTable {
    fn default() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(name, class)| ((*name).to_string(), *class))
                .collect(),
        }
    }
}

impl LicenseTable {
    /// Loads overrides (`{"<licence>": "permissive" | "copyleft" | "proprietary" | "unknown"}`)
    /// on top of the built-in table.
    pub fn with_overrides(path: &Path) -> Result<Self, CheckError> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckError::Database {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let overrides: HashMap<String, TableLabel> =
            serde_json::from_str(&content).map_err(|e| CheckError::Database {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut table = Self::default();
        for (name, label) in &overrides {
            let class = match label {
                TableLabel::Permissive => LicenseClass::permissive(),
                TableLabel::Copyleft => {
                    // keep the family of a known copyleft licence
                    let known = table.lookup(name).filter(|c| c.family.is_some());
                    known.unwrap_or(LicenseClass::copyleft(CopyleftFamily::Ambiguous))
                }
                TableLabel::Proprietary => LicenseClass::proprietary(),
                TableLabel::Unknown => LicenseClass::unrecognized(),
            };
            table.entries.insert(normalize_license(name), class);
        }
        info!(path = %path.display(), overrides = overrides.len(), "Licence table loaded");
        Ok(table)
    }

    fn lookup(&self, license: &str) -> Option<LicenseClass> {
        self.entries.get(&normalize_license(license)).copied()
    }

    /// Classifies a licence string. Unknown strings are unrecognized.
    pub fn classify(&self, license: &str) -> LicenseClass {
        if let Some(class) = self.lookup(license) {
            return class;
        }
        // "MIT OR Apache-2.0": permissive if any alternative is permissive
        let alternatives: Vec<&str> = license.split(" OR ").collect();
        if alternatives.len() > 1 {
            let classes: Vec<LicenseClass> = alternatives
                .iter()
                .map(|alt| self.classify(alt.trim().trim_matches(['(', ')'])))
                .collect();
            if let Some(permissive) = classes
                .iter()
                .find(|c| c.category == LicenseCategory::Permissive)
            {
                return *permissive;
            }
            if let Some(first) = classes.first() {
                return *first;
            }
        }
        LicenseClass::unrecognized()
    }
}

fn normalize_license(license: &str) -> String {
    license.trim().to_ascii_lowercase()
}

// ============================================================================
// Conflicts
// ============================================================================

/// Finds incompatible licence pairs across all dependencies.
///
/// Dependencies with no licence information at all are skipped. One conflict
/// is reported per unordered pair, ordered by name.
pub fn find_conflicts(table: &LicenseTable, dependencies: &[Dependency]) -> Vec<LicenseConflict> {
    let classified: Vec<(&str, &str, LicenseClass)> = dependencies
        .iter()
        .filter_map(|dep| {
            let license = dep.license.as_deref()?;
            Some((dep.name.as_str(), license, table.classify(license)))
        })
        .collect();

    let mut conflicts = BTreeSet::new();
    for (i, (name_a, license_a, class_a)) in classified.iter().enumerate() {
        for (name_b, license_b, class_b) in &classified[i + 1..] {
            if name_a == name_b {
                continue;
            }
            let Some(reason) = conflict_reason((license_a, class_a), (license_b, class_b)) else {
                continue;
            };
            let (first, second) = if name_a <= name_b {
                (name_a, name_b)
            } else {
                (name_b, name_a)
            };
            conflicts.insert(LicenseConflict {
                dependency_a: (*first).to_string(),
                dependency_b: (*second).to_string(),
                reason,
            });
        }
    }

    let mut seen = BTreeSet::new();
    conflicts
        .into_iter()
        .filter(|c| seen.insert((c.dependency_a.clone(), c.dependency_b.clone())))
        .collect()
}

fn conflict_reason(a: (&str, &LicenseClass), b: (&str, &LicenseClass)) -> Option<String> {
    let ((license_a, class_a), (license_b, class_b)) = (a, b);
    match (class_a.family, class_b.family) {
        (Some(family_a), Some(family_b)) => (!family_a.compatible_with(family_b)).then(|| {
            format!("copyleft licences {license_a} and {license_b} are incompatible")
        }),
        (Some(_), None) => other_side_reason(license_a, license_b, class_b),
        (None, Some(_)) => other_side_reason(license_b, license_a, class_a),
        (None, None) => None,
    }
}

fn other_side_reason(copyleft: &str, other: &str, other_class: &LicenseClass) -> Option<String> {
    if other_class.proprietary {
        Some(format!("copyleft licence {copyleft} conflicts with proprietary licence {other}"))
    } else if !other_class.recognized {
        Some(format!(
            "copyleft licence {copyleft} next to unrecognized licence {other}; compatibility cannot be verified"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, license: Option<&str>) -> Dependency {
        let mut dep = Dependency::declared(name, "", None, "requirements.txt", false);
        dep.license = license.map(str::to_string);
        dep
    }

    #[test]
    fn test_classification() {
        let table = LicenseTable::default();
        assert_eq!(table.classify("MIT").category, LicenseCategory::Permissive);
        assert_eq!(table.classify("BSD License").category, LicenseCategory::Permissive);
        assert_eq!(table.classify("GPL-3.0").category, LicenseCategory::Copyleft);
        assert_eq!(table.classify("LGPL-2.1").family, Some(CopyleftFamily::Lgpl));
        assert!(table.classify("Proprietary").proprietary);
        assert!(!table.classify("Some Custom Terms").recognized);
        assert_eq!(
            table.classify("MIT OR GPL-3.0").category,
            LicenseCategory::Permissive
        );
    }

    #[test]
    fn test_copyleft_family_compatibility() {
        use CopyleftFamily::*;
        assert!(Gpl3.compatible_with(Agpl3));
        assert!(Lgpl.compatible_with(Gpl2Only));
        assert!(Gpl2OrLater.compatible_with(Gpl3));
        assert!(!Gpl2Only.compatible_with(Gpl3));
        assert!(!Epl.compatible_with(Gpl3));
        assert!(!Ambiguous.compatible_with(Gpl3));
    }

    #[test]
    fn test_conflicts_are_found_once_per_pair() {
        let table = LicenseTable::default();
        let deps = vec![
            dep("alpha", Some("GPL-3.0")),
            dep("beta", Some("Proprietary")),
            dep("gamma", Some("MIT")),
            dep("delta", Some("GPL-2.0-only")),
            dep("epsilon", None),
            dep("zeta", Some("Custom EULA")),
        ];
        let conflicts = find_conflicts(&table, &deps);
        let pairs: Vec<_> = conflicts
            .iter()
            .map(|c| (c.dependency_a.as_str(), c.dependency_b.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("alpha", "beta"),
                ("alpha", "delta"),
                ("alpha", "zeta"),
                ("beta", "delta"),
                ("delta", "zeta"),
            ]
        );
    }

    #[test]
    fn test_permissive_projects_have_no_conflicts() {
        let table = LicenseTable::default();
        let deps = vec![
            dep("a", Some("MIT")),
            dep("b", Some("Apache-2.0")),
            dep("c", Some("LGPL-3.0")),
            dep("d", Some("PSF")),
        ];
        assert!(find_conflicts(&table, &deps).is_empty());
    }

    #[test]
    fn test_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licenses.json");
        std::fs::write(&path, r#"{"Acme EULA": "proprietary", "GPL-3.0": "copyleft"}"#).unwrap();
        let table = LicenseTable::with_overrides(&path).unwrap();
        assert!(table.classify("acme eula").proprietary);
        assert_eq!(table.classify("GPL-3.0").family, Some(CopyleftFamily::Gpl3));
    }
}
