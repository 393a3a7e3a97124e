//! Lock files with exact pinned versions (`poetry.lock`, `Pipfile.lock`).

use serde::Deserialize;
use std::collections::BTreeMap;

use super::{Declaration, FormatOutput};
use crate::error::ParseError;
use crate::manifest::requirement::ConstraintKind;
use crate::model::normalize_name;

fn pinned(name: &str, version: &str, is_dev: bool) -> Declaration {
    Declaration {
        name: normalize_name(name),
        constraint: format!("=={version}"),
        kind: ConstraintKind::Pinned,
        current_version: Some(version.to_string()),
        is_dev,
    }
}

// ============================================================================
// poetry.lock
// ============================================================================

#[derive(Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<toml::Value>,
}

#[derive(Deserialize)]
struct PoetryLockPackage {
    name: String,
    version: String,
    /// Poetry < 1.2
    #[serde(default)]
    category: Option<String>,
    /// Poetry >= 2.0
    #[serde(default)]
    groups: Option<Vec<String>>,
}

pub(super) fn parse_poetry(content: &str) -> Result<FormatOutput, ParseError> {
    let lock: PoetryLock = toml::from_str(content)?;
    let mut output = FormatOutput::default();

    for (idx, raw) in lock.package.into_iter().enumerate() {
        match raw.try_into::<PoetryLockPackage>() {
            Ok(package) => {
                let is_dev = match (&package.groups, &package.category) {
                    (Some(groups), _) => !groups.iter().any(|g| g == "main"),
                    (None, Some(category)) => category == "dev",
                    (None, None) => false,
                };
                output
                    .declarations
                    .push(pinned(&package.name, &package.version, is_dev));
            }
            Err(err) => output.errors.push(ParseError::InvalidEntry {
                entry: format!("package[{idx}]"),
                reason: err.to_string(),
            }),
        }
    }
    Ok(output)
}

// ============================================================================
// Pipfile.lock
// ============================================================================

#[derive(Deserialize)]
struct PipfileLock {
    #[serde(default)]
    default: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    develop: BTreeMap<String, serde_json::Value>,
}

pub(super) fn parse_pipfile(content: &str) -> Result<FormatOutput, ParseError> {
    let lock: PipfileLock = serde_json::from_str(content)?;
    let mut output = FormatOutput::default();

    for (section, is_dev) in [(&lock.default, false), (&lock.develop, true)] {
        for (name, entry) in section {
            let version = entry
                .get("version")
                .and_then(serde_json::Value::as_str)
                .map(|v| v.trim_start_matches("==").trim());
            match version {
                Some(version) if !version.is_empty() => {
                    output.declarations.push(pinned(name, version, is_dev));
                }
                _ => output.errors.push(ParseError::InvalidEntry {
                    entry: name.clone(),
                    reason: "locked entry has no version pin".to_string(),
                }),
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poetry_lock_categories_and_groups() {
        let content = r#"
[[package]]
name = "Flask"
version = "2.0.0"
category = "main"

[[package]]
name = "pytest"
version = "7.4.0"
category = "dev"

[[package]]
name = "black"
version = "23.1.0"
groups = ["dev"]

[[package]]
name = "broken"
"#;
        let output = parse_poetry(content).unwrap();
        assert_eq!(output.declarations.len(), 3);
        assert_eq!(output.declarations[0].name, "flask");
        assert_eq!(output.declarations[0].kind, ConstraintKind::Pinned);
        assert_eq!(output.declarations[0].constraint, "==2.0.0");
        assert!(!output.declarations[0].is_dev);
        assert!(output.declarations[1].is_dev);
        assert!(output.declarations[2].is_dev);
        assert_eq!(output.errors.len(), 1);
    }

    #[test]
    fn test_pipfile_lock_sections() {
        let content = r#"{
            "_meta": {"hash": {"sha256": "x"}},
            "default": {
                "requests": {"version": "==2.25.0"},
                "vcs-thing": {"git": "https://example.com/x.git"}
            },
            "develop": {
                "pytest": {"version": "==7.4.0"}
            }
        }"#;
        let output = parse_pipfile(content).unwrap();
        assert_eq!(output.declarations.len(), 2);
        assert_eq!(output.declarations[0].current_version.as_deref(), Some("2.25.0"));
        assert!(output.declarations[1].is_dev);
        assert_eq!(output.errors.len(), 1);
    }
}
