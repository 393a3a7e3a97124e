//! Requirement-specifier grammar shared by every manifest format.
//!
//! Understands PEP 508 style strings (`name[extra] >=1.0, <2 ; marker`) and
//! Poetry constraint strings (`^1.2`, `~1.2`, `*`, `1.2.3`).

use serde::{Deserialize, Serialize};

/// How tightly a declaration fixes the version. Ordered by merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Unconstrained,
    Range,
    Exact,
    /// Exact version recorded by a lock file.
    Pinned,
}

/// One parsed requirement string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Name as written (not yet normalized).
    pub name: String,
    pub constraint: String,
    pub kind: ConstraintKind,
    pub current_version: Option<String>,
}

const OPERATORS: [&str; 8] = ["===", "==", "~=", ">=", "<=", "!=", ">", "<"];

/// Parses a PEP 508 requirement string.
///
/// Environment markers, extras and direct-reference URLs are accepted and
/// dropped. Returns a human-readable reason on failure.
pub fn parse_requirement(raw: &str) -> Result<Requirement, String> {
    let without_marker = raw.split(';').next().unwrap_or_default().trim();
    if without_marker.is_empty() {
        return Err("empty requirement".to_string());
    }

    let name_end = without_marker
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(without_marker.len());
    let name = &without_marker[..name_end];
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid package name in '{raw}'"));
    }

    let mut rest = without_marker[name_end..].trim_start();
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let close = after_bracket
            .find(']')
            .ok_or_else(|| format!("unterminated extras in '{raw}'"))?;
        rest = after_bracket[close + 1..].trim_start();
    }

    // Direct reference: `name @ https://...`
    if rest.starts_with('@') {
        return Ok(Requirement {
            name: name.to_string(),
            constraint: String::new(),
            kind: ConstraintKind::Unconstrained,
            current_version: None,
        });
    }

    // Legacy parenthesized form: `requests (>=2.0)`
    if let Some(inner) = rest.strip_prefix('(') {
        rest = inner
            .strip_suffix(')')
            .ok_or_else(|| format!("unbalanced parenthesis in '{raw}'"))?
            .trim();
    }

    let specifiers = parse_specifiers(rest).map_err(|reason| format!("{reason} in '{raw}'"))?;
    let (kind, current_version) = classify(&specifiers);
    let constraint = specifiers
        .iter()
        .map(|(op, version)| format!("{op}{version}"))
        .collect::<Vec<_>>()
        .join(",");

    Ok(Requirement {
        name: name.to_string(),
        constraint,
        kind,
        current_version,
    })
}

fn parse_specifiers(text: &str) -> Result<Vec<(&'static str, String)>, String> {
    let mut specifiers = Vec::new();
    if text.trim().is_empty() {
        return Ok(specifiers);
    }
    for part in text.split(',') {
        let part = part.trim();
        let op = OPERATORS
            .iter()
            .copied()
            .find(|op| part.starts_with(*op))
            .ok_or_else(|| format!("missing version operator near '{part}'"))?;
        let version = part[op.len()..].trim();
        if version.is_empty() {
            return Err(format!("operator '{op}' without a version"));
        }
        if !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '+' | '!' | '-' | '_'))
        {
            return Err(format!("invalid version '{version}'"));
        }
        specifiers.push((op, version.to_string()));
    }
    Ok(specifiers)
}

fn classify(specifiers: &[(&'static str, String)]) -> (ConstraintKind, Option<String>) {
    match specifiers {
        [] => (ConstraintKind::Unconstrained, None),
        [("===", version)] => (ConstraintKind::Exact, Some(version.clone())),
        [("==", version)] if !version.contains('*') => {
            (ConstraintKind::Exact, Some(version.clone()))
        }
        _ => (ConstraintKind::Range, lower_bound(specifiers)),
    }
}

fn lower_bound(specifiers: &[(&'static str, String)]) -> Option<String> {
    specifiers.iter().find_map(|(op, version)| match *op {
        ">=" | "~=" => Some(version.clone()),
        "==" => Some(version.trim_end_matches(".*").to_string()),
        _ => None,
    })
}

/// Parses a Poetry constraint value (`"^2.0"`, `"*"`, `"1.4.2"`, `">=1,<2"`).
pub fn parse_poetry_constraint(raw: &str) -> (ConstraintKind, Option<String>) {
    let text = raw.trim();
    if text.is_empty() || text == "*" {
        return (ConstraintKind::Unconstrained, None);
    }
    if text.starts_with(|c: char| c.is_ascii_digit()) && !text.contains([',', '|', ' ', '*']) {
        return (ConstraintKind::Exact, Some(text.to_string()));
    }
    if let Some(version) = text.strip_prefix("==") {
        if !text.contains([',', '|', '*']) {
            return (ConstraintKind::Exact, Some(version.trim().to_string()));
        }
    }

    let first = text
        .split("||")
        .next()
        .and_then(|alt| alt.split(',').next())
        .unwrap_or_default()
        .trim();
    let lower = ["^", "~=", "~", ">="]
        .iter()
        .find_map(|prefix| first.strip_prefix(prefix))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    (ConstraintKind::Range, lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pin() {
        let req = parse_requirement("Flask==2.0.0").unwrap();
        assert_eq!(req.name, "Flask");
        assert_eq!(req.kind, ConstraintKind::Exact);
        assert_eq!(req.constraint, "==2.0.0");
        assert_eq!(req.current_version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_range_with_extras_and_marker() {
        let req =
            parse_requirement("requests[security] >= 2.25.0, <3 ; python_version >= '3.8'").unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.kind, ConstraintKind::Range);
        assert_eq!(req.constraint, ">=2.25.0,<3");
        assert_eq!(req.current_version.as_deref(), Some("2.25.0"));
    }

    #[test]
    fn test_compatible_release_and_upper_only() {
        let compat = parse_requirement("django~=4.2").unwrap();
        assert_eq!(compat.current_version.as_deref(), Some("4.2"));

        let upper = parse_requirement("numpy<2").unwrap();
        assert_eq!(upper.kind, ConstraintKind::Range);
        assert_eq!(upper.current_version, None);

        let strict = parse_requirement("attrs>21").unwrap();
        assert_eq!(strict.kind, ConstraintKind::Range);
    }

    #[test]
    fn test_wildcard_equality_is_a_range() {
        let req = parse_requirement("click==8.1.*").unwrap();
        assert_eq!(req.kind, ConstraintKind::Range);
        assert_eq!(req.current_version.as_deref(), Some("8.1"));
    }

    #[test]
    fn test_unconstrained_and_direct_reference() {
        let bare = parse_requirement("pytest").unwrap();
        assert_eq!(bare.kind, ConstraintKind::Unconstrained);
        assert!(bare.constraint.is_empty());

        let url = parse_requirement("mypkg @ https://example.com/mypkg-1.0.tar.gz").unwrap();
        assert_eq!(url.kind, ConstraintKind::Unconstrained);
    }

    #[test]
    fn test_legacy_parenthesized_specifier() {
        let req = parse_requirement("idna (>=2.5)").unwrap();
        assert_eq!(req.name, "idna");
        assert_eq!(req.current_version.as_deref(), Some("2.5"));
    }

    #[test]
    fn test_malformed_requirements_are_rejected() {
        assert!(parse_requirement("==1.0").is_err());
        assert!(parse_requirement("flask 2.0").is_err());
        assert!(parse_requirement("flask>=").is_err());
        assert!(parse_requirement("flask[extra").is_err());
        assert!(parse_requirement("   ").is_err());
    }

    #[test]
    fn test_precedence_order() {
        assert!(ConstraintKind::Pinned > ConstraintKind::Exact);
        assert!(ConstraintKind::Exact > ConstraintKind::Range);
        assert!(ConstraintKind::Range > ConstraintKind::Unconstrained);
    }

    #[test]
    fn test_poetry_constraints() {
        assert_eq!(
            parse_poetry_constraint("^2.31"),
            (ConstraintKind::Range, Some("2.31".to_string()))
        );
        assert_eq!(
            parse_poetry_constraint("1.4.2"),
            (ConstraintKind::Exact, Some("1.4.2".to_string()))
        );
        assert_eq!(parse_poetry_constraint("*"), (ConstraintKind::Unconstrained, None));
        assert_eq!(
            parse_poetry_constraint("~1.2 || ^2.0"),
            (ConstraintKind::Range, Some("1.2".to_string()))
        );
        assert_eq!(parse_poetry_constraint("<3"), (ConstraintKind::Range, None));
    }
}
