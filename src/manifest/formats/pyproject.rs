//! `pyproject.toml`: Poetry's `[tool.poetry]` tables and PEP-621 `[project]`.

use toml::{Table, Value};

use super::{Declaration, FormatOutput};
use crate::error::ParseError;
use crate::manifest::requirement::{parse_poetry_constraint, parse_requirement};
use crate::model::normalize_name;

pub(super) fn parse(content: &str) -> Result<FormatOutput, ParseError> {
    let document: Table = content.parse()?;
    let mut output = FormatOutput::default();

    if let Some(poetry) = document
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(Value::as_table)
    {
        parse_poetry(poetry, &mut output);
    }
    if let Some(project) = document.get("project").and_then(Value::as_table) {
        parse_pep621(project, &mut output);
    }

    Ok(output)
}

// ============================================================================
// Poetry
// ============================================================================

fn parse_poetry(poetry: &Table, output: &mut FormatOutput) {
    if let Some(deps) = poetry.get("dependencies").and_then(Value::as_table) {
        parse_poetry_table(deps, false, output);
    }
    if let Some(deps) = poetry.get("dev-dependencies").and_then(Value::as_table) {
        parse_poetry_table(deps, true, output);
    }
    if let Some(groups) = poetry.get("group").and_then(Value::as_table) {
        for (group_name, group) in groups {
            if let Some(deps) = group.get("dependencies").and_then(Value::as_table) {
                parse_poetry_table(deps, group_name != "main", output);
            }
        }
    }
}

fn parse_poetry_table(deps: &Table, is_dev: bool, output: &mut FormatOutput) {
    for (name, value) in deps {
        if name.eq_ignore_ascii_case("python") {
            continue;
        }
        match poetry_entry(value) {
            Ok((constraint, optional)) => {
                let (kind, current_version) = parse_poetry_constraint(&constraint);
                output.declarations.push(Declaration {
                    name: normalize_name(name),
                    constraint,
                    kind,
                    current_version,
                    is_dev: is_dev || optional,
                });
            }
            Err(reason) => output.errors.push(ParseError::InvalidEntry {
                entry: name.clone(),
                reason,
            }),
        }
    }
}

/// Returns `(constraint, optional)` for one Poetry dependency value.
fn poetry_entry(value: &Value) -> Result<(String, bool), String> {
    match value {
        Value::String(constraint) => Ok((constraint.clone(), false)),
        Value::Table(table) => {
            let optional = table
                .get("optional")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            // git/path/url dependencies carry no version
            let constraint = match table.get("version") {
                Some(Value::String(v)) => v.clone(),
                Some(_) => return Err("'version' must be a string".to_string()),
                None => String::new(),
            };
            Ok((constraint, optional))
        }
        // Multiple-constraint form: one table per environment
        Value::Array(alternatives) => {
            let mut constraints = Vec::with_capacity(alternatives.len());
            let mut optional = false;
            for alternative in alternatives {
                let (constraint, alt_optional) = poetry_entry(alternative)?;
                constraints.push(constraint);
                optional |= alt_optional;
            }
            if constraints.is_empty() {
                return Err("empty constraint list".to_string());
            }
            Ok((constraints.join(" || "), optional))
        }
        other => Err(format!("unsupported value type '{}'", other.type_str())),
    }
}

// ============================================================================
// PEP 621
// ============================================================================

fn parse_pep621(project: &Table, output: &mut FormatOutput) {
    match project.get("dependencies") {
        Some(Value::Array(items)) => parse_requirement_array(items, false, "dependencies", output),
        Some(_) => output.errors.push(ParseError::InvalidEntry {
            entry: "project.dependencies".to_string(),
            reason: "expected an array of requirement strings".to_string(),
        }),
        None => {}
    }

    if let Some(optional) = project.get("optional-dependencies").and_then(Value::as_table) {
        for (extra, items) in optional {
            match items {
                Value::Array(items) => parse_requirement_array(items, true, extra, output),
                _ => output.errors.push(ParseError::InvalidEntry {
                    entry: format!("project.optional-dependencies.{extra}"),
                    reason: "expected an array of requirement strings".to_string(),
                }),
            }
        }
    }
}

fn parse_requirement_array(items: &[Value], is_dev: bool, section: &str, output: &mut FormatOutput) {
    for item in items {
        let Some(raw) = item.as_str() else {
            output.errors.push(ParseError::InvalidEntry {
                entry: section.to_string(),
                reason: format!("non-string requirement {item}"),
            });
            continue;
        };
        match parse_requirement(raw) {
            Ok(req) => output
                .declarations
                .push(Declaration::from_requirement(req, is_dev)),
            Err(reason) => output.errors.push(ParseError::InvalidEntry {
                entry: section.to_string(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::requirement::ConstraintKind;

    const POETRY: &str = r#"
[tool.poetry]
name = "demo"

[tool.poetry.dependencies]
python = "^3.10"
Flask = "2.0.0"
requests = { version = "^2.25", extras = ["socks"] }
internal-lib = { git = "https://example.com/internal.git" }
broken = 42

[tool.poetry.dev-dependencies]
black = "^23.1"

[tool.poetry.group.test.dependencies]
pytest = "*"
"#;

    const PEP621: &str = r#"
[project]
name = "demo"
dependencies = ["Flask==2.0.0", "requests>=2.25.0", "not a requirement"]

[project.optional-dependencies]
docs = ["sphinx>=7"]
"#;

    #[test]
    fn test_poetry_tables() {
        let output = parse(POETRY).unwrap();
        let by_name = |n: &str| output.declarations.iter().find(|d| d.name == n).unwrap();

        assert!(output.declarations.iter().all(|d| d.name != "python"));
        assert_eq!(by_name("flask").kind, ConstraintKind::Exact);
        assert_eq!(by_name("requests").current_version.as_deref(), Some("2.25"));
        assert_eq!(by_name("internal-lib").kind, ConstraintKind::Unconstrained);
        assert!(by_name("black").is_dev);
        assert!(by_name("pytest").is_dev);
        assert!(!by_name("flask").is_dev);
        assert_eq!(output.errors.len(), 1);
    }

    #[test]
    fn test_pep621_tables() {
        let output = parse(PEP621).unwrap();
        let names: Vec<_> = output.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["flask", "requests", "sphinx"]);
        assert!(output.declarations[2].is_dev);
        assert_eq!(output.errors.len(), 1);
    }

    #[test]
    fn test_invalid_toml_fails_whole_file() {
        assert!(matches!(parse("[project"), Err(ParseError::InvalidToml(_))));
    }
}
