//! `setup.py` and `setup.cfg`.
//!
//! `setup.py` is never executed: the `install_requires=[...]` and
//! `tests_require=[...]` list literals are located textually and their string
//! literals extracted.

use super::{Declaration, FormatOutput};
use crate::error::ParseError;
use crate::manifest::requirement::parse_requirement;

// ============================================================================
// setup.py
// ============================================================================

pub(super) fn parse_script(content: &str) -> FormatOutput {
    let mut output = FormatOutput::default();
    for (keyword, is_dev) in [("install_requires", false), ("tests_require", true)] {
        extract_keyword_list(content, keyword, is_dev, &mut output);
    }
    output
}

fn extract_keyword_list(content: &str, keyword: &str, is_dev: bool, output: &mut FormatOutput) {
    let mut search_from = 0;
    while let Some(found) = content[search_from..].find(keyword) {
        let start = search_from + found;
        search_from = start + keyword.len();

        let after = content[search_from..].trim_start();
        let Some(after_eq) = after.strip_prefix('=') else {
            continue;
        };
        let value = after_eq.trim_start();
        let value_offset = content.len() - value.len();

        if !value.starts_with('[') {
            output.errors.push(ParseError::Malformed {
                line: line_of(content, value_offset),
                reason: format!("{keyword} is not a literal list; skipped"),
            });
            continue;
        }

        for (offset, literal) in string_literals_in_list(&value[1..]) {
            match parse_requirement(&literal) {
                Ok(req) => output
                    .declarations
                    .push(Declaration::from_requirement(req, is_dev)),
                Err(reason) => output.errors.push(ParseError::Malformed {
                    line: line_of(content, value_offset + 1 + offset),
                    reason,
                }),
            }
        }
    }
}

/// Collects `'...'` / `"..."` literals up to the closing `]`.
///
/// Returns each literal with its byte offset in `list_body`.
fn string_literals_in_list(list_body: &str) -> Vec<(usize, String)> {
    let mut literals = Vec::new();
    let mut chars = list_body.char_indices();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            ']' => break,
            '#' => {
                // comment until end of line
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' | '\'' => {
                let mut literal = String::new();
                let mut escaped = false;
                for (_, c) in chars.by_ref() {
                    if escaped {
                        literal.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == ch {
                        break;
                    } else {
                        literal.push(c);
                    }
                }
                literals.push((idx, literal));
            }
            _ => {}
        }
    }
    literals
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

// ============================================================================
// setup.cfg
// ============================================================================

#[derive(PartialEq)]
enum Section {
    Options,
    Extras,
    Other,
}

pub(super) fn parse_cfg(content: &str) -> FormatOutput {
    let mut output = FormatOutput::default();
    let mut section = Section::Other;
    // Whether indented continuation lines belong to a requirement list
    let mut collecting: Option<bool> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = match trimmed.trim_matches(['[', ']']).trim() {
                "options" => Section::Options,
                "options.extras_require" => Section::Extras,
                _ => Section::Other,
            };
            collecting = None;
            continue;
        }

        let is_continuation = raw.starts_with([' ', '\t']);
        let value = if is_continuation {
            match collecting {
                Some(_) => trimmed,
                None => continue,
            }
        } else {
            let Some((key, value)) = trimmed.split_once('=') else {
                collecting = None;
                continue;
            };
            collecting = match (&section, key.trim()) {
                (Section::Options, "install_requires") => Some(false),
                (Section::Extras, _) => Some(true),
                _ => None,
            };
            if collecting.is_none() {
                continue;
            }
            value.trim()
        };

        if value.is_empty() {
            continue;
        }
        let is_dev = collecting.unwrap_or(false);
        match parse_requirement(value) {
            Ok(req) => output
                .declarations
                .push(Declaration::from_requirement(req, is_dev)),
            Err(reason) => output.errors.push(ParseError::Malformed {
                line: line_no,
                reason,
            }),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_py_literal_lists() {
        let content = r#"
from setuptools import setup

setup(
    name="demo",
    install_requires=[
        "Flask>=2.0",  # web
        'requests==2.25.0',
    ],
    tests_require = ["pytest"],
)
"#;
        let output = parse_script(content);
        let names: Vec<_> = output.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["flask", "requests", "pytest"]);
        assert!(output.declarations[2].is_dev);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_setup_py_non_literal_is_warned() {
        let output = parse_script("REQS = []\nsetup(install_requires=REQS)\n");
        assert!(output.declarations.is_empty());
        assert!(matches!(output.errors[0], ParseError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_setup_cfg_sections() {
        let content = "\
[metadata]
name = demo

[options]
packages = find:
install_requires =
    click>=8.0
    attrs==23.1.0

[options.extras_require]
test =
    pytest
";
        let output = parse_cfg(content);
        let names: Vec<_> = output.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["click", "attrs", "pytest"]);
        assert!(!output.declarations[0].is_dev);
        assert!(output.declarations[2].is_dev);
    }
}
