//! Plain requirement files (`requirements.txt` and friends).

use super::{Declaration, FormatOutput};
use crate::error::ParseError;
use crate::manifest::requirement::parse_requirement;

/// Parses requirement lines. Never fails as a whole; bad lines are collected.
pub(super) fn parse(content: &str, is_dev: bool) -> FormatOutput {
    let mut output = FormatOutput::default();

    for (line_no, line) in logical_lines(content) {
        let line = strip_comment(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(option) = line.strip_prefix('-') {
            if let Some(target) = include_target(option) {
                output.includes.push(target.to_string());
            }
            // -e, -c, --index-url and other pip options carry no declaration
            continue;
        }

        // Hash-checking mode: `pkg==1.0 --hash=sha256:...`
        let requirement = line.split(" --").next().unwrap_or_default();

        match parse_requirement(requirement) {
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

/// Joins `\`-continued lines, keeping the number of the first physical line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let (start, mut buffer) = pending.take().unwrap_or((idx + 1, String::new()));
        match raw.trim_end().strip_suffix('\\') {
            Some(continued) => {
                buffer.push_str(continued);
                buffer.push(' ');
                pending = Some((start, buffer));
            }
            None => {
                buffer.push_str(raw);
                lines.push((start, buffer));
            }
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

/// `#` starts a comment at line start or after whitespace.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte == b'#' && (idx == 0 || bytes[idx - 1].is_ascii_whitespace()) {
            return &line[..idx];
        }
    }
    line
}

fn include_target(option: &str) -> Option<&str> {
    let rest = option
        .strip_prefix("-requirement")
        .or_else(|| option.strip_prefix('r'))?;
    let target = rest.trim_start_matches('=').trim();
    (!target.is_empty()).then_some(target)
}
