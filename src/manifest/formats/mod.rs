//! Manifest format implementations.
//!
//! Each supported grammar is one variant of [`ManifestFormat`]; detection
//! picks the variant from the file name (or, failing that, from the content)
//! and [`ManifestFormat::parse`] dispatches to the matching module.

mod lock;
mod pyproject;
mod requirements;
mod setup;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ParseError;
use crate::manifest::requirement::{ConstraintKind, Requirement};
use crate::model::normalize_name;

/// The closed set of understood manifest grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    /// `pyproject.toml` (Poetry table and PEP-621 `project` table)
    PyProject,
    /// `setup.cfg` `[options] install_requires`
    SetupConfig,
    /// `setup.py`, scanned as text
    SetupScript,
    /// `requirements*.txt`
    Requirements,
    /// `poetry.lock`
    PoetryLock,
    /// `Pipfile.lock`
    PipfileLock,
}

impl ManifestFormat {
    /// Detects the format from a file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let in_requirements_dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case("requirements"));

        match file_name.as_str() {
            "pyproject.toml" => Some(Self::PyProject),
            "setup.cfg" => Some(Self::SetupConfig),
            "setup.py" => Some(Self::SetupScript),
            "poetry.lock" => Some(Self::PoetryLock),
            "pipfile.lock" => Some(Self::PipfileLock),
            name if name.ends_with(".txt")
                && (name.contains("requirements") || in_requirements_dir) =>
            {
                Some(Self::Requirements)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PyProject => "pyproject",
            Self::SetupConfig => "setup.cfg",
            Self::SetupScript => "setup.py",
            Self::Requirements => "requirements",
            Self::PoetryLock => "poetry.lock",
            Self::PipfileLock => "Pipfile.lock",
        }
    }

    /// Lock files list the resolved tree, not what the project declares.
    pub fn is_lock(&self) -> bool {
        matches!(self, Self::PoetryLock | Self::PipfileLock)
    }

    /// Parses `content` in this format.
    ///
    /// `dev_context` marks every declaration as dev (used for files such as
    /// `requirements-dev.txt`). A whole-file failure (invalid TOML/JSON) is
    /// returned as `Err`; individual bad entries land in
    /// [`FormatOutput::errors`].
    pub fn parse(&self, content: &str, dev_context: bool) -> Result<FormatOutput, ParseError> {
        match self {
            Self::PyProject => pyproject::parse(content),
            Self::SetupConfig => Ok(setup::parse_cfg(content)),
            Self::SetupScript => Ok(setup::parse_script(content)),
            Self::Requirements => Ok(requirements::parse(content, dev_context)),
            Self::PoetryLock => lock::parse_poetry(content),
            Self::PipfileLock => lock::parse_pipfile(content),
        }
    }
}

/// A single dependency declaration found in one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Normalized name
    pub name: String,
    pub constraint: String,
    pub kind: ConstraintKind,
    pub current_version: Option<String>,
    pub is_dev: bool,
}

impl Declaration {
    fn from_requirement(req: Requirement, is_dev: bool) -> Self {
        Self {
            name: normalize_name(&req.name),
            constraint: req.constraint,
            kind: req.kind,
            current_version: req.current_version,
            is_dev,
        }
    }
}

/// Everything one manifest produced.
#[derive(Debug, Default)]
pub struct FormatOutput {
    pub declarations: Vec<Declaration>,

    /// Recovered per-entry errors
    pub errors: Vec<ParseError>,

    /// Other requirement files referenced with `-r` (relative paths)
    pub includes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_by_file_name() {
        let cases = [
            ("pyproject.toml", Some(ManifestFormat::PyProject)),
            ("requirements.txt", Some(ManifestFormat::Requirements)),
            ("requirements-dev.txt", Some(ManifestFormat::Requirements)),
            ("requirements/base.txt", Some(ManifestFormat::Requirements)),
            ("setup.py", Some(ManifestFormat::SetupScript)),
            ("setup.cfg", Some(ManifestFormat::SetupConfig)),
            ("poetry.lock", Some(ManifestFormat::PoetryLock)),
            ("Pipfile.lock", Some(ManifestFormat::PipfileLock)),
            ("README.md", None),
            ("notes.txt", None),
        ];
        for (name, expected) in cases {
            assert_eq!(ManifestFormat::detect(&PathBuf::from(name)), expected, "{name}");
        }
    }
}
