//! Manifest module - discovery, parsing and merging of dependency declarations.
//!
//! - **Formats**: one [`ManifestFormat`] variant per grammar
//! - **Requirements**: shared specifier grammar in [`requirement`]
//! - **Merge**: lock pin > exact pin > range > unconstrained
//!
//! Parsing never aborts on bad input: every recovered problem becomes a
//! [`ParseWarning`].

pub mod formats;
pub mod requirement;

pub use formats::{Declaration, ManifestFormat};
pub use requirement::{parse_requirement, ConstraintKind, Requirement};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::error::ParseError;
use crate::model::Dependency;

// ============================================================================
// Output Types
// ============================================================================

/// A recovered problem in one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub file: PathBuf,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

/// Canonical, deduplicated dependencies of a project.
#[derive(Debug, Default)]
pub struct ParsedManifests {
    /// Sorted by normalized name
    pub dependencies: Vec<Dependency>,
    pub warnings: Vec<ParseWarning>,
    /// Manifests that were read, in discovery order
    pub files: Vec<PathBuf>,
}

// ============================================================================
// Discovery
// ============================================================================

/// Lists the manifests under `project` in merge order.
///
/// A file path is returned as-is. Directories are searched at the top level
/// and in a `requirements/` subdirectory.
pub fn discover(project: &Path) -> Vec<(PathBuf, ManifestFormat)> {
    if project.is_file() {
        return ManifestFormat::detect(project)
            .or_else(|| {
                // Any explicitly given .txt file is read as requirement lines
                project
                    .extension()
                    .is_some_and(|ext| ext == "txt")
                    .then_some(ManifestFormat::Requirements)
            })
            .map(|format| vec![(project.to_path_buf(), format)])
            .unwrap_or_default();
    }

    let mut found = Vec::new();
    for dir in [project.to_path_buf(), project.join("requirements")] {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(format) = ManifestFormat::detect(&path) {
                found.push((path, format));
            }
        }
    }

    found.sort_by(|(a_path, a_fmt), (b_path, b_fmt)| a_fmt.cmp(b_fmt).then_with(|| a_path.cmp(b_path)));
    found
}

/// Requirement files named like `requirements-dev.txt` or `test-requirements.txt`.
fn is_dev_requirements_file(path: &Path) -> bool {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    name.split(['-', '_', '.'])
        .any(|part| matches!(part, "dev" | "develop" | "test" | "tests" | "testing" | "lint" | "docs"))
}

// ============================================================================
// Parsing
// ============================================================================

/// Discovers, parses and merges all manifests of a project.
#[instrument(skip_all, fields(project = %project.display()))]
pub fn parse_project(project: &Path) -> ParsedManifests {
    let mut result = ParsedManifests::default();

    if !project.exists() {
        warn!("Project path does not exist");
        result.warnings.push(ParseWarning {
            file: project.to_path_buf(),
            message: "path does not exist".to_string(),
        });
        return result;
    }

    let manifests = discover(project);
    if manifests.is_empty() {
        warn!("No supported manifest files found");
    }

    let mut merger = Merger::default();
    let mut visited = HashSet::new();
    for (path, format) in manifests {
        let dev_context = format == ManifestFormat::Requirements && is_dev_requirements_file(&path);
        parse_file(&path, format, dev_context, &mut visited, &mut merger, &mut result);
    }

    result.dependencies = merger.finish();
    info!(
        dependencies = result.dependencies.len(),
        files = result.files.len(),
        warnings = result.warnings.len(),
        "Manifest parsing completed"
    );
    result
}

fn parse_file(
    path: &Path,
    format: ManifestFormat,
    dev_context: bool,
    visited: &mut HashSet<PathBuf>,
    merger: &mut Merger,
    result: &mut ParsedManifests,
) {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(key) {
        debug!(file = %path.display(), "Manifest already parsed, skipping");
        return;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            record(result, path, &ParseError::Io(e));
            return;
        }
    };
    result.files.push(path.to_path_buf());

    let output = match format.parse(&content, dev_context) {
        Ok(output) => output,
        Err(e) => {
            record(result, path, &e);
            return;
        }
    };

    debug!(
        file = %path.display(),
        format = format.name(),
        declarations = output.declarations.len(),
        "Parsed manifest"
    );

    for error in &output.errors {
        record(result, path, error);
    }

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    merger.add_all(format, output.declarations, &source);

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for include in output.includes {
        let included = base.join(&include);
        let included_dev = dev_context || is_dev_requirements_file(&included);
        parse_file(&included, ManifestFormat::Requirements, included_dev, visited, merger, result);
    }
}

fn record(result: &mut ParsedManifests, path: &Path, error: &ParseError) {
    warn!(file = %path.display(), error = %error, "Skipping malformed manifest content");
    result.warnings.push(ParseWarning {
        file: path.to_path_buf(),
        message: error.to_string(),
    });
}

/// Parses a single manifest given as text. Used for in-memory inputs.
pub fn parse_content(
    content: &str,
    format: ManifestFormat,
    source: &str,
    dev_context: bool,
) -> ParsedManifests {
    let mut result = ParsedManifests::default();
    let mut merger = Merger::default();
    match format.parse(content, dev_context) {
        Ok(output) => {
            for error in &output.errors {
                record(&mut result, Path::new(source), error);
            }
            merger.add_all(format, output.declarations, source);
        }
        Err(e) => record(&mut result, Path::new(source), &e),
    }
    result.dependencies = merger.finish();
    result
}

// ============================================================================
// Merge
// ============================================================================

/// Folds declarations into one entry per name.
///
/// Lock-file entries only pin names some other manifest declares. A lock
/// file stands in for the declarations only when it is the sole manifest.
#[derive(Default)]
struct Merger {
    entries: BTreeMap<String, MergeEntry>,
    locked: BTreeMap<String, MergeEntry>,
    declaring_manifests: usize,
}

struct MergeEntry {
    declaration: Declaration,
    source: String,
    /// Dev only if every declaration of the package is dev
    all_dev: bool,
}

impl MergeEntry {
    fn new(declaration: Declaration, source: &str) -> Self {
        Self {
            all_dev: declaration.is_dev,
            declaration,
            source: source.to_string(),
        }
    }
}

impl Merger {
    fn add_all(&mut self, format: ManifestFormat, declarations: Vec<Declaration>, source: &str) {
        if format.is_lock() {
            for declaration in declarations {
                // first lock file wins
                self.locked
                    .entry(declaration.name.clone())
                    .or_insert_with(|| MergeEntry::new(declaration, source));
            }
        } else {
            self.declaring_manifests += 1;
            for declaration in declarations {
                self.add(declaration, source);
            }
        }
    }

    fn add(&mut self, declaration: Declaration, source: &str) {
        match self.entries.get_mut(&declaration.name) {
            Some(existing) => {
                existing.all_dev &= declaration.is_dev;
                // Ties keep the first declaration
                if declaration.kind > existing.declaration.kind {
                    existing.declaration = declaration;
                    existing.source = source.to_string();
                }
            }
            None => {
                self.entries
                    .insert(declaration.name.clone(), MergeEntry::new(declaration, source));
            }
        }
    }

    fn finish(mut self) -> Vec<Dependency> {
        if self.declaring_manifests == 0 {
            self.entries = std::mem::take(&mut self.locked);
        } else {
            for (name, pin) in std::mem::take(&mut self.locked) {
                let Some(existing) = self.entries.get_mut(&name) else {
                    debug!(package = %name, "Lock entry is not a declared dependency, skipping");
                    continue;
                };
                if pin.declaration.kind > existing.declaration.kind {
                    existing.declaration = pin.declaration;
                    existing.source = pin.source;
                }
            }
        }

        self.entries
            .into_values()
            .map(|entry| {
                Dependency::declared(
                    &entry.declaration.name,
                    entry.declaration.constraint,
                    entry.declaration.current_version,
                    entry.source,
                    entry.all_dev,
                )
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn project_with(files: &[(&str, &str)]) -> tempfile::TempDir {
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

    #[test]
    fn test_lock_pin_wins_over_requirement_range() {
        let dir = project_with(&[
            ("requirements.txt", "requests>=2.0\nflask\n"),
            (
                "poetry.lock",
                "[[package]]\nname = \"requests\"\nversion = \"2.25.0\"\ncategory = \"main\"\n",
            ),
        ]);
        let parsed = parse_project(dir.path());
        let requests = parsed.dependencies.iter().find(|d| d.name == "requests").unwrap();
        assert_eq!(requests.current_version.as_deref(), Some("2.25.0"));
        assert_eq!(requests.constraint, "==2.25.0");
        assert_eq!(requests.source, "poetry.lock");
    }

    #[test]
    fn test_lock_only_pins_declared_packages() {
        let dir = project_with(&[
            ("pyproject.toml", "[tool.poetry.dependencies]\nflask = \"^2.0\"\n"),
            (
                "poetry.lock",
                "[[package]]\nname = \"flask\"\nversion = \"2.3.3\"\n\n\
                 [[package]]\nname = \"werkzeug\"\nversion = \"2.3.7\"\n\n\
                 [[package]]\nname = \"jinja2\"\nversion = \"3.1.2\"\n",
            ),
        ]);
        let parsed = parse_project(dir.path());
        let names: Vec<_> = parsed.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["flask"]);
        assert_eq!(parsed.dependencies[0].current_version.as_deref(), Some("2.3.3"));
        assert_eq!(parsed.dependencies[0].source, "poetry.lock");
    }

    #[test]
    fn test_sole_lock_file_supplies_dependencies() {
        let dir = project_with(&[(
            "poetry.lock",
            "[[package]]\nname = \"flask\"\nversion = \"2.3.3\"\n\n\
             [[package]]\nname = \"werkzeug\"\nversion = \"2.3.7\"\n",
        )]);
        let parsed = parse_project(dir.path());
        let names: Vec<_> = parsed.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["flask", "werkzeug"]);
    }

    #[test]
    fn test_exact_wins_over_range_wins_over_unconstrained() {
        let dir = project_with(&[
            ("requirements.txt", "flask\nclick>=8.0\n"),
            ("requirements-prod.txt", "flask>=2.0\nclick==8.1.3\n"),
        ]);
        let parsed = parse_project(dir.path());
        let names: Vec<_> = parsed.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["click", "flask"]);
        assert_eq!(parsed.dependencies[0].constraint, "==8.1.3");
        assert_eq!(parsed.dependencies[1].constraint, ">=2.0");
    }

    #[test]
    fn test_names_are_deduplicated_after_normalization() {
        let parsed = parse_content(
            "Flask_Pkg==1.0\nflask-pkg>=0.9\nFLASK.PKG\n",
            ManifestFormat::Requirements,
            "requirements.txt",
            false,
        );
        assert_eq!(parsed.dependencies.len(), 1);
        assert_eq!(parsed.dependencies[0].name, "flask-pkg");
        assert_eq!(parsed.dependencies[0].constraint, "==1.0");
    }

    #[test]
    fn test_dev_files_and_includes() {
        let dir = project_with(&[
            ("requirements.txt", "-r requirements/base.txt\nflask==2.0.0\n"),
            ("requirements/base.txt", "click==8.1.3\n"),
            ("requirements-dev.txt", "pytest==7.4.0\nflask==2.0.0\n"),
        ]);
        let parsed = parse_project(dir.path());
        let get = |n: &str| parsed.dependencies.iter().find(|d| d.name == n).unwrap();
        assert!(get("pytest").is_dev);
        // declared in both a dev and a non-dev file
        assert!(!get("flask").is_dev);
        assert!(!get("click").is_dev);
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    }

    #[test]
    fn test_malformed_input_never_aborts() {
        let dir = project_with(&[
            ("requirements.txt", "flask==2.0.0\n???\n"),
            ("pyproject.toml", "[project\n"),
        ]);
        let parsed = parse_project(dir.path());
        assert_eq!(parsed.dependencies.len(), 1);
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_explicit_file_needs_a_known_name() {
        let dir = project_with(&[("deps.txt", "flask==2.0.0\n"), ("deps.cfg", "[options]\n")]);
        let txt = discover(&dir.path().join("deps.txt"));
        assert_eq!(txt, vec![(dir.path().join("deps.txt"), ManifestFormat::Requirements)]);
        assert!(discover(&dir.path().join("deps.cfg")).is_empty());
    }

    #[test]
    fn test_missing_project_path_yields_warning() {
        let parsed = parse_project(Path::new("/definitely/not/here"));
        assert!(parsed.dependencies.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_recursive_include_is_parsed_once() {
        let dir = project_with(&[
            ("requirements.txt", "-r requirements-extra.txt\nflask==2.0.0\n"),
            ("requirements-extra.txt", "-r requirements.txt\nclick==8.1.3\n"),
        ]);
        let parsed = parse_project(dir.path());
        assert_eq!(parsed.dependencies.len(), 2);
        assert_eq!(parsed.files.len(), 2);
    }

    #[test]
    fn test_dev_file_name_classification() {
        assert!(is_dev_requirements_file(Path::new("requirements-dev.txt")));
        assert!(is_dev_requirements_file(Path::new("test-requirements.txt")));
        assert!(is_dev_requirements_file(Path::new("requirements/dev.txt")));
        assert!(!is_dev_requirements_file(Path::new("requirements.txt")));
        assert!(!is_dev_requirements_file(Path::new("requirements/base.txt")));
    }
}
