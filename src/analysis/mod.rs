//! Analyzers applied to each resolved dependency, plus the whole-set passes.

pub mod cycles;
pub mod license;
pub mod scoring;
pub mod version;
pub mod vulnerability;

pub use cycles::{detect_cycles, DependencyGraph};
pub use license::{find_conflicts, CopyleftFamily, LicenseClass, LicenseTable};
pub use scoring::{overall_score, ScoringWeights};
pub use version::{parse_version, staleness, update_type};
pub use vulnerability::{VersionPredicate, VulnerabilityDatabase};
