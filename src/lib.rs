pub mod analysis;
pub mod checker;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod registry;
pub mod traits;

// Re-export common types for convenience
pub use checker::HealthChecker;
pub use config::CheckerConfig;
pub use error::*;
pub use model::*;
pub use registry::{RegistryClient, RegistryStats, Resolution};
pub use traits::*;
