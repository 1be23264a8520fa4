pub mod config;
pub mod cycle;
pub mod types;
pub mod version;

pub use config::{ConfigError, ReleaseConfig, Timing};
pub use types::*;
pub use version::{VersionDescriptor, VersionDocument, VersionError};
