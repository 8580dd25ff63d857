//! Configuration for the Tessera runtime.
//!
//! Settings are layered with figment: built-in defaults, then configuration
//! files, then `TESSERA_*` environment variables, then programmatic overrides.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ManifestEntry, RegistrySettings,
    SpanEventConfig, TesseraConfig,
};
pub use validation::validate_config;
