//! Tessera Runtime - configuration, logging and composition bootstrap.
//!
//! This crate provides:
//! - Layered configuration with figment (`TesseraConfig`, `ConfigLoader`)
//! - Logging setup on top of `tracing-subscriber` (`LoggingBuilder`)
//! - A catalog over the values declared in the configuration (`ManifestCatalog`)
//! - The runtime that ties them to a composition root (`TesseraRuntime`)
//!
//! ```ignore
//! use tessera_runtime::TesseraRuntime;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = TesseraRuntime::new()?;
//!     let registry = runtime.registry();
//!     for name in registry.names() {
//!         tracing::info!(%name, "capability available");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, ManifestEntry, TesseraConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use manifest::ManifestCatalog;
pub use runtime::{RuntimeBuilder, TesseraRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
