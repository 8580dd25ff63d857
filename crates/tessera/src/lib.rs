//! # Tessera
//!
//! A plugin registry and service resolution graph.
//!
//! ## Overview
//!
//! Capabilities are published by catalogs, collected into a registry grouped
//! by contract name and ordered by priority, and resolved by type through a
//! service container whose items follow the providers they were derived from.
//!
//! ```text
//! ┌────────────┐     ┌──────────┐     ┌──────────────────┐
//! │  Catalogs  │────▶│ Registry │────▶│ ServiceContainer │──▶ ServiceItems
//! │ (#[export],│     │ (groups, │     │ (type fallback,  │    (change
//! │  manifest) │     │ priority)│     │  regeneration)   │     cascade)
//! └────────────┘     └──────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tessera::prelude::*;
//!
//! #[export(name = "greeting", priority = 10, value)]
//! fn greeting() -> String {
//!     "hello".to_string()
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = TesseraRuntime::new()?;
//!     let greeting = runtime.registry().get_one_as::<String>(Some("greeting"))?;
//!     tracing::info!(?greeting, "resolved");
//!     Ok(())
//! }
//! ```
//!
//! Code generated by `#[export]` refers to `tessera_core`, so crates that
//! export capabilities depend on `tessera-core` directly.
//!
//! ## Features
//!
//! - `macros`: the `#[export]` attribute (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log format

pub use tessera_core as core;
pub use tessera_runtime as runtime;

#[cfg(feature = "macros")]
pub use tessera_macros::export;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tessera_core::prelude::*;
    pub use tessera_runtime::{RuntimeError, RuntimeResult, TesseraConfig, TesseraRuntime};

    #[cfg(feature = "macros")]
    pub use tessera_macros::export;
}
