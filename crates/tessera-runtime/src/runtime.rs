//! Runtime bootstrap.
//!
//! [`TesseraRuntime`] loads the configuration, installs logging and owns the
//! [`Composition`] built from the linked exports, the configuration manifest
//! and any catalogs added through the builder.
//!
//! ```rust,ignore
//! use tessera_runtime::TesseraRuntime;
//!
//! let runtime = TesseraRuntime::builder()
//!     .config_file("config/tessera.toml")
//!     .profile("production")
//!     .build()?;
//!
//! let greeting = runtime.registry().get_one_as::<String>(Some("greeting"))?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tessera_core::{
    Catalog, Composition, LinkedCatalog, LoadReport, Registry, RegistryResult, ServiceContainer,
};
use tracing::info;

use crate::config::{ConfigLoader, TesseraConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::manifest::ManifestCatalog;

/// Configuration plus the composition it describes.
pub struct TesseraRuntime {
    config: TesseraConfig,
    composition: Composition,
}

impl TesseraRuntime {
    /// Loads the configuration from the default locations and builds the
    /// runtime, installing logging.
    pub fn new() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds a runtime from an already loaded configuration.
    ///
    /// Logging is left untouched.
    pub fn from_config(config: TesseraConfig) -> RuntimeResult<Self> {
        Self::compose(config, Vec::new())
    }

    fn compose(config: TesseraConfig, extra: Vec<Arc<dyn Catalog>>) -> RuntimeResult<Self> {
        validate_config(&config)?;

        let mut catalogs: Vec<Arc<dyn Catalog>> = Vec::new();
        if config.registry.linked_exports {
            catalogs.push(Arc::new(LinkedCatalog));
        }
        if !config.registry.manifest.is_empty() {
            catalogs.push(Arc::new(ManifestCatalog::new(config.registry.manifest.clone())));
        }
        catalogs.extend(extra);

        let composition = Composition::new(catalogs);
        let report = composition.last_report();
        info!(
            catalogs = report.catalogs,
            failed_catalogs = report.failed_catalogs,
            plugins = report.plugins,
            skipped = report.skipped,
            "Runtime composed"
        );

        Ok(Self {
            config,
            composition,
        })
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// The current registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.composition.registry()
    }

    /// Rebuilds the registry from every catalog.
    pub fn reload(&self) -> Arc<Registry> {
        self.composition.reload()
    }

    pub fn last_report(&self) -> LoadReport {
        self.composition.last_report()
    }

    /// A service container seeded from the plugins registered under `name`.
    pub fn service_container(&self, name: &str) -> RegistryResult<ServiceContainer> {
        ServiceContainer::builder(&self.registry()).name(name).build()
    }
}

/// Builder for [`TesseraRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    catalogs: Vec<Arc<dyn Catalog>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            catalogs: Vec::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: TesseraConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Adds a catalog after the linked exports and the manifest.
    pub fn catalog(mut self, catalog: impl Catalog + 'static) -> Self {
        self.catalogs.push(Arc::new(catalog));
        self
    }

    /// Skips installing the logging subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<TesseraRuntime> {
        let config = self.config_loader.load()?;
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        TesseraRuntime::compose(config, self.catalogs)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
