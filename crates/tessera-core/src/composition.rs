//! The composition root.
//!
//! Owns the catalogs and the current [`Registry`]. Reloading builds a fresh
//! registry from the catalogs and publishes it atomically; readers holding
//! the previous registry keep using it until they fetch the new one.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;

use crate::catalog::{Catalog, LinkedCatalog};
use crate::registry::{LoadReport, Registry};

pub struct Composition {
    catalogs: Vec<Arc<dyn Catalog>>,
    current: ArcSwap<Registry>,
    last_report: Mutex<LoadReport>,
    reload_lock: Mutex<()>,
}

impl Composition {
    /// Builds the initial registry from `catalogs`.
    pub fn new(catalogs: Vec<Arc<dyn Catalog>>) -> Self {
        let (registry, report) = Registry::from_catalogs(&catalogs);
        Self {
            catalogs,
            current: ArcSwap::from_pointee(registry),
            last_report: Mutex::new(report),
            reload_lock: Mutex::new(()),
        }
    }

    /// A composition over the exports linked into the binary.
    pub fn linked() -> Self {
        Self::new(vec![Arc::new(LinkedCatalog)])
    }

    /// The current registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    pub fn catalogs(&self) -> &[Arc<dyn Catalog>] {
        &self.catalogs
    }

    /// Report of the most recent build.
    pub fn last_report(&self) -> LoadReport {
        self.last_report.lock().clone()
    }

    /// Rebuilds the registry from the catalogs and publishes it.
    ///
    /// Concurrent reloads are serialized.
    pub fn reload(&self) -> Arc<Registry> {
        let _guard = self.reload_lock.lock();
        let (registry, report) = Registry::from_catalogs(&self.catalogs);
        let registry = Arc::new(registry);
        self.current.store(Arc::clone(&registry));
        info!(plugins = report.plugins, skipped = report.skipped, "Registry reloaded");
        *self.last_report.lock() = report;
        registry
    }
}
