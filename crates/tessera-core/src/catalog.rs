//! Capability discovery.
//!
//! A [`Catalog`] enumerates [`CapabilityDescriptor`]s. Two catalogs ship with
//! the core:
//!
//! - [`LinkedCatalog`] reads the [`EXPORTS`] distributed slice, which
//!   `#[export]` populates at link time.
//! - [`StaticCatalog`] holds an explicit list, handy for tests and for
//!   descriptors built from configuration.

use linkme::distributed_slice;

use crate::descriptor::CapabilityDescriptor;
use crate::error::BoxError;

/// Builds the descriptor of one linked export.
pub type ExportFn = fn() -> CapabilityDescriptor;

/// Exports registered at link time by `#[export]`.
#[distributed_slice]
pub static EXPORTS: [ExportFn];

/// A source of capability descriptors.
pub trait Catalog: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Enumerates the descriptors of this catalog.
    ///
    /// Called on every registry build, so reloading picks up changes.
    fn descriptors(&self) -> Result<Vec<CapabilityDescriptor>, BoxError>;
}

/// Catalog over the linked [`EXPORTS`] slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedCatalog;

impl Catalog for LinkedCatalog {
    fn name(&self) -> &str {
        "linked"
    }

    fn descriptors(&self) -> Result<Vec<CapabilityDescriptor>, BoxError> {
        Ok(EXPORTS.iter().map(|export| export()).collect())
    }
}

/// Catalog over an explicit descriptor list.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    name: String,
    descriptors: Vec<CapabilityDescriptor>,
}

impl StaticCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptors: Vec::new(),
        }
    }

    pub fn with(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn push(&mut self, descriptor: CapabilityDescriptor) {
        self.descriptors.push(descriptor);
    }
}

impl Catalog for StaticCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptors(&self) -> Result<Vec<CapabilityDescriptor>, BoxError> {
        Ok(self.descriptors.clone())
    }
}
