//! Catalog over the values declared in the configuration manifest.

use tessera_core::{BoxError, CapabilityDescriptor, Catalog, Instance, JSON};

use crate::config::ManifestEntry;

/// Publishes each [`ManifestEntry`] as a `JSON`-typed plugin.
#[derive(Debug, Clone, Default)]
pub struct ManifestCatalog {
    entries: Vec<ManifestEntry>,
}

impl ManifestCatalog {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}

impl ManifestEntry {
    /// The descriptor this entry is registered with.
    pub fn to_descriptor(&self) -> CapabilityDescriptor {
        let descriptor = CapabilityDescriptor::value(&self.name, Instance::new(self.value.clone()))
            .with_contract_type(&JSON)
            .with_priority(self.priority);
        self.metadata
            .iter()
            .fold(descriptor, |descriptor, (key, value)| {
                descriptor.with_metadata(key.as_str(), value.clone())
            })
    }
}

impl Catalog for ManifestCatalog {
    fn name(&self) -> &str {
        "manifest"
    }

    fn descriptors(&self) -> Result<Vec<CapabilityDescriptor>, BoxError> {
        Ok(self.entries.iter().map(ManifestEntry::to_descriptor).collect())
    }
}
