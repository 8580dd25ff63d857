//! # Tessera Core
//!
//! A plugin registry and service resolution graph.
//!
//! Capabilities are advertised by [`Catalog`]s, materialized into [`Plugin`]s
//! and collected by a [`Registry`] that groups them by contract name and
//! orders them by priority. On top of the registry, a [`ServiceContainer`]
//! maps capability types to observable [`ServiceItem`]s that fall back to
//! related registrations and follow their providers when those change.
//!
//! ## Layers
//!
//! - **Types**: static [`TypeInfo`] descriptors and type-erased [`Instance`]s
//! - **Discovery**: [`CapabilityDescriptor`], [`Catalog`], the link-time
//!   [`EXPORTS`] slice filled by `#[export]`
//! - **Registry**: [`Plugin`], [`Registry`], imports and keyed components
//! - **Services**: [`ServiceItem`], [`ServiceContainer`], [`ServiceProvider`]
//! - **Composition**: [`Composition`] owns catalogs and reloads the registry
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{CapabilityDescriptor, Instance, Registry};
//!
//! let registry = Registry::new();
//! registry.add_descriptor(CapabilityDescriptor::value("greeting", Instance::new("hi".to_string())).with_priority(1))?;
//! registry.add_descriptor(CapabilityDescriptor::value("greeting", Instance::new("hello".to_string())).with_priority(2))?;
//!
//! assert_eq!(registry.get_one_as::<String>(Some("greeting"))?.as_deref(), Some("hello"));
//! ```

pub mod catalog;
pub mod components;
pub mod composition;
pub mod descriptor;
pub mod error;
pub mod import;
pub mod plugin;
pub mod registry;
pub mod service;
pub mod types;

// Used by code generated with `#[export]`.
pub use linkme;

pub use catalog::{Catalog, EXPORTS, ExportFn, LinkedCatalog, StaticCatalog};
pub use components::{KeyFn, KeyedComponents, SelectFn};
pub use composition::Composition;
pub use descriptor::{CapabilityDescriptor, FactoryFn, PRIORITY_KEY, Payload, SERVICE_TYPE_KEY};
pub use error::{BoxError, RegistryError, RegistryResult};
pub use import::{Cardinality, Import, ImportSpec, Imports, Resolved};
pub use plugin::Plugin;
pub use registry::{LoadReport, Registry};
pub use service::{
    FnProvider, SERVICE_PROVIDER, ServiceCallback, ServiceContainer, ServiceContainerBuilder,
    ServiceItem, ServiceProvider, ServiceTypeResolver, ServiceValue, TypeComparer, provide_typed,
    provider_instance,
};
pub use types::{
    ANY, AnyArc, BOOL, Callable, CastFn, F64, I32, I64, Instance, JSON, STRING, Signature,
    TypeFn, TypeInfo, TypeKind, TypeRef, Typed, UNIT, Upcast,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        ANY, CapabilityDescriptor, Catalog, Composition, Import, Imports, Instance, Plugin,
        Registry, RegistryError, RegistryResult, ServiceContainer, ServiceItem, ServiceProvider,
        TypeInfo, TypeRef, Typed, Upcast, upcast,
    };
}
