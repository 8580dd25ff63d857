//! Service resolution graph.
//!
//! - [`ServiceItem`]: observable cell holding the value of one capability type
//! - [`ServiceContainer`]: capability type to item map with fallback matching
//! - [`ServiceProvider`]: values that derive services of other types

mod container;
mod item;
mod provider;

pub use container::{ServiceContainer, ServiceContainerBuilder, ServiceTypeResolver, TypeComparer};
pub use item::{ServiceItem, ServiceValue};
pub use provider::{
    FnProvider, SERVICE_PROVIDER, ServiceCallback, ServiceProvider, provide_typed,
    provider_instance,
};
