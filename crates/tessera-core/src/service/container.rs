//! The service container.
//!
//! Maps capability types to [`ServiceItem`]s. The container is seeded from
//! the registry with *system* items; lookups for types nobody registered
//! directly are answered by the closest related registration, deriving a
//! child item when that registration's value is a service provider.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use super::item::{ServiceItem, ServiceValue};
use super::provider::ServiceCallback;
use crate::descriptor::SERVICE_TYPE_KEY;
use crate::error::{RegistryError, RegistryResult};
use crate::plugin::Plugin;
use crate::registry::Registry;
use crate::types::{ANY, Instance, TypeRef};

/// Orders related types during candidate matching; greater comes first.
pub type TypeComparer = Arc<dyn Fn(TypeRef, TypeRef) -> Ordering + Send + Sync>;

/// Decides which capability type a registry value is registered as.
pub type ServiceTypeResolver = Arc<dyn Fn(&Plugin, &Instance) -> Option<TypeRef> + Send + Sync>;

/// Capability type to service item map.
pub struct ServiceContainer {
    items: DashMap<TypeRef, ServiceItem>,
    comparer: Option<TypeComparer>,
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceContainer {
    /// An empty container.
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            comparer: None,
        }
    }

    /// Starts building a container seeded from `registry`.
    pub fn builder(registry: &Registry) -> ServiceContainerBuilder<'_> {
        ServiceContainerBuilder {
            registry,
            name: None,
            ty: None,
            comparer: None,
            resolver: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capability types with an item.
    pub fn service_types(&self) -> Vec<TypeRef> {
        self.items.iter().map(|entry| *entry.key()).collect()
    }

    /// The value registered for `ty`, resolving it if necessary.
    pub fn get_service(&self, ty: TypeRef) -> RegistryResult<Option<Instance>> {
        self.get_service_item(ty)?.value()
    }

    /// The item for `ty`, creating or regenerating it if necessary.
    ///
    /// The returned item is the one stored in the container: later changes,
    /// including regeneration, happen in place.
    pub fn get_service_item(&self, ty: TypeRef) -> RegistryResult<ServiceItem> {
        let existing = self.items.get(&ty).map(|entry| entry.value().clone());
        let item = match existing {
            Some(item) => item,
            None => {
                let created = self.create_item(ty, None)?;
                let stored = self.items.entry(ty).or_insert(created).value().clone();
                return Ok(stored);
            }
        };

        if item.has_value() {
            return Ok(item);
        }
        self.regenerate(ty, &item)?;
        Ok(item)
    }

    /// Registers `value` for `ty` and pins it against automatic updates.
    pub fn add_service(&self, ty: TypeRef, value: Instance) {
        self.upsert(ty, ServiceValue::Ready(value));
    }

    /// Registers a value computed on first read.
    pub fn add_service_callback(&self, ty: TypeRef, callback: ServiceCallback) {
        self.upsert(ty, ServiceValue::Deferred(callback));
    }

    fn upsert(&self, ty: TypeRef, value: ServiceValue) {
        let existing = match self.items.entry(ty) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                vacant.insert(ServiceItem::new(ty, Some(value)));
                debug!(service = %ty, "Service added");
                return;
            }
        };
        existing.set_auto_update(false);
        match value {
            ServiceValue::Ready(instance) => existing.set_value(Some(instance)),
            ServiceValue::Deferred(callback) => existing.set_callback(callback),
        }
        debug!(service = %ty, "Service replaced");
    }

    /// Clears a user-registered value so the item is derived again.
    ///
    /// Types without an entry are ignored. An entry that only shares the item
    /// of a related type is dropped without touching that item. Registry-seeded
    /// items cannot be removed.
    pub fn remove_service(&self, ty: TypeRef) -> RegistryResult<()> {
        let Some(item) = self.items.get(&ty).map(|entry| entry.value().clone()) else {
            return Ok(());
        };
        if item.service_type() != ty {
            self.items.remove_if(&ty, |_, shared| shared.ptr_eq(&item));
            debug!(service = %ty, shared_with = %item.service_type(), "Shared service entry dropped");
            return Ok(());
        }
        if item.is_system() {
            return Err(RegistryError::not_supported(format!(
                "cannot remove system service {ty}"
            )));
        }
        item.set_auto_update(true);
        item.set_value(None);
        debug!(service = %ty, "Service removed");
        Ok(())
    }

    fn regenerate(&self, ty: TypeRef, item: &ServiceItem) -> RegistryResult<()> {
        let _guard = item.regen_lock();
        if item.has_value() || !item.auto_update() {
            return Ok(());
        }
        item.set_auto_update(false);
        let result = self
            .create_item(ty, Some(item))
            .and_then(|next| item.assign_from(&next));
        item.set_auto_update(true);
        if result.is_ok() {
            debug!(service = %ty, has_value = item.has_value(), "Service item regenerated");
        }
        result
    }

    /// Builds an item for `ty` from the best candidate other than `exclude`.
    fn create_item(&self, ty: TypeRef, exclude: Option<&ServiceItem>) -> RegistryResult<ServiceItem> {
        let candidate = self
            .candidates(ty)
            .into_iter()
            .find(|candidate| exclude.is_none_or(|excluded| !excluded.ptr_eq(candidate)));
        let Some(candidate) = candidate else {
            return Ok(ServiceItem::new(ty, None));
        };
        if candidate.service_type() == ty {
            return Ok(candidate);
        }
        Ok(candidate.derive(ty)?.unwrap_or(candidate))
    }

    /// Registered items related to `ty`, best first.
    ///
    /// The exact type (or its generic definition), then base classes from the
    /// most derived and implemented interfaces, then the universal type.
    fn candidates(&self, ty: TypeRef) -> Vec<ServiceItem> {
        let mut out: Vec<ServiceItem> = Vec::new();
        let mut push = |item: Option<ServiceItem>| {
            if let Some(item) = item {
                if !out.iter().any(|seen| seen.ptr_eq(&item)) {
                    out.push(item);
                }
            }
        };

        push(self.lookup(ty));

        let mut related: Vec<TypeRef> = ty.base_types().collect();
        for iface in ty.all_interfaces() {
            if !related.contains(&iface) {
                related.push(iface);
            }
        }
        if let Some(comparer) = &self.comparer {
            related.sort_by(|a, b| comparer(*b, *a));
        }
        for related_ty in related {
            push(self.lookup(related_ty));
        }

        if !ty.is_any() {
            push(self.items.get(&&ANY).map(|entry| entry.value().clone()));
        }
        out
    }

    /// The item registered for `ty` itself or, failing that, for its generic
    /// definition.
    fn lookup(&self, ty: TypeRef) -> Option<ServiceItem> {
        self.items
            .get(&ty)
            .or_else(|| ty.generic_definition().and_then(|def| self.items.get(&def)))
            .map(|entry| entry.value().clone())
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.items.len())
            .field("comparer", &self.comparer.is_some())
            .finish()
    }
}

/// Builder for a registry-seeded [`ServiceContainer`].
pub struct ServiceContainerBuilder<'a> {
    registry: &'a Registry,
    name: Option<String>,
    ty: Option<TypeRef>,
    comparer: Option<TypeComparer>,
    resolver: Option<ServiceTypeResolver>,
}

impl ServiceContainerBuilder<'_> {
    /// Seeds from plugins registered under `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Seeds from plugins whose type identity is `ty`.
    pub fn contract_type(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn comparer<F>(mut self, comparer: F) -> Self
    where
        F: Fn(TypeRef, TypeRef) -> Ordering + Send + Sync + 'static,
    {
        self.comparer = Some(Arc::new(comparer));
        self
    }

    /// Overrides how the capability type of a seeded value is chosen.
    pub fn service_type_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Plugin, &Instance) -> Option<TypeRef> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> RegistryResult<ServiceContainer> {
        let plugins = self.registry.query(self.name.as_deref(), self.ty, true)?;
        let container = ServiceContainer {
            items: DashMap::new(),
            comparer: self.comparer,
        };

        for plugin in plugins {
            let Some(value) = plugin.get_value(self.ty)? else {
                continue;
            };
            let service_type = match &self.resolver {
                Some(resolver) => resolver(&plugin, &value),
                None => default_service_type(&plugin, &value),
            };
            let Some(service_type) = service_type else {
                debug!(plugin = %plugin.name(), "No service type resolved, plugin skipped");
                continue;
            };
            if let Entry::Vacant(vacant) = container.items.entry(service_type) {
                let value = value.view_as(service_type).unwrap_or(value);
                vacant.insert(ServiceItem::system(service_type, value));
            }
        }

        info!(services = container.items.len(), "Service container seeded");
        Ok(container)
    }
}

/// Resolves the `ServiceType` metadata entry against the value's type
/// hierarchy, falling back to the plugin's declared type.
fn default_service_type(plugin: &Plugin, value: &Instance) -> Option<TypeRef> {
    let Some(wanted) = plugin.metadata_value::<Option<String>>(SERVICE_TYPE_KEY, None) else {
        return Some(plugin.declared_type());
    };
    let ty = value.type_info();
    std::iter::once(ty)
        .chain(ty.base_types())
        .chain(ty.all_interfaces())
        .chain(std::iter::once(&ANY))
        .find(|candidate| candidate.name() == wanted)
}
