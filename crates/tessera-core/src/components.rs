//! Keyed views over the registry.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::error::{BoxError, RegistryError, RegistryResult};
use crate::plugin::Plugin;
use crate::registry::Registry;
use crate::types::{Instance, TypeRef, Typed};

/// Picks the plugins a [`KeyedComponents`] indexes and extracts their value.
pub type SelectFn<V> = Box<dyn Fn(&Plugin) -> Result<Option<V>, BoxError> + Send + Sync>;

/// Computes the key of a selected value.
pub type KeyFn<K, V> = Box<dyn Fn(&V) -> Result<K, BoxError> + Send + Sync>;

/// A map of selected registry values, indexed by a key derived from each value.
///
/// The map is filled by [`reload`](Self::reload). When two values share a key
/// the one registered later wins.
pub struct KeyedComponents<K, V> {
    registry: Arc<Registry>,
    select: SelectFn<V>,
    key: KeyFn<K, V>,
    items: DashMap<K, V>,
}

impl<K, V> KeyedComponents<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Builds and loads a keyed view.
    pub fn new<S, F>(registry: Arc<Registry>, select: S, key: F) -> RegistryResult<Self>
    where
        S: Fn(&Plugin) -> Result<Option<V>, BoxError> + Send + Sync + 'static,
        F: Fn(&V) -> Result<K, BoxError> + Send + Sync + 'static,
    {
        let components = Self {
            registry,
            select: Box::new(select),
            key: Box::new(key),
            items: DashMap::new(),
        };
        components.reload()?;
        Ok(components)
    }

    /// Rebuilds the map from the registry.
    ///
    /// A failing selector or key function aborts the reload with
    /// [`RegistryError::Invocation`].
    pub fn reload(&self) -> RegistryResult<()> {
        self.items.clear();
        for plugin in self.registry.plugins() {
            let selected = (self.select)(&plugin).map_err(|e| {
                error!(plugin = %plugin.name(), error = %e, "Component selector failed");
                RegistryError::invocation(format!("selecting component '{}'", plugin.name()), e)
            })?;
            let Some(value) = selected else {
                continue;
            };
            let key = (self.key)(&value).map_err(|e| {
                error!(plugin = %plugin.name(), error = %e, "Component key function failed");
                RegistryError::invocation(format!("computing key of component '{}'", plugin.name()), e)
            })?;
            self.items.insert(key, value);
        }
        debug!(components = self.items.len(), "Keyed components reloaded");
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.items.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, V> KeyedComponents<K, V>
where
    K: Eq + Hash,
    V: Typed + Clone,
{
    /// Indexes every plugin whose type identity is `V`'s, downcasting its value.
    pub fn typed<F>(registry: Arc<Registry>, key: F) -> RegistryResult<Self>
    where
        F: Fn(&V) -> Result<K, BoxError> + Send + Sync + 'static,
    {
        let ty = V::type_info();
        Self::new(
            registry,
            move |plugin: &Plugin| {
                if plugin.type_identity() != Some(ty.name()) {
                    return Ok(None);
                }
                Ok(plugin
                    .get_value(Some(ty))?
                    .and_then(|value| value.downcast_ref::<V>().cloned()))
            },
            key,
        )
    }
}

impl<K> KeyedComponents<K, Instance>
where
    K: Eq + Hash,
{
    /// Indexes every plugin whose type identity equals `ty`.
    pub fn of_type<F>(registry: Arc<Registry>, ty: TypeRef, key: F) -> RegistryResult<Self>
    where
        F: Fn(&Instance) -> Result<K, BoxError> + Send + Sync + 'static,
    {
        Self::new(
            registry,
            move |plugin: &Plugin| {
                if plugin.type_identity() != Some(ty.name()) {
                    return Ok(None);
                }
                plugin.get_value(Some(ty)).map_err(BoxError::from)
            },
            key,
        )
    }
}
