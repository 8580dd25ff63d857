//! The plugin record.
//!
//! A [`Plugin`] is a shared handle to a mutable slot. The registry may swap the
//! contents of two slots so that the handle registered first under a name
//! always carries the highest-priority capability; anyone holding that handle
//! observes the swap.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::descriptor::{CapabilityDescriptor, priority_of};
use crate::error::{RegistryError, RegistryResult};
use crate::types::{Instance, Signature, TypeRef};

/// Contents of a plugin slot.
#[derive(Debug, Clone)]
struct PluginData {
    name: String,
    contract_type: Option<TypeRef>,
    priority: i32,
    metadata: Arc<Map<String, Value>>,
    is_callable: bool,
    value: Instance,
    ordinal: u64,
}

impl PluginData {
    /// Type the plugin was declared as, falling back to its value's type.
    fn declared_type(&self) -> TypeRef {
        self.contract_type.unwrap_or_else(|| self.value.type_info())
    }

    fn is_acceptable(&self, requested: Option<TypeRef>) -> bool {
        let Some(requested) = requested else {
            return true;
        };
        if requested.is_any() {
            return true;
        }
        if self.is_callable && requested.is_function() {
            return self.value.type_info().signature() == requested.signature();
        }
        self.value.is_instance_of(requested) || self.declared_type().is_subtype_of(requested)
    }
}

/// A registered capability.
#[derive(Clone)]
pub struct Plugin {
    inner: Arc<RwLock<PluginData>>,
}

impl Plugin {
    /// Materializes a descriptor, running its factory if it has one.
    pub fn from_descriptor(descriptor: CapabilityDescriptor) -> RegistryResult<Self> {
        let (name, contract_type, metadata, payload) = descriptor.into_parts();
        let (value, is_callable) = payload
            .materialize()
            .map_err(|e| RegistryError::invocation(format!("constructing capability '{name}'"), e))?;
        Ok(Self {
            inner: Arc::new(RwLock::new(PluginData {
                priority: priority_of(&metadata),
                name,
                contract_type,
                metadata: Arc::new(metadata),
                is_callable,
                value,
                ordinal: 0,
            })),
        })
    }

    fn data(&self) -> RwLockReadGuard<'_, PluginData> {
        self.inner.read()
    }

    pub fn name(&self) -> String {
        self.data().name.clone()
    }

    /// Renames the plugin. Only meaningful before registration.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.write().name = name.into();
    }

    /// Identity string of the declared capability type.
    pub fn type_identity(&self) -> Option<&'static str> {
        Some(self.data().declared_type().name())
    }

    pub fn declared_type(&self) -> TypeRef {
        self.data().declared_type()
    }

    pub fn priority(&self) -> i32 {
        self.data().priority
    }

    pub fn metadata(&self) -> Arc<Map<String, Value>> {
        Arc::clone(&self.data().metadata)
    }

    /// Reads a metadata entry, falling back to `default` when it is missing or
    /// does not deserialize as `T`.
    pub fn metadata_value<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.data()
            .metadata
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    pub fn is_callable(&self) -> bool {
        self.data().is_callable
    }

    /// The stored value, without any view conversion.
    pub fn raw_value(&self) -> Instance {
        self.data().value.clone()
    }

    pub(crate) fn ordinal(&self) -> u64 {
        self.data().ordinal
    }

    pub(crate) fn stamp(&self, ordinal: u64) {
        self.inner.write().ordinal = ordinal;
    }

    /// Priority and ordinal read under one lock.
    pub(crate) fn sort_key(&self) -> (i32, u64) {
        let data = self.data();
        (data.priority, data.ordinal)
    }

    /// Whether this plugin can satisfy a request for `requested`.
    pub fn is_acceptable(&self, requested: Option<TypeRef>) -> bool {
        self.data().is_acceptable(requested)
    }

    /// Returns the value viewed as `requested`, or `None` when not acceptable.
    ///
    /// Callables requested as a function type are adapted to that type; an
    /// open generic signature is rejected with [`RegistryError::InvalidDelegate`].
    pub fn get_value(&self, requested: Option<TypeRef>) -> RegistryResult<Option<Instance>> {
        let data = self.data();
        let Some(requested) = requested else {
            return Ok(Some(data.value.clone()));
        };
        if data.is_callable && requested.is_function() {
            return Self::adapt(&data, requested);
        }
        if !data.is_acceptable(Some(requested)) {
            return Ok(None);
        }
        let view = data.value.view_as(requested);
        if view.is_none() {
            debug!(
                plugin = %data.name,
                requested = %requested,
                "Value is declared compatible but has no view for the requested type"
            );
        }
        Ok(view)
    }

    /// Binds this callable to the function type `fn_type`.
    pub fn create_delegate(&self, fn_type: TypeRef) -> RegistryResult<Option<Instance>> {
        let data = self.data();
        if !data.is_callable {
            return Ok(None);
        }
        Self::adapt(&data, fn_type)
    }

    /// Whether this callable's signature equals `signature`.
    pub fn compare_method_sign(&self, signature: &Signature) -> bool {
        let data = self.data();
        data.is_callable && data.value.type_info().signature() == Some(signature)
    }

    fn adapt(data: &PluginData, fn_type: TypeRef) -> RegistryResult<Option<Instance>> {
        let Some(requested) = fn_type.signature() else {
            return Err(RegistryError::InvalidDelegate {
                plugin: data.name.clone(),
                requested: fn_type.name(),
                reason: "not a function type",
            });
        };
        if requested.is_open() {
            return Err(RegistryError::InvalidDelegate {
                plugin: data.name.clone(),
                requested: fn_type.name(),
                reason: "signature contains an open generic type",
            });
        }
        if data.value.type_info().signature() != Some(requested) {
            return Ok(None);
        }
        Ok(Some(data.value.retag(fn_type)))
    }

    /// Exchanges the full contents of two slots.
    pub(crate) fn swap_contents(&self, other: &Plugin) {
        if self.ptr_eq(other) {
            return;
        }
        let (first, second) = if Arc::as_ptr(&self.inner) < Arc::as_ptr(&other.inner) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = first.inner.write();
        let mut b = second.inner.write();
        std::mem::swap(&mut *a, &mut *b);
    }

    pub fn ptr_eq(&self, other: &Plugin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data();
        f.debug_struct("Plugin")
            .field("name", &data.name)
            .field("type", &data.declared_type().name())
            .field("priority", &data.priority)
            .field("callable", &data.is_callable)
            .finish()
    }
}
