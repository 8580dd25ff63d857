//! Capability descriptors: what a catalog advertises before materialization.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::BoxError;
use crate::types::{Callable, Instance, TypeRef};

/// Metadata key holding the plugin priority.
pub const PRIORITY_KEY: &str = "Priority";

/// Metadata key naming the capability type a service should be registered as.
pub const SERVICE_TYPE_KEY: &str = "ServiceType";

/// Produces a capability value on demand.
pub type FactoryFn = Arc<dyn Fn() -> Result<Instance, BoxError> + Send + Sync>;

/// How the value of a capability is obtained.
#[derive(Clone)]
pub enum Payload {
    /// An already constructed value.
    Value(Instance),
    /// A function handle; the plugin is callable.
    Callable(Callable),
    /// A constructor run once when the registry is built.
    Factory(FactoryFn),
}

impl Payload {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Runs the factory if there is one.
    pub(crate) fn materialize(self) -> Result<(Instance, bool), BoxError> {
        match self {
            Self::Value(instance) => Ok((instance, false)),
            Self::Callable(callable) => Ok((callable.into_instance(), true)),
            Self::Factory(factory) => factory().map(|instance| (instance, false)),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(instance) => f.debug_tuple("Value").field(instance).finish(),
            Self::Callable(callable) => f.debug_tuple("Callable").field(callable).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A capability advertised by a catalog.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    name: String,
    contract_type: Option<TypeRef>,
    metadata: Map<String, Value>,
    payload: Payload,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            contract_type: None,
            metadata: Map::new(),
            payload,
        }
    }

    /// A descriptor for an already constructed value.
    pub fn value(name: impl Into<String>, value: Instance) -> Self {
        Self::new(name, Payload::Value(value))
    }

    /// Declares the capability type, which also becomes the type identity.
    pub fn with_contract_type(mut self, ty: TypeRef) -> Self {
        self.contract_type = Some(ty);
        self
    }

    pub fn with_priority(self, priority: i32) -> Self {
        self.with_metadata(PRIORITY_KEY, priority)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract_type(&self) -> Option<TypeRef> {
        self.contract_type
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn priority(&self) -> i32 {
        priority_of(&self.metadata)
    }

    pub(crate) fn into_parts(self) -> (String, Option<TypeRef>, Map<String, Value>, Payload) {
        (self.name, self.contract_type, self.metadata, self.payload)
    }
}

/// Reads the priority entry of a metadata map, defaulting to 0.
///
/// Integral floats such as `2.0` count as integers; other values are ignored.
pub(crate) fn priority_of(metadata: &Map<String, Value>) -> i32 {
    metadata
        .get(PRIORITY_KEY)
        .and_then(|value| {
            value.as_i64().or_else(|| {
                value
                    .as_f64()
                    .filter(|p| p.fract() == 0.0)
                    .map(|p| p as i64)
            })
        })
        .map(|p| p.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_defaults_to_zero() {
        let descriptor = CapabilityDescriptor::value("a", Instance::new(1i32));
        assert_eq!(descriptor.priority(), 0);
        assert_eq!(descriptor.with_priority(-3).priority(), -3);
    }

    #[test]
    fn non_numeric_priority_is_ignored() {
        let descriptor = CapabilityDescriptor::value("a", Instance::new(1i32))
            .with_metadata(PRIORITY_KEY, "high");
        assert_eq!(descriptor.priority(), 0);
    }

    #[test]
    fn integral_float_priority_is_read() {
        let descriptor = CapabilityDescriptor::value("a", Instance::new(1i32));
        assert_eq!(descriptor.clone().with_metadata(PRIORITY_KEY, 2.0).priority(), 2);
        assert_eq!(descriptor.clone().with_metadata(PRIORITY_KEY, -4.0).priority(), -4);
        assert_eq!(descriptor.clone().with_metadata(PRIORITY_KEY, 2.5).priority(), 0);
        assert_eq!(descriptor.with_metadata(PRIORITY_KEY, 1e12).priority(), i32::MAX);
    }

    #[test]
    fn failing_factory_reports_error() {
        let payload = Payload::factory(|| Err("constructor needs an argument".into()));
        assert!(payload.materialize().is_err());
    }
}
