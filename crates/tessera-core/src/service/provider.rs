use std::sync::Arc;

use crate::error::BoxError;
use crate::types::{Instance, TypeInfo, TypeRef, Typed};

/// A value that can produce services of other types.
///
/// A service item whose value views as [`SERVICE_PROVIDER`] can derive child
/// items for types it is asked about.
pub trait ServiceProvider: Send + Sync {
    /// Produces a service of type `ty`, or `None` if this provider has none.
    fn provide(&self, ty: TypeRef) -> Result<Option<Instance>, BoxError>;
}

pub static SERVICE_PROVIDER: TypeInfo = TypeInfo::interface("tessera::ServiceProvider");

/// Lazily computes a service value the first time it is read.
pub type ServiceCallback = Arc<dyn Fn(TypeRef) -> Result<Option<Instance>, BoxError> + Send + Sync>;

/// Wraps a provider as an instance of [`SERVICE_PROVIDER`].
pub fn provider_instance<P: ServiceProvider + 'static>(provider: P) -> Instance {
    let view: Arc<dyn ServiceProvider> = Arc::new(provider);
    Instance::from_view(&SERVICE_PROVIDER, view)
}

/// Adapts a closure into a [`ServiceProvider`].
pub struct FnProvider<F>(F);

impl<F> FnProvider<F>
where
    F: Fn(TypeRef) -> Result<Option<Instance>, BoxError> + Send + Sync,
{
    pub fn new(provide: F) -> Self {
        Self(provide)
    }
}

impl<F> ServiceProvider for FnProvider<F>
where
    F: Fn(TypeRef) -> Result<Option<Instance>, BoxError> + Send + Sync,
{
    fn provide(&self, ty: TypeRef) -> Result<Option<Instance>, BoxError> {
        (self.0)(ty)
    }
}

/// Provider answering requests for `T` with a fresh value from `make`.
pub fn provide_typed<T, F>(make: F) -> impl ServiceProvider
where
    T: Typed,
    F: Fn() -> Result<T, BoxError> + Send + Sync,
{
    FnProvider::new(move |ty: TypeRef| {
        if ty != T::type_info() {
            return Ok(None);
        }
        make().map(|value| Some(Instance::new(value)))
    })
}
