//! Declarative imports.
//!
//! A consumer describes what it needs as [`ImportSpec`]s, or implements
//! [`Import`] and pulls values from an [`Imports`] resolver when the registry
//! composes it.

use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registry, describe};
use crate::types::{Instance, TypeRef, Typed};

/// How many values an import expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// The best value, if any.
    #[default]
    ZeroOrOne,
    /// Exactly one value; none or several is an error.
    ExactlyOne,
    /// Every compatible value, highest priority first.
    Many,
}

/// A single import requirement.
#[derive(Debug, Clone, Default)]
pub struct ImportSpec {
    pub name: Option<String>,
    pub ty: Option<TypeRef>,
    pub cardinality: Cardinality,
}

impl ImportSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn typed(ty: TypeRef) -> Self {
        Self {
            ty: Some(ty),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn exactly_one(mut self) -> Self {
        self.cardinality = Cardinality::ExactlyOne;
        self
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }
}

/// Values resolved for an [`ImportSpec`].
#[derive(Debug, Clone)]
pub enum Resolved {
    One(Option<Instance>),
    Many(Vec<Instance>),
}

impl Resolved {
    pub fn into_vec(self) -> Vec<Instance> {
        match self {
            Self::One(value) => value.into_iter().collect(),
            Self::Many(values) => values,
        }
    }
}

impl Registry {
    /// Resolves one import requirement.
    pub fn resolve(&self, spec: &ImportSpec) -> RegistryResult<Resolved> {
        let name = spec.name.as_deref();
        match spec.cardinality {
            Cardinality::ZeroOrOne => self.get_one(name, spec.ty).map(Resolved::One),
            Cardinality::ExactlyOne => self
                .get_exactly_one(name, spec.ty)
                .map(|value| Resolved::One(Some(value))),
            Cardinality::Many => self.get_many(name, spec.ty).map(Resolved::Many),
        }
    }

    /// Fills a consumer's imports.
    pub fn compose<T: Import + ?Sized>(&self, target: &mut T) -> RegistryResult<()> {
        target.import(&Imports { registry: self })
    }
}

/// A consumer whose fields are filled from the registry.
pub trait Import {
    fn import(&mut self, imports: &Imports<'_>) -> RegistryResult<()>;
}

/// Resolver handed to [`Import::import`].
pub struct Imports<'a> {
    registry: &'a Registry,
}

impl Imports<'_> {
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn resolve(&self, spec: &ImportSpec) -> RegistryResult<Resolved> {
        self.registry.resolve(spec)
    }

    /// The best value under `name` compatible with `ty`.
    pub fn one(&self, name: &str, ty: Option<TypeRef>) -> RegistryResult<Option<Instance>> {
        self.registry.get_one(Some(name), ty)
    }

    /// The single value under `name` compatible with `ty`.
    pub fn exactly_one(&self, name: &str, ty: Option<TypeRef>) -> RegistryResult<Instance> {
        self.registry.get_exactly_one(Some(name), ty)
    }

    /// Every value under `name` compatible with `ty`, highest priority first.
    pub fn many(&self, name: &str, ty: Option<TypeRef>) -> RegistryResult<Vec<Instance>> {
        self.registry.get_many(Some(name), ty)
    }

    /// The best value of type `T` under `name`.
    pub fn one_as<T: Typed + Clone>(&self, name: &str) -> RegistryResult<Option<T>> {
        self.registry.get_one_as::<T>(Some(name))
    }

    /// The single value of type `T` under `name`.
    pub fn exactly_one_as<T: Typed + Clone>(&self, name: &str) -> RegistryResult<T> {
        let value = self.exactly_one(name, Some(T::type_info()))?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(describe(Some(name), Some(T::type_info()))))
    }

    /// Every value of type `T` under `name`, collected into `C`.
    pub fn many_as<T, C>(&self, name: &str) -> RegistryResult<C>
    where
        T: Typed + Clone,
        C: FromIterator<T>,
    {
        self.registry.get_many_as::<T, C>(Some(name))
    }

    /// The best value under `name` viewed through the interface `ty`.
    pub fn one_dyn<T: ?Sized + 'static>(&self, name: &str, ty: TypeRef) -> RegistryResult<Option<Arc<T>>>
    where
        Arc<T>: std::any::Any,
    {
        self.registry.get_one_dyn::<T>(Some(name), ty)
    }

    /// Every value under `name` viewed through the interface `ty`.
    pub fn many_dyn<T: ?Sized + 'static>(&self, name: &str, ty: TypeRef) -> RegistryResult<Vec<Arc<T>>>
    where
        Arc<T>: std::any::Any,
    {
        self.registry.get_many_dyn::<T>(Some(name), ty)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use super::*;
    use crate::descriptor::CapabilityDescriptor;
    use crate::types::tests::{CLONER, Cloner, Widget};

    fn registry() -> Registry {
        let registry = Registry::new();
        for (value, priority) in [("98", 98), ("100", 100), ("99", 99)] {
            registry
                .add_descriptor(
                    CapabilityDescriptor::value("UnitTest2", Instance::new(value.to_owned()))
                        .with_priority(priority),
                )
                .unwrap();
        }
        registry
            .add_descriptor(
                CapabilityDescriptor::value("UnitTest5", Instance::new(Widget("UnitTest5")))
                    .with_contract_type(&CLONER),
            )
            .unwrap();
        registry
    }

    #[derive(Default)]
    struct Consumer {
        list: Vec<String>,
        set: HashSet<String>,
        sorted: BTreeSet<String>,
        best: Option<String>,
        cloner: Option<Arc<dyn Cloner>>,
    }

    impl Import for Consumer {
        fn import(&mut self, imports: &Imports<'_>) -> RegistryResult<()> {
            self.list = imports.many_as::<String, _>("UnitTest2")?;
            self.set = imports.many_as::<String, _>("UnitTest2")?;
            self.sorted = imports.many_as::<String, _>("UnitTest2")?;
            self.best = imports.one_as("UnitTest2")?;
            self.cloner = imports.one_dyn::<dyn Cloner>("UnitTest5", &CLONER)?;
            Ok(())
        }
    }

    #[test]
    fn compose_fills_every_collection_shape() {
        let mut consumer = Consumer::default();
        registry().compose(&mut consumer).unwrap();

        assert_eq!(consumer.list, ["100", "99", "98"]);
        assert_eq!(consumer.set.len(), 3);
        assert_eq!(consumer.sorted.len(), 3);
        assert_eq!(consumer.best.as_deref(), Some("100"));
        assert_eq!(consumer.cloner.map(|c| c.clone_name()).as_deref(), Some("UnitTest5"));
    }

    #[test]
    fn strict_import_of_single_value() {
        struct Strict(Option<Instance>, i32);

        impl Import for Strict {
            fn import(&mut self, imports: &Imports<'_>) -> RegistryResult<()> {
                self.0 = Some(imports.exactly_one("UnitTest5", None)?);
                self.1 = imports.many("UnitTest2", None)?.len() as i32;
                Ok(())
            }
        }

        let mut strict = Strict(None, 0);
        registry().compose(&mut strict).unwrap();
        assert!(strict.0.is_some());
        assert_eq!(strict.1, 3);

        let err = Registry::new().compose(&mut strict).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn cardinality_controls_resolution() {
        let registry = registry();

        let many = registry.resolve(&ImportSpec::named("UnitTest2").many()).unwrap();
        assert_eq!(many.into_vec().len(), 3);

        let one = registry.resolve(&ImportSpec::named("UnitTest5")).unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let strict = registry.resolve(&ImportSpec::named("UnitTest2").exactly_one());
        assert!(matches!(strict, Err(RegistryError::Ambiguous { count: 3, .. })));

        let missing = registry.resolve(&ImportSpec::named("absent").exactly_one());
        assert!(matches!(missing, Err(RegistryError::NotFound(_))));
    }
}
