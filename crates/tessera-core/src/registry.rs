//! The plugin registry.
//!
//! Plugins are grouped by contract name. The first plugin registered under a
//! name is the group's *representative*; when a strictly higher-priority
//! plugin arrives later the two swap contents, so the representative handle
//! always carries the best capability of its group.
//!
//! Queries return plugins ordered by priority, highest first; plugins with
//! equal priority keep their registration order.

use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::descriptor::CapabilityDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::plugin::Plugin;
use crate::types::{Instance, TypeRef, Typed};

struct NameGroup {
    representative: Plugin,
    others: Vec<Plugin>,
}

impl NameGroup {
    fn contains(&self, plugin: &Plugin) -> bool {
        self.representative.ptr_eq(plugin) || self.others.iter().any(|p| p.ptr_eq(plugin))
    }

    fn members(&self) -> impl Iterator<Item = &Plugin> {
        std::iter::once(&self.representative).chain(self.others.iter())
    }
}

/// Summary of one registry build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Catalogs that enumerated successfully.
    pub catalogs: usize,
    /// Catalogs that failed and were skipped.
    pub failed_catalogs: usize,
    /// Plugins registered.
    pub plugins: usize,
    /// Descriptors whose materialization failed.
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Registry of plugins, indexed by contract name.
pub struct Registry {
    groups: DashMap<String, NameGroup>,
    all: RwLock<Vec<Plugin>>,
    next_ordinal: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            all: RwLock::new(Vec::new()),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Builds a registry from catalogs, skipping whatever fails to load.
    pub fn from_catalogs(catalogs: &[Arc<dyn Catalog>]) -> (Self, LoadReport) {
        let registry = Self::new();
        let report = registry.load(catalogs);
        (registry, report)
    }

    /// Loads every descriptor of every catalog.
    ///
    /// A failing catalog or a failing factory is logged and skipped; the rest
    /// of the load proceeds.
    pub fn load(&self, catalogs: &[Arc<dyn Catalog>]) -> LoadReport {
        let start = Instant::now();
        let mut report = LoadReport::default();

        for catalog in catalogs {
            let descriptors = match catalog.descriptors() {
                Ok(descriptors) => descriptors,
                Err(source) => {
                    let err = RegistryError::Discovery {
                        catalog: catalog.name().to_owned(),
                        source,
                    };
                    error!(catalog = %catalog.name(), error = %err, "Catalog failed to load, skipped");
                    report.failed_catalogs += 1;
                    continue;
                }
            };
            report.catalogs += 1;

            for descriptor in descriptors {
                let name = descriptor.name().to_owned();
                match self.add_descriptor(descriptor) {
                    Ok(_) => report.plugins += 1,
                    Err(e) => {
                        warn!(
                            catalog = %catalog.name(),
                            plugin = %name,
                            error = %e,
                            "Capability failed to materialize, skipped"
                        );
                        report.skipped += 1;
                    }
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            catalogs = report.catalogs,
            plugins = report.plugins,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Plugin registry built"
        );
        report
    }

    /// Materializes and registers a descriptor.
    pub fn add_descriptor(&self, descriptor: CapabilityDescriptor) -> RegistryResult<Plugin> {
        let plugin = Plugin::from_descriptor(descriptor)?;
        self.add(&plugin);
        Ok(plugin)
    }

    /// Registers a plugin under its own name.
    ///
    /// Returns `false` when this exact plugin is already registered.
    pub fn add(&self, plugin: &Plugin) -> bool {
        let name = plugin.name();
        match self.groups.entry(name.clone()) {
            Entry::Vacant(vacant) => {
                plugin.stamp(self.next_ordinal.fetch_add(1, Ordering::Relaxed));
                vacant.insert(NameGroup {
                    representative: plugin.clone(),
                    others: Vec::new(),
                });
            }
            Entry::Occupied(mut occupied) => {
                let group = occupied.get_mut();
                if group.contains(plugin) {
                    return false;
                }
                plugin.stamp(self.next_ordinal.fetch_add(1, Ordering::Relaxed));
                if group.representative.priority() < plugin.priority() {
                    debug!(
                        plugin = %name,
                        priority = plugin.priority(),
                        "Higher-priority capability takes over the representative"
                    );
                    group.representative.swap_contents(plugin);
                }
                group.others.push(plugin.clone());
            }
        }
        self.all.write().push(plugin.clone());
        true
    }

    /// Registers a plugin under `name`, renaming it first.
    pub fn add_named(&self, plugin: &Plugin, name: impl Into<String>) -> bool {
        plugin.set_name(name);
        self.add(plugin)
    }

    /// The representative plugin of a name group.
    pub fn get(&self, name: &str) -> Option<Plugin> {
        self.groups.get(name).map(|group| group.representative.clone())
    }

    /// All plugins in registration order.
    pub fn plugins(&self) -> Vec<Plugin> {
        self.all.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|group| group.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.all.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Plugins matching a name and/or a type, highest priority first.
    ///
    /// With `exact_type`, a plugin matches when its type identity equals the
    /// requested type's identity; otherwise [`Plugin::is_acceptable`] decides.
    pub fn query(
        &self,
        name: Option<&str>,
        ty: Option<TypeRef>,
        exact_type: bool,
    ) -> RegistryResult<Vec<Plugin>> {
        if name.is_none() && ty.is_none() {
            return Err(RegistryError::InvalidQuery(
                "a contract name or a contract type is required",
            ));
        }

        let candidates: Vec<Plugin> = match name {
            Some(name) => self
                .groups
                .get(name)
                .map(|group| group.members().cloned().collect())
                .unwrap_or_default(),
            None => self.plugins(),
        };

        let mut matched: Vec<((Reverse<i32>, u64), Plugin)> = candidates
            .into_iter()
            .filter(|plugin| match ty {
                None => true,
                Some(ty) if exact_type => plugin.type_identity() == Some(ty.name()),
                Some(ty) => plugin.is_acceptable(Some(ty)),
            })
            .map(|plugin| {
                let (priority, ordinal) = plugin.sort_key();
                ((Reverse(priority), ordinal), plugin)
            })
            .collect();
        matched.sort_by_key(|(key, _)| *key);
        Ok(matched.into_iter().map(|(_, plugin)| plugin).collect())
    }

    /// Every compatible value, highest priority first.
    pub fn get_many(&self, name: Option<&str>, ty: Option<TypeRef>) -> RegistryResult<Vec<Instance>> {
        let mut values = Vec::new();
        for plugin in self.query(name, ty, false)? {
            if let Some(value) = plugin.get_value(ty)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// The highest-priority compatible value.
    pub fn get_one(&self, name: Option<&str>, ty: Option<TypeRef>) -> RegistryResult<Option<Instance>> {
        for plugin in self.query(name, ty, false)? {
            if let Some(value) = plugin.get_value(ty)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// The only compatible value; fails when there are none or several.
    pub fn get_exactly_one(&self, name: Option<&str>, ty: Option<TypeRef>) -> RegistryResult<Instance> {
        let mut values = self.get_many(name, ty)?;
        let target = describe(name, ty);
        match values.len() {
            0 => Err(RegistryError::NotFound(target)),
            1 => Ok(values.remove(0)),
            count => Err(RegistryError::Ambiguous { target, count }),
        }
    }

    /// Typed form of [`get_one`](Self::get_one) for a concrete value type.
    pub fn get_one_as<T: Typed + Clone>(&self, name: Option<&str>) -> RegistryResult<Option<T>> {
        Ok(self
            .get_one(name, Some(T::type_info()))?
            .and_then(|value| value.downcast_ref::<T>().cloned()))
    }

    /// Typed form of [`get_many`](Self::get_many), collected into any
    /// collection. Set-like collections drop values that compare equal.
    pub fn get_many_as<T, C>(&self, name: Option<&str>) -> RegistryResult<C>
    where
        T: Typed + Clone,
        C: FromIterator<T>,
    {
        Ok(self
            .get_many(name, Some(T::type_info()))?
            .into_iter()
            .filter_map(|value| value.downcast_ref::<T>().cloned())
            .collect())
    }

    /// Interface form of [`get_one`](Self::get_one).
    pub fn get_one_dyn<T: ?Sized + 'static>(
        &self,
        name: Option<&str>,
        ty: TypeRef,
    ) -> RegistryResult<Option<Arc<T>>>
    where
        Arc<T>: std::any::Any,
    {
        Ok(self.get_one(name, Some(ty))?.and_then(|value| value.as_dyn::<T>()))
    }

    /// Interface form of [`get_many`](Self::get_many).
    pub fn get_many_dyn<T: ?Sized + 'static>(
        &self,
        name: Option<&str>,
        ty: TypeRef,
    ) -> RegistryResult<Vec<Arc<T>>>
    where
        Arc<T>: std::any::Any,
    {
        Ok(self
            .get_many(name, Some(ty))?
            .into_iter()
            .filter_map(|value| value.as_dyn::<T>())
            .collect())
    }
}

pub(crate) fn describe(name: Option<&str>, ty: Option<TypeRef>) -> String {
    match (name, ty) {
        (Some(name), Some(ty)) => format!("'{name}' as {ty}"),
        (Some(name), None) => format!("'{name}'"),
        (None, Some(ty)) => ty.to_string(),
        (None, None) => "nothing".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::descriptor::Payload;
    use crate::types::tests::{BASE_WIDGET, CLONER, Cloner, Widget};
    use crate::types::{ANY, STRING};

    fn text(name: &str, value: &str, priority: i32) -> CapabilityDescriptor {
        CapabilityDescriptor::value(name, Instance::new(value.to_owned())).with_priority(priority)
    }

    fn registry_of(descriptors: Vec<CapabilityDescriptor>) -> Registry {
        let registry = Registry::new();
        for descriptor in descriptors {
            registry.add_descriptor(descriptor).expect("descriptor");
        }
        registry
    }

    fn strings(values: Vec<Instance>) -> Vec<String> {
        values
            .iter()
            .filter_map(|v| v.downcast_ref::<String>().cloned())
            .collect()
    }

    #[test]
    fn higher_priority_wins_by_name() {
        let registry = registry_of(vec![text("x", "1", 1), text("x", "2", 2)]);

        assert_eq!(registry.get_one_as::<String>(Some("x")).unwrap().as_deref(), Some("2"));
        let representative = registry.get("x").expect("group exists");
        assert_eq!(representative.priority(), 2);
    }

    #[test]
    fn representative_handle_observes_swap() {
        let registry = Registry::new();
        let first = registry.add_descriptor(text("x", "1", 1)).unwrap();
        registry.add_descriptor(text("x", "2", 2)).unwrap();

        assert_eq!(first.raw_value().downcast_ref::<String>().map(String::as_str), Some("2"));
        assert!(registry.get("x").unwrap().ptr_eq(&first));
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let registry = registry_of(vec![text("s", "a", 1), text("s", "b", 2), text("s", "c", 2)]);

        assert_eq!(registry.get_one_as::<String>(Some("s")).unwrap().as_deref(), Some("b"));
        assert_eq!(strings(registry.get_many(Some("s"), None).unwrap()), ["b", "c", "a"]);
    }

    #[test]
    fn get_many_orders_by_priority() {
        let registry = registry_of(vec![text("t", "98", 98), text("t", "100", 100), text("t", "99", 99)]);

        let list: Vec<String> = registry.get_many_as::<String, _>(Some("t")).unwrap();
        assert_eq!(list, ["100", "99", "98"]);
        let set: HashSet<String> = registry.get_many_as::<String, _>(Some("t")).unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn set_collection_drops_equal_values() {
        let registry = registry_of(vec![text("d", "same", 2), text("d", "same", 1)]);

        let list: Vec<String> = registry.get_many_as::<String, _>(Some("d")).unwrap();
        let set: HashSet<String> = registry.get_many_as::<String, _>(Some("d")).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn re_adding_same_plugin_is_noop() {
        let registry = Registry::new();
        let plugin = registry.add_descriptor(text("x", "1", 1)).unwrap();

        assert!(!registry.add(&plugin));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_many(Some("x"), None).unwrap().len(), 1);
    }

    #[test]
    fn query_requires_selector() {
        let registry = Registry::new();
        assert!(matches!(registry.query(None, None, true), Err(RegistryError::InvalidQuery(_))));
        assert!(registry.query(Some("missing"), None, true).unwrap().is_empty());
    }

    #[test]
    fn polymorphic_and_exact_type_queries() {
        let registry = registry_of(vec![
            CapabilityDescriptor::value("w", Instance::new(Widget("w"))),
            text("s", "plain", 0),
        ]);

        assert_eq!(registry.query(None, Some(&BASE_WIDGET), false).unwrap().len(), 1);
        assert!(registry.query(None, Some(&BASE_WIDGET), true).unwrap().is_empty());
        assert_eq!(registry.query(None, Some(&STRING), true).unwrap().len(), 1);
        assert_eq!(registry.query(None, Some(&ANY), false).unwrap().len(), 2);

        let cloners = registry.get_many_dyn::<dyn Cloner>(None, &CLONER).unwrap();
        assert_eq!(cloners.len(), 1);
        assert_eq!(cloners[0].clone_name(), "w");
    }

    #[test]
    fn strict_single_resolution() {
        let registry = registry_of(vec![text("one", "1", 0), text("two", "a", 0), text("two", "b", 0)]);

        assert!(registry.get_exactly_one(Some("one"), None).is_ok());
        assert!(matches!(
            registry.get_exactly_one(Some("two"), None),
            Err(RegistryError::Ambiguous { count: 2, .. })
        ));
        assert!(matches!(
            registry.get_exactly_one(Some("none"), None),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_registration_keeps_representative_highest() {
        let registry = Registry::new();
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..25 {
                        let priority = worker * 25 + i;
                        registry
                            .add_descriptor(text("shared", &priority.to_string(), priority))
                            .unwrap();
                        let _ = registry.get_one(Some("shared"), None).unwrap();
                    }
                });
            }
        });

        assert_eq!(registry.len(), 100);
        let representative = registry.get("shared").unwrap();
        assert_eq!(representative.priority(), 99);
        let all = registry.query(Some("shared"), None, true).unwrap();
        assert!(all.windows(2).all(|w| w[0].priority() >= w[1].priority()));
    }

    #[test]
    fn load_skips_failures() {
        struct Broken;
        impl Catalog for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn descriptors(&self) -> Result<Vec<CapabilityDescriptor>, crate::BoxError> {
                Err("unreadable".into())
            }
        }

        let good = StaticCatalog::new("good")
            .with(text("ok", "fine", 0))
            .with(CapabilityDescriptor::new(
                "ok",
                Payload::factory(|| Err("constructor requires an argument".into())),
            ));
        let catalogs: Vec<Arc<dyn Catalog>> = vec![Arc::new(Broken), Arc::new(good)];

        let (registry, report) = Registry::from_catalogs(&catalogs);

        assert_eq!(report.catalogs, 1);
        assert_eq!(report.failed_catalogs, 1);
        assert_eq!(report.plugins, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(registry.get_many(Some("ok"), None).unwrap().len(), 1);
    }
}
