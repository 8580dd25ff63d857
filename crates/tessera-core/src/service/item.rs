//! Service items: observable cells in the service resolution graph.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::provider::{SERVICE_PROVIDER, ServiceCallback, ServiceProvider};
use crate::error::{RegistryError, RegistryResult};
use crate::types::{Instance, TypeRef};

/// The value slot of a service item.
#[derive(Clone)]
pub enum ServiceValue {
    Ready(Instance),
    /// Resolved on first read, then replaced by the produced value.
    Deferred(ServiceCallback),
}

impl fmt::Debug for ServiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(instance) => f.debug_tuple("Ready").field(instance).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Clone)]
struct ItemState {
    value: Option<ServiceValue>,
    system_value: Option<Instance>,
    is_system: bool,
    auto_update: bool,
    /// The item this one was derived from.
    source: Option<ServiceItem>,
}

struct ItemInner {
    service_type: TypeRef,
    state: Mutex<ItemState>,
    regen: Mutex<()>,
    /// Held while a deferred callback runs.
    resolve: Mutex<()>,
    dependents: Mutex<Vec<Weak<ItemInner>>>,
}

/// A shared cell holding the value registered for one capability type.
///
/// Items derived from a provider are subscribed to it: whenever the
/// provider's value changes, dependents with auto-update enabled re-derive
/// their value. Items with auto-update disabled keep whatever was set on them.
#[derive(Clone)]
pub struct ServiceItem {
    inner: Arc<ItemInner>,
}

impl ServiceItem {
    pub fn new(service_type: TypeRef, value: Option<ServiceValue>) -> Self {
        Self {
            inner: Arc::new(ItemInner {
                service_type,
                state: Mutex::new(ItemState {
                    value,
                    system_value: None,
                    is_system: false,
                    auto_update: true,
                    source: None,
                }),
                regen: Mutex::new(()),
                resolve: Mutex::new(()),
                dependents: Mutex::new(Vec::new()),
            }),
        }
    }

    /// An item seeded from the registry.
    pub fn system(service_type: TypeRef, value: Instance) -> Self {
        let item = Self::new(service_type, Some(ServiceValue::Ready(value)));
        item.make_system();
        item
    }

    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.inner.state.lock()
    }

    pub fn service_type(&self) -> TypeRef {
        self.inner.service_type
    }

    pub fn is_system(&self) -> bool {
        self.state().is_system
    }

    pub fn system_value(&self) -> Option<Instance> {
        self.state().system_value.clone()
    }

    pub fn auto_update(&self) -> bool {
        self.state().auto_update
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.state().auto_update = enabled;
    }

    /// Whether a value, resolved or deferred, is present.
    pub fn has_value(&self) -> bool {
        self.state().value.is_some()
    }

    /// The current value, running a deferred callback if one is pending.
    ///
    /// Concurrent readers wait for a single run of the callback. A callback
    /// that fails stays pending and its error is returned.
    pub fn value(&self) -> RegistryResult<Option<Instance>> {
        if let Some(ready) = self.ready_value() {
            return ready;
        }
        let _resolving = self.inner.resolve.lock();
        let callback = match &self.state().value {
            None => return Ok(None),
            Some(ServiceValue::Ready(instance)) => return Ok(Some(instance.clone())),
            Some(ServiceValue::Deferred(callback)) => Arc::clone(callback),
        };
        // The state lock is released so the callback may read other items.
        let produced = callback(self.inner.service_type).map_err(|e| {
            RegistryError::invocation(format!("resolving deferred service {}", self.inner.service_type), e)
        })?;

        let mut state = self.state();
        match &state.value {
            Some(ServiceValue::Deferred(pending)) if Arc::ptr_eq(pending, &callback) => {
                state.value = produced.clone().map(ServiceValue::Ready);
                Ok(produced)
            }
            // Replaced while the callback ran; the newer value wins.
            Some(ServiceValue::Ready(instance)) => Ok(Some(instance.clone())),
            _ => Ok(produced),
        }
    }

    fn ready_value(&self) -> Option<RegistryResult<Option<Instance>>> {
        match &self.state().value {
            None => Some(Ok(None)),
            Some(ServiceValue::Ready(instance)) => Some(Ok(Some(instance.clone()))),
            Some(ServiceValue::Deferred(_)) => None,
        }
    }

    /// The resolved value, if any, without running a deferred callback.
    pub fn peek(&self) -> Option<Instance> {
        match &self.state().value {
            Some(ServiceValue::Ready(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Replaces the value and notifies dependents if it changed.
    ///
    /// Setting a different value on a system item turns it into a user item.
    /// Clearing a user item that shadows a system value restores the system
    /// value. Clearing a system item is ignored.
    pub fn set_value(&self, value: Option<Instance>) {
        let changed = {
            let mut state = self.state();
            match value {
                None => match state.system_value.clone() {
                    Some(_) if state.is_system => false,
                    Some(system) => {
                        state.value = Some(ServiceValue::Ready(system));
                        state.is_system = true;
                        true
                    }
                    None => state.value.take().is_some(),
                },
                Some(value) => {
                    let same = matches!(&state.value, Some(ServiceValue::Ready(current)) if current.ptr_eq(&value));
                    if !same {
                        state.is_system = false;
                        state.value = Some(ServiceValue::Ready(value));
                    }
                    !same
                }
            }
        };
        if changed {
            self.propagate();
        }
    }

    /// Installs a deferred value and notifies dependents.
    pub fn set_callback(&self, callback: ServiceCallback) {
        {
            let mut state = self.state();
            state.is_system = false;
            state.value = Some(ServiceValue::Deferred(callback));
        }
        self.propagate();
    }

    /// Marks the current value as the system value.
    pub fn make_system(&self) {
        let mut state = self.state();
        state.is_system = true;
        state.system_value = match &state.value {
            Some(ServiceValue::Ready(instance)) => Some(instance.clone()),
            _ => None,
        };
    }

    /// Copies the state of `other` into this item in place.
    ///
    /// Holders of this item observe the new value; if `other` was derived from
    /// a provider, this item subscribes to that provider too.
    pub fn assign_from(&self, other: &ServiceItem) -> RegistryResult<()> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        let copied = other.state().clone();
        if let Some(parent) = &copied.source {
            parent.subscribe(self)?;
        }
        *self.state() = copied;
        self.propagate();
        Ok(())
    }

    /// Derives a child item of type `ty` from this item's provider value.
    ///
    /// Returns `None` when the value is not a provider or the provider has no
    /// service of that type.
    pub fn derive(&self, ty: TypeRef) -> RegistryResult<Option<ServiceItem>> {
        let Some(produced) = self.provide(ty)? else {
            return Ok(None);
        };
        let child = ServiceItem::new(ty, Some(ServiceValue::Ready(produced)));
        if self.is_system() {
            child.make_system();
        }
        self.subscribe(&child)?;
        child.state().source = Some(self.clone());
        debug!(parent = %self.service_type(), child = %ty, "Derived service item");
        Ok(Some(child))
    }

    fn provide(&self, ty: TypeRef) -> RegistryResult<Option<Instance>> {
        let Some(provider) = self
            .value()?
            .and_then(|value| value.view_as(&SERVICE_PROVIDER))
            .and_then(|view| view.as_dyn::<dyn ServiceProvider>())
        else {
            return Ok(None);
        };
        provider
            .provide(ty)
            .map_err(|e| RegistryError::invocation(format!("providing {ty} from {}", self.service_type()), e))
    }

    /// Registers `child` as a dependent of this item.
    ///
    /// Fails when the subscription would close a cycle.
    pub fn subscribe(&self, child: &ServiceItem) -> RegistryResult<()> {
        if self.ptr_eq(child) || self.has_ancestor(child) {
            return Err(RegistryError::Cycle {
                parent: self.service_type().name(),
                child: child.service_type().name(),
            });
        }
        let mut dependents = self.inner.dependents.lock();
        dependents.retain(|weak| weak.strong_count() > 0);
        let target = Arc::downgrade(&child.inner);
        if !dependents.iter().any(|weak| weak.ptr_eq(&target)) {
            dependents.push(target);
        }
        Ok(())
    }

    fn has_ancestor(&self, candidate: &ServiceItem) -> bool {
        let mut current = self.state().source.clone();
        while let Some(item) = current {
            if item.ptr_eq(candidate) {
                return true;
            }
            current = item.state().source.clone();
        }
        false
    }

    fn dependents(&self) -> Vec<ServiceItem> {
        self.inner
            .dependents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| ServiceItem { inner })
            .collect()
    }

    /// Re-derives every auto-updating dependent, breadth first.
    ///
    /// A dependent whose re-derivation fails keeps its previous value.
    fn propagate(&self) {
        let mut queue = VecDeque::from([self.clone()]);
        while let Some(parent) = queue.pop_front() {
            for child in parent.dependents() {
                if !child.auto_update() {
                    continue;
                }
                match parent.provide(child.service_type()) {
                    Ok(Some(value)) => {
                        if child.replace_derived(value, parent.is_system()) {
                            queue.push_back(child);
                        }
                    }
                    Ok(None) => {
                        debug!(
                            parent = %parent.service_type(),
                            child = %child.service_type(),
                            "Provider no longer supplies dependent, keeping previous value"
                        );
                    }
                    Err(e) => {
                        warn!(
                            parent = %parent.service_type(),
                            child = %child.service_type(),
                            error = %e,
                            "Dependent re-derivation failed, keeping previous value"
                        );
                    }
                }
            }
        }
    }

    fn replace_derived(&self, value: Instance, is_system: bool) -> bool {
        let mut state = self.state();
        if matches!(&state.value, Some(ServiceValue::Ready(current)) if current.ptr_eq(&value)) {
            return false;
        }
        state.is_system = is_system;
        if is_system {
            state.system_value = Some(value.clone());
        }
        state.value = Some(ServiceValue::Ready(value));
        true
    }

    pub(crate) fn regen_lock(&self) -> MutexGuard<'_, ()> {
        self.inner.regen.lock()
    }

    pub fn ptr_eq(&self, other: &ServiceItem) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ServiceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ServiceItem")
            .field("type", &self.inner.service_type.name())
            .field("value", &state.value)
            .field("is_system", &state.is_system)
            .field("auto_update", &state.auto_update)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::service::provider::{FnProvider, provider_instance};
    use crate::types::{I32, STRING};

    fn text(value: &str) -> Instance {
        Instance::new(value.to_owned())
    }

    fn read(item: &ServiceItem) -> Option<String> {
        item.peek().and_then(|v| v.downcast_ref::<String>().cloned())
    }

    /// Provider producing strings prefixed with its tag.
    fn tagged(tag: &'static str) -> Instance {
        provider_instance(FnProvider::new(move |ty: TypeRef| {
            Ok((ty == &STRING).then(|| text(tag)))
        }))
    }

    #[test]
    fn system_value_is_restored_after_clear() {
        let item = ServiceItem::system(&STRING, text("system"));

        item.set_value(Some(text("user")));
        assert!(!item.is_system());
        assert_eq!(read(&item).as_deref(), Some("user"));

        item.set_value(None);
        assert!(item.is_system());
        assert_eq!(read(&item).as_deref(), Some("system"));

        item.set_value(None);
        assert_eq!(read(&item).as_deref(), Some("system"));
    }

    #[test]
    fn clearing_plain_item_empties_it() {
        let item = ServiceItem::new(&STRING, Some(ServiceValue::Ready(text("x"))));
        item.set_value(None);
        assert!(!item.has_value());
    }

    #[test]
    fn deferred_value_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let item = ServiceItem::new(
            &I32,
            Some(ServiceValue::Deferred(Arc::new(move |_: TypeRef| -> Result<Option<Instance>, crate::BoxError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Instance::new(7i32)))
            }))),
        );

        for _ in 0..3 {
            let value = item.value().unwrap().expect("resolved");
            assert_eq!(value.downcast_ref::<i32>(), Some(&7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependents_follow_provider_changes() {
        let provider = ServiceItem::system(&SERVICE_PROVIDER, tagged("one"));
        let child = provider.derive(&STRING).unwrap().expect("provider supplies strings");
        assert!(child.is_system());
        assert_eq!(read(&child).as_deref(), Some("one"));

        provider.set_value(Some(tagged("two")));
        assert_eq!(read(&child).as_deref(), Some("two"));
        assert!(!child.is_system());
    }

    #[test]
    fn manual_value_is_not_overwritten() {
        let provider = ServiceItem::new(&SERVICE_PROVIDER, Some(ServiceValue::Ready(tagged("one"))));
        let child = provider.derive(&STRING).unwrap().unwrap();

        child.set_auto_update(false);
        child.set_value(Some(text("manual")));
        provider.set_value(Some(tagged("two")));

        assert_eq!(read(&child).as_deref(), Some("manual"));
    }

    #[test]
    fn cascade_reaches_grandchildren() {
        static CHAIN: crate::types::TypeInfo = crate::types::TypeInfo::class("test::Chain");

        let root = ServiceItem::new(&SERVICE_PROVIDER, Some(ServiceValue::Ready(tagged("a"))));
        let middle_provider = |tag: &'static str| {
            provider_instance(FnProvider::new(move |ty: TypeRef| {
                Ok((ty == &CHAIN).then(|| Instance::with_type(&CHAIN, tag)))
            }))
        };
        let middle = ServiceItem::new(&STRING, Some(ServiceValue::Ready(middle_provider("m1"))));
        root.subscribe(&middle).unwrap();
        let leaf = middle.derive(&CHAIN).unwrap().unwrap();
        assert_eq!(leaf.peek().and_then(|v| v.downcast_ref::<&str>().copied()), Some("m1"));

        root.set_value(Some(tagged("b")));

        assert_eq!(read(&middle).as_deref(), Some("b"));
        assert!(leaf.has_value());
    }

    #[test]
    fn failing_rederivation_keeps_stale_value() {
        let provider = ServiceItem::new(&SERVICE_PROVIDER, Some(ServiceValue::Ready(tagged("ok"))));
        let child = provider.derive(&STRING).unwrap().unwrap();

        provider.set_value(Some(provider_instance(FnProvider::new(|_: TypeRef| Err("down".into())))));

        assert_eq!(read(&child).as_deref(), Some("ok"));
    }

    #[test]
    fn subscription_cycles_are_rejected() {
        let provider = ServiceItem::new(&SERVICE_PROVIDER, Some(ServiceValue::Ready(tagged("x"))));
        let child = provider.derive(&STRING).unwrap().unwrap();

        assert!(matches!(child.subscribe(&provider), Err(RegistryError::Cycle { .. })));
        assert!(matches!(provider.subscribe(&provider), Err(RegistryError::Cycle { .. })));
    }

    #[test]
    fn rejected_assignment_leaves_item_untouched() {
        let provider = ServiceItem::new(&SERVICE_PROVIDER, Some(ServiceValue::Ready(tagged("x"))));
        let child = provider.derive(&STRING).unwrap().unwrap();

        assert!(matches!(provider.assign_from(&child), Err(RegistryError::Cycle { .. })));

        assert!(read(&provider).is_none());
        let again = provider.derive(&STRING).unwrap().expect("still a provider");
        assert_eq!(read(&again).as_deref(), Some("x"));
        assert!(matches!(child.subscribe(&provider), Err(RegistryError::Cycle { .. })));
    }

    #[test]
    fn concurrent_first_reads_share_one_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let item = ServiceItem::new(
            &I32,
            Some(ServiceValue::Deferred(Arc::new(move |_: TypeRef| -> Result<Option<Instance>, crate::BoxError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(Some(Instance::new(11i32)))
            }))),
        );

        let values: Vec<Instance> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| item.value().unwrap().expect("resolved")))
                .collect();
            readers.into_iter().map(|reader| reader.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|value| value.ptr_eq(&values[0])));
        assert_eq!(values[0].downcast_ref::<i32>(), Some(&11));
    }
}
