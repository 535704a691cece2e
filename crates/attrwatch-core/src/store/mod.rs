//! AttributeStore - an observable mapping of named attributes.
//!
//! # Change detection
//! `set` compares the incoming value with the bound one by reference
//! identity (`Value::identical`). Replacing the binding notifies; mutating a
//! shared container in place does not, because the binding still points at
//! the same storage.
//!
//! # Delivery
//! Synchronous and ordered: observers of each changed attribute in
//! registration order, then `Any` observers once per batch. The observer
//! list is snapshotted before delivery, so callbacks may subscribe,
//! unsubscribe or call `set` again. Nested deliveries are bounded by
//! `StoreOptions::max_notify_depth`.
//!
//! ストアは `Rc` ベースのハンドルなので `Send` ではありません。
//! 非同期の境界（`sync`）では await をまたいでストアを借用しないこと。

mod builder;
mod observer;
mod serialize;

pub use builder::{BuildError, StoreBuilder};
pub use observer::{Callback, EventFilter, Subscription};
pub use serialize::{
    OpaqueChildren, RecursiveSerializer, SerializeContext, SerializeHook, UnflattenSerializer,
};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use observer::ObserverList;
use tracing::{debug, trace, warn};

use crate::config::StoreOptions;
use crate::domain::errors::json_kind;
use crate::domain::{ChangeEvent, ChangeOrigin, Map, StoreError, StoreId, SubscriptionId, Value};
use crate::ports::{Clock, IdGenerator, Validator};

struct StoreInner {
    id: StoreId,
    attributes: RefCell<Map>,
    /// Bindings as they were before the latest change batch.
    previous: RefCell<Map>,
    /// Names touched by the latest change batch.
    changed: RefCell<Vec<String>>,
    observers: RefCell<ObserverList>,
    depth: Cell<usize>,
    options: StoreOptions,
    hook: Rc<dyn SerializeHook>,
    validator: Option<Rc<dyn Validator>>,
    clock: Rc<dyn Clock>,
    ids: Rc<dyn IdGenerator>,
}

/// Shared handle to a store. Cloning the handle does not copy the store.
#[derive(Clone)]
pub struct AttributeStore {
    inner: Rc<StoreInner>,
}

/// Non-owning handle, used by subscriptions and observers that must not keep
/// a store alive.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<AttributeStore> {
        self.inner.upgrade().map(|inner| AttributeStore { inner })
    }
}

/// Increments the delivery depth for the lifetime of the guard.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

impl AttributeStore {
    /// Store with default options and the given initial bindings.
    ///
    /// A repeated name keeps its last value.
    pub fn new<I, K>(initial: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let attributes: Map = initial.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let clock: Rc<dyn Clock> = Rc::new(crate::ports::SystemClock);
        let ids: Rc<dyn IdGenerator> =
            Rc::new(crate::ports::UlidGenerator::new(crate::ports::SystemClock));
        Self::from_parts(
            attributes,
            StoreOptions::default(),
            Rc::new(RecursiveSerializer),
            None,
            clock,
            ids,
        )
    }

    pub fn empty() -> Self {
        Self::new(Map::new())
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Store whose initial bindings are the members of a JSON object.
    /// Nested objects become plain `Map` values.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, StoreError> {
        match json {
            serde_json::Value::Object(entries) => Ok(Self::new(
                entries.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
            other => Err(StoreError::NotAnObject {
                found: json_kind(other),
            }),
        }
    }

    fn from_parts(
        attributes: Map,
        options: StoreOptions,
        hook: Rc<dyn SerializeHook>,
        validator: Option<Rc<dyn Validator>>,
        clock: Rc<dyn Clock>,
        ids: Rc<dyn IdGenerator>,
    ) -> Self {
        let id = ids.generate_store_id();
        Self {
            inner: Rc::new(StoreInner {
                id,
                previous: RefCell::new(attributes.clone()),
                attributes: RefCell::new(attributes),
                changed: RefCell::new(Vec::new()),
                observers: RefCell::new(ObserverList::default()),
                depth: Cell::new(0),
                options,
                hook,
                validator,
                clock,
                ids,
            }),
        }
    }

    /// Empty store sharing this store's options, hook, validator, clock and
    /// ID generator. The child is not observed by the parent.
    pub fn spawn_child(&self) -> AttributeStore {
        self.spawn_with(Map::new())
    }

    fn spawn_with(&self, attributes: Map) -> AttributeStore {
        let inner = &self.inner;
        Self::from_parts(
            attributes,
            inner.options.clone(),
            inner.hook.clone(),
            inner.validator.clone(),
            inner.clock.clone(),
            inner.ids.clone(),
        )
    }

    /// New store with the same bindings and no observers.
    pub(crate) fn detached_copy(&self) -> AttributeStore {
        self.spawn_with(self.inner.attributes.borrow().clone())
    }

    /// `detached_copy` that deep-clones every bound value. Cycles through
    /// stores or containers are `InvalidValue`.
    pub(crate) fn deep_copy_in(&self, ctx: &mut SerializeContext) -> Result<AttributeStore, StoreError> {
        ctx.enter_container(Rc::as_ptr(&self.inner) as *const ())?;
        let mut attributes = Map::new();
        for (name, value) in self.entries() {
            ctx.push(name.clone());
            attributes.insert(name, value.deep_clone_in(ctx)?);
            ctx.pop();
        }
        ctx.exit_container();
        Ok(self.spawn_with(attributes))
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn ptr_eq(&self, other: &AttributeStore) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ========================================
    // Reads
    // ========================================

    /// Handle to the bound value; nested structures are not copied.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.attributes.borrow().contains_key(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.attributes.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.attributes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.attributes.borrow().is_empty()
    }

    /// All bindings as handles, in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn previous(&self, name: &str) -> Option<Value> {
        self.inner.previous.borrow().get(name).cloned()
    }

    pub fn previous_attributes(&self) -> Map {
        self.inner.previous.borrow().clone()
    }

    /// Names changed by the latest batch.
    pub fn changed_attributes(&self) -> Vec<String> {
        self.inner.changed.borrow().clone()
    }

    pub fn has_changed(&self, name: &str) -> bool {
        self.inner.changed.borrow().iter().any(|n| n == name)
    }

    // ========================================
    // Writes
    // ========================================

    /// Binds `value` to `name`.
    ///
    /// Returns `Ok(false)` without notifying when `value` is identical to the
    /// bound value. Observer errors are returned after the value has been
    /// recorded and every observer has run.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<bool, StoreError> {
        self.set_many([(name.into(), value.into())])
    }

    /// Applies several bindings as one batch: one attribute notification per
    /// changed name, then a single `Any` notification.
    ///
    /// A name given more than once keeps its last value, and that value is
    /// compared with the stored one. Validation runs on every changed entry
    /// before anything is recorded; one rejection rejects the batch.
    pub fn set_many<I, K>(&self, pairs: I) -> Result<bool, StoreError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.write_batch(pairs.into_iter().map(|(name, value)| (name.into(), Some(value))))
    }

    /// Removes `name`. Removing an absent attribute is a no-op.
    pub fn unset(&self, name: &str) -> Result<bool, StoreError> {
        self.write_batch([(name.to_string(), None)])
    }

    /// Binds (`Some`) and removes (`None`) attributes as one change batch.
    pub(crate) fn write_batch<I>(&self, writes: I) -> Result<bool, StoreError>
    where
        I: IntoIterator<Item = (String, Option<Value>)>,
    {
        self.check_depth()?;

        let mut staged: Vec<(String, Option<Value>)> = Vec::new();
        for (name, write) in writes {
            staged.retain(|(n, _)| *n != name);
            staged.push((name, write));
        }

        let mut changes: Vec<(String, Option<Value>, Option<Value>)> = Vec::new();
        for (name, write) in staged {
            let current = self.get(&name);
            let unchanged = match (&current, &write) {
                (Some(current), Some(value)) => current.identical(value),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                trace!(store = %self.inner.id, attribute = %name, "identical value, skipped");
                continue;
            }
            if let (Some(value), Some(validator)) = (&write, &self.inner.validator) {
                validator
                    .validate(&name, value)
                    .map_err(|reason| StoreError::ValidationFailed {
                        attribute: name.clone(),
                        reason,
                    })?;
            }
            changes.push((name, current, write));
        }

        if changes.is_empty() {
            return Ok(false);
        }

        let at = self.inner.clock.now();
        {
            let mut attributes = self.inner.attributes.borrow_mut();
            *self.inner.previous.borrow_mut() = attributes.clone();
            for (name, _, write) in &changes {
                match write {
                    Some(value) => attributes.insert(name.clone(), value.clone()),
                    None => attributes.remove(name),
                };
            }
        }
        *self.inner.changed.borrow_mut() = changes.iter().map(|(n, _, _)| n.clone()).collect();

        let events = changes
            .into_iter()
            .map(|(attribute, previous, current)| {
                let origin = match &current {
                    Some(value) => {
                        debug!(store = %self.inner.id, attribute = %attribute, kind = value.kind(), "attribute replaced");
                        ChangeOrigin::Replaced
                    }
                    None => {
                        debug!(store = %self.inner.id, attribute = %attribute, "attribute unset");
                        ChangeOrigin::Unset
                    }
                };
                ChangeEvent {
                    store: self.inner.id,
                    attribute,
                    previous,
                    current,
                    origin,
                    at,
                }
            })
            .collect();
        self.deliver(events)?;
        Ok(true)
    }

    /// Emits a bubbled change for `attribute` without touching any binding.
    pub(crate) fn emit_bubbled(
        &self,
        attribute: &str,
        child: StoreId,
        child_attribute: &str,
    ) -> Result<(), StoreError> {
        self.check_depth()?;
        let current = self.get(attribute);
        self.deliver(vec![ChangeEvent {
            store: self.inner.id,
            attribute: attribute.to_string(),
            previous: current.clone(),
            current,
            origin: ChangeOrigin::Bubbled {
                child,
                attribute: child_attribute.to_string(),
            },
            at: self.inner.clock.now(),
        }])
    }

    fn check_depth(&self) -> Result<(), StoreError> {
        let depth = self.inner.depth.get();
        if depth >= self.inner.options.max_notify_depth {
            warn!(store = %self.inner.id, depth, "re-entrant notification limit reached");
            return Err(StoreError::ReentrantNotification {
                store: self.inner.id,
                depth,
            });
        }
        Ok(())
    }

    fn deliver(&self, events: Vec<ChangeEvent>) -> Result<(), StoreError> {
        let _guard = DepthGuard::enter(&self.inner.depth);

        let (per_attribute, any) = {
            let mut observers = self.inner.observers.borrow_mut();
            let per_attribute: Vec<_> = events
                .iter()
                .map(|event| observers.for_attribute(&event.attribute))
                .collect();
            (per_attribute, observers.for_any())
        };

        let mut first_error = None;
        for (event, callbacks) in events.iter().zip(per_attribute) {
            for callback in callbacks {
                if let Err(err) = callback(event) {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(last) = events.last() {
            for callback in any {
                if let Err(err) = callback(last) {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ========================================
    // Observers
    // ========================================

    /// Registers `callback` for events matching `filter`.
    ///
    /// The store keeps only a weak reference; the returned `Subscription`
    /// owns the callback.
    pub fn subscribe<F>(&self, filter: EventFilter, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> Result<(), StoreError> + 'static,
    {
        let id = self.inner.ids.generate_subscription_id();
        let callback: Rc<Callback> = Rc::new(callback);
        self.inner
            .observers
            .borrow_mut()
            .push(id, filter.clone(), &callback);
        debug!(store = %self.inner.id, subscription = %id, ?filter, "observer registered");
        Subscription::new(id, self.downgrade(), callback)
    }

    /// `subscribe(EventFilter::Attribute(name), ..)`.
    pub fn on_change<F>(&self, name: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> Result<(), StoreError> + 'static,
    {
        self.subscribe(EventFilter::attribute(name), callback)
    }

    /// `subscribe(EventFilter::Any, ..)`.
    pub fn on_any<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> Result<(), StoreError> + 'static,
    {
        self.subscribe(EventFilter::Any, callback)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.observers.borrow_mut().remove(id);
    }

    /// Number of live registrations.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().live_count()
    }

    // ========================================
    // Serialization
    // ========================================

    /// Plain JSON form of every attribute, produced by the store's hook.
    ///
    /// Unrepresentable values (non-finite floats, cycles) are reported here
    /// as `InvalidValue`.
    pub fn to_serializable(&self) -> Result<serde_json::Value, StoreError> {
        self.serialize_in(&mut SerializeContext::new())
    }

    pub(crate) fn serialize_in(&self, ctx: &mut SerializeContext) -> Result<serde_json::Value, StoreError> {
        ctx.enter_container(Rc::as_ptr(&self.inner) as *const ())?;
        let json = self.inner.hook.serialize(self, ctx)?;
        ctx.exit_container();
        Ok(json)
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeStore")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}
