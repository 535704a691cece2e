//! Observer registration.
//!
//! The store keeps `Weak` callbacks; the caller keeps the strong side inside
//! a `Subscription`. Dropping the `Subscription` removes the registration, so
//! observation never extends the lifetime of the observer.

use std::rc::{Rc, Weak};

use crate::domain::{ChangeEvent, StoreError, SubscriptionId};
use crate::store::WeakStore;

/// Observer callback. An `Err` is reported to the caller of `set` once every
/// observer has run.
pub type Callback = dyn Fn(&ChangeEvent) -> Result<(), StoreError>;

/// Which events an observer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Changes of one named attribute.
    Attribute(String),

    /// Once per change batch, after the attribute observers.
    Any,
}

impl EventFilter {
    pub fn attribute(name: impl Into<String>) -> Self {
        EventFilter::Attribute(name.into())
    }

    fn matches_attribute(&self, name: &str) -> bool {
        matches!(self, EventFilter::Attribute(n) if n == name)
    }
}

struct Entry {
    id: SubscriptionId,
    filter: EventFilter,
    callback: Weak<Callback>,
}

/// Registration list, in registration order.
#[derive(Default)]
pub(crate) struct ObserverList {
    entries: Vec<Entry>,
}

impl ObserverList {
    pub(crate) fn push(&mut self, id: SubscriptionId, filter: EventFilter, callback: &Rc<Callback>) {
        self.entries.push(Entry {
            id,
            filter,
            callback: Rc::downgrade(callback),
        });
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) {
        self.entries.retain(|entry| entry.id != id);
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.callback.strong_count() > 0)
            .count()
    }

    /// Live callbacks for one attribute. Dead entries are pruned on the way.
    pub(crate) fn for_attribute(&mut self, name: &str) -> Vec<Rc<Callback>> {
        self.collect(|filter| filter.matches_attribute(name))
    }

    pub(crate) fn for_any(&mut self) -> Vec<Rc<Callback>> {
        self.collect(|filter| *filter == EventFilter::Any)
    }

    fn collect(&mut self, wanted: impl Fn(&EventFilter) -> bool) -> Vec<Rc<Callback>> {
        self.entries.retain(|entry| entry.callback.strong_count() > 0);
        self.entries
            .iter()
            .filter(|entry| wanted(&entry.filter))
            .filter_map(|entry| entry.callback.upgrade())
            .collect()
    }
}

/// Guard owning an observer callback.
///
/// Keep it alive for as long as notifications are wanted.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    store: WeakStore,
    _callback: Rc<Callback>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, store: WeakStore, callback: Rc<Callback>) -> Self {
        Self {
            id,
            store,
            _callback: callback,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the observed store still exists.
    pub fn is_active(&self) -> bool {
        self.store.upgrade().is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
