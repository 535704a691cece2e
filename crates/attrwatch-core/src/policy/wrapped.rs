//! Wrapped child stores.
//!
//! Nested objects become child `AttributeStore`s, so a leaf update is a `set`
//! on the innermost child and always notifies that child's observers.
//!
//! # Hazard
//! The parent is not told. A child change reaches the parent's observers
//! only if the caller wires it with `bubble` (or `bubble_all`) and keeps the
//! returned subscriptions alive. `to_serializable` on the parent expands the
//! children through their hooks; a store built with `OpaqueChildren` shows
//! handles instead.

use serde_json::{Map as JsonMap, Value as Json};
use tracing::debug;

use crate::domain::{Map, StoreError, Value};
use crate::store::{AttributeStore, EventFilter, Subscription};

/// Converts `object` into attribute values, turning every nested object
/// (empty ones included) into a child of `parent`.
pub fn wrap(parent: &AttributeStore, object: &JsonMap<String, Json>) -> Result<Map, StoreError> {
    let mut out = Map::new();
    for (key, value) in object {
        let value = match value {
            Json::Object(inner) => {
                let child = parent.spawn_child();
                child.set_many(wrap(&child, inner)?)?;
                debug!(parent = %parent.id(), child = %child.id(), attribute = %key, "wrapped nested object");
                Value::Store(child)
            }
            other => Value::from_json(other),
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}

pub fn ingest(store: &AttributeStore, object: &JsonMap<String, Json>) -> Result<bool, StoreError> {
    store.set_many(wrap(store, object)?)
}

/// The store that owns the last segment of `path`, and that segment.
fn owner<'p>(store: &AttributeStore, path: &'p [&'p str]) -> Result<(AttributeStore, &'p str), StoreError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(StoreError::invalid_path(path, "empty path"));
    };
    let mut current = store.clone();
    for segment in parents {
        current = match current.get(segment) {
            Some(Value::Store(child)) => child,
            Some(other) => {
                return Err(StoreError::invalid_path(
                    path,
                    format!("'{segment}' holds a {}, not a child store", other.kind()),
                ));
            }
            None => return Err(StoreError::invalid_path(path, format!("'{segment}' is not set"))),
        };
    }
    Ok((current, *last))
}

/// Sets the leaf on the innermost child store.
pub fn update(store: &AttributeStore, path: &[&str], value: Value) -> Result<bool, StoreError> {
    let (owner, name) = owner(store, path)?;
    owner.set(name, value)
}

pub fn read(store: &AttributeStore, path: &[&str]) -> Option<Value> {
    let (owner, name) = owner(store, path).ok()?;
    owner.get(name)
}

/// Re-emits every change batch of `child` on `parent` as a bubbled change of
/// `attribute`. Dropping the subscription undoes the wiring.
pub fn bubble(parent: &AttributeStore, attribute: impl Into<String>, child: &AttributeStore) -> Subscription {
    let parent = parent.downgrade();
    let attribute = attribute.into();
    let child_id = child.id();
    child.subscribe(EventFilter::Any, move |event| match parent.upgrade() {
        Some(parent) => parent.emit_bubbled(&attribute, child_id, &event.attribute),
        None => Ok(()),
    })
}

/// `bubble` for every child store reachable from `store`, at every depth.
pub fn bubble_all(store: &AttributeStore) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();
    for (name, value) in store.entries() {
        if let Value::Store(child) = value {
            subscriptions.push(bubble(store, name, &child));
            subscriptions.extend(bubble_all(&child));
        }
    }
    subscriptions
}
