//! Nested-value policies.
//!
//! A policy decides how nested data enters a store, how a nested field is
//! updated so that observers hear about it, and how the store is turned back
//! into the nested shape an external sink expects.
//!
//! | policy                | nested data stored as       | leaf update                   |
//! |-----------------------|-----------------------------|-------------------------------|
//! | `WrapChild`           | child `AttributeStore`s     | `set` on the innermost child  |
//! | `Flatten`             | separator-joined keys       | `set` of the flattened key    |
//! | `CloneBeforeReplace`  | plain `Map` values          | copy, edit, `set` the copy    |
//!
//! Paths are attribute name first: `["name", "first"]`.

pub mod copy_on_write;
pub mod flatten;
pub mod wrapped;

pub use self::copy_on_write::CloneDepth;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::domain::errors::json_kind;
use crate::domain::{StoreError, Value};
use crate::store::AttributeStore;

fn default_separator() -> char {
    '-'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NestedValuePolicy {
    WrapChild,
    Flatten {
        #[serde(default = "default_separator")]
        separator: char,
    },
    CloneBeforeReplace {
        #[serde(default)]
        depth: CloneDepth,
    },
}

impl Default for NestedValuePolicy {
    fn default() -> Self {
        NestedValuePolicy::CloneBeforeReplace {
            depth: CloneDepth::Shallow,
        }
    }
}

impl NestedValuePolicy {
    /// Binds the members of a JSON object as one change batch.
    pub fn ingest(&self, store: &AttributeStore, document: &Json) -> Result<bool, StoreError> {
        let Json::Object(object) = document else {
            return Err(StoreError::NotAnObject {
                found: json_kind(document),
            });
        };
        match *self {
            NestedValuePolicy::WrapChild => wrapped::ingest(store, object),
            NestedValuePolicy::Flatten { separator } => flatten::ingest(store, object, separator),
            NestedValuePolicy::CloneBeforeReplace { .. } => store.set_many(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v))),
            ),
        }
    }

    /// Updates the field at `path` so that observers are notified.
    ///
    /// For `WrapChild`, "observers" means the innermost child's observers.
    pub fn update(&self, store: &AttributeStore, path: &[&str], value: impl Into<Value>) -> Result<bool, StoreError> {
        let value = value.into();
        match *self {
            NestedValuePolicy::WrapChild => wrapped::update(store, path, value),
            NestedValuePolicy::Flatten { separator } => flatten::update(store, path, value, separator),
            NestedValuePolicy::CloneBeforeReplace { depth } => {
                copy_on_write::update(store, path, value, depth)
            }
        }
    }

    pub fn read(&self, store: &AttributeStore, path: &[&str]) -> Option<Value> {
        match *self {
            NestedValuePolicy::WrapChild => wrapped::read(store, path),
            NestedValuePolicy::Flatten { separator } => {
                store.get(&flatten::flat_key(path, separator).ok()?)
            }
            NestedValuePolicy::CloneBeforeReplace { .. } => copy_on_write::read(store, path),
        }
    }

    /// The store in the nested shape an external sink expects.
    pub fn export(&self, store: &AttributeStore) -> Result<Json, StoreError> {
        match *self {
            NestedValuePolicy::Flatten { separator } => flatten::export(store, separator),
            _ => store.to_serializable(),
        }
    }
}
