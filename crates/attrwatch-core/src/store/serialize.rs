//! Serialization hooks.
//!
//! A store turns itself into JSON through the `SerializeHook` it was built
//! with. Swapping the hook replaces what would otherwise be an override of
//! the store's `to_serializable` method.

use serde_json::Value as Json;

use crate::domain::{StoreError, Value};
use crate::policy::flatten::unflatten;
use crate::store::AttributeStore;

/// Produces the JSON form of one store.
pub trait SerializeHook {
    fn serialize(&self, store: &AttributeStore, ctx: &mut SerializeContext) -> Result<Json, StoreError>;
}

/// Tracks the current path and the containers being visited, so errors name
/// the offending attribute and cycles are detected instead of recursing
/// forever.
#[derive(Debug, Default)]
pub struct SerializeContext {
    path: Vec<String>,
    active: Vec<*const ()>,
}

impl SerializeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.path.push(segment.into());
    }

    pub fn pop(&mut self) {
        self.path.pop();
    }

    /// Dotted path of the value being serialized, `$` at the root.
    pub fn path(&self) -> String {
        if self.path.is_empty() {
            "$".to_string()
        } else {
            self.path.join(".")
        }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> StoreError {
        StoreError::InvalidValue {
            path: self.path(),
            reason: reason.into(),
        }
    }

    pub(crate) fn enter_container(&mut self, ptr: *const ()) -> Result<(), StoreError> {
        if self.active.contains(&ptr) {
            return Err(self.invalid("cycle detected"));
        }
        self.active.push(ptr);
        Ok(())
    }

    pub(crate) fn exit_container(&mut self) {
        self.active.pop();
    }
}

/// Every attribute in turn; child stores expand through their own hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursiveSerializer;

impl SerializeHook for RecursiveSerializer {
    fn serialize(&self, store: &AttributeStore, ctx: &mut SerializeContext) -> Result<Json, StoreError> {
        let mut out = serde_json::Map::new();
        for (name, value) in store.entries() {
            ctx.push(name.clone());
            out.insert(name, value.to_json_in(ctx)?);
            ctx.pop();
        }
        Ok(Json::Object(out))
    }
}

/// Renders top-level child stores as `{"$store": "<id>"}` instead of their
/// data. This is what a caller sees when child stores are not unwrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueChildren;

impl SerializeHook for OpaqueChildren {
    fn serialize(&self, store: &AttributeStore, ctx: &mut SerializeContext) -> Result<Json, StoreError> {
        let mut out = serde_json::Map::new();
        for (name, value) in store.entries() {
            let json = match &value {
                Value::Store(child) => serde_json::json!({ "$store": child.id().to_string() }),
                other => {
                    ctx.push(name.clone());
                    let json = other.to_json_in(ctx)?;
                    ctx.pop();
                    json
                }
            };
            out.insert(name, json);
        }
        Ok(Json::Object(out))
    }
}

/// Serializes recursively, then folds flattened keys back into nested
/// objects so flattened keys never leak to an external sink.
#[derive(Debug, Clone, Copy)]
pub struct UnflattenSerializer {
    separator: char,
}

impl UnflattenSerializer {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }
}

impl SerializeHook for UnflattenSerializer {
    fn serialize(&self, store: &AttributeStore, ctx: &mut SerializeContext) -> Result<Json, StoreError> {
        match RecursiveSerializer.serialize(store, ctx)? {
            Json::Object(flat) => Ok(Json::Object(unflatten(&flat, self.separator)?)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_path_tracks_segments() {
        let mut ctx = SerializeContext::new();
        assert_eq!(ctx.path(), "$");

        ctx.push("name");
        ctx.push("first");
        assert_eq!(ctx.path(), "name.first");

        ctx.pop();
        assert_eq!(ctx.path(), "name");
    }

    #[test]
    fn opaque_children_hides_child_data() {
        let child = AttributeStore::new([("first", Value::from("Kazu"))]);
        let parent = AttributeStore::builder()
            .attribute("name", Value::Store(child.clone()))
            .attribute("role", Value::from("engineer"))
            .serializer(OpaqueChildren)
            .build()
            .unwrap();

        let json = parent.to_serializable().unwrap();

        assert_eq!(json["role"], json!("engineer"));
        assert_eq!(json["name"], json!({ "$store": child.id().to_string() }));
    }

    #[test]
    fn unflatten_serializer_restores_nesting() {
        let store = AttributeStore::builder()
            .attribute("name-first", Value::from("Kazu"))
            .attribute("name-last", Value::from("Omatsu"))
            .attribute("role", Value::from("engineer"))
            .unflatten_on_serialize()
            .build()
            .unwrap();

        assert_eq!(
            store.to_serializable().unwrap(),
            json!({"name": {"first": "Kazu", "last": "Omatsu"}, "role": "engineer"})
        );
    }

    #[test]
    fn unflatten_serializer_reports_collisions() {
        let store = AttributeStore::builder()
            .attribute("name", Value::from("Kazu"))
            .attribute("name-last", Value::from("Omatsu"))
            .unflatten_on_serialize()
            .build()
            .unwrap();

        assert!(matches!(
            store.to_serializable(),
            Err(StoreError::KeyCollision { .. })
        ));
    }
}
