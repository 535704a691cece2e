//! Value - the attribute value model.
//!
//! A JSON-compatible tree in which containers are shared handles. Cloning a
//! `Value` clones the handle: two clones of a `Map` point at the same
//! storage, so a mutation through one is visible through the other. This is
//! exactly the reference behaviour that makes in-place edits invisible to
//! change detection.
//!
//! # Identity
//! - containers (`List`, `Map`, `Store`) are identical when they share storage
//! - scalars are identical when they are equal (`Float` uses IEEE equality,
//!   so `NaN` is never identical to anything)

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::domain::errors::StoreError;
use crate::store::{AttributeStore, SerializeContext};

/// Ordered attribute mapping.
pub type Map = BTreeMap<String, Value>;

/// Shared, mutable mapping handle.
pub type SharedMap = Rc<RefCell<Map>>;

/// Shared, mutable sequence handle.
pub type SharedList = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(SharedList),
    Map(SharedMap),
    /// A child store (wrapped-child policy).
    Store(AttributeStore),
}

impl Value {
    /// Builds a fresh `Map` value.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map: Map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn empty_map() -> Self {
        Value::from(Map::new())
    }

    /// Builds a fresh `List` value.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Reference identity.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Store(a), Value::Store(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Store(_) => "store",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&SharedMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&SharedList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&AttributeStore> {
        match self {
            Value::Store(s) => Some(s),
            _ => None,
        }
    }

    /// Handle to a field of a `Map` (or an attribute of a `Store`).
    ///
    /// Like `AttributeStore::get`, this never copies.
    pub fn field(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(m) => m.borrow().get(key).cloned(),
            Value::Store(s) => s.get(key),
            _ => None,
        }
    }

    /// New top-level container; children stay shared.
    ///
    /// A `Store` is copied into a new detached store with the same bindings
    /// and no observers.
    pub fn shallow_clone(&self) -> Value {
        match self {
            Value::List(l) => Value::List(Rc::new(RefCell::new(l.borrow().clone()))),
            Value::Map(m) => Value::Map(Rc::new(RefCell::new(m.borrow().clone()))),
            Value::Store(s) => Value::Store(s.detached_copy()),
            scalar => scalar.clone(),
        }
    }

    /// Copies every container level.
    ///
    /// 循環参照は `to_serializable` と同じ方法で検出し、`InvalidValue` を返します。
    /// 同じコンテナを 2 回参照している（循環ではない）場合はそれぞれ別々にコピーされます。
    pub fn deep_clone(&self) -> Result<Value, StoreError> {
        self.deep_clone_in(&mut SerializeContext::new())
    }

    pub(crate) fn deep_clone_in(&self, ctx: &mut SerializeContext) -> Result<Value, StoreError> {
        match self {
            Value::List(items) => {
                ctx.enter_container(Rc::as_ptr(items) as *const ())?;
                let mut out = Vec::new();
                for (index, item) in items.borrow().iter().enumerate() {
                    ctx.push(index.to_string());
                    out.push(item.deep_clone_in(ctx)?);
                    ctx.pop();
                }
                ctx.exit_container();
                Ok(Value::from(out))
            }
            Value::Map(entries) => {
                ctx.enter_container(Rc::as_ptr(entries) as *const ())?;
                let mut out = Map::new();
                for (key, item) in entries.borrow().iter() {
                    ctx.push(key.clone());
                    out.insert(key.clone(), item.deep_clone_in(ctx)?);
                    ctx.pop();
                }
                ctx.exit_container();
                Ok(Value::from(out))
            }
            Value::Store(store) => Ok(Value::Store(store.deep_copy_in(ctx)?)),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Builds a value tree from JSON. Every container is fresh.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(f)) => Value::Float(f),
                (None, None) => Value::Null,
            },
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(items) => Value::list(items.iter().map(Value::from_json)),
            Json::Object(entries) => {
                Value::map(entries.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }

    /// Plain JSON form; child stores go through their own serialization hook.
    pub fn to_json(&self) -> Result<Json, StoreError> {
        self.to_json_in(&mut SerializeContext::new())
    }

    pub(crate) fn to_json_in(&self, ctx: &mut SerializeContext) -> Result<Json, StoreError> {
        match self {
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Int(i) => Ok(Json::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| ctx.invalid(format!("non-finite float {f}"))),
            Value::Text(s) => Ok(Json::String(s.clone())),
            Value::List(items) => {
                ctx.enter_container(Rc::as_ptr(items) as *const ())?;
                let mut out = Vec::new();
                for (index, item) in items.borrow().iter().enumerate() {
                    ctx.push(index.to_string());
                    out.push(item.to_json_in(ctx)?);
                    ctx.pop();
                }
                ctx.exit_container();
                Ok(Json::Array(out))
            }
            Value::Map(entries) => {
                ctx.enter_container(Rc::as_ptr(entries) as *const ())?;
                let mut out = serde_json::Map::new();
                for (key, item) in entries.borrow().iter() {
                    ctx.push(key.clone());
                    out.insert(key.clone(), item.to_json_in(ctx)?);
                    ctx.pop();
                }
                ctx.exit_container();
                Ok(Json::Object(out))
            }
            Value::Store(store) => store.serialize_in(ctx),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(Rc::new(RefCell::new(map)))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }
}

impl From<AttributeStore> for Value {
    fn from(store: AttributeStore) -> Self {
        Value::Store(store)
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        Value::from_json(json)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn name() -> Value {
        Value::map([("first", Value::from("Kazu")), ("last", Value::from("Omatsu"))])
    }

    #[test]
    fn clones_share_storage() {
        let original = name();
        let alias = original.clone();

        alias
            .as_map()
            .unwrap()
            .borrow_mut()
            .insert("first".to_string(), Value::from("K."));

        assert!(original.identical(&alias));
        assert_eq!(original.field("first").unwrap().as_str(), Some("K."));
    }

    #[test]
    fn equal_content_is_not_identity() {
        assert!(!name().identical(&name()));
    }

    #[rstest]
    #[case::null(Value::Null, Value::Null, true)]
    #[case::same_int(Value::from(3), Value::from(3), true)]
    #[case::different_int(Value::from(3), Value::from(4), false)]
    #[case::same_text(Value::from("a"), Value::from("a"), true)]
    #[case::int_vs_float(Value::from(1), Value::from(1.0), false)]
    #[case::nan(Value::from(f64::NAN), Value::from(f64::NAN), false)]
    fn scalar_identity(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(a.identical(&b), expected);
    }

    #[test]
    fn shallow_clone_shares_children() {
        let inner = Value::map([("city", Value::from("SF"))]);
        let outer = Value::map([("address", inner.clone())]);

        let copy = outer.shallow_clone();

        assert!(!copy.identical(&outer));
        assert!(copy.field("address").unwrap().identical(&inner));
    }

    #[test]
    fn deep_clone_copies_every_level() {
        let inner = Value::map([("city", Value::from("SF"))]);
        let outer = Value::map([("address", inner.clone())]);

        let copy = outer.deep_clone().unwrap();

        assert!(!copy.field("address").unwrap().identical(&inner));
        assert_eq!(copy.to_json().unwrap(), outer.to_json().unwrap());
    }

    #[test]
    fn deep_clone_copies_shared_children_twice() {
        let inner = Value::map([("city", Value::from("SF"))]);
        let outer = Value::map([("home", inner.clone()), ("work", inner.clone())]);

        let copy = outer.deep_clone().unwrap();

        let home = copy.field("home").unwrap();
        assert!(!home.identical(&inner));
        assert_eq!(home.field("city").unwrap().as_str(), Some("SF"));
    }

    #[test]
    fn deep_clone_reports_cycles() {
        let value = Value::map([("x", Value::from(1))]);
        let list = Value::list([value.clone()]);
        value
            .as_map()
            .unwrap()
            .borrow_mut()
            .insert("items".to_string(), list.clone());

        let err = value.deep_clone().unwrap_err();

        assert_eq!(
            err,
            StoreError::InvalidValue {
                path: "items.0".to_string(),
                reason: "cycle detected".to_string(),
            }
        );
        value.as_map().unwrap().borrow_mut().remove("items");
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let source = json!({
            "company": "Crittercism",
            "tags": ["a", "b"],
            "name": {"first": "Kazu", "last": "Omatsu"},
            "score": 1.5,
            "active": true,
            "manager": null
        });

        let value = Value::from_json(&source);

        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn non_finite_float_is_invalid_at_serialization() {
        let value = Value::map([("ratio", Value::from(f64::INFINITY))]);

        let err = value.to_json().unwrap_err();

        assert!(matches!(
            err,
            StoreError::InvalidValue { ref path, .. } if path == "ratio"
        ));
    }

    #[test]
    fn self_referencing_map_is_invalid() {
        let value = Value::map([("x", Value::from(1))]);
        value
            .as_map()
            .unwrap()
            .borrow_mut()
            .insert("me".to_string(), value.clone());

        let err = value.to_json().unwrap_err();

        assert!(matches!(err, StoreError::InvalidValue { .. }));
        // break the cycle so the test does not leak
        value.as_map().unwrap().borrow_mut().remove("me");
    }
}
