//! Clone-before-replace.
//!
//! Read the bound value, copy it, change the copy, `set` the copy. The copy
//! is a new top-level reference, so `set` always sees a change and the store
//! keeps plain nested data that serializes without special casing.
//!
//! # Copy depth
//! - `Shallow`: `update` はパス上のマップだけをコピーし、それ以外の兄弟は
//!   旧い値と共有したまま。旧い値（`previous`）は変更されない
//! - `Deep`: すべての階層をコピーする。循環した値は `InvalidValue`
//!
//! # Known limitation
//! `modify` hands the edit closure a shallow copy. Descending into it and
//! mutating a nested container edits storage shared with the stored value.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::domain::{SharedMap, StoreError, Value};
use crate::store::AttributeStore;

/// How much of the bound value is copied before editing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneDepth {
    #[default]
    Shallow,
    Deep,
}

impl CloneDepth {
    pub fn copy(self, value: &Value) -> Result<Value, StoreError> {
        match self {
            CloneDepth::Shallow => Ok(value.shallow_clone()),
            CloneDepth::Deep => value.deep_clone(),
        }
    }
}

/// Sets the field at `path` (attribute name first) through a copy.
///
/// Every map on the way to the leaf is copied as well, so the stored value
/// is never edited, even when `set` then rejects the copy.
/// A one-segment path is a plain `set`.
pub fn update(store: &AttributeStore, path: &[&str], value: Value, depth: CloneDepth) -> Result<bool, StoreError> {
    let Some((name, rest)) = path.split_first() else {
        return Err(StoreError::invalid_path(path, "empty path"));
    };
    if rest.is_empty() {
        return store.set(*name, value);
    }
    let Some((leaf, parents)) = rest.split_last() else {
        return Err(StoreError::invalid_path(path, "empty path"));
    };

    modify(store, name, depth, |root| {
        let mut target = root.clone();
        for segment in parents {
            let next = target.borrow().get(*segment).cloned();
            let copy: SharedMap = match next {
                Some(Value::Map(inner)) => Rc::new(RefCell::new(inner.borrow().clone())),
                Some(other) => {
                    return Err(StoreError::invalid_path(
                        path,
                        format!("'{segment}' holds a {}, not a map", other.kind()),
                    ));
                }
                None => return Err(StoreError::invalid_path(path, format!("'{segment}' is not set"))),
            };
            target
                .borrow_mut()
                .insert(segment.to_string(), Value::Map(copy.clone()));
            target = copy;
        }
        target.borrow_mut().insert(leaf.to_string(), value);
        Ok(())
    })
}

/// Copies the `Map` bound to `name`, hands the copy to `edit`, then sets it.
///
/// Nothing is set if `edit` fails.
pub fn modify<F>(store: &AttributeStore, name: &str, depth: CloneDepth, edit: F) -> Result<bool, StoreError>
where
    F: FnOnce(&SharedMap) -> Result<(), StoreError>,
{
    let current = store
        .get(name)
        .ok_or_else(|| StoreError::invalid_path(&[name], "attribute is not set"))?;
    let copy = depth.copy(&current)?;
    let Some(map) = copy.as_map() else {
        return Err(StoreError::invalid_path(
            &[name],
            format!("holds a {}, not a map", current.kind()),
        ));
    };
    edit(map)?;
    store.set(name, copy)
}

/// Follows `path` through maps (and child stores) without copying.
pub fn read(store: &AttributeStore, path: &[&str]) -> Option<Value> {
    let (name, rest) = path.split_first()?;
    let mut current = store.get(name)?;
    for segment in rest {
        current = current.field(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FnValidator;
    use crate::store::EventFilter;
    use rstest::rstest;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn profile() -> AttributeStore {
        AttributeStore::from_json(&json!({
            "company": "Crittercism",
            "name": {"first": "Kazu", "last": "Omatsu"},
            "address": {"geo": {"city": "SF"}}
        }))
        .unwrap()
    }

    fn counter(store: &AttributeStore, name: &str) -> (Rc<Cell<usize>>, crate::store::Subscription) {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let sub = store.subscribe(EventFilter::attribute(name), move |_| {
            seen.set(seen.get() + 1);
            Ok(())
        });
        (count, sub)
    }

    #[rstest]
    #[case::shallow(CloneDepth::Shallow)]
    #[case::deep(CloneDepth::Deep)]
    fn update_notifies_and_serializes(#[case] depth: CloneDepth) {
        let store = profile();
        let (count, _sub) = counter(&store, "name");

        assert!(update(&store, &["name", "first"], Value::from("Kazuhiro"), depth).unwrap());

        assert_eq!(count.get(), 1);
        assert_eq!(
            store.to_serializable().unwrap()["name"],
            json!({"first": "Kazuhiro", "last": "Omatsu"})
        );
    }

    #[test]
    fn editing_the_copy_leaves_the_stored_value_alone() {
        let store = profile();
        let original = store.get("name").unwrap();

        let copy = CloneDepth::Shallow.copy(&original).unwrap();
        copy.as_map()
            .unwrap()
            .borrow_mut()
            .insert("first".to_string(), Value::from("Kazuhiro"));

        assert_eq!(store.get("name").unwrap().field("first").unwrap().as_str(), Some("Kazu"));

        store.set("name", copy).unwrap();
        assert_eq!(store.get("name").unwrap().field("first").unwrap().as_str(), Some("Kazuhiro"));
        assert_eq!(store.previous("name").unwrap().field("first").unwrap().as_str(), Some("Kazu"));
    }

    #[test]
    fn shallow_copy_leaves_the_old_path_alone() {
        let store = profile();

        update(&store, &["address", "geo", "city"], Value::from("Tokyo"), CloneDepth::Shallow).unwrap();

        let previous_city = read_previous(&store, "address", &["geo", "city"]);
        assert_eq!(previous_city.as_deref(), Some("SF"));
        assert_eq!(
            read(&store, &["address", "geo", "city"]).unwrap().as_str(),
            Some("Tokyo")
        );
    }

    #[test]
    fn shallow_copy_shares_siblings_of_the_path() {
        let store = AttributeStore::from_json(&json!({
            "address": {"geo": {"city": "SF"}, "zip": {"code": "94105"}}
        }))
        .unwrap();
        let zip = read(&store, &["address", "zip"]).unwrap();

        update(&store, &["address", "geo", "city"], Value::from("Tokyo"), CloneDepth::Shallow).unwrap();

        assert!(read(&store, &["address", "zip"]).unwrap().identical(&zip));
    }

    #[rstest]
    #[case::shallow(CloneDepth::Shallow)]
    #[case::deep(CloneDepth::Deep)]
    fn rejected_update_leaves_the_store_untouched(#[case] depth: CloneDepth) {
        let store = AttributeStore::builder()
            .attribute("address", Value::from_json(&json!({"geo": {"city": "SF"}})))
            .validator(FnValidator(|_: &str, value: &Value| {
                let city = value.field("geo").and_then(|geo| geo.field("city"));
                match city.as_ref().and_then(Value::as_str) {
                    Some("Nowhere") => Err("unknown city".to_string()),
                    _ => Ok(()),
                }
            }))
            .build()
            .unwrap();
        let (count, _sub) = counter(&store, "address");

        let err = update(&store, &["address", "geo", "city"], Value::from("Nowhere"), depth).unwrap_err();

        assert!(matches!(err, StoreError::ValidationFailed { ref attribute, .. } if attribute == "address"));
        assert_eq!(count.get(), 0);
        assert_eq!(
            store.to_serializable().unwrap(),
            json!({"address": {"geo": {"city": "SF"}}})
        );
    }

    #[test]
    fn deep_copy_of_a_cycle_is_invalid() {
        let store = AttributeStore::empty();
        let looped = Value::map([("x", Value::from(1))]);
        looped
            .as_map()
            .unwrap()
            .borrow_mut()
            .insert("me".to_string(), looped.clone());
        store.set("a", looped.clone()).unwrap();
        let (count, _sub) = counter(&store, "a");

        let err = update(&store, &["a", "x"], Value::from(2), CloneDepth::Deep).unwrap_err();

        assert!(matches!(err, StoreError::InvalidValue { ref path, .. } if path == "me"));
        assert_eq!(count.get(), 0);
        assert!(store.get("a").unwrap().identical(&looped));
        looped.as_map().unwrap().borrow_mut().remove("me");
    }

    #[test]
    fn deep_copy_protects_every_level() {
        let store = profile();

        update(&store, &["address", "geo", "city"], Value::from("Tokyo"), CloneDepth::Deep).unwrap();

        let previous_city = read_previous(&store, "address", &["geo", "city"]);
        assert_eq!(previous_city.as_deref(), Some("SF"));
        assert_eq!(
            read(&store, &["address", "geo", "city"]).unwrap().as_str(),
            Some("Tokyo")
        );
    }

    fn read_previous(store: &AttributeStore, name: &str, rest: &[&str]) -> Option<String> {
        let mut current = store.previous(name)?;
        for segment in rest {
            current = current.field(segment)?;
        }
        current.as_str().map(str::to_string)
    }

    #[test]
    fn single_segment_is_a_plain_set() {
        let store = profile();

        assert!(update(&store, &["company"], Value::from("Apteligent"), CloneDepth::Shallow).unwrap());
        assert_eq!(read(&store, &["company"]).unwrap().as_str(), Some("Apteligent"));
    }

    #[test]
    fn failed_edit_sets_nothing() {
        let store = profile();
        let (count, _sub) = counter(&store, "name");
        let before = store.get("name").unwrap();

        let err = modify(&store, "name", CloneDepth::Shallow, |_| {
            Err(StoreError::invalid_path(&["name"], "rejected"))
        })
        .unwrap_err();

        assert!(matches!(err, StoreError::InvalidPath { .. }));
        assert!(store.get("name").unwrap().identical(&before));
        assert_eq!(count.get(), 0);
    }

    #[rstest]
    #[case::empty(&[][..])]
    #[case::missing(&["salary", "amount"][..])]
    #[case::through_scalar(&["company", "x"][..])]
    #[case::through_nested_scalar(&["name", "first", "x"][..])]
    fn bad_paths(#[case] path: &[&str]) {
        let store = profile();
        assert!(matches!(
            update(&store, path, Value::from(1), CloneDepth::Shallow),
            Err(StoreError::InvalidPath { .. })
        ));
    }
}
