//! Flattened keys.
//!
//! `{"name": {"first": "Kazu"}}` is stored as `{"name-first": "Kazu"}`, so a
//! leaf update is a plain top-level replacement and always notifies.
//!
//! # Known limitations
//! - every consumer must know the separator to rebuild the nested shape
//! - keys grow with depth; every level goes through the same transform
//! - keys that already contain the separator cannot be represented and are
//!   rejected as `KeyCollision`
//!
//! Empty objects and arrays are kept as leaves.
//!
//! # Collisions with stored keys
//! `ingest` と `update` は書き込む前にストアの既存キーと照合します。
//! 既存キーが新しいキーの（区切り文字つき）接頭辞、またはその逆であれば
//! `KeyCollision` でバッチ全体を拒否し、何も書き込みません。
//! 例外は空オブジェクトの葉（`"prefs": {}`）で、その下にキーを書くと同じ
//! バッチ内で葉が取り除かれます。

use std::collections::HashSet;

use serde_json::{Map as JsonMap, Value as Json};
use tracing::warn;

use crate::domain::{StoreError, Value};
use crate::store::AttributeStore;

fn collision(key: impl Into<String>) -> StoreError {
    let key = key.into();
    warn!(key = %key, "flattened key collision");
    StoreError::KeyCollision { key }
}

/// Nested objects to separator-joined top-level keys, at every depth.
pub fn flatten(object: &JsonMap<String, Json>, separator: char) -> Result<JsonMap<String, Json>, StoreError> {
    let mut out = JsonMap::new();
    flatten_into(None, object, separator, &mut out)?;
    Ok(out)
}

fn flatten_into(
    prefix: Option<&str>,
    object: &JsonMap<String, Json>,
    separator: char,
    out: &mut JsonMap<String, Json>,
) -> Result<(), StoreError> {
    for (key, value) in object {
        let full = match prefix {
            Some(prefix) => format!("{prefix}{separator}{key}"),
            None => key.clone(),
        };
        if key.contains(separator) {
            return Err(collision(full));
        }
        match value {
            Json::Object(inner) if !inner.is_empty() => {
                flatten_into(Some(&full), inner, separator, out)?
            }
            leaf => {
                out.insert(full, leaf.clone());
            }
        }
    }
    Ok(())
}

/// Inverse of `flatten`.
///
/// A key that is both a leaf and a branch (`"a"` next to `"a-b"`) is a
/// `KeyCollision`; nothing is overwritten or merged.
pub fn unflatten(flat: &JsonMap<String, Json>, separator: char) -> Result<JsonMap<String, Json>, StoreError> {
    let mut out = JsonMap::new();
    let mut leaves: HashSet<String> = HashSet::new();

    for (key, value) in flat {
        let segments: Vec<&str> = key.split(separator).collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        let mut target = &mut out;
        let mut branch = String::new();
        for segment in parents {
            if !branch.is_empty() {
                branch.push(separator);
            }
            branch.push_str(segment);
            if leaves.contains(&branch) {
                return Err(collision(key.clone()));
            }
            let entry = target
                .entry(segment.to_string())
                .or_insert_with(|| Json::Object(JsonMap::new()));
            target = match entry {
                Json::Object(inner) => inner,
                _ => return Err(collision(key.clone())),
            };
        }

        if target.contains_key(*last) {
            return Err(collision(key.clone()));
        }
        target.insert(last.to_string(), value.clone());
        leaves.insert(key.clone());
    }
    Ok(out)
}

/// Joins a path into its flattened key.
pub fn flat_key(path: &[&str], separator: char) -> Result<String, StoreError> {
    if path.is_empty() {
        return Err(StoreError::invalid_path(path, "empty path"));
    }
    if let Some(segment) = path.iter().find(|s| s.contains(separator)) {
        return Err(collision(*segment));
    }
    Ok(path.join(&separator.to_string()))
}

/// Flattens `object` and binds every flattened key as one batch.
pub fn ingest(store: &AttributeStore, object: &JsonMap<String, Json>, separator: char) -> Result<bool, StoreError> {
    let flat = flatten(object, separator)?;
    write(
        store,
        flat.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
        separator,
    )
}

/// Sets the flattened key for `path`.
pub fn update(store: &AttributeStore, path: &[&str], value: Value, separator: char) -> Result<bool, StoreError> {
    write(store, vec![(flat_key(path, separator)?, value)], separator)
}

fn write(store: &AttributeStore, entries: Vec<(String, Value)>, separator: char) -> Result<bool, StoreError> {
    let mut placeholders = Vec::new();
    for (key, _) in &entries {
        check_stored(store, key, separator, &mut placeholders)?;
    }
    store.write_batch(
        placeholders
            .into_iter()
            .map(|key| (key, None))
            .chain(entries.into_iter().map(|(key, value)| (key, Some(value)))),
    )
}

/// Fails if `key` and a stored key would nest into each other. Stored empty
/// maps above `key` are collected into `placeholders` instead.
fn check_stored(
    store: &AttributeStore,
    key: &str,
    separator: char,
    placeholders: &mut Vec<String>,
) -> Result<(), StoreError> {
    for existing in store.keys() {
        if nests_under(key, &existing, separator) {
            let empty_leaf = store
                .get(&existing)
                .and_then(|value| value.as_map().map(|map| map.borrow().is_empty()))
                .unwrap_or(false);
            if !empty_leaf {
                return Err(collision(key));
            }
            if !placeholders.contains(&existing) {
                placeholders.push(existing);
            }
        } else if nests_under(&existing, key, separator) {
            return Err(collision(key));
        }
    }
    Ok(())
}

/// `"a-b"` nests under `"a"`; `"ab"` does not.
fn nests_under(key: &str, prefix: &str, separator: char) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(separator))
}

/// Serializes the store and folds the flattened keys back.
pub fn export(store: &AttributeStore, separator: char) -> Result<Json, StoreError> {
    match store.to_serializable()? {
        Json::Object(flat) => Ok(Json::Object(unflatten(&flat, separator)?)),
        other => Ok(other),
    }
}
