//! Errors - every failure the store, the policies and the sync boundary report.
//!
//! ストア操作・ポリシー・同期境界のエラーを 1 つの enum にまとめます。
//! 設定ファイルの読み込みエラーは `config::ConfigError` が別に扱います。

use thiserror::Error;

use crate::domain::ids::StoreId;
use crate::ports::SourceError;
use crate::store::BuildError;

/// StoreError はストア操作のエラー型
///
/// 未知の属性への `get` はエラーではなく `None` を返します。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// JSON で表現できない値。`set` ではなく `to_serializable`（と deep clone）で検出
    #[error("invalid value at '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    /// flatten/unflatten が既存キーを上書きしそうになった
    #[error("key collision on '{key}'")]
    KeyCollision { key: String },

    /// An observer chain re-entered `set` deeper than the configured bound.
    #[error("re-entrant notification on {store} exceeded depth {depth}")]
    ReentrantNotification { store: StoreId, depth: usize },

    #[error("validation failed for '{attribute}': {reason}")]
    ValidationFailed { attribute: String, reason: String },

    /// A policy update path does not match the stored shape.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl StoreError {
    pub(crate) fn invalid_path(path: &[&str], reason: impl Into<String>) -> Self {
        StoreError::InvalidPath {
            path: path.join("."),
            reason: reason.into(),
        }
    }
}

/// Short name of a JSON value kind, for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_path_joins_segments() {
        let err = StoreError::invalid_path(&["name", "first"], "not a map");
        assert_eq!(err.to_string(), "invalid path 'name.first': not a map");
    }

    #[test]
    fn source_errors_convert() {
        let err: StoreError = SourceError::NotFound("profile".to_string()).into();
        assert_eq!(err.to_string(), "document 'profile' not found");
    }

    #[test]
    fn build_errors_convert() {
        let err: StoreError = BuildError::ZeroNotifyDepth.into();
        assert_eq!(err, StoreError::Build(BuildError::ZeroNotifyDepth));
        assert_eq!(err.to_string(), "max_notify_depth must be at least 1");
    }

    #[test]
    fn json_kind_names() {
        assert_eq!(json_kind(&json!([1])), "array");
        assert_eq!(json_kind(&json!({})), "object");
        assert_eq!(json_kind(&json!(null)), "null");
    }
}
