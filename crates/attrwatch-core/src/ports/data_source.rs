//! DataSource port - where raw attribute documents come from and go to.
//!
//! サーバーに対する `fetch`/`save` に相当します。ドキュメントは素の JSON で、
//! ストアの属性との相互変換は `NestedValuePolicy::ingest` /
//! `NestedValuePolicy::export` が担当します。

use async_trait::async_trait;

/// SourceError is a data-source failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("malformed document '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// DataSource reads and writes JSON documents by key.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value, SourceError>;

    async fn save(&self, key: &str, document: serde_json::Value) -> Result<(), SourceError>;
}
