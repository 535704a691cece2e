//! InMemorySource - a `DataSource` backed by a map, for development and tests.
//!
//! latency を指定すると各呼び出しの前に sleep します（他の処理と交互に
//! 動く呼び出し側のテスト用）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::ports::{DataSource, SourceError};

/// Cloning shares the underlying documents.
#[derive(Clone, Default)]
pub struct InMemorySource {
    documents: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    latency: Option<Duration>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds a document.
    pub async fn insert(&self, key: impl Into<String>, document: serde_json::Value) {
        self.documents.lock().await.insert(key.into(), document);
    }

    /// Current document under `key`, if any.
    pub async fn document(&self, key: &str) -> Option<serde_json::Value> {
        self.documents.lock().await.get(key).cloned()
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value, SourceError> {
        self.wait().await;
        let document = self
            .documents
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(key.to_string()))?;
        debug!(key, "document fetched");
        Ok(document)
    }

    async fn save(&self, key: &str, document: serde_json::Value) -> Result<(), SourceError> {
        self.wait().await;
        if !document.is_object() {
            return Err(SourceError::Malformed {
                key: key.to_string(),
                reason: "documents must be JSON objects".to_string(),
            });
        }
        self.documents.lock().await.insert(key.to_string(), document);
        debug!(key, "document saved");
        Ok(())
    }
}
