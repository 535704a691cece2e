//! Configuration: store options and the default nested-update policy.
//!
//! JSON から読み込み、欠けているフィールドはデフォルト値で埋めます。
//! `Flatten` ポリシーの区切り文字は `StoreOptions::separator` と一致している
//! 必要があります（`UnflattenSerializer` と同じキーを読むため）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::NestedValuePolicy;
use crate::store::{AttributeStore, BuildError};

/// ConfigError は設定の読み込み・検証エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("flatten separator '{policy}' does not match store separator '{store}'")]
    SeparatorMismatch { store: char, policy: char },
}

/// Per-store options, shared with every child spawned from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Maximum number of nested deliveries per store before `set` fails with
    /// `ReentrantNotification`.
    pub max_notify_depth: usize,

    /// Separator used by `UnflattenSerializer` and by the `Flatten` policy.
    pub separator: char,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_notify_depth: 10,
            separator: '-',
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreOptions,
    pub policy: NestedValuePolicy,
}

impl Config {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.policy {
            NestedValuePolicy::Flatten { separator } if separator != self.store.separator => {
                Err(ConfigError::SeparatorMismatch {
                    store: self.store.separator,
                    policy: separator,
                })
            }
            _ => Ok(()),
        }
    }

    /// `Flatten` を指定した場合、区切り文字は常に `store.separator` から取る
    pub fn flatten_policy(&self) -> NestedValuePolicy {
        NestedValuePolicy::Flatten {
            separator: self.store.separator,
        }
    }

    /// Empty store with these options.
    pub fn build_store(&self) -> Result<AttributeStore, BuildError> {
        AttributeStore::builder().options(self.store.clone()).build()
    }
}
