//! Fetch and save through a `DataSource`.
//!
//! The store is only touched after the awaited call returns, so no store
//! borrow is ever held across an await point.

use tracing::info;

use crate::domain::StoreError;
use crate::policy::NestedValuePolicy;
use crate::ports::DataSource;
use crate::store::AttributeStore;

/// Fetches `key` and ingests it with `policy`. Returns whether any attribute
/// changed.
pub async fn fetch_into<S>(
    source: &S,
    key: &str,
    store: &AttributeStore,
    policy: &NestedValuePolicy,
) -> Result<bool, StoreError>
where
    S: DataSource + ?Sized,
{
    let document = source.fetch(key).await?;
    let changed = policy.ingest(store, &document)?;
    info!(key, store = %store.id(), changed, "fetched into store");
    Ok(changed)
}

/// Exports the store with `policy` and saves it under `key`.
pub async fn save_from<S>(
    source: &S,
    key: &str,
    store: &AttributeStore,
    policy: &NestedValuePolicy,
) -> Result<(), StoreError>
where
    S: DataSource + ?Sized,
{
    let document = policy.export(store)?;
    source.save(key, document).await?;
    info!(key, store = %store.id(), "saved from store");
    Ok(())
}
