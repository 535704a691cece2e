//! Domain identifiers (strongly-typed IDs).
//!
//! ストアと購読は ULID で識別します。
//! Phantom type の `Id<T>` で包むので、`StoreId` を `SubscriptionId` の
//! 代わりに渡すことはできません。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順に並ぶので、ログやデバッグ出力が読みやすい
//! - **128-bit**: UUID と同じサイズ

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（`"store-"`, `"sub-"`）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` はコンパイル時にだけ存在し、`Id<T>` のサイズは `Ulid` と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// Marker types
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Store {}

impl IdMarker for Store {
    fn prefix() -> &'static str {
        "store-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subscription {}

impl IdMarker for Subscription {
    fn prefix() -> &'static str {
        "sub-"
    }
}

/// Identifier of an attribute store (parent or child).
pub type StoreId = Id<Store>;

/// Identifier of one observer registration.
pub type SubscriptionId = Id<Subscription>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let store = StoreId::from_ulid(ulid1);
        let sub = SubscriptionId::from_ulid(ulid2);

        assert_eq!(store.as_ulid(), ulid1);
        assert_eq!(sub.as_ulid(), ulid2);

        assert!(store.to_string().starts_with("store-"));
        assert!(sub.to_string().starts_with("sub-"));

        // let _: StoreId = sub; // <- does not compile
    }

    #[test]
    fn ids_can_be_serialized() {
        let id = StoreId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: StoreId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<StoreId>(), size_of::<Ulid>());
        assert_eq!(size_of::<SubscriptionId>(), 16);
    }
}
