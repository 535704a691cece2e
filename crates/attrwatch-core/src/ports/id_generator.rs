//! IdGenerator port - ID minting behind a trait.
//!
//! ID の生成方法を trait の裏に隠し、テストで差し替えられるようにします。
//!
//! # 実装
//! - **UlidGenerator**: タイムスタンプ部分を `Clock` から取る ULID

use crate::domain::ids::{StoreId, SubscriptionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator mints store and subscription IDs.
pub trait IdGenerator: Send + Sync {
    fn generate_store_id(&self) -> StoreId;

    fn generate_subscription_id(&self) -> SubscriptionId;
}

/// ULID generator driven by a `Clock`.
///
/// `FixedClock` を使うと全 ID のタイムスタンプ部分は同じになりますが、
/// ランダム部分で一意性は保たれます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_store_id(&self) -> StoreId {
        StoreId::from(self.next_ulid())
    }

    fn generate_subscription_id(&self) -> SubscriptionId {
        SubscriptionId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_store_id();
        let id2 = id_gen.generate_store_id();
        let id3 = id_gen.generate_store_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_store_id();
        let id2 = id_gen.generate_subscription_id();

        assert_ne!(id1.as_ulid(), id2.as_ulid());

        let timestamp1 = (id1.as_ulid().0 >> 80) as u64;
        let timestamp2 = (id2.as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp1, timestamp2);
        assert_eq!(timestamp1, fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn display_prefixes_follow_the_kind() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.generate_store_id().to_string().starts_with("store-"));
        assert!(id_gen.generate_subscription_id().to_string().starts_with("sub-"));
    }
}
