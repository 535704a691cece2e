//! Domain model (IDs, values, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod value;

pub use self::errors::StoreError;
pub use self::events::{ChangeEvent, ChangeOrigin};
pub use self::ids::{StoreId, SubscriptionId};
pub use self::value::{Map, SharedList, SharedMap, Value};
