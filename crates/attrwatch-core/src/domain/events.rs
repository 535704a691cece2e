//! Events - what observers receive.

use chrono::{DateTime, Utc};

use crate::domain::ids::StoreId;
use crate::domain::value::Value;

/// Why an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// `set` bound a new value.
    Replaced,

    /// `unset` removed the attribute.
    Unset,

    /// Re-emitted from a child store wired with `wrapped::bubble`.
    Bubbled { child: StoreId, attribute: String },
}

/// ChangeEvent は 1 つのストアの 1 つの属性の変更
///
/// `previous` と `current` はコピーではなくハンドルです。
/// bubbled イベントでは親の束縛は変わっていないので、どちらも子ストア自身を指します。
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub store: StoreId,
    pub attribute: String,
    pub previous: Option<Value>,
    pub current: Option<Value>,
    pub origin: ChangeOrigin,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn is_bubbled(&self) -> bool {
        matches!(self.origin, ChangeOrigin::Bubbled { .. })
    }
}
