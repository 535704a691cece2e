//! attrwatch-core
//!
//! Observable attribute stores and three policies for updating nested
//! attributes so that change notification, validation and serialization keep
//! working.
//!
//! # Modules
//! - **domain**: values, IDs, change events, errors
//! - **store**: `AttributeStore`, builder, observers, serialization hooks
//! - **policy**: wrap-as-child-store, flatten-to-keys, clone-before-replace
//! - **ports**: clock, ID generation, validation, data source
//! - **impls**: `InMemorySource`
//! - **sync**: fetch into / save from a store through a `DataSource`
//! - **render**: a re-rendering observer
//! - **config**: `StoreOptions` and `Config`

pub mod config;
pub mod domain;
pub mod impls;
pub mod policy;
pub mod ports;
pub mod render;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError, StoreOptions};
pub use domain::{ChangeEvent, ChangeOrigin, StoreError, StoreId, SubscriptionId, Value};
pub use policy::{CloneDepth, NestedValuePolicy};
pub use render::Renderer;
pub use store::{AttributeStore, BuildError, EventFilter, StoreBuilder, Subscription};
