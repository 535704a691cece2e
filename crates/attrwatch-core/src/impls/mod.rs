//! Impls - in-process implementations of the ports.
//!
//! - **InMemorySource**: map-backed `DataSource`

pub mod memory_source;

pub use self::memory_source::InMemorySource;
