//! Ports - seams the store is wired through.
//!
//! Each trait hides something the store should not hard-code: where time and
//! IDs come from, how replacements are validated, and where raw documents are
//! fetched from and saved to.

pub mod clock;
pub mod data_source;
pub mod id_generator;
pub mod validator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::data_source::{DataSource, SourceError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::validator::{FnValidator, Validator};
