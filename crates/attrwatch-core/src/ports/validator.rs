//! Validator port - accept or reject a replacement before it is recorded.
//!
//! The validator sees the incoming top-level value. With wrapped child stores
//! the parent's validator never sees leaf updates, because those go to the
//! child; give the child its own validator if the leaf matters.

use crate::domain::value::Value;

/// Validator is consulted on every non-identical `set`.
///
/// Returning `Err(reason)` aborts the replacement: nothing is recorded and no
/// observer runs.
pub trait Validator {
    fn validate(&self, name: &str, value: &Value) -> Result<(), String>;
}

/// Adapts a closure into a `Validator`.
pub struct FnValidator<F>(pub F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(&str, &Value) -> Result<(), String>,
{
    fn validate(&self, name: &str, value: &Value) -> Result<(), String> {
        (self.0)(name, value)
    }
}
