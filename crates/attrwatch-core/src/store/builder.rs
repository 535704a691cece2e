//! StoreBuilder - construction and wiring of an `AttributeStore`.
//!
//! Everything pluggable (serialization hook, validator, clock, ID generator)
//! is fixed here, at construction time. `build()` checks the configuration
//! up front instead of failing on the first `set`.

use std::rc::Rc;

use crate::config::StoreOptions;
use crate::domain::{Map, Value};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator, Validator};
use crate::store::{AttributeStore, RecursiveSerializer, SerializeHook, UnflattenSerializer};

/// BuildError is a construction-time configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_notify_depth must be at least 1")]
    ZeroNotifyDepth,

    #[error("attribute '{0}' was given more than once")]
    DuplicateAttribute(String),
}

/// Builds an `AttributeStore`.
///
/// # Example
/// ```ignore
/// let store = AttributeStore::builder()
///     .attribute("company", "Crittercism")
///     .validator(FnValidator(|_, _| Ok(())))
///     .build()?;
/// ```
pub struct StoreBuilder {
    attributes: Map,
    duplicate: Option<String>,
    options: StoreOptions,
    hook: Option<Rc<dyn SerializeHook>>,
    unflatten: bool,
    validator: Option<Rc<dyn Validator>>,
    clock: Option<Rc<dyn Clock>>,
    ids: Option<Rc<dyn IdGenerator>>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            attributes: Map::new(),
            duplicate: None,
            options: StoreOptions::default(),
            hook: None,
            unflatten: false,
            validator: None,
            clock: None,
            ids: None,
        }
    }

    /// Initial binding. Initial bindings never notify.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if self.attributes.insert(name.clone(), value.into()).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name);
        }
        self
    }

    pub fn attributes<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in entries {
            self = self.attribute(name, value);
        }
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn serializer(mut self, hook: impl SerializeHook + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self.unflatten = false;
        self
    }

    /// Uses `UnflattenSerializer` with the separator from the options.
    pub fn unflatten_on_serialize(mut self) -> Self {
        self.hook = None;
        self.unflatten = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Sets the event clock. Unless an ID generator was given explicitly,
    /// IDs are minted from the same clock.
    pub fn clock<C: Clock + Clone + 'static>(mut self, clock: C) -> Self {
        if self.ids.is_none() {
            self.ids = Some(Rc::new(UlidGenerator::new(clock.clone())));
        }
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Rc::new(ids));
        self
    }

    pub fn build(self) -> Result<AttributeStore, BuildError> {
        if self.options.max_notify_depth == 0 {
            return Err(BuildError::ZeroNotifyDepth);
        }
        if let Some(name) = self.duplicate {
            return Err(BuildError::DuplicateAttribute(name));
        }
        let hook: Rc<dyn SerializeHook> = match (self.hook, self.unflatten) {
            (Some(hook), _) => hook,
            (None, true) => Rc::new(UnflattenSerializer::new(self.options.separator)),
            (None, false) => Rc::new(RecursiveSerializer),
        };
        let clock = self.clock.unwrap_or_else(|| Rc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Rc::new(UlidGenerator::new(SystemClock)));

        Ok(AttributeStore::from_parts(
            self.attributes,
            self.options,
            hook,
            self.validator,
            clock,
            ids,
        ))
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn build_success() {
        let store = StoreBuilder::new()
            .attribute("company", "Crittercism")
            .attribute("role", "engineer")
            .build()
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("company").unwrap().as_str(), Some("Crittercism"));
    }

    #[test]
    fn build_rejects_zero_depth() {
        let result = StoreBuilder::new()
            .options(StoreOptions {
                max_notify_depth: 0,
                ..StoreOptions::default()
            })
            .build();

        assert!(matches!(result, Err(BuildError::ZeroNotifyDepth)));
    }

    #[test]
    fn build_rejects_duplicate_attribute() {
        let result = StoreBuilder::new()
            .attribute("role", "engineer")
            .attribute("role", "manager")
            .build();

        assert!(matches!(
            result,
            Err(BuildError::DuplicateAttribute(name)) if name == "role"
        ));
    }

    #[test]
    fn clock_drives_store_ids() {
        let at = Utc.with_ymd_and_hms(2013, 6, 1, 0, 0, 0).unwrap();
        let store = StoreBuilder::new().clock(FixedClock::new(at)).build().unwrap();

        let timestamp = (store.id().as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp, at.timestamp_millis() as u64);
    }
}
