/*
    Store subsystem - Layered key-value storage

    A store maps string keys to untyped values across two layers: values the
    user set explicitly and registered defaults. Readers see the effective
    value, user layer first. Observers are told when a key's effective value
    changes.
*/

pub mod memory;
pub mod value;

pub use memory::MemoryStore;
pub use value::{property_list_copy, OpaqueObject, UnrepresentableValue, Value};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Old and new effective raw values of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Callback invoked with every change of an observed key.
pub type ObserverCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

type Release = Box<dyn FnOnce() + Send>;

/// A live key observation.
///
/// Delivery stops once the subscription is cancelled or dropped. Cancelling
/// more than once is harmless.
pub struct Subscription {
    release: Mutex<Option<Release>>,
}

impl Subscription {
    /// Wrap the function that unregisters the observer.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Layered key-value store contract.
///
/// Implementations must never let a registered default overwrite a user
/// value, and must notify observers only when the effective value changes.
/// Typed getters fall back to a zero value (`false`, `0`, `0.0`, or `None`
/// for object-like types) when the key is absent or cannot be coerced.
pub trait Store: Send + Sync {
    /// Effective raw value: user layer, else default layer.
    fn object(&self, key: &str) -> Option<Value>;

    /// Set a user value. Values the store cannot represent are dropped.
    fn set_object(&self, key: &str, value: Value);

    /// Remove the user value. A registered default stays in place.
    fn remove_object(&self, key: &str);

    /// Insert values into the default layer.
    fn register_defaults(&self, defaults: BTreeMap<String, Value>);

    /// Observe effective-value changes of `key`.
    fn observe(&self, key: &str, callback: ObserverCallback) -> Subscription;

    fn register_default(&self, key: &str, value: Value) {
        let mut defaults = BTreeMap::new();
        defaults.insert(key.to_string(), value);
        self.register_defaults(defaults);
    }

    fn optional_bool(&self, key: &str) -> Option<bool> {
        self.object(key).map(|v| v.coerce_bool())
    }

    fn bool(&self, key: &str) -> bool {
        self.optional_bool(key).unwrap_or(false)
    }

    fn integer(&self, key: &str) -> i64 {
        self.object(key)
            .and_then(|v| v.coerce_integer())
            .unwrap_or(0)
    }

    fn double(&self, key: &str) -> f64 {
        self.object(key)
            .and_then(|v| v.coerce_double())
            .unwrap_or(0.0)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.object(key).and_then(|v| v.coerce_string())
    }

    fn string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.object(key)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.object(key).and_then(|v| v.as_date())
    }

    fn data(&self, key: &str) -> Option<Vec<u8>> {
        match self.object(key)? {
            Value::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn url(&self, key: &str) -> Option<Url> {
        self.object(key).and_then(|v| v.coerce_url())
    }

    fn array(&self, key: &str) -> Option<Vec<Value>> {
        match self.object(key)? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    fn dictionary(&self, key: &str) -> Option<BTreeMap<String, Value>> {
        match self.object(key)? {
            Value::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set_object(key, Value::Bool(value));
    }

    fn set_integer(&self, key: &str, value: i64) {
        self.set_object(key, Value::Integer(value));
    }

    fn set_double(&self, key: &str, value: f64) {
        self.set_object(key, Value::Real(value));
    }

    fn set_string(&self, key: &str, value: &str) {
        self.set_object(key, Value::from(value));
    }

    fn set_date(&self, key: &str, value: DateTime<Utc>) {
        self.set_object(key, Value::Date(value));
    }

    fn set_data(&self, key: &str, value: &[u8]) {
        self.set_object(key, Value::Data(value.to_vec()));
    }

    fn set_url(&self, key: &str, value: &Url) {
        self.set_object(key, Value::from(value));
    }

    fn set_array(&self, key: &str, value: Vec<Value>) {
        self.set_object(key, Value::Array(value));
    }

    fn set_dictionary(&self, key: &str, value: BTreeMap<String, Value>) {
        self.set_object(key, Value::Dictionary(value));
    }
}
