//! Typed attributes
//!
//! An attribute binds a key to a value type and an [`Encoding`]. Mandatory
//! attributes carry a default and register it lazily on first read; optional
//! attributes have no default and read as `None` while the key is absent.
//!
//! Attributes are declared through a [`Container`], which supplies the key
//! prefix and the backing store.

mod container;
mod encoding;
mod error;
mod native;

pub use container::Container;
pub use encoding::{CoderKind, DecodeFn, EncodeFn, Encoding};
pub use error::{AttributeError, CodecError};
pub use native::{is_native_type, Blob, NativeValue};

use crate::reactive::{AttributeStream, ProjectedStream, Publisher};
use crate::registrar::DefaultRegistrar;
use crate::store::{Store, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What the reactive bridge needs from an attribute.
pub trait Setting: Send + Sync + 'static {
    /// `T` for mandatory attributes, `Option<T>` for optional ones.
    type Output: Clone + Send + 'static;

    fn key(&self) -> &str;

    fn store(&self) -> &Arc<dyn Store>;

    /// Interpret an effective raw value exactly as `read` would.
    fn resolve(&self, raw: Option<Value>) -> Result<Self::Output, AttributeError>;
}

/// An attribute with a default value.
pub struct Attribute<T> {
    name: String,
    key: String,
    store: Arc<dyn Store>,
    encoding: Encoding<T>,
    default: T,
    registrar: Arc<DefaultRegistrar>,
}

impl<T> Attribute<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: String,
        key: String,
        store: Arc<dyn Store>,
        encoding: Encoding<T>,
        default: T,
    ) -> Self {
        Self {
            name,
            key,
            store,
            encoding,
            default,
            registrar: Arc::new(DefaultRegistrar::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn encoding(&self) -> &Encoding<T> {
        &self.encoding
    }

    pub fn encode(&self, value: &T) -> Result<Value, AttributeError> {
        self.encoding.encode(&self.key, value)
    }

    pub fn decode(&self, raw: &Value) -> Result<T, AttributeError> {
        self.encoding.decode(&self.key, raw)
    }

    /// Install the default into the store's default layer, once.
    ///
    /// # Panics
    ///
    /// If the default value cannot be encoded. Defaults are fixed at
    /// declaration time, so that is a programming error.
    pub fn register_default_if_needed(&self) {
        self.registrar.register_if_needed(|| {
            let encoded = match self.encode(&self.default) {
                Ok(encoded) => encoded,
                Err(e) => panic!("default value of {} cannot be encoded: {e}", self.key),
            };
            debug!(key = %self.key, encoding = self.encoding.label(), "Registering default");
            self.store.register_default(&self.key, encoded);
        });
    }

    /// Current effective value.
    ///
    /// A stored native value that cannot be coerced falls back to the
    /// default; a coded value that fails to decode is an error.
    pub fn read(&self) -> Result<T, AttributeError> {
        self.register_default_if_needed();
        self.resolve_raw(self.store.object(&self.key))
    }

    pub fn write(&self, value: &T) -> Result<(), AttributeError> {
        let encoded = self.encode(value)?;
        self.store.set_object(&self.key, encoded);
        Ok(())
    }

    /// Drop the user value so reads return the default again.
    pub fn reset(&self) {
        self.store.remove_object(&self.key);
    }

    pub fn stream(&self) -> AttributeStream<Self> {
        AttributeStream::open(self.clone())
    }

    /// Stream of `projection(value)`, emitted only when the projection changes.
    pub fn stream_for<V, F>(&self, projection: F) -> ProjectedStream<AttributeStream<Self>, F, V>
    where
        F: FnMut(&T) -> V,
        V: PartialEq + Clone,
    {
        self.stream().project(projection)
    }

    pub fn publisher(&self) -> Publisher<T> {
        Publisher::new(self.clone())
    }

    pub fn publisher_for<V, F>(&self, projection: F) -> Publisher<V>
    where
        F: Fn(&T) -> V + Clone + Send + Sync + 'static,
        V: PartialEq + Clone + Send + Sync + 'static,
    {
        Publisher::projected(self.clone(), projection)
    }

    fn resolve_raw(&self, raw: Option<Value>) -> Result<T, AttributeError> {
        let Some(raw) = raw else {
            return Ok(self.default.clone());
        };
        match self.decode(&raw) {
            Ok(value) => Ok(value),
            Err(e) if self.encoding.is_native() => {
                debug!(key = %self.key, error = %e, "Stored value unusable, using default");
                Ok(self.default.clone())
            }
            Err(e) => Err(e),
        }
    }
}

impl<T> Setting for Attribute<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn key(&self) -> &str {
        &self.key
    }

    fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn resolve(&self, raw: Option<Value>) -> Result<T, AttributeError> {
        self.resolve_raw(raw)
    }
}

impl<T: Clone> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key: self.key.clone(),
            store: self.store.clone(),
            encoding: self.encoding.clone(),
            default: self.default.clone(),
            registrar: self.registrar.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("key", &self.key)
            .field("encoding", &self.encoding)
            .field("default", &self.default)
            .finish()
    }
}

/// An attribute without a default.
pub struct OptionalAttribute<T> {
    name: String,
    key: String,
    store: Arc<dyn Store>,
    encoding: Encoding<T>,
}

impl<T> OptionalAttribute<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(name: String, key: String, store: Arc<dyn Store>, encoding: Encoding<T>) -> Self {
        Self {
            name,
            key,
            store,
            encoding,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn encoding(&self) -> &Encoding<T> {
        &self.encoding
    }

    pub fn encode(&self, value: &T) -> Result<Value, AttributeError> {
        self.encoding.encode(&self.key, value)
    }

    pub fn decode(&self, raw: &Value) -> Result<T, AttributeError> {
        self.encoding.decode(&self.key, raw)
    }

    /// `None` while the key is absent.
    pub fn read(&self) -> Result<Option<T>, AttributeError> {
        self.resolve_raw(self.store.object(&self.key))
    }

    /// Store `value`, or remove the key for `None`.
    pub fn write(&self, value: Option<&T>) -> Result<(), AttributeError> {
        match value {
            Some(value) => {
                let encoded = self.encode(value)?;
                self.store.set_object(&self.key, encoded);
            }
            None => self.store.remove_object(&self.key),
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.store.remove_object(&self.key);
    }

    pub fn stream(&self) -> AttributeStream<Self> {
        AttributeStream::open(self.clone())
    }

    pub fn stream_for<V, F>(
        &self,
        projection: F,
    ) -> ProjectedStream<AttributeStream<Self>, F, V>
    where
        F: FnMut(&Option<T>) -> V,
        V: PartialEq + Clone,
    {
        self.stream().project(projection)
    }

    pub fn publisher(&self) -> Publisher<Option<T>> {
        Publisher::new(self.clone())
    }

    pub fn publisher_for<V, F>(&self, projection: F) -> Publisher<V>
    where
        F: Fn(&Option<T>) -> V + Clone + Send + Sync + 'static,
        V: PartialEq + Clone + Send + Sync + 'static,
    {
        Publisher::projected(self.clone(), projection)
    }

    fn resolve_raw(&self, raw: Option<Value>) -> Result<Option<T>, AttributeError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        match self.decode(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(_) if self.encoding.is_native() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T> Setting for OptionalAttribute<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Option<T>;

    fn key(&self) -> &str {
        &self.key
    }

    fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn resolve(&self, raw: Option<Value>) -> Result<Option<T>, AttributeError> {
        self.resolve_raw(raw)
    }
}

impl<T> Clone for OptionalAttribute<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key: self.key.clone(),
            store: self.store.clone(),
            encoding: self.encoding.clone(),
        }
    }
}

impl<T> fmt::Debug for OptionalAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalAttribute")
            .field("key", &self.key)
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeEvent, MemoryStore, ObserverCallback, Subscription};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts default registrations on top of a [`MemoryStore`].
    struct CountingStore {
        inner: MemoryStore,
        registrations: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(),
                registrations: AtomicUsize::new(0),
            })
        }
    }

    impl Store for CountingStore {
        fn object(&self, key: &str) -> Option<Value> {
            self.inner.object(key)
        }

        fn set_object(&self, key: &str, value: Value) {
            self.inner.set_object(key, value)
        }

        fn remove_object(&self, key: &str) {
            self.inner.remove_object(key)
        }

        fn register_defaults(&self, defaults: BTreeMap<String, Value>) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            self.inner.register_defaults(defaults)
        }

        fn observe(&self, key: &str, callback: ObserverCallback) -> Subscription {
            self.inner.observe(key, callback)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        nickname: String,
        age: u8,
    }

    #[test]
    fn test_mandatory_read_write_reset() {
        let store = CountingStore::new();
        let container = Container::new("Settings", store.clone());
        let greeting = container.mandatory("greeting", "def".to_string());

        assert_eq!(greeting.key(), "Settings::greeting");
        assert_eq!(greeting.read().unwrap(), "def");
        assert_eq!(store.registrations.load(Ordering::SeqCst), 1);

        greeting.write(&"val".to_string()).unwrap();
        assert_eq!(greeting.read().unwrap(), "val");

        greeting.reset();
        assert_eq!(greeting.read().unwrap(), "def");
        assert_eq!(store.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.default_value("Settings::greeting"), Some(Value::from("def")));
    }

    #[test]
    fn test_concurrent_first_reads_register_once() {
        for readers in [1usize, 2, 50] {
            let store = CountingStore::new();
            let container = Container::new("Concurrent", store.clone());
            let volume = container.mandatory("volume", 0.5f64);

            let handles: Vec<_> = (0..readers)
                .map(|_| {
                    let volume = volume.clone();
                    std::thread::spawn(move || volume.read().unwrap())
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), 0.5);
            }

            assert_eq!(store.registrations.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_native_mismatch_falls_back_to_default() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("", store.clone());
        let retries = container.mandatory("retries", 3i64);

        store.set_string("retries", "7");
        assert_eq!(retries.read().unwrap(), 7);

        store.set_data("retries", &[1, 2]);
        assert_eq!(retries.read().unwrap(), 3);
    }

    #[test]
    fn test_bool_attribute_uses_coercion_policy() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Flags", store.clone());
        let enabled = container.mandatory("enabled", false);

        store.set_string("Flags::enabled", "YES");
        assert!(enabled.read().unwrap());

        store.set_string("Flags::enabled", "whatever");
        assert!(!enabled.read().unwrap());
    }

    #[test]
    fn test_optional_attribute() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let nickname = container.optional::<String>("nickname");

        assert_eq!(nickname.read().unwrap(), None);

        nickname.write(Some(&"kit".to_string())).unwrap();
        assert_eq!(nickname.read().unwrap().as_deref(), Some("kit"));

        nickname.write(None).unwrap();
        assert_eq!(nickname.read().unwrap(), None);
        assert_eq!(store.object("Settings::nickname"), None);
    }

    #[test]
    fn test_coded_attribute_round_trip() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Accounts", store.clone());
        let fallback = Profile {
            nickname: "guest".to_string(),
            age: 0,
        };
        let profile = container
            .mandatory_coded("profile", fallback.clone(), CoderKind::Json)
            .unwrap();

        assert_eq!(profile.read().unwrap(), fallback);

        let updated = Profile {
            nickname: "ada".to_string(),
            age: 36,
        };
        profile.write(&updated).unwrap();
        assert_eq!(profile.read().unwrap(), updated);

        let raw = store.data("Accounts::profile").unwrap();
        let parsed: Profile = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed, updated);
    }

    #[test]
    fn test_coded_decode_failure_is_returned() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Accounts", store.clone());
        let profile = container
            .optional_coded::<Profile>("profile", CoderKind::Binary)
            .unwrap();

        store.set_data("Accounts::profile", &[0xff]);
        assert!(matches!(profile.read(), Err(AttributeError::Decoding { .. })));
    }

    #[test]
    fn test_custom_write_failure_is_returned() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Accounts", store.clone());
        let profile = container
            .optional_custom::<Profile, _, _>(
                "profile",
                |p| {
                    if p.nickname.is_empty() {
                        Err("nickname required".into())
                    } else {
                        Ok(p.nickname.as_bytes().to_vec())
                    }
                },
                |bytes| {
                    Ok(Profile {
                        nickname: String::from_utf8(bytes.to_vec())?,
                        age: 0,
                    })
                },
            )
            .unwrap();

        let anonymous = Profile {
            nickname: String::new(),
            age: 1,
        };
        assert!(matches!(
            profile.write(Some(&anonymous)),
            Err(AttributeError::Encoding { .. })
        ));
        assert_eq!(store.object("Accounts::profile"), None);
    }

    #[test]
    #[should_panic(expected = "cannot be encoded")]
    fn test_unencodable_default_panics() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let container = Container::new("Broken", store);
        let attribute = container
            .mandatory_custom(
                "always_fails",
                Profile {
                    nickname: "x".to_string(),
                    age: 1,
                },
                |_| Err("no".into()),
                |_| Err("no".into()),
            )
            .unwrap();

        let _ = attribute.read();
    }

    #[test]
    fn test_clones_share_registration() {
        let store = CountingStore::new();
        let container = Container::new("Shared", store.clone());
        let original = container.mandatory("count", 1i64);
        let copy = original.clone();

        original.read().unwrap();
        copy.read().unwrap();

        assert_eq!(store.registrations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_observer_is_released_with_stream() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let count = container.mandatory("count", 0i64);

        let stream = count.stream();
        assert_eq!(store.observer_count("Settings::count"), 1);
        drop(stream);
        assert_eq!(store.observer_count("Settings::count"), 0);

        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();
        let _sub = store.observe(
            "Settings::count",
            Arc::new(move |_: &ChangeEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count.write(&4).unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
