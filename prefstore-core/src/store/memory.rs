/*
    memory.rs - In-memory reference store

    Holds the user and default layers behind one mutex. Every accepted value
    is an independent copy produced by a serialization round trip; values that
    fail the round trip are dropped and the key is left untouched.

    Notification:
    - Each mutation samples the old effective value, applies the change and
      samples the new one under the lock.
    - Differing (old, new) pairs are queued in mutation order while the lock
      is held.
    - One caller at a time drains the queue and runs callbacks with the lock
      released, so callbacks may write back into the store.
*/

use crate::config::StoreConfig;
use crate::store::value::{property_list_copy, Value};
use crate::store::{ChangeEvent, ObserverCallback, Store, Subscription};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

struct Observer {
    id: u64,
    active: AtomicBool,
    callback: ObserverCallback,
}

struct Delivery {
    observers: Vec<Arc<Observer>>,
    event: ChangeEvent,
}

#[derive(Default)]
struct Layers {
    user: HashMap<String, Value>,
    defaults: HashMap<String, Value>,
    observers: HashMap<String, Vec<Arc<Observer>>>,
    pending: VecDeque<Delivery>,
    dispatching: bool,
    next_observer_id: u64,
}

impl Layers {
    fn effective(&self, key: &str) -> Option<&Value> {
        self.user.get(key).or_else(|| self.defaults.get(key))
    }
}

struct Shared {
    layers: Mutex<Layers>,
    config: StoreConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_observer(&self, key: &str, id: u64) {
        let mut layers = self.lock();
        if let Some(observers) = layers.observers.get_mut(key) {
            observers.retain(|observer| observer.id != id);
            if observers.is_empty() {
                layers.observers.remove(key);
            }
        }
        trace!(key, id, "Observer released");
    }
}

/// Clears the dispatching flag if a callback panics mid-drain.
struct DispatchGuard<'a> {
    shared: &'a Shared,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared.lock().dispatching = false;
        }
    }
}

/// Thread-safe in-memory [`Store`].
///
/// Clones share the same layers and observers.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with a custom configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                layers: Mutex::new(Layers::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Number of live observations of `key`.
    pub fn observer_count(&self, key: &str) -> usize {
        self.shared
            .lock()
            .observers
            .get(key)
            .map_or(0, |observers| observers.len())
    }

    pub fn user_value(&self, key: &str) -> Option<Value> {
        self.shared.lock().user.get(key).cloned()
    }

    pub fn default_value(&self, key: &str) -> Option<Value> {
        self.shared.lock().defaults.get(key).cloned()
    }

    /// Every effective key/value pair, user values shadowing defaults.
    pub fn dictionary_representation(&self) -> BTreeMap<String, Value> {
        let layers = self.shared.lock();
        let mut merged: BTreeMap<String, Value> = layers
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in &layers.user {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    fn accept(&self, key: &str, value: &Value) -> Option<Value> {
        match property_list_copy(value, self.shared.config.max_value_bytes) {
            Ok(copy) => Some(copy),
            Err(e) => {
                warn!(key, kind = value.kind(), error = %e, "Dropping unrepresentable value");
                None
            }
        }
    }

    fn mutate<F>(&self, keys: Vec<String>, apply: F)
    where
        F: FnOnce(&mut Layers),
    {
        let mut layers = self.shared.lock();
        let before: Vec<Option<Value>> = keys
            .iter()
            .map(|key| layers.effective(key).cloned())
            .collect();

        apply(&mut *layers);

        for (key, old) in keys.into_iter().zip(before) {
            let new = layers.effective(&key).cloned();
            if old == new {
                continue;
            }
            trace!(key = %key, "Effective value changed");
            let observers = layers.observers.get(&key).cloned().unwrap_or_default();
            if !observers.is_empty() {
                layers.pending.push_back(Delivery {
                    observers,
                    event: ChangeEvent { key, old, new },
                });
            }
        }

        self.drain(layers);
    }

    fn drain<'a>(&'a self, mut layers: MutexGuard<'a, Layers>) {
        if layers.dispatching {
            return;
        }
        layers.dispatching = true;
        let _guard = DispatchGuard {
            shared: &self.shared,
        };

        loop {
            let next = layers.pending.pop_front();
            let Some(delivery) = next else {
                break;
            };
            drop(layers);
            for observer in &delivery.observers {
                if observer.active.load(Ordering::Acquire) {
                    (observer.callback)(&delivery.event);
                }
            }
            layers = self.shared.lock();
        }
        layers.dispatching = false;
    }
}

impl Store for MemoryStore {
    fn object(&self, key: &str) -> Option<Value> {
        self.shared.lock().effective(key).cloned()
    }

    fn set_object(&self, key: &str, value: Value) {
        let Some(copy) = self.accept(key, &value) else {
            return;
        };
        self.mutate(vec![key.to_string()], |layers| {
            layers.user.insert(key.to_string(), copy);
        });
    }

    fn remove_object(&self, key: &str) {
        self.mutate(vec![key.to_string()], |layers| {
            layers.user.remove(key);
        });
    }

    fn register_defaults(&self, defaults: BTreeMap<String, Value>) {
        let accepted: Vec<(String, Value)> = defaults
            .into_iter()
            .filter_map(|(key, value)| self.accept(&key, &value).map(|copy| (key, copy)))
            .collect();
        if accepted.is_empty() {
            return;
        }

        let keys = accepted.iter().map(|(key, _)| key.clone()).collect();
        self.mutate(keys, |layers| {
            layers.defaults.extend(accepted);
        });
    }

    fn observe(&self, key: &str, callback: ObserverCallback) -> Subscription {
        let mut layers = self.shared.lock();
        layers.next_observer_id += 1;
        let id = layers.next_observer_id;
        let observer = Arc::new(Observer {
            id,
            active: AtomicBool::new(true),
            callback,
        });
        layers
            .observers
            .entry(key.to_string())
            .or_default()
            .push(observer.clone());
        drop(layers);

        trace!(key, id, "Observer registered");

        let shared = Arc::downgrade(&self.shared);
        let observer = Arc::downgrade(&observer);
        let key = key.to_string();
        Subscription::new(move || {
            if let Some(observer) = observer.upgrade() {
                observer.active.store(false, Ordering::Release);
            }
            if let Some(shared) = shared.upgrade() {
                shared.remove_observer(&key, id);
            }
        })
    }
}
