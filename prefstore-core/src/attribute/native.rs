//! Store-native attribute types
//!
//! Types implementing [`NativeValue`] are stored as plain [`Value`]s, with no
//! encoding step. Decoding applies the same coercions as the typed getters on
//! [`Store`](crate::store::Store), so a native `bool` attribute reads `"yes"`
//! as `true`.

use crate::store::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// A value the store can hold without an encoding step.
pub trait NativeValue: Clone + Send + Sync + 'static {
    /// Arrays and dictionaries. A stored value that no longer matches a
    /// collection type means the store contents are corrupt.
    const COLLECTION: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Binary data stored as [`Value::Data`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl NativeValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.coerce_bool())
    }
}

impl NativeValue for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_integer()
    }
}

impl NativeValue for i32 {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_integer().and_then(|i| i32::try_from(i).ok())
    }
}

impl NativeValue for u32 {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_integer().and_then(|i| u32::try_from(i).ok())
    }
}

impl NativeValue for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_double()
    }
}

impl NativeValue for f32 {
    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_double().map(|r| r as f32)
    }
}

impl NativeValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_string()
    }
}

impl NativeValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_date()
    }
}

impl NativeValue for Blob {
    fn to_value(&self) -> Value {
        Value::Data(self.0.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_data().map(|bytes| Blob(bytes.to_vec()))
    }
}

// URLs go through their string form.
impl NativeValue for Url {
    fn to_value(&self) -> Value {
        Value::from(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.coerce_url()
    }
}

impl NativeValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: NativeValue> NativeValue for Vec<T> {
    const COLLECTION: bool = true;

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(NativeValue::to_value).collect())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_array()?.iter().map(T::from_value).collect()
    }
}

impl<T: NativeValue> NativeValue for BTreeMap<String, T> {
    const COLLECTION: bool = true;

    fn to_value(&self) -> Value {
        Value::Dictionary(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_dictionary()?
            .iter()
            .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

impl<T: NativeValue> NativeValue for HashMap<String, T> {
    const COLLECTION: bool = true;

    fn to_value(&self) -> Value {
        Value::Dictionary(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_dictionary()?
            .iter()
            .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

macro_rules! native_type_ids {
    ($($scalar:ty),* $(,)?) => {
        [$(
            TypeId::of::<$scalar>(),
            TypeId::of::<Vec<$scalar>>(),
            TypeId::of::<BTreeMap<String, $scalar>>(),
            TypeId::of::<HashMap<String, $scalar>>(),
        )*]
    };
}

/// Whether `T` is one of the store-native types (scalars and one level of
/// arrays or dictionaries of them).
pub fn is_native_type<T: 'static>() -> bool {
    let native = native_type_ids![bool, i64, i32, u32, f64, f32, String, DateTime<Utc>, Blob, Url, Value];
    native.contains(&TypeId::of::<T>())
}
