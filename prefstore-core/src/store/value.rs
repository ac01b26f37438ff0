/*
    value.rs - Values a store can hold

    A Value is a store-native primitive (bool, integer, real, string, date,
    binary data) or a finite nesting of arrays and string-keyed dictionaries
    of such primitives. `Opaque` carries an arbitrary in-process object that
    can never be serialized; stores reject it.

    The coercion helpers here back both the typed getters on `Store` and the
    native attribute decoders, so both layers agree on what "42" or "yes" means.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// A raw, untyped store value.
///
/// Equality is structural, with reals compared by bit pattern so a stored
/// NaN equals itself.
#[derive(Clone, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
    /// Not property-list representable. Kept as the last variant so the
    /// serialized indices of the others never shift.
    #[serde(skip)]
    Opaque(OpaqueObject),
}

/// An arbitrary object handed to a store. Compared by identity.
#[derive(Clone)]
pub struct OpaqueObject {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueObject {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for OpaqueObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OpaqueObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dictionary(a), Value::Dictionary(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Real(r) => write!(f, "Real({})", r),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Value::Data(bytes) => write!(f, "Data({} bytes)", bytes.len()),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Dictionary(map) => f.debug_tuple("Dictionary").field(map).finish(),
            Value::Opaque(object) => fmt::Debug::fmt(object, f),
        }
    }
}

/// Why a candidate value was refused by a store.
#[derive(Debug, Error)]
pub enum UnrepresentableValue {
    #[error("value cannot be serialized: {0}")]
    NotSerializable(String),

    #[error("serialized value is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("value did not survive a serialization round trip: {0}")]
    RoundTrip(String),
}

/// Serialize `value` and read it back, returning the independent copy.
///
/// This is the property-list check: anything that fails to serialize
/// (an `Opaque` anywhere in the tree) or exceeds `limit` bytes is refused.
pub fn property_list_copy(value: &Value, limit: usize) -> Result<Value, UnrepresentableValue> {
    let encoded = bincode::serialize(value)
        .map_err(|e| UnrepresentableValue::NotSerializable(e.to_string()))?;

    if encoded.len() > limit {
        return Err(UnrepresentableValue::TooLarge {
            size: encoded.len(),
            limit,
        });
    }

    bincode::deserialize(&encoded).map_err(|e| UnrepresentableValue::RoundTrip(e.to_string()))
}

const TRUE_WORDS: [&str; 4] = ["true", "yes", "y", "on"];
const FALSE_WORDS: [&str; 4] = ["false", "no", "n", "off"];

impl Value {
    /// Wrap an arbitrary object. Stores will refuse it.
    pub fn opaque<T: Any + Send + Sync>(object: T) -> Self {
        Value::Opaque(OpaqueObject {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(object),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Data(_) => "data",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Boolean truthiness. Never fails: anything unrecognised is `false`.
    pub fn coerce_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::String(s) => {
                let word = s.trim().to_lowercase();
                if TRUE_WORDS.contains(&word.as_str()) {
                    true
                } else if FALSE_WORDS.contains(&word.as_str()) {
                    false
                } else {
                    word.parse::<i64>().map(|i| i != 0).unwrap_or(false)
                }
            }
            _ => false,
        }
    }

    pub fn coerce_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.is_finite() => Some(r.trunc() as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|r| r.is_finite())
                        .map(|r| r.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    pub fn coerce_double(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            _ => None,
        }
    }

    /// Absolute URLs parse directly; absolute paths become `file://` URLs.
    pub fn coerce_url(&self) -> Option<Url> {
        let Value::String(s) = self else {
            return None;
        };
        match Url::parse(s) {
            Ok(url) => Some(url),
            Err(_) if s.starts_with('/') => Url::from_file_path(s).ok(),
            Err(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dictionary(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<&Url> for Value {
    fn from(url: &Url) -> Self {
        Value::String(url.as_str().to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Dictionary(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_coercion_table() {
        for truthy in ["yes", "on", "1", " TRUE ", "Y", "-7"] {
            assert!(Value::from(truthy).coerce_bool(), "{truthy:?} should be true");
        }
        for falsy in ["no", "off", "0", "false", "N", "maybe", "", "1.5"] {
            assert!(!Value::from(falsy).coerce_bool(), "{falsy:?} should be false");
        }

        assert!(Value::Integer(3).coerce_bool());
        assert!(!Value::Integer(0).coerce_bool());
        assert!(Value::Real(0.25).coerce_bool());
        assert!(!Value::Real(0.0).coerce_bool());
        assert!(!Value::Data(vec![1]).coerce_bool());
        assert!(!Value::Array(vec![Value::Bool(true)]).coerce_bool());
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(Value::Integer(9).coerce_integer(), Some(9));
        assert_eq!(Value::Real(3.9).coerce_integer(), Some(3));
        assert_eq!(Value::Real(f64::NAN).coerce_integer(), None);
        assert_eq!(Value::Bool(true).coerce_integer(), Some(1));
        assert_eq!(Value::from(" 42 ").coerce_integer(), Some(42));
        assert_eq!(Value::from("2.5").coerce_integer(), Some(2));
        assert_eq!(Value::from("abc").coerce_integer(), None);
        assert_eq!(Value::Data(vec![]).coerce_integer(), None);
    }

    #[test]
    fn test_string_and_url_coercion() {
        assert_eq!(Value::Integer(7).coerce_string().as_deref(), Some("7"));
        assert_eq!(Value::Bool(true).coerce_string(), None);

        let url = Value::from("https://example.com/a").coerce_url().unwrap();
        assert_eq!(url.host_str(), Some("example.com"));

        let file = Value::from("/tmp/settings").coerce_url().unwrap();
        assert_eq!(file.scheme(), "file");
        assert_eq!(Value::from("relative/path").coerce_url(), None);
    }

    #[test]
    fn test_property_list_copy_accepts_nested_values() {
        let mut map = BTreeMap::new();
        map.insert("names".to_string(), Value::Array(vec!["a".into(), "b".into()]));
        map.insert("when".to_string(), Value::Date(Utc::now()));
        let value = Value::Dictionary(map);

        let copy = property_list_copy(&value, 1024).unwrap();
        assert_eq!(copy, value);
    }

    #[test]
    fn test_property_list_copy_rejects_opaque_anywhere() {
        let value = Value::Array(vec![Value::Integer(1), Value::opaque(std::time::Instant::now())]);
        assert!(matches!(
            property_list_copy(&value, 1024),
            Err(UnrepresentableValue::NotSerializable(_))
        ));
    }

    #[test]
    fn test_property_list_copy_enforces_limit() {
        let value = Value::Data(vec![0u8; 64]);
        assert!(matches!(
            property_list_copy(&value, 16),
            Err(UnrepresentableValue::TooLarge { limit: 16, .. })
        ));
    }

    #[test]
    fn test_reals_compare_by_bit_pattern() {
        assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_eq!(
            Value::Array(vec![Value::Real(f64::NAN)]),
            Value::Array(vec![Value::Real(f64::NAN)])
        );
        assert_ne!(Value::Real(0.0), Value::Real(-0.0));
        assert_ne!(Value::Real(1.0), Value::Integer(1));
    }

    #[test]
    fn test_opaque_compares_by_identity() {
        let a = Value::opaque(5u32);
        let b = Value::opaque(5u32);
        assert_eq!(a.clone(), a);
        assert_ne!(a, b);
        assert_eq!(a.kind(), "opaque");
    }
}
