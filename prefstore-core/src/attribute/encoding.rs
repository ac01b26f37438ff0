//! Encoding strategies
//!
//! How an attribute's value becomes a store [`Value`] and back. The strategy
//! is picked once, when the attribute is declared:
//!
//! - `Native`: the value already is a store value; encode is a conversion,
//!   decode a coercing cast.
//! - `Coder`: serde serialization into an opaque [`Value::Data`] blob, as
//!   JSON or as a compact binary encoding.
//! - `Custom`: caller-supplied encode/decode functions producing a blob.

use super::error::{AttributeError, CodecError};
use super::native::NativeValue;
use crate::store::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Serialization formats for [`Encoding::Coder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoderKind {
    /// UTF-8 JSON, readable by any JSON decoder
    Json,
    /// bincode
    Binary,
}

impl CoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoderKind::Json => "json",
            CoderKind::Binary => "binary",
        }
    }
}

pub type EncodeFn<T> = Arc<dyn Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync>;
pub type DecodeFn<T> = Arc<dyn Fn(&[u8]) -> Result<T, CodecError> + Send + Sync>;

pub enum Encoding<T> {
    Native {
        to_value: fn(&T) -> Value,
        from_value: fn(&Value) -> Option<T>,
        collection: bool,
    },
    Coder {
        kind: CoderKind,
        encode: fn(&T) -> Result<Vec<u8>, CodecError>,
        decode: fn(&[u8]) -> Result<T, CodecError>,
    },
    Custom {
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    },
}

fn json_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

fn json_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn binary_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(value)?)
}

fn binary_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(bincode::deserialize(bytes)?)
}

impl<T: NativeValue> Encoding<T> {
    pub fn native() -> Self {
        Encoding::Native {
            to_value: T::to_value,
            from_value: T::from_value,
            collection: T::COLLECTION,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Encoding<T> {
    pub fn coder(kind: CoderKind) -> Self {
        match kind {
            CoderKind::Json => Encoding::Coder {
                kind,
                encode: json_encode::<T>,
                decode: json_decode::<T>,
            },
            CoderKind::Binary => Encoding::Coder {
                kind,
                encode: binary_encode::<T>,
                decode: binary_decode::<T>,
            },
        }
    }

    pub fn json() -> Self {
        Self::coder(CoderKind::Json)
    }

    pub fn binary() -> Self {
        Self::coder(CoderKind::Binary)
    }
}

impl<T> Encoding<T> {
    pub fn custom<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        Encoding::Custom {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Encoding::Native { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Encoding::Native { .. } => "native",
            Encoding::Coder { kind, .. } => kind.as_str(),
            Encoding::Custom { .. } => "custom",
        }
    }

    /// Stored representation of `value`.
    pub fn encode(&self, key: &str, value: &T) -> Result<Value, AttributeError> {
        let blob = match self {
            Encoding::Native { to_value, .. } => return Ok(to_value(value)),
            Encoding::Coder { encode, .. } => encode(value),
            Encoding::Custom { encode, .. } => encode(value),
        };
        blob.map(Value::Data).map_err(|e| AttributeError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Interpret a stored raw value.
    ///
    /// # Panics
    ///
    /// For native array and dictionary types a mismatching raw value means
    /// the store is corrupt, and this panics instead of returning an error.
    pub fn decode(&self, key: &str, raw: &Value) -> Result<T, AttributeError> {
        let decode_failure = |reason: String| AttributeError::Decoding {
            key: key.to_string(),
            reason,
        };

        let result = match self {
            Encoding::Native {
                from_value,
                collection,
                ..
            } => {
                return match from_value(raw) {
                    Some(value) => Ok(value),
                    None if *collection => {
                        panic!("stored {} at {key} does not match its collection type", raw.kind())
                    }
                    None => Err(decode_failure(format!(
                        "{} cannot be read as {}",
                        raw.kind(),
                        std::any::type_name::<T>()
                    ))),
                };
            }
            Encoding::Coder { decode, .. } => match raw.as_data() {
                Some(bytes) => decode(bytes),
                None => return Err(decode_failure(format!("expected data, found {}", raw.kind()))),
            },
            Encoding::Custom { decode, .. } => match raw.as_data() {
                Some(bytes) => decode(bytes),
                None => return Err(decode_failure(format!("expected data, found {}", raw.kind()))),
            },
        };
        result.map_err(|e| decode_failure(e.to_string()))
    }
}

impl<T> Clone for Encoding<T> {
    fn clone(&self) -> Self {
        match self {
            Encoding::Native {
                to_value,
                from_value,
                collection,
            } => Encoding::Native {
                to_value: *to_value,
                from_value: *from_value,
                collection: *collection,
            },
            Encoding::Coder {
                kind,
                encode,
                decode,
            } => Encoding::Coder {
                kind: *kind,
                encode: *encode,
                decode: *decode,
            },
            Encoding::Custom { encode, decode } => Encoding::Custom {
                encode: encode.clone(),
                decode: decode.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for Encoding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encoding::{}", self.label())
    }
}
