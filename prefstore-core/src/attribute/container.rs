//! Attribute containers
//!
//! A container groups attributes under one key prefix and one store. Keys
//! are `prefix + separator + name`, or just `name` for an empty prefix.

use super::encoding::{CoderKind, Encoding};
use super::error::{AttributeError, CodecError};
use super::native::{is_native_type, NativeValue};
use super::{Attribute, OptionalAttribute};
use crate::config::NamespaceConfig;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Container {
    prefix: String,
    separator: String,
    store: Arc<dyn Store>,
}

impl Container {
    /// Container using the default `::` separator.
    pub fn new(prefix: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self::with_config(prefix, store, &NamespaceConfig::default())
    }

    pub fn with_config(
        prefix: impl Into<String>,
        store: Arc<dyn Store>,
        namespace: &NamespaceConfig,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            separator: namespace.separator.clone(),
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.prefix, self.separator, name)
        }
    }

    pub fn mandatory<T: NativeValue>(&self, name: &str, default: T) -> Attribute<T> {
        self.declare(name, Encoding::native(), default)
    }

    pub fn optional<T: NativeValue>(&self, name: &str) -> OptionalAttribute<T> {
        self.declare_optional(name, Encoding::native())
    }

    /// Attribute stored as a serde blob.
    ///
    /// Fails for store-native types, which must use [`Container::mandatory`].
    pub fn mandatory_coded<T>(
        &self,
        name: &str,
        default: T,
        kind: CoderKind,
    ) -> Result<Attribute<T>, AttributeError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.reject_native::<T>(name, kind.as_str())?;
        Ok(self.declare(name, Encoding::coder(kind), default))
    }

    pub fn optional_coded<T>(
        &self,
        name: &str,
        kind: CoderKind,
    ) -> Result<OptionalAttribute<T>, AttributeError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.reject_native::<T>(name, kind.as_str())?;
        Ok(self.declare_optional(name, Encoding::coder(kind)))
    }

    pub fn mandatory_custom<T, E, D>(
        &self,
        name: &str,
        default: T,
        encode: E,
        decode: D,
    ) -> Result<Attribute<T>, AttributeError>
    where
        T: Clone + Send + Sync + 'static,
        E: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.reject_native::<T>(name, "custom")?;
        Ok(self.declare(name, Encoding::custom(encode, decode), default))
    }

    pub fn optional_custom<T, E, D>(
        &self,
        name: &str,
        encode: E,
        decode: D,
    ) -> Result<OptionalAttribute<T>, AttributeError>
    where
        T: Clone + Send + Sync + 'static,
        E: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.reject_native::<T>(name, "custom")?;
        Ok(self.declare_optional(name, Encoding::custom(encode, decode)))
    }

    fn declare<T>(&self, name: &str, encoding: Encoding<T>, default: T) -> Attribute<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Attribute::new(
            name.to_string(),
            self.key_for(name),
            self.store.clone(),
            encoding,
            default,
        )
    }

    fn declare_optional<T>(&self, name: &str, encoding: Encoding<T>) -> OptionalAttribute<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        OptionalAttribute::new(name.to_string(), self.key_for(name), self.store.clone(), encoding)
    }

    fn reject_native<T: 'static>(&self, name: &str, encoding: &str) -> Result<(), AttributeError> {
        if is_native_type::<T>() {
            return Err(AttributeError::Configuration {
                name: self.key_for(name),
                reason: format!(
                    "{} is store-native and cannot use the {encoding} encoding",
                    std::any::type_name::<T>()
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("prefix", &self.prefix)
            .field("separator", &self.separator)
            .finish()
    }
}
