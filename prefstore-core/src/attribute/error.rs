//! Attribute error types

use thiserror::Error;

/// Boxed error returned by coders and custom encode/decode functions
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AttributeError {
    /// A value could not be turned into its stored representation
    #[error("Failed to encode {key}: {reason}")]
    Encoding { key: String, reason: String },

    /// The stored raw value cannot be read back as the attribute's type
    #[error("Failed to decode {key}: {reason}")]
    Decoding { key: String, reason: String },

    /// The attribute was declared with an encoding its type does not allow
    #[error("Invalid declaration of {name}: {reason}")]
    Configuration { name: String, reason: String },
}

impl AttributeError {
    pub fn key(&self) -> &str {
        match self {
            AttributeError::Encoding { key, .. } | AttributeError::Decoding { key, .. } => key,
            AttributeError::Configuration { name, .. } => name,
        }
    }
}
