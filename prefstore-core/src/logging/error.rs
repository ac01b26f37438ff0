//! Error types for the logging subsystem

use thiserror::Error;

/// Errors that can occur while setting up logging
#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed, or the filter is malformed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// The configured level is not one of trace/debug/info/warn/error
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),
}
