//! Reactive bridge errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// `subscribe` was called outside a tokio runtime
    #[error("No tokio runtime available to deliver publisher values")]
    NoRuntime,
}
