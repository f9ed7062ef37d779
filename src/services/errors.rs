use std::fmt::Display;

use thiserror::Error;

use crate::repositories::StoreError;

#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("{0}")]
    Validation(String),
    /// The record exists but is in the wrong lifecycle state; `current` is
    /// surfaced to the caller as-is.
    #[error("{message}")]
    State { message: String, current: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn state(message: impl Into<String>, current: impl Display) -> Self {
        Self::State { message: message.into(), current: current.to_string() }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::State { .. } => "state",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store",
        }
    }
}

pub(crate) type LifecycleResult<T> = Result<T, LifecycleError>;
