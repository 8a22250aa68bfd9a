//! Error types for tiercache operations

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Descriptor and configuration errors.
///
/// These are raised before any I/O happens and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Provider {provider_key} sets both a dynamic key and a dynamic key group")]
    DynamicKeyAndGroupBothSet { provider_key: String },

    #[error("Provider {provider_key} requests dynamic key eviction without a dynamic key")]
    MissingDynamicKey { provider_key: String },

    #[error("Provider {provider_key} requests group eviction without a dynamic key group")]
    MissingDynamicKeyGroup { provider_key: String },

    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Durable tier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to open persistence store: {reason}")]
    Open { reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Malformed record under {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io {
            reason: e.to_string(),
        }
    }
}

/// Master error type for cache requests.
///
/// `Clone` so a single coalesced load can hand the same failure to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Loader failed: {0}")]
    Loader(Arc<dyn StdError + Send + Sync>),
}

impl CacheError {
    /// Wrap an arbitrary loader failure.
    pub fn loader<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        CacheError::Loader(Arc::from(error.into()))
    }

    /// The loader's own error, if this is a loader failure.
    ///
    /// Use `downcast_ref` on the result to recover the concrete type.
    pub fn loader_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            CacheError::Loader(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, CacheError::Configuration(_))
    }
}

/// Result type for cache requests.
pub type CacheResult<T> = Result<T, CacheError>;
