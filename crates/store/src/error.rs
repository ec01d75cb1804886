//! Error types for document store operations.

use thiserror::Error;

/// A key that a bulk removal could not delete, with the cause.
#[derive(Debug, Clone)]
pub struct FailedKey {
    pub key: String,
    pub cause: String,
}

/// Errors that can occur during document store operations.
///
/// Callers can tell "key never existed" ([`NotFound`](Self::NotFound)) apart
/// from "medium is broken" ([`Io`](Self::Io)) to decide whether a retry makes
/// sense. The store itself never retries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry exists for the key.
    #[error("no entry for key '{0}'")]
    NotFound(String),

    /// The key cannot be used with any backend.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A medium-level failure: disk, permissions, network, timeout.
    ///
    /// `key` is empty for namespace-wide operations such as listing.
    #[error("{operation} failed for '{key}': {source}")]
    Io {
        operation: &'static str,
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend session could not be established. Fatal to the store
    /// instance; construct a new one after fixing the configuration.
    #[error("cannot connect to storage backend: {0}")]
    Connection(String),

    /// A bulk removal succeeded for some keys and failed for others.
    /// `failed` names exactly the keys still present, so callers can
    /// retry just those.
    #[error("clear failed for {} of {attempted} entries", .failed.len())]
    PartialFailure {
        attempted: usize,
        failed: Vec<FailedKey>,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io<E>(operation: &'static str, key: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Io {
            operation,
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Medium failures and partial bulk removals are worth retrying from
    /// the caller's side; missing keys, rejected keys, and failed
    /// connections are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::Io { .. } | StoreError::PartialFailure { .. }
        )
    }
}
