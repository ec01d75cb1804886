//! The shared contract every storage backend implements.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// Uniform key-value contract over interchangeable storage backends.
///
/// Callers hold a `Box<dyn DocumentStore>` or `Arc<dyn DocumentStore>` and
/// never branch on which backend is behind it. Every call round-trips to the
/// physical medium; nothing is cached. Concurrent writes to the same key
/// race with last-physical-write-wins; operations on distinct keys do not
/// interfere.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check whether an entry exists for the key.
    ///
    /// A missing key is `Ok(false)`, never an error.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List every key currently stored under the namespace, with the
    /// namespace prefix stripped back off.
    ///
    /// A live scan of the medium. Best-effort with respect to concurrent
    /// writers: a key written or deleted mid-scan may or may not appear.
    async fn entries(&self) -> Result<HashSet<String>>;

    /// Read the full payload stored under the key.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Store the payload under the key, creating or overwriting.
    ///
    /// All-or-nothing: a failed write leaves no partial payload visible to
    /// [`exists`](Self::exists) or [`size`](Self::size).
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the entry for the key.
    ///
    /// Fails with [`StoreError::NotFound`] when the key is absent; callers
    /// wanting an idempotent delete check [`exists`](Self::exists) first.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Byte length of the payload stored under the key, taken from the
    /// medium's metadata rather than by reading the payload.
    async fn size(&self, key: &str) -> Result<u64>;

    /// Remove every entry under the namespace.
    ///
    /// A no-op on an empty namespace. When only some entries could be
    /// removed, fails with [`StoreError::PartialFailure`] naming the
    /// survivors so callers can retry just those.
    async fn clear(&self) -> Result<()>;

    /// The physical location the key maps to: `namespace + "/" + key`.
    /// Pure; exposed for diagnostics.
    fn path(&self, key: &str) -> String;
}

/// Name reserved inside every namespace for the store's own bookkeeping.
/// The filesystem backend stages in-flight writes under it; it is never a
/// valid key on any backend, so the contract stays uniform.
pub const STAGING_NAME: &str = ".staging";

/// Reject keys that could escape the namespace or collide with the store's
/// own bookkeeping.
///
/// Keys are otherwise opaque to the store; this is the only structure it
/// imposes on them.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key == "." || key == ".." {
        "key is a directory reference"
    } else if key.contains('/') || key.contains('\\') {
        "key contains a path separator"
    } else if key == STAGING_NAME {
        "key is reserved for store bookkeeping"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keys_pass_validation() {
        for key in ["report.csv", "a", "2024-06-01_dump.json", "..hidden", "with space"] {
            assert!(validate_key(key).is_ok(), "key {key:?} should be valid");
        }
    }

    #[test]
    fn test_traversal_and_separator_keys_are_rejected() {
        for key in ["", ".", "..", "a/b", "..\\b", "/etc/passwd", "../escape", ".staging"] {
            let err = validate_key(key).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidKey { .. }),
                "key {key:?} should be rejected, got {err:?}"
            );
        }
    }
}
