//! Namespaced document storage for downloaded data artifacts.
//!
//! This crate persists opaque byte payloads under caller-chosen string keys,
//! scoped to a namespace fixed at construction time, with interchangeable
//! backends behind one contract:
//!
//! - [`FilesystemStore`] — one file per key under a local directory
//! - [`S3Store`] — one object per key under a bucket prefix
//!
//! Callers pick a backend once, then use only the [`DocumentStore`] trait;
//! the two backends behave identically for every contract operation.
//!
//! # Example
//!
//! ```rust
//! use arkiv_store::{DocumentStore, FilesystemStore};
//!
//! # async fn example() -> arkiv_store::Result<()> {
//! let store: Box<dyn DocumentStore> = Box::new(FilesystemStore::new("./downloads")?);
//!
//! store.write("page-1.html", b"<html>...</html>").await?;
//! let body = store.read("page-1.html").await?;
//! assert_eq!(store.size("page-1.html").await?, body.len() as u64);
//!
//! for key in store.entries().await? {
//!     println!("{} -> {}", key, store.path(&key));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The store holds no cache and applies no retry policy: every call reaches
//! the medium, and transient failures come back as typed errors carrying
//! enough context ([`StoreError::Io`]) for the caller to drive retries.

pub mod backends;
pub mod error;
pub mod store;

// Re-export the main interface and types for easy access
pub use backends::{FilesystemStore, S3Config, S3Store};
pub use error::{FailedKey, Result, StoreError};
pub use store::DocumentStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "arkiv_store");
    }
}
