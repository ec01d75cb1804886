//! Storage backend implementations.
//!
//! Each backend maps logical keys onto one physical medium and satisfies
//! the [`DocumentStore`](crate::DocumentStore) contract.

pub mod filesystem;
pub mod s3;

// Re-export the backends for convenience
pub use filesystem::FilesystemStore;
pub use s3::{S3Config, S3Store};
