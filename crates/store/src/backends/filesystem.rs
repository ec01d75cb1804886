//! Local-filesystem storage backend.

use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{FailedKey, Result, StoreError};
use crate::store::{validate_key, DocumentStore, STAGING_NAME};

/// Filesystem-backed document store.
///
/// Each key maps 1:1 to a regular file directly under the namespace
/// directory; subdirectories are neither created nor scanned. The directory
/// must exist before the store is opened — callers own its lifecycle.
///
/// Writes are staged as temporary files under a reserved
/// [`.staging`](STAGING_NAME) subdirectory and renamed into place, so a
/// failed or in-flight write is never visible at the key's path and never
/// shows up in [`entries`](DocumentStore::entries) as a phantom key.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Open a store over an existing namespace directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::io(
                "open",
                root.display().to_string(),
                std::io::Error::new(
                    ErrorKind::NotFound,
                    "namespace directory does not exist",
                ),
            ));
        }
        Ok(Self { root })
    }

    /// The namespace directory this store is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl DocumentStore for FilesystemStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match fs::metadata(self.file_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io("stat", key, err)),
        }
    }

    async fn entries(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io("list", "", e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io("list", "", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io("list", "", e))?;
            // Skips subdirectories, the staging directory among them.
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    keys.insert(name);
                }
                Err(name) => {
                    warn!(name = ?name, "skipping non-UTF-8 file name in namespace");
                }
            }
        }

        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        match fs::read(self.file_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => {
                // A directory squatting on the key's name is not an entry;
                // report it the way exists() and size() do.
                match fs::metadata(self.file_path(key)).await {
                    Ok(meta) if !meta.is_file() => Err(StoreError::NotFound(key.to_string())),
                    _ => Err(StoreError::io("read", key, err)),
                }
            }
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        debug!(key, bytes = value.len(), "writing file");

        let staging = self.root.join(STAGING_NAME);
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| StoreError::io("write", key, e))?;

        // The temp file and the rename are blocking calls; keep them off the
        // runtime threads. Staging inside the root keeps the rename on one
        // filesystem, so it is atomic; a failed write drops the temp file
        // without ever touching the key's path.
        let target = self.file_path(key);
        let payload = value.to_vec();
        let staged_write = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staged = NamedTempFile::new_in(&staging)?;
            staged.write_all(&payload)?;
            staged.persist(target).map_err(|e| e.error)?;
            Ok(())
        })
        .await;

        match staged_write {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(StoreError::io("write", key, err)),
            Err(join_err) => Err(StoreError::io("write", key, join_err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::io("delete", key, err)),
        }
    }

    async fn size(&self, key: &str) -> Result<u64> {
        validate_key(key)?;
        match fs::metadata(self.file_path(key)).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StoreError::NotFound(key.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::io("stat", key, err)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.entries().await?;
        let attempted = keys.len();
        let mut failed = Vec::new();

        for key in keys {
            if let Err(err) = fs::remove_file(self.file_path(&key)).await {
                // Deleted under us between the scan and now counts as gone.
                if err.kind() != ErrorKind::NotFound {
                    failed.push(FailedKey {
                        key,
                        cause: err.to_string(),
                    });
                }
            }
        }

        if failed.is_empty() {
            debug!(removed = attempted, root = %self.root.display(), "cleared namespace");
            Ok(())
        } else {
            warn!(
                failed = failed.len(),
                attempted, "clear left entries behind"
            );
            Err(StoreError::PartialFailure { attempted, failed })
        }
    }

    fn path(&self, key: &str) -> String {
        self.file_path(key).display().to_string()
    }
}
