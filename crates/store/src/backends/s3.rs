//! S3 object-storage backend.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::{debug, warn};

use crate::error::{FailedKey, Result, StoreError};
use crate::store::{validate_key, DocumentStore};

const DEFAULT_REGION: &str = "us-east-1";

/// The service rejects DeleteObjects batches above this size.
const MAX_BULK_DELETE: usize = 1000;

/// Construction parameters for [`S3Store`].
#[derive(Clone)]
pub struct S3Config {
    /// Bucket holding the namespace.
    pub bucket: String,
    /// Key prefix every logical key lives under. May be empty to use the
    /// whole bucket as the namespace.
    pub prefix: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Service region. Defaults to `us-east-1`.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, localstack, ...).
    pub endpoint_url: Option<String>,
    /// Use path-style addressing (`host/bucket/key`) instead of
    /// virtual-hosted buckets. Most S3-compatible services require it.
    pub force_path_style: bool,
    /// Per-request deadline. Expiry surfaces as [`StoreError::Io`], the
    /// store never hangs indefinitely on a stuck request.
    pub operation_timeout: Option<Duration>,
}

impl S3Config {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
            operation_timeout: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_path_style(mut self) -> Self {
        self.force_path_style = true;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// S3-backed document store.
///
/// Each key maps to the object `prefix/key` inside the configured bucket.
/// Every operation is one (occasionally two) service request; nothing is
/// cached and nothing is retried — transient failures surface as
/// [`StoreError::Io`] with the operation, the key, and the SDK error as
/// source, so the caller owns the retry policy.
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Build a client from static credentials and verify the bucket is
    /// reachable. A failed probe is fatal to the instance: fix the
    /// configuration and connect again.
    pub async fn connect(config: S3Config) -> Result<Self> {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "arkiv-static",
        );
        let region = Region::new(
            config
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);
        if let Some(url) = &config.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        if let Some(timeout) = config.operation_timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }
        let client = Client::from_conf(builder.build());

        client
            .head_bucket()
            .bucket(&config.bucket)
            .send()
            .await
            .map_err(|err| {
                StoreError::Connection(format!(
                    "bucket '{}' unreachable: {}",
                    config.bucket,
                    DisplayErrorContext(&err)
                ))
            })?;
        debug!(bucket = %config.bucket, prefix = %config.prefix, "connected to object storage");

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix.trim_matches('/').to_string(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        join_prefix(&self.prefix, key)
    }

    /// Listing prefix with a trailing separator, so the namespace `reports`
    /// never matches objects under `reports-archive`.
    fn listing_prefix(&self) -> Option<String> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(format!("{}/", self.prefix))
        }
    }
}

fn join_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Map an object name back to its logical key. `None` when the object does
/// not belong to the namespace mapping (wrong prefix, or the bare prefix
/// marker itself).
fn logical_key(prefix: &str, object_key: &str) -> Option<String> {
    let key = if prefix.is_empty() {
        object_key
    } else {
        object_key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

#[async_trait]
impl DocumentStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        // Metadata-only check, no payload transfer.
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(StoreError::io("head", key, err)),
        }
    }

    async fn entries(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(self.listing_prefix())
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::io("list", "", e))?;
            for object in page.contents() {
                let Some(name) = object.key() else { continue };
                match logical_key(&self.prefix, name) {
                    Some(key) => {
                        keys.insert(key);
                    }
                    None => warn!(object = name, "object outside namespace mapping, skipped"),
                }
            }
        }

        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(StoreError::io("get", key, err)),
        };

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::io("get", key, e))?;
        Ok(body.to_vec())
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        debug!(key, bytes = value.len(), "putting object");

        // Single-shot put: the object becomes visible only once the service
        // has the complete payload.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .content_length(value.len() as i64)
            .body(ByteStream::from(value.to_vec()))
            .send()
            .await
            .map_err(|e| StoreError::io("put", key, e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // DeleteObject is silently idempotent on the service side; the
        // contract is not, so probe first.
        if !self.exists(key).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| StoreError::io("delete", key, e))?;
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<u64> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(head) => Ok(head.content_length().unwrap_or(0) as u64),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::io("head", key, err)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let keys: Vec<String> = self.entries().await?.into_iter().collect();
        if keys.is_empty() {
            return Ok(());
        }
        let attempted = keys.len();
        let mut failed = Vec::new();

        for chunk in keys.chunks(MAX_BULK_DELETE) {
            let mut objects = Vec::with_capacity(chunk.len());
            for key in chunk {
                objects.push(
                    ObjectIdentifier::builder()
                        .key(self.object_key(key))
                        .build()
                        .map_err(|e| StoreError::io("clear", key.as_str(), e))?,
                );
            }
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StoreError::io("clear", "", e))?;

            match self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
            {
                Ok(out) => {
                    for err in out.errors() {
                        let object_key = err.key().unwrap_or_default();
                        failed.push(FailedKey {
                            key: logical_key(&self.prefix, object_key)
                                .unwrap_or_else(|| object_key.to_string()),
                            cause: format!(
                                "{}: {}",
                                err.code().unwrap_or("unknown"),
                                err.message().unwrap_or("")
                            ),
                        });
                    }
                }
                Err(err) => {
                    // The whole batch failed; every key in it is still there.
                    let cause = DisplayErrorContext(&err).to_string();
                    failed.extend(chunk.iter().map(|key| FailedKey {
                        key: key.clone(),
                        cause: cause.clone(),
                    }));
                }
            }
        }

        if failed.is_empty() {
            debug!(removed = attempted, bucket = %self.bucket, "cleared namespace");
            Ok(())
        } else {
            warn!(
                failed = failed.len(),
                attempted, "clear left objects behind"
            );
            Err(StoreError::PartialFailure { attempted, failed })
        }
    }

    fn path(&self, key: &str) -> String {
        self.object_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
    use aws_sdk_s3::types::Object;
    use aws_smithy_mocks::{mock, mock_client, RuleMode};

    fn object(key: &str) -> Object {
        Object::builder().key(key).build()
    }

    #[tokio::test]
    async fn test_entries_follow_every_listing_page() {
        // The service truncates at its page size; enumeration must walk
        // every page and return each key exactly once.
        let first_page = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token().is_none())
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .set_contents(Some(vec![
                        object("downloads/a"),
                        object("downloads/b"),
                    ]))
                    .is_truncated(true)
                    .next_continuation_token("page-2")
                    .build()
            });
        let second_page = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token() == Some("page-2"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .set_contents(Some(vec![
                        object("downloads/c"),
                        object("downloads/d"),
                    ]))
                    .is_truncated(false)
                    .build()
            });

        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&first_page, &second_page]);
        let store = S3Store {
            client,
            bucket: "bucket".to_string(),
            prefix: "downloads".to_string(),
        };

        let keys = store.entries().await.unwrap();
        assert_eq!(
            keys,
            HashSet::from([
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
            ])
        );
        assert_eq!(first_page.num_calls(), 1);
        assert_eq!(second_page.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_entries_request_uses_terminated_prefix() {
        // Sibling namespaces like `downloads-archive` must not be swept in:
        // the listing asks the service for `downloads/`, not `downloads`.
        let listing = mock!(Client::list_objects_v2)
            .match_requests(|req| req.prefix() == Some("downloads/"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .set_contents(Some(vec![object("downloads/only")]))
                    .is_truncated(false)
                    .build()
            });

        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&listing]);
        let store = S3Store {
            client,
            bucket: "bucket".to_string(),
            prefix: "downloads".to_string(),
        };

        let keys = store.entries().await.unwrap();
        assert_eq!(keys, HashSet::from(["only".to_string()]));
    }

    #[test]
    fn test_join_prefix_handles_empty_namespace() {
        assert_eq!(join_prefix("downloads", "page.html"), "downloads/page.html");
        assert_eq!(join_prefix("", "page.html"), "page.html");
    }

    #[test]
    fn test_logical_key_is_the_inverse_of_join_for_valid_keys() {
        for prefix in ["", "downloads", "a/b"] {
            for key in ["page.html", "2024-report.csv"] {
                let object = join_prefix(prefix, key);
                assert_eq!(logical_key(prefix, &object).as_deref(), Some(key));
            }
        }
    }

    #[test]
    fn test_logical_key_rejects_foreign_objects() {
        // Sibling prefix, bare marker, and empty remainder never map back.
        assert_eq!(logical_key("downloads", "downloads-old/page"), None);
        assert_eq!(logical_key("downloads", "downloads"), None);
        assert_eq!(logical_key("downloads", "downloads/"), None);
        assert_eq!(logical_key("downloads", "other/page"), None);
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let config = S3Config::new("bucket", "prefix", "AKIAEXAMPLE", "super-secret")
            .with_region("eu-west-1")
            .with_path_style();

        let rendered = format!("{config:?}");
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_config_defaults() {
        let config = S3Config::new("b", "p", "id", "secret");
        assert!(config.region.is_none());
        assert!(config.endpoint_url.is_none());
        assert!(!config.force_path_style);
        assert!(config.operation_timeout.is_none());
    }
}
