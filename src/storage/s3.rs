use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::config::StorageConfig;
use crate::core::error::StoreError;

use super::{BlobStore, ListResult, EMPTY_LIST_TEXT};

// ---------------------------------------------------------------------------
// Retry constants
// ---------------------------------------------------------------------------

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

// ---------------------------------------------------------------------------
// S3BlobStore
// ---------------------------------------------------------------------------

/// Production storage backend wrapping `aws-sdk-s3`.
///
/// Supports both AWS S3 and S3-compatible stores (MinIO, DigitalOcean
/// Spaces, etc.) via configurable endpoint and path-style addressing.
/// Conditional writes map to the store's If-Match / If-None-Match
/// preconditions on PUT.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    endpoint: String,
    region: String,
    path_style: bool,
}

impl S3BlobStore {
    /// Create a new S3BlobStore from configuration.
    pub async fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "playbox-config",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.path_style)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(Duration::from_secs(config.request_timeout_secs))
                    .build(),
            );

        if !config.endpoint.is_empty() {
            s3_config_builder = s3_config_builder.endpoint_url(&config.endpoint);
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            path_style: config.path_style,
        })
    }

    /// Execute a PUT with retry and exponential backoff.
    async fn put_with_retry(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        user_metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * (1 << (attempt - 1)));
                debug!(key, attempt, backoff_ms = backoff.as_millis(), "retrying S3 PUT");
                tokio::time::sleep(backoff).await;
            }

            let mut req = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body.clone()))
                .content_type(content_type);
            for (name, value) in user_metadata {
                req = req.metadata(name, value);
            }

            match req.send().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    let err_str = e.to_string();
                    // Don't retry 403 (forbidden), likely misconfigured credentials
                    if err_str.contains("403") || err_str.contains("Forbidden") {
                        return Err(StoreError::PutFailed {
                            key: key.to_string(),
                            reason: format!("forbidden (credentials issue): {}", err_str),
                        });
                    }
                    warn!(key, attempt, error = %err_str, "S3 PUT failed");
                }
            }
        }

        Err(StoreError::RetriesExhausted {
            key: key.to_string(),
        })
    }

    /// Execute a GET, collecting the body as a string with its etag.
    ///
    /// A missing key is not an error here: the manifest contract normalizes
    /// "not found" to the empty-list text.
    async fn get_with_retry(&self, key: &str) -> Result<(String, Option<String>), StoreError> {
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * (1 << (attempt - 1)));
                tokio::time::sleep(backoff).await;
            }

            match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => {
                    let etag = output.e_tag.clone();
                    let body_bytes = output
                        .body
                        .collect()
                        .await
                        .map_err(|e| StoreError::GetFailed {
                            key: key.to_string(),
                            reason: e.to_string(),
                        })?
                        .into_bytes();

                    let text =
                        String::from_utf8(body_bytes.to_vec()).map_err(|e| StoreError::GetFailed {
                            key: key.to_string(),
                            reason: format!("object is not valid UTF-8: {}", e),
                        })?;

                    return Ok((text, etag));
                }
                Err(e) => {
                    let err_str = e.to_string();
                    // Don't retry 404: the object doesn't exist, which the
                    // manifest contract maps to an empty list.
                    if err_str.contains("NoSuchKey") || err_str.contains("404") {
                        return Ok((EMPTY_LIST_TEXT.to_string(), None));
                    }
                    if err_str.contains("403") || err_str.contains("Forbidden") {
                        return Err(StoreError::GetFailed {
                            key: key.to_string(),
                            reason: format!("forbidden: {}", err_str),
                        });
                    }
                    warn!(key, attempt, error = %err_str, "S3 GET failed");
                }
            }
        }

        Err(StoreError::RetriesExhausted {
            key: key.to_string(),
        })
    }
}

impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        user_metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        self.put_with_retry(key, data, content_type, &user_metadata)
            .await
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type);

        // S3 conditional writes: If-None-Match: * for create-only,
        // If-Match: <etag> for replace-if-unchanged.
        req = match expected {
            None => req.if_none_match("*"),
            Some(etag) => req.if_match(etag),
        };

        match req.send().await {
            Ok(output) => Ok(output.e_tag.unwrap_or_default()),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("PreconditionFailed")
                    || err_str.contains("412")
                    || err_str.contains("ConditionalRequestConflict")
                {
                    return Err(StoreError::PreconditionFailed {
                        key: key.to_string(),
                    });
                }
                Err(StoreError::PutFailed {
                    key: key.to_string(),
                    reason: err_str,
                })
            }
        }
    }

    async fn get_as_string(&self, key: &str) -> Result<String, StoreError> {
        let (text, _) = self.get_with_retry(key).await?;
        Ok(text)
    }

    async fn get_versioned(&self, key: &str) -> Result<(String, Option<String>), StoreError> {
        self.get_with_retry(key).await
    }

    async fn list_prefix(&self, prefix: &str, delimiter: &str) -> Result<ListResult, StoreError> {
        let mut result = ListResult::default();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter(delimiter);

            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let output = req.send().await.map_err(|e| StoreError::ListFailed {
                prefix: prefix.to_string(),
                reason: e.to_string(),
            })?;

            if let Some(contents) = output.contents {
                for obj in contents {
                    if let Some(key) = obj.key {
                        result.keys.push(key);
                    }
                }
            }
            if let Some(prefixes) = output.common_prefixes {
                for p in prefixes {
                    if let Some(prefix) = p.prefix {
                        result.common_prefixes.push(prefix);
                    }
                }
            }

            if output.is_truncated.unwrap_or(false) {
                continuation_token = output.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(result)
    }

    fn public_url(&self, key: &str) -> String {
        if !self.endpoint.is_empty() && self.path_style {
            format!(
                "{}/{}/{}",
                self.endpoint.trim_end_matches('/'),
                self.bucket,
                key
            )
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StorageConfig;

    fn minio_config() -> StorageConfig {
        StorageConfig {
            backend: "s3".to_string(),
            endpoint: "http://localhost:9000".to_string(),
            bucket: "playbox-media".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            path_style: true,
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_new_applies_request_timeout_from_config() {
        let store = S3BlobStore::new(&minio_config()).await.unwrap();
        let timeout = store
            .client
            .config()
            .timeout_config()
            .and_then(|t| t.operation_attempt_timeout());
        assert_eq!(timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_public_url_path_style() {
        let store = S3BlobStore::new(&minio_config()).await.unwrap();
        assert_eq!(
            store.public_url("music/jazz/a.mp3"),
            "http://localhost:9000/playbox-media/music/jazz/a.mp3"
        );
    }

    #[tokio::test]
    async fn test_public_url_virtual_hosted() {
        let mut config = minio_config();
        config.endpoint = String::new();
        config.path_style = false;
        let store = S3BlobStore::new(&config).await.unwrap();
        assert_eq!(
            store.public_url("music/jazz/a.mp3"),
            "https://playbox-media.s3.us-east-1.amazonaws.com/music/jazz/a.mp3"
        );
    }
}
