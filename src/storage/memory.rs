use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::core::error::StoreError;

use super::{BlobStore, ListResult, EMPTY_LIST_TEXT};

// ---------------------------------------------------------------------------
// InMemoryBlobStore
// ---------------------------------------------------------------------------

/// In-memory storage backend for unit tests and the development backend.
///
/// Stores all objects in a `HashMap<String, StoredObject>` behind a
/// `RwLock`. Version tokens come from a monotonic counter so conditional
/// writes behave like S3 etag preconditions.
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    version_counter: AtomicU64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    user_metadata: HashMap<String, String>,
    version: String,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            version_counter: AtomicU64::new(0),
        }
    }

    fn next_version(&self) -> String {
        let n = self.version_counter.fetch_add(1, Ordering::Relaxed);
        format!("\"v{}\"", n)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        user_metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let version = self.next_version();
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                user_metadata,
                version,
            },
        );
        Ok(())
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let version = self.next_version();
        let mut objects = self.objects.write().await;
        let current = objects.get(key).map(|obj| obj.version.as_str());
        if current != expected {
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
            });
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                user_metadata: HashMap::new(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn get_as_string(&self, key: &str) -> Result<String, StoreError> {
        let (text, _) = self.get_versioned(key).await?;
        Ok(text)
    }

    async fn get_versioned(&self, key: &str) -> Result<(String, Option<String>), StoreError> {
        let objects = self.objects.read().await;
        match objects.get(key) {
            None => Ok((EMPTY_LIST_TEXT.to_string(), None)),
            Some(obj) => {
                let text = String::from_utf8(obj.data.to_vec()).map_err(|e| {
                    StoreError::GetFailed {
                        key: key.to_string(),
                        reason: format!("object is not valid UTF-8: {}", e),
                    }
                })?;
                Ok((text, Some(obj.version.clone())))
            }
        }
    }

    async fn list_prefix(&self, prefix: &str, delimiter: &str) -> Result<ListResult, StoreError> {
        let objects = self.objects.read().await;
        let mut keys = Vec::new();
        let mut common_prefixes = BTreeSet::new();

        for key in objects.keys() {
            let Some(remainder) = key.strip_prefix(prefix) else {
                continue;
            };
            match remainder.find(delimiter) {
                Some(idx) => {
                    let end = idx + delimiter.len();
                    common_prefixes.insert(format!("{}{}", prefix, &remainder[..end]));
                }
                None => keys.push(key.clone()),
            }
        }

        keys.sort();
        Ok(ListResult {
            keys,
            common_prefixes: common_prefixes.into_iter().collect(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("mem://{}", key)
    }
}

#[cfg(test)]
impl InMemoryBlobStore {
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.content_type.clone())
    }

    pub async fn user_metadata_of(&self, key: &str) -> Option<HashMap<String, String>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.user_metadata.clone())
    }
}
