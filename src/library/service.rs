use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::{LibraryConfig, ManifestWriteMode};
use crate::core::error::{LibraryError, StoreError};
use crate::core::types::{AlbumView, AssetEntry, AssetUpload};
use crate::observability::metrics as obs;
use crate::storage::BlobStore;

use super::{codec, keys};

/// User-metadata key mirrored alongside the store-level content type.
const CONTENT_TYPE_KEY: &str = "Content-Type";

/// Content type of every manifest object.
const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Bounded retry for conditional manifest writes.
const MAX_CONDITIONAL_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// LibraryService
// ---------------------------------------------------------------------------

/// Orchestrates uploads, manifest read-merge-write, and album views.
///
/// The service holds no persistent state: the object store is the sole
/// source of truth and is read fully on every operation. The manifest for
/// a folder is maintained as a best-effort superset of the assets uploaded
/// under that folder's content prefix; see [`LibraryService::append_and_persist`]
/// for the consistency contract.
pub struct LibraryService<S> {
    store: Arc<S>,
    config: LibraryConfig,
}

impl<S: BlobStore> LibraryService<S> {
    pub fn new(store: Arc<S>, config: LibraryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn ensure_folder(folder: &str) -> Result<(), LibraryError> {
        if folder.trim().is_empty() {
            return Err(LibraryError::blank_folder());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Upload one asset into a folder and index it in the folder's manifest.
    ///
    /// Steps, in order and not atomic across steps:
    /// 1. PUT raw bytes at `music/{folder}/{file_name}`
    /// 2. build the manifest entry from the store's public URL
    /// 3. append the entry to the folder manifest and persist
    ///
    /// If step 1 succeeds and step 3 fails, the binary exists but is not
    /// indexed; there is no compensating rollback.
    pub async fn upload_asset(
        &self,
        upload: AssetUpload,
        folder: &str,
    ) -> Result<AssetEntry, LibraryError> {
        Self::ensure_folder(folder)?;
        if upload.data.is_empty() {
            return Err(LibraryError::InvalidArgument {
                reason: "file cannot be empty or null".to_string(),
            });
        }

        let key = keys::asset_key(folder, &upload.file_name);
        let size = upload.data.len();
        let user_metadata = HashMap::from([(
            CONTENT_TYPE_KEY.to_string(),
            upload.content_type.clone(),
        )]);

        self.store
            .put(&key, upload.data, &upload.content_type, user_metadata)
            .await
            .map_err(|e| {
                obs::inc_upload("error");
                LibraryError::UploadFailed {
                    reason: e.to_string(),
                }
            })?;

        let url = self.store.public_url(&key);
        let entry = AssetEntry::new(upload.file_name, url, upload.content_type);

        self.append_and_persist(entry.clone(), folder).await?;

        obs::inc_upload("ok");
        obs::record_upload_size(size as f64);
        info!(key, folder, size_bytes = size, "asset uploaded and indexed");

        Ok(entry)
    }

    /// Upload a batch of assets into one folder, strictly sequentially.
    ///
    /// There is no partial-batch rollback: a failure partway through leaves
    /// earlier items persisted and later ones unattempted, and the failing
    /// item's error propagates.
    pub async fn upload_many(
        &self,
        uploads: Vec<AssetUpload>,
        folder: &str,
    ) -> Result<Vec<AssetEntry>, LibraryError> {
        if uploads.is_empty() {
            return Err(LibraryError::InvalidArgument {
                reason: "batch cannot be empty".to_string(),
            });
        }

        let total = uploads.len();
        let mut entries = Vec::with_capacity(total);
        for (index, upload) in uploads.into_iter().enumerate() {
            match self.upload_asset(upload, folder).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        folder,
                        failed_index = index,
                        persisted = entries.len(),
                        total,
                        "batch upload aborted"
                    );
                    return Err(e);
                }
            }
        }
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Manifest read-merge-write
    // -----------------------------------------------------------------------

    /// Read a folder's manifest.
    ///
    /// A folder with no manifest object reads as an empty sequence, never
    /// an error: the store gateway normalizes "not found" to the empty-list
    /// text before decode.
    pub async fn read_manifest(&self, folder: &str) -> Result<Vec<AssetEntry>, LibraryError> {
        let key = keys::manifest_key(folder);
        let text = self.store.get_as_string(&key).await?;
        codec::decode_manifest(&text)
    }

    /// Append one entry to a folder's manifest and persist the result.
    ///
    /// In `last-write-wins` mode this is a plain read-modify-write with no
    /// version check: two concurrent appends to the same folder perform
    /// independent reads followed by independent overwrites, and the
    /// second write silently discards the first writer's addition. That
    /// lost-update window is a documented limitation of the historical
    /// layout, not a bug to paper over here.
    ///
    /// In `conditional` mode the write carries the version token observed
    /// at read time and is retried a bounded number of times on conflict,
    /// so both of two racing appends survive (or the loser surfaces
    /// [`LibraryError::ManifestConflict`]).
    pub async fn append_and_persist(
        &self,
        entry: AssetEntry,
        folder: &str,
    ) -> Result<(), LibraryError> {
        let key = keys::manifest_key(folder);

        match self.config.manifest_write_mode {
            ManifestWriteMode::LastWriteWins => {
                let mut entries = self.read_manifest(folder).await?;
                entries.push(entry);
                let text = codec::encode_manifest(&entries)?;
                self.store
                    .put(
                        &key,
                        text.into(),
                        MANIFEST_CONTENT_TYPE,
                        HashMap::from([(
                            CONTENT_TYPE_KEY.to_string(),
                            MANIFEST_CONTENT_TYPE.to_string(),
                        )]),
                    )
                    .await?;
                obs::inc_manifest_write("last-write-wins");
                Ok(())
            }
            ManifestWriteMode::Conditional => {
                for attempt in 0..MAX_CONDITIONAL_ATTEMPTS {
                    let (text, version) = self.store.get_versioned(&key).await?;
                    let mut entries = codec::decode_manifest(&text)?;
                    entries.push(entry.clone());
                    let text = codec::encode_manifest(&entries)?;

                    match self
                        .store
                        .put_if_version(&key, text.into(), MANIFEST_CONTENT_TYPE, version.as_deref())
                        .await
                    {
                        Ok(_) => {
                            obs::inc_manifest_write("conditional");
                            return Ok(());
                        }
                        Err(StoreError::PreconditionFailed { .. }) => {
                            obs::inc_manifest_conflict();
                            debug!(key, attempt, "manifest version conflict, re-reading");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(LibraryError::ManifestConflict {
                    folder: folder.to_string(),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Listings and album views
    // -----------------------------------------------------------------------

    /// List top-level folders from the store root.
    pub async fn list_all_top_level_folders(&self) -> Result<Vec<String>, LibraryError> {
        let listing = self
            .store
            .list_prefix(keys::TOP_LEVEL_PREFIX, keys::DELIMITER)
            .await?;
        Ok(listing
            .common_prefixes
            .iter()
            .map(|p| keys::strip_top_level_prefix(p))
            .collect())
    }

    /// List a folder's subfolders from the content prefix.
    ///
    /// An empty listing is reported as `ObjectNotFound` when
    /// `empty_subfolders_as_missing` is set (historical behavior, which
    /// conflates "folder does not exist" with "folder has files but no
    /// subfolders"); otherwise an empty list is returned.
    pub async fn list_sub_folders_by_folder(
        &self,
        folder: &str,
    ) -> Result<Vec<String>, LibraryError> {
        Self::ensure_folder(folder)?;
        let sub_folders = self.sub_folders_of(folder).await?;
        if sub_folders.is_empty() && self.config.empty_subfolders_as_missing {
            return Err(LibraryError::ObjectNotFound {
                path: folder.to_string(),
            });
        }
        Ok(sub_folders)
    }

    /// Assemble the album view for a folder: its subfolders plus the
    /// manifest's assets. Zero assets and zero subfolders yield an empty
    /// view rather than an error.
    pub async fn get_album(&self, folder: &str) -> Result<AlbumView, LibraryError> {
        Self::ensure_folder(folder)?;
        let assets = self.read_manifest(folder).await?;
        let sub_folders = self.sub_folders_of(folder).await?;
        Ok(AlbumView {
            sub_folders,
            path: folder.to_string(),
            assets,
        })
    }

    async fn sub_folders_of(&self, folder: &str) -> Result<Vec<String>, LibraryError> {
        let prefix = keys::subfolder_prefix(folder);
        let listing = self.store.list_prefix(&prefix, keys::DELIMITER).await?;
        Ok(listing
            .common_prefixes
            .iter()
            .map(|p| keys::strip_listing_prefix(p, &prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBlobStore;
    use crate::storage::ListResult;
    use bytes::Bytes;

    fn lww_config() -> LibraryConfig {
        LibraryConfig {
            manifest_write_mode: ManifestWriteMode::LastWriteWins,
            empty_subfolders_as_missing: true,
        }
    }

    fn service() -> LibraryService<InMemoryBlobStore> {
        LibraryService::new(Arc::new(InMemoryBlobStore::new()), lww_config())
    }

    fn upload(file_name: &str, content_type: &str) -> AssetUpload {
        AssetUpload {
            data: Bytes::from(vec![0xAB; 64]),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upload_then_read_manifest() {
        let svc = service();
        svc.upload_asset(upload("take-five.mp3", "audio/mpeg"), "jazz")
            .await
            .unwrap();

        let manifest = svc.read_manifest("jazz").await.unwrap();
        assert_eq!(manifest.len(), 1);
        let last = manifest.last().unwrap();
        assert_eq!(last.title, "take-five.mp3");
        assert_eq!(last.media_type, "audio/mpeg");
        assert_eq!(last.url, "mem://music/jazz/take-five.mp3");
        assert_eq!(last.duration, 0.0);
    }

    #[tokio::test]
    async fn test_upload_writes_asset_bytes_and_manifest_keys() {
        let svc = service();
        svc.upload_asset(upload("song.mp3", "audio/mpeg"), "rock/classic")
            .await
            .unwrap();

        let store = svc.store();
        assert!(store.exists("music/rock/classic/song.mp3").await);
        assert!(store.exists("content/rock/classic/classic.json").await);
        assert_eq!(
            store.content_type_of("content/rock/classic/classic.json").await,
            Some("application/json".to_string())
        );
        assert_eq!(
            store
                .user_metadata_of("music/rock/classic/song.mp3")
                .await
                .unwrap()
                .get("Content-Type")
                .map(String::as_str),
            Some("audio/mpeg")
        );
    }

    #[tokio::test]
    async fn test_read_manifest_without_object_is_empty() {
        let svc = service();
        let manifest = svc.read_manifest("nothing-here").await.unwrap();
        assert!(manifest.is_empty());
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let svc = service();
        let a = AssetEntry::new("a.mp3", "mem://music/jazz/a.mp3", "audio/mpeg");
        let b = AssetEntry::new("b.mp3", "mem://music/jazz/b.mp3", "audio/mpeg");

        svc.append_and_persist(a.clone(), "jazz").await.unwrap();
        svc.append_and_persist(b.clone(), "jazz").await.unwrap();

        assert_eq!(svc.read_manifest("jazz").await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_upload_blank_folder_rejected_without_writes() {
        let svc = service();
        for folder in ["", "   "] {
            let err = svc
                .upload_asset(upload("a.mp3", "audio/mpeg"), folder)
                .await
                .unwrap_err();
            assert!(matches!(err, LibraryError::InvalidArgument { .. }));
        }
        assert_eq!(svc.store().object_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_empty_content_rejected_without_writes() {
        let svc = service();
        let empty = AssetUpload {
            data: Bytes::new(),
            file_name: "a.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
        };
        let err = svc.upload_asset(empty, "jazz").await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument { .. }));
        assert_eq!(svc.store().object_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_many_empty_batch_rejected() {
        let svc = service();
        let err = svc.upload_many(Vec::new(), "jazz").await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_upload_many_sequential_order() {
        let svc = service();
        let entries = svc
            .upload_many(
                vec![upload("1.mp3", "audio/mpeg"), upload("2.mp3", "audio/mpeg")],
                "jazz",
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);

        let manifest = svc.read_manifest("jazz").await.unwrap();
        assert_eq!(manifest[0].title, "1.mp3");
        assert_eq!(manifest[1].title, "2.mp3");
    }

    #[tokio::test]
    async fn test_upload_many_aborts_on_first_failure() {
        let store = Arc::new(FailOn {
            inner: InMemoryBlobStore::new(),
            fail_key_marker: "boom",
        });
        let svc = LibraryService::new(store, lww_config());

        let err = svc
            .upload_many(
                vec![
                    upload("ok-1.mp3", "audio/mpeg"),
                    upload("boom.mp3", "audio/mpeg"),
                    upload("never.mp3", "audio/mpeg"),
                ],
                "jazz",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::UploadFailed { .. }));

        // The first item stays persisted, the third was never attempted.
        let manifest = svc.read_manifest("jazz").await.unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].title, "ok-1.mp3");
        assert!(!svc.store().inner.exists("music/jazz/never.mp3").await);
    }

    #[tokio::test]
    async fn test_list_sub_folders_strips_prefix() {
        let svc = service();
        let store = svc.store();
        for key in ["content/jazz/blue/x", "content/jazz/rock/y"] {
            store
                .put(key, Bytes::from("x"), "application/octet-stream", HashMap::new())
                .await
                .unwrap();
        }

        let folders = svc.list_sub_folders_by_folder("jazz").await.unwrap();
        assert_eq!(folders, vec!["blue", "rock"]);
    }

    #[tokio::test]
    async fn test_list_sub_folders_empty_is_not_found_by_default() {
        let svc = service();
        let err = svc.list_sub_folders_by_folder("ghost").await.unwrap_err();
        assert!(matches!(err, LibraryError::ObjectNotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_list_sub_folders_empty_can_be_lenient() {
        let svc = LibraryService::new(
            Arc::new(InMemoryBlobStore::new()),
            LibraryConfig {
                manifest_write_mode: ManifestWriteMode::LastWriteWins,
                empty_subfolders_as_missing: false,
            },
        );
        assert_eq!(
            svc.list_sub_folders_by_folder("ghost").await.unwrap(),
            Vec::<String>::new()
        );
    }

    #[tokio::test]
    async fn test_list_all_top_level_folders() {
        let svc = service();
        let store = svc.store();
        for key in ["/jazz/a", "/rock/b"] {
            store
                .put(key, Bytes::from("x"), "application/octet-stream", HashMap::new())
                .await
                .unwrap();
        }

        let folders = svc.list_all_top_level_folders().await.unwrap();
        assert_eq!(folders, vec!["jazz", "rock"]);
    }

    #[tokio::test]
    async fn test_get_album_empty_folder_is_empty_view() {
        let svc = service();
        let album = svc.get_album("jazz").await.unwrap();
        assert_eq!(album.path, "jazz");
        assert!(album.sub_folders.is_empty());
        assert!(album.assets.is_empty());
    }

    #[tokio::test]
    async fn test_get_album_combines_assets_and_subfolders() {
        let svc = service();
        svc.upload_asset(upload("a.mp3", "audio/mpeg"), "jazz")
            .await
            .unwrap();
        svc.store()
            .put(
                "content/jazz/blue/x",
                Bytes::from("x"),
                "application/octet-stream",
                HashMap::new(),
            )
            .await
            .unwrap();

        let album = svc.get_album("jazz").await.unwrap();
        assert_eq!(album.sub_folders, vec!["blue"]);
        assert_eq!(album.assets.len(), 1);
        assert_eq!(album.assets[0].title, "a.mp3");
    }

    #[tokio::test]
    async fn test_get_album_blank_folder_rejected() {
        let svc = service();
        let err = svc.get_album("  ").await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument { .. }));
    }

    // -- Write-mode behavior --

    /// Sequential appends are the only ordering last-write-wins guarantees:
    /// concurrent appends to the same folder may silently drop one entry,
    /// since each writer reads, merges, and overwrites independently.
    #[tokio::test]
    async fn test_last_write_wins_sequential_only_guarantee() {
        let svc = service();
        let a = AssetEntry::new("a.mp3", "u1", "audio/mpeg");
        let b = AssetEntry::new("b.mp3", "u2", "audio/mpeg");
        svc.append_and_persist(a, "jazz").await.unwrap();
        svc.append_and_persist(b, "jazz").await.unwrap();
        assert_eq!(svc.read_manifest("jazz").await.unwrap().len(), 2);
    }

    /// In last-write-wins mode a stale overwrite is accepted verbatim: the
    /// lost-update anomaly observable under concurrency, reproduced here
    /// deterministically.
    #[tokio::test]
    async fn test_last_write_wins_loses_interleaved_update() {
        let svc = service();
        let a = AssetEntry::new("a.mp3", "u1", "audio/mpeg");
        svc.append_and_persist(a, "jazz").await.unwrap();

        // A second writer overwrites the manifest with its own read result,
        // taken before our append landed.
        svc.store()
            .put(
                "content/jazz/jazz.json",
                Bytes::from(
                    codec::encode_manifest(&[AssetEntry::new("b.mp3", "u2", "audio/mpeg")]).unwrap(),
                ),
                MANIFEST_CONTENT_TYPE,
                HashMap::new(),
            )
            .await
            .unwrap();

        let manifest = svc.read_manifest("jazz").await.unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].title, "b.mp3");
    }

    #[tokio::test]
    async fn test_conditional_mode_retries_past_conflict_and_keeps_both() {
        let store = Arc::new(ConflictOnce::new());
        let svc = LibraryService::new(
            store,
            LibraryConfig {
                manifest_write_mode: ManifestWriteMode::Conditional,
                empty_subfolders_as_missing: true,
            },
        );

        let a = AssetEntry::new("a.mp3", "u1", "audio/mpeg");
        let b = AssetEntry::new("b.mp3", "u2", "audio/mpeg");
        svc.append_and_persist(a, "jazz").await.unwrap();
        // This append hits one injected conflict, re-reads, and succeeds.
        svc.append_and_persist(b, "jazz").await.unwrap();

        let manifest = svc.read_manifest("jazz").await.unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].title, "a.mp3");
        assert_eq!(manifest[1].title, "b.mp3");
    }

    // -----------------------------------------------------------------------
    // Test store doubles
    // -----------------------------------------------------------------------

    /// Delegating store whose PUT fails for keys containing a marker.
    struct FailOn {
        inner: InMemoryBlobStore,
        fail_key_marker: &'static str,
    }

    impl BlobStore for FailOn {
        async fn put(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
            user_metadata: HashMap<String, String>,
        ) -> Result<(), StoreError> {
            if key.contains(self.fail_key_marker) {
                return Err(StoreError::PutFailed {
                    key: key.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.inner.put(key, data, content_type, user_metadata).await
        }

        async fn put_if_version(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
            expected: Option<&str>,
        ) -> Result<String, StoreError> {
            self.inner.put_if_version(key, data, content_type, expected).await
        }

        async fn get_as_string(&self, key: &str) -> Result<String, StoreError> {
            self.inner.get_as_string(key).await
        }

        async fn get_versioned(&self, key: &str) -> Result<(String, Option<String>), StoreError> {
            self.inner.get_versioned(key).await
        }

        async fn list_prefix(&self, prefix: &str, delimiter: &str) -> Result<ListResult, StoreError> {
            self.inner.list_prefix(prefix, delimiter).await
        }

        fn public_url(&self, key: &str) -> String {
            self.inner.public_url(key)
        }
    }

    /// Delegating store whose first conditional write fails with a
    /// precondition conflict, as if another writer had won the race.
    struct ConflictOnce {
        inner: InMemoryBlobStore,
        tripped: std::sync::atomic::AtomicBool,
    }

    impl ConflictOnce {
        fn new() -> Self {
            Self {
                inner: InMemoryBlobStore::new(),
                tripped: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    impl BlobStore for ConflictOnce {
        async fn put(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
            user_metadata: HashMap<String, String>,
        ) -> Result<(), StoreError> {
            self.inner.put(key, data, content_type, user_metadata).await
        }

        async fn put_if_version(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
            expected: Option<&str>,
        ) -> Result<String, StoreError> {
            // Inject one conflict on the second manifest write.
            if expected.is_some()
                && !self.tripped.swap(true, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(StoreError::PreconditionFailed {
                    key: key.to_string(),
                });
            }
            self.inner.put_if_version(key, data, content_type, expected).await
        }

        async fn get_as_string(&self, key: &str) -> Result<String, StoreError> {
            self.inner.get_as_string(key).await
        }

        async fn get_versioned(&self, key: &str) -> Result<(String, Option<String>), StoreError> {
            self.inner.get_versioned(key).await
        }

        async fn list_prefix(&self, prefix: &str, delimiter: &str) -> Result<ListResult, StoreError> {
            self.inner.list_prefix(prefix, delimiter).await
        }

        fn public_url(&self, key: &str) -> String {
            self.inner.public_url(key)
        }
    }
}
