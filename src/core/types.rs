use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Manifest record
// ---------------------------------------------------------------------------

/// One asset as recorded in a folder's manifest.
///
/// Immutable once constructed. The wire format is fixed for compatibility
/// with existing manifests: the media type is serialized under the key
/// `"type"`, and `duration` is a placeholder that is always written as 0
/// (no media probing is performed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub duration: f64,
}

impl AssetEntry {
    /// Build the manifest entry for a freshly uploaded asset.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            media_type: media_type.into(),
            duration: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Upload input
// ---------------------------------------------------------------------------

/// One inbound file, as decoded from a multipart request by the API layer.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub data: Bytes,
    pub file_name: String,
    pub content_type: String,
}

// ---------------------------------------------------------------------------
// Album view
// ---------------------------------------------------------------------------

/// Ephemeral view of one folder: its subfolders and its manifest entries.
///
/// Assembled fresh on every read from a prefix listing plus the manifest;
/// never persisted. Lifetime is a single request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumView {
    pub sub_folders: Vec<String>,
    pub path: String,
    pub assets: Vec<AssetEntry>,
}
