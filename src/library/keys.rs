//! Deterministic key and path construction rules.
//!
//! These string formats are the persisted layout of the library and must be
//! reproduced exactly: existing stores hold manifests and assets under
//! these keys, so any change here orphans data.

/// Namespace prefix for raw asset bytes.
pub const MUSIC_PREFIX: &str = "music";

/// Namespace prefix for folder manifests and folder structure.
pub const CONTENT_PREFIX: &str = "content";

/// Delimiter used for every prefix listing.
pub const DELIMITER: &str = "/";

/// Prefix used when listing top-level folders.
///
/// Carried over verbatim from the original layout: listings are rooted at
/// `/` even though keys written by the upload path have no leading slash.
pub const TOP_LEVEL_PREFIX: &str = "/";

/// Manifest file suffix.
const JSON_SUFFIX: &str = ".json";

/// Key for an asset's raw bytes: `music/{folder}/{file_name}`.
pub fn asset_key(folder: &str, file_name: &str) -> String {
    format!("{}/{}/{}", MUSIC_PREFIX, folder, file_name)
}

/// Key for a folder's manifest: `content/{folder}/{last_segment}.json`.
pub fn manifest_key(folder: &str) -> String {
    format!(
        "{}/{}/{}{}",
        CONTENT_PREFIX,
        folder,
        last_segment(folder),
        JSON_SUFFIX
    )
}

/// Listing prefix for a folder's subfolders: `content/{folder}/`.
pub fn subfolder_prefix(folder: &str) -> String {
    format!("{}/{}/", CONTENT_PREFIX, folder)
}

/// The substring after the final `/` in a folder path, or the whole path
/// if it contains none.
pub fn last_segment(folder: &str) -> &str {
    match folder.rfind('/') {
        Some(idx) => &folder[idx + 1..],
        None => folder,
    }
}

/// Shape one common prefix from a subfolder listing into a folder name:
/// strip the shared listing prefix, then one trailing delimiter.
///
/// Under prefix `content/jazz/`, the common prefix `content/jazz/blue/`
/// becomes `blue`.
pub fn strip_listing_prefix(common_prefix: &str, listing_prefix: &str) -> String {
    let stripped = common_prefix
        .strip_prefix(listing_prefix)
        .unwrap_or(common_prefix);
    stripped.strip_suffix('/').unwrap_or(stripped).to_string()
}

/// Shape one top-level common prefix into a folder name by removing every
/// delimiter.
pub fn strip_top_level_prefix(common_prefix: &str) -> String {
    common_prefix.replace('/', "")
}
