pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::HashMap;

use bytes::Bytes;

use crate::core::error::StoreError;

/// Textual form of an empty manifest. GET of an absent manifest key is
/// normalized to this so that a folder with no manifest reads as an empty
/// sequence rather than an error.
pub const EMPTY_LIST_TEXT: &str = "[]";

// ---------------------------------------------------------------------------
// BlobStore trait
// ---------------------------------------------------------------------------

/// Trait-based abstraction over the object store.
///
/// The production implementation (`S3BlobStore`) wraps `aws-sdk-s3`; tests
/// and the development backend use `InMemoryBlobStore` without external
/// dependencies. The gateway owns no domain state, it is a stateless
/// transport over put/get/list-by-prefix primitives.
pub trait BlobStore: Send + Sync {
    /// Write an object. Overwrites unconditionally.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        user_metadata: HashMap<String, String>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Write an object only if its current version token matches.
    ///
    /// `expected = None` requires the key to not exist yet (create-only);
    /// `Some(token)` requires the stored version to match. Returns the new
    /// version token. Fails with `StoreError::PreconditionFailed` when a
    /// concurrent writer got there first.
    fn put_if_version(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        expected: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String, StoreError>> + Send;

    /// Read an object as a UTF-8 string.
    ///
    /// An absent key yields [`EMPTY_LIST_TEXT`]; any other failure
    /// propagates.
    fn get_as_string(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<String, StoreError>> + Send;

    /// Read an object as a string together with its version token.
    ///
    /// An absent key yields `(EMPTY_LIST_TEXT, None)`.
    fn get_versioned(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(String, Option<String>), StoreError>> + Send;

    /// List object keys and common prefixes under a prefix.
    ///
    /// Common prefixes are the store's emulation of subdirectories: one
    /// entry per distinct segment between the prefix and the next
    /// delimiter. Expressed as prefix + delimiter only, never as a
    /// vendor-specific request shape.
    fn list_prefix(
        &self,
        prefix: &str,
        delimiter: &str,
    ) -> impl std::future::Future<Output = Result<ListResult, StoreError>> + Send;

    /// Public URL for a stored object.
    fn public_url(&self, key: &str) -> String;
}

// ---------------------------------------------------------------------------
// Listing types
// ---------------------------------------------------------------------------

/// Output of a prefix/delimiter listing.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

impl ListResult {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.common_prefixes.is_empty()
    }
}
