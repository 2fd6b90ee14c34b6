use thiserror::Error;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors originating from the blob store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PUT failed for key {key}: {reason}")]
    PutFailed { key: String, reason: String },

    #[error("GET failed for key {key}: {reason}")]
    GetFailed { key: String, reason: String },

    #[error("LIST failed for prefix {prefix}: {reason}")]
    ListFailed { prefix: String, reason: String },

    #[error("precondition failed for key {key}: version token did not match")]
    PreconditionFailed { key: String },

    #[error("retries exhausted for key {key}")]
    RetriesExhausted { key: String },
}

// ---------------------------------------------------------------------------
// Library errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the library service.
///
/// There is no recovery or retry loop in the service itself; every failure
/// propagates to the API layer, which maps it to a transport status code
/// via [`LibraryError::status_code`].
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("{path} not found")]
    ObjectNotFound { path: String },

    #[error("failed to upload file: {reason}")]
    UploadFailed { reason: String },

    #[error("failed to decode manifest: {reason}")]
    ConversionFailed { reason: String },

    #[error("failed to encode manifest: {reason}")]
    SerializationFailed { reason: String },

    #[error("manifest update conflict for folder {folder}: concurrent writers")]
    ManifestConflict { folder: String },

    #[error("storage backend error: {0}")]
    Store(#[from] StoreError),
}

impl LibraryError {
    /// Map a LibraryError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            LibraryError::InvalidArgument { .. } => 400,
            LibraryError::ObjectNotFound { .. } => 404,
            LibraryError::ManifestConflict { .. } => 409,
            LibraryError::UploadFailed { .. } => 502,
            LibraryError::ConversionFailed { .. }
            | LibraryError::SerializationFailed { .. }
            | LibraryError::Store(_) => 500,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LibraryError::InvalidArgument { .. } => "invalid_argument",
            LibraryError::ObjectNotFound { .. } => "not_found",
            LibraryError::ManifestConflict { .. } => "manifest_conflict",
            LibraryError::UploadFailed { .. } => "upload_failed",
            LibraryError::ConversionFailed { .. } => "conversion_failed",
            LibraryError::SerializationFailed { .. } => "serialization_failed",
            LibraryError::Store(_) => "storage_error",
        }
    }

    /// Shorthand for the folder-validation failure used by every operation
    /// that takes a folder path.
    pub fn blank_folder() -> Self {
        LibraryError::InvalidArgument {
            reason: "folder cannot be null, empty or blank".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(LibraryError::blank_folder().status_code(), 400);
        assert_eq!(
            LibraryError::ObjectNotFound {
                path: "jazz".to_string()
            }
            .status_code(),
            404
        );
        assert_eq!(
            LibraryError::ManifestConflict {
                folder: "jazz".to_string()
            }
            .status_code(),
            409
        );
        assert_eq!(
            LibraryError::UploadFailed {
                reason: "io".to_string()
            }
            .status_code(),
            502
        );
    }

    #[test]
    fn test_store_error_wraps_as_internal() {
        let err = LibraryError::from(StoreError::ListFailed {
            prefix: "content/".to_string(),
            reason: "timeout".to_string(),
        });
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "storage_error");
    }
}
