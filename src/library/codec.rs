//! Manifest JSON codec.
//!
//! A manifest is a single JSON array of asset entries. The codec is the
//! only place the wire format is touched; everything above it works with
//! `Vec<AssetEntry>`.

use crate::core::error::LibraryError;
use crate::core::types::AssetEntry;

/// Decode manifest text into its entries.
pub fn decode_manifest(text: &str) -> Result<Vec<AssetEntry>, LibraryError> {
    serde_json::from_str(text).map_err(|e| LibraryError::ConversionFailed {
        reason: e.to_string(),
    })
}

/// Encode entries back into manifest text.
pub fn encode_manifest(entries: &[AssetEntry]) -> Result<String, LibraryError> {
    serde_json::to_string(entries).map_err(|e| LibraryError::SerializationFailed {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_list() {
        assert_eq!(decode_manifest("[]").unwrap(), Vec::new());
    }

    #[test]
    fn test_decode_reads_wire_type_field() {
        let text = r#"[{"title":"a.mp3","url":"mem://music/jazz/a.mp3","type":"audio/mpeg","duration":0.0}]"#;
        let entries = decode_manifest(text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].media_type, "audio/mpeg");
        assert_eq!(entries[0].duration, 0.0);
    }

    #[test]
    fn test_decode_malformed_is_conversion_failed() {
        let err = decode_manifest("{not json").unwrap_err();
        assert!(matches!(err, LibraryError::ConversionFailed { .. }));
    }

    #[test]
    fn test_encode_preserves_order() {
        let entries = vec![
            AssetEntry::new("a.mp3", "u1", "audio/mpeg"),
            AssetEntry::new("b.mp3", "u2", "audio/mpeg"),
        ];
        let text = encode_manifest(&entries).unwrap();
        let round = decode_manifest(&text).unwrap();
        assert_eq!(round, entries);
        assert!(text.find("a.mp3").unwrap() < text.find("b.mp3").unwrap());
    }
}
