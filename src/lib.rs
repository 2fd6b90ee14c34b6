//! playbox: an object-store-backed media library service.
//!
//! Albums live entirely inside an S3-compatible object store: raw asset
//! bytes under `music/{folder}/`, one JSON manifest per folder under
//! `content/{folder}/`, and folder structure derived from prefix/delimiter
//! listings. There is no database.

pub mod api;
pub mod core;
pub mod library;
pub mod observability;
pub mod storage;
