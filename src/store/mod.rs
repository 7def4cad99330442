//! File store for uploaded PDFs.
//!
//! Handles upload validation, on-disk storage, removal and text
//! extraction for indexing.

pub mod extract;
pub mod schema;
pub mod storage;

pub use schema::UploadedFile;
pub use storage::{FileStore, StoredUpload, DEFAULT_MAX_UPLOAD_BYTES};
