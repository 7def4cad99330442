use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A PDF persisted by the [`FileStore`](super::FileStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub stored_path: PathBuf,
    /// Sanitized client-side name, shown back to the user.
    pub original_name: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}
