use super::extract::{has_pdf_extension, sanitize_filename};
use super::schema::UploadedFile;
use crate::error::ChatError;
use anyhow::Context;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default upload size limit (16MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// A stored upload that is deleted when dropped, unless [`keep`](Self::keep)
/// was called.
///
/// Covers every way an upload can be abandoned between the write and
/// activation: errors, timeouts and the request future being dropped.
#[derive(Debug)]
pub struct StoredUpload {
    file: UploadedFile,
    keep: bool,
}

impl StoredUpload {
    fn pending(file: UploadedFile) -> Self {
        Self { file, keep: false }
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    /// Disarm the guard; the file now belongs to the caller.
    pub fn keep(mut self) -> UploadedFile {
        self.keep = true;
        self.file.clone()
    }

    /// Delete a file that is no longer referenced, without an await point.
    pub fn discard(file: UploadedFile) {
        drop(Self::pending(file));
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        let path = &self.file.stored_path;
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove stale upload"),
        }
    }
}

/// Manages uploaded PDFs on disk, one flat directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
    max_bytes: u64,
}

impl FileStore {
    pub fn new(base_dir: &str, max_bytes: u64) -> Self {
        let expanded = shellexpand::tilde(base_dir).to_string();
        Self {
            base_dir: PathBuf::from(expanded),
            max_bytes,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check an upload without touching the filesystem.
    pub fn validate(&self, declared_name: &str, data: &[u8]) -> Result<(), ChatError> {
        if declared_name.trim().is_empty() {
            return Err(ChatError::validation("No file selected"));
        }
        if !has_pdf_extension(declared_name) {
            return Err(ChatError::validation("Only PDF files are allowed"));
        }
        if data.is_empty() {
            return Err(ChatError::validation("Uploaded file is empty"));
        }
        if data.len() as u64 > self.max_bytes {
            return Err(ChatError::TooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Validate and persist an upload under `<base_dir>/<uuid>_<name>`.
    ///
    /// Nothing is written when validation fails. The returned guard deletes
    /// the file again unless it is kept.
    pub async fn store(&self, declared_name: &str, data: &[u8]) -> Result<StoredUpload, ChatError> {
        self.validate(declared_name, data)?;

        fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.base_dir.display()))?;

        let original_name = sanitize_filename(declared_name);
        let id = Uuid::new_v4().to_string();
        let stored_path = self.base_dir.join(format!("{id}_{original_name}"));

        let staged = StoredUpload::pending(UploadedFile {
            id,
            stored_path,
            original_name,
            size_bytes: data.len() as u64,
            uploaded_at: Utc::now(),
        });
        fs::write(&staged.file().stored_path, data)
            .await
            .context("Failed to write uploaded file")?;

        info!(file = %staged.file().original_name, bytes = data.len(), "Stored upload");
        Ok(staged)
    }

    /// Delete a stored file. Missing files are not an error.
    pub async fn remove(&self, file: &UploadedFile) -> anyhow::Result<()> {
        match fs::remove_file(&file.stored_path).await {
            Ok(()) => {
                debug!(path = %file.stored_path.display(), "Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to delete {}", file.stored_path.display())
            }),
        }
    }
}
