//! The per-process session record: which document is active, its index,
//! and the conversation about it.
//!
//! Two states: empty, and ready (file + index set). Upload moves to ready
//! (replacing any previous document and its history), clear moves back to
//! empty, chat turns may only be appended while ready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::providers::IndexHandle;
use crate::store::UploadedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One immutable entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot returned by the status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub has_file: bool,
    pub ready: bool,
    /// Empty when no file is active.
    pub filename: String,
}

#[derive(Default)]
pub struct SessionRecord {
    active_file: Option<UploadedFile>,
    index: Option<IndexHandle>,
    ready: bool,
    history: Vec<ChatTurn>,
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("active_file", &self.active_file)
            .field("has_index", &self.index.is_some())
            .field("ready", &self.ready)
            .field("history", &self.history.len())
            .finish()
    }
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file` the active document. History starts over.
    ///
    /// Returns the replaced file; removing it from disk is the caller's job.
    pub fn activate(&mut self, file: UploadedFile, index: IndexHandle) -> Option<UploadedFile> {
        let previous = self.active_file.replace(file);
        self.index = Some(index);
        self.history.clear();
        self.ready = true;
        previous
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) -> Result<(), ChatError> {
        if !self.ready {
            return Err(ChatError::NotReady);
        }
        self.history.push(ChatTurn::new(role, text));
        Ok(())
    }

    /// Back to empty. Returns the file that was active, if any.
    pub fn reset(&mut self) -> Option<UploadedFile> {
        self.index = None;
        self.ready = false;
        self.history.clear();
        self.active_file.take()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            has_file: self.active_file.is_some(),
            ready: self.ready,
            filename: self
                .active_file
                .as_ref()
                .map(|f| f.original_name.clone())
                .unwrap_or_default(),
        }
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The active index, only while ready.
    pub fn index(&self) -> Option<IndexHandle> {
        if self.ready {
            self.index.clone()
        } else {
            None
        }
    }

    pub fn active_file(&self) -> Option<&UploadedFile> {
        self.active_file.as_ref()
    }
}
