//! Upload/chat/clear lifecycle around the single session record.
//!
//! Upload, chat and clear run one at a time under `op_lock`, held across
//! the slow adapter calls. The record itself sits behind a short-lived
//! `RwLock`, so status queries never wait for an in-flight upload or answer.
//! A chat that is running when a new upload arrives finishes against the old
//! index before the upload replaces it.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info};

use crate::error::ChatError;
use crate::providers::{ChatAdapter, DocumentIndexer};
use crate::session::{ChatTurn, Role, SessionRecord, SessionStatus};
use crate::store::{FileStore, StoredUpload, UploadedFile};

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];

const GREETING_REPLY: &str = "Hello! I'm your PDF assistant. I can help you with questions about the uploaded document. How can I assist you today?";

fn is_greeting(message: &str) -> bool {
    let lowered = message.to_lowercase();
    GREETINGS.contains(&lowered.as_str())
}

/// The document chat context shared by all HTTP handlers.
pub struct DocumentChat {
    files: FileStore,
    indexer: Arc<dyn DocumentIndexer>,
    chat: Arc<dyn ChatAdapter>,
    session: RwLock<SessionRecord>,
    op_lock: Mutex<()>,
    adapter_timeout: Duration,
}

impl std::fmt::Debug for DocumentChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentChat")
            .field("files", &self.files)
            .field("chat", &self.chat.display_name())
            .field("session", &*self.session.read())
            .field("adapter_timeout", &self.adapter_timeout)
            .finish()
    }
}

impl DocumentChat {
    pub fn new(
        files: FileStore,
        indexer: Arc<dyn DocumentIndexer>,
        chat: Arc<dyn ChatAdapter>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            files,
            indexer,
            chat,
            session: RwLock::new(SessionRecord::new()),
            op_lock: Mutex::new(()),
            adapter_timeout,
        }
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Store and index a PDF, then make it the active document.
    ///
    /// On any failure, or if the call is dropped before it completes, the
    /// session keeps its previous document and the new file is not left on
    /// disk.
    pub async fn upload(&self, declared_name: &str, data: &[u8]) -> Result<UploadedFile, ChatError> {
        self.files.validate(declared_name, data)?;

        let _op = self.op_lock.lock().await;
        let staged = self.files.store(declared_name, data).await?;
        let name = staged.file().original_name.clone();

        let index = match timeout(self.adapter_timeout, self.indexer.build(&staged.file().stored_path)).await {
            Ok(Ok(index)) => index,
            Ok(Err(e)) => {
                let reason = format!("{e:#}");
                error!(file = %name, error = %reason, "Indexing failed");
                return Err(ChatError::Indexing(reason));
            }
            Err(_) => {
                error!(file = %name, "Indexing timed out");
                return Err(ChatError::Indexing(format!(
                    "timed out after {}s",
                    self.adapter_timeout.as_secs_f32()
                )));
            }
        };

        let chunks = index.chunk_count();
        let file = staged.keep();
        let previous = self.session.write().activate(file.clone(), index);
        if let Some(previous) = previous {
            StoredUpload::discard(previous);
        }

        info!(file = %file.original_name, bytes = file.size_bytes, chunks, "Document ready");
        Ok(file)
    }

    /// Answer a question about the active document.
    ///
    /// The question and answer are appended to history together, and only
    /// when an answer was produced.
    pub async fn chat(&self, message: &str) -> Result<String, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::validation("Empty message"));
        }

        let _op = self.op_lock.lock().await;
        let (index, history) = {
            let session = self.session.read();
            match session.index() {
                Some(index) => (index, session.history()),
                None => return Err(ChatError::NotReady),
            }
        };

        let answer = if is_greeting(message) {
            GREETING_REPLY.to_string()
        } else {
            match timeout(self.adapter_timeout, self.chat.answer(index.as_ref(), message, &history)).await {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => {
                    let reason = format!("{e:#}");
                    error!(adapter = self.chat.display_name(), error = %reason, "Chat failed");
                    return Err(ChatError::generation(format!("Failed to generate an answer: {e}")));
                }
                Err(_) => {
                    error!(adapter = self.chat.display_name(), "Chat timed out");
                    return Err(ChatError::Generation {
                        message: format!(
                            "The assistant did not answer within {}s",
                            self.adapter_timeout.as_secs_f32()
                        ),
                        timed_out: true,
                    });
                }
            }
        };

        let mut session = self.session.write();
        session.append_turn(Role::User, message)?;
        session.append_turn(Role::Assistant, answer.clone())?;
        Ok(answer)
    }

    /// Drop the active document and its conversation.
    ///
    /// The file is deleted before the session is reset, so a failed delete
    /// leaves the document active. Clearing an empty session succeeds.
    pub async fn clear(&self) -> Result<(), ChatError> {
        let _op = self.op_lock.lock().await;
        let active = self.session.read().active_file().cloned();
        if let Some(file) = active {
            self.files.remove(&file).await?;
            info!(file = %file.original_name, "Cleared document");
        }
        self.session.write().reset();
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        self.session.read().status()
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.session.read().history()
    }
}
