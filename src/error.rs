use thiserror::Error;

/// Failure kinds surfaced by the upload/chat lifecycle.
///
/// None of these are fatal to the server. Every variant leaves the session
/// record exactly as it was before the failing call.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request itself is unacceptable (bad file type, empty message, ...).
    #[error("{0}")]
    Validation(String),

    /// The upload exceeds the configured size limit.
    #[error("File too large. Maximum size is {}.", human_size(.limit))]
    TooLarge { limit: u64 },

    /// Chat was attempted before a document became active.
    #[error("Please upload a PDF file first")]
    NotReady,

    /// The document could not be turned into a queryable index.
    #[error("Error processing PDF: {0}")]
    Indexing(String),

    /// The chat adapter could not produce an answer.
    #[error("{message}")]
    Generation { message: String, timed_out: bool },

    /// Filesystem or other internal failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            timed_out: false,
        }
    }

    /// True for errors the user fixes by changing their input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::TooLarge { .. })
    }
}

fn human_size(bytes: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    match *bytes {
        b if b >= MIB && b % MIB == 0 => format!("{}MB", b / MIB),
        b if b >= MIB => format!("{:.1}MB", b as f64 / MIB as f64),
        b => format!("{b} bytes"),
    }
}
