//! Configuration schema.
//!
//! Hierarchy: `Config` → `GatewayConfig`, `UploadConfig`, `RetrievalConfig`,
//! `ProviderConfig`. Every field has a default, so an empty TOML file is a
//! valid configuration.

use anyhow::{ensure, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_MAX_UPLOAD_BYTES;

/// Root configuration, loaded from `config.toml` plus environment overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub upload: UploadConfig,
    pub retrieval: RetrievalConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.upload.max_bytes > 0, "upload.max_bytes must be positive");
        ensure!(self.retrieval.chunk_size > 0, "retrieval.chunk_size must be positive");
        ensure!(
            self.retrieval.chunk_overlap < self.retrieval.chunk_size,
            "retrieval.chunk_overlap must be less than retrieval.chunk_size"
        );
        ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be positive");
        ensure!(self.provider.timeout_secs > 0, "provider.timeout_secs must be positive");
        Ok(())
    }
}

/// HTTP bind address.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory for stored PDFs; `~` is expanded.
    pub dir: String,
    /// Largest accepted upload in bytes.
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "uploads".to_string(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Chunking and search settings for the local index.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// Passages sent to the model per question.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 4,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    /// Falls back to `GOOGLE_API_KEY` when empty.
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Prior question/answer exchanges included with each question.
    pub history_window: usize,
    /// Upper bound for a single indexing or answering call.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            history_window: 5,
            timeout_secs: 120,
        }
    }
}

// Never print the key.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &if self.is_configured() { "***" } else { "" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("history_window", &self.history_window)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
