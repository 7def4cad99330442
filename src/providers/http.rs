//! Chat adapter for any OpenAI-compatible `/chat/completions` endpoint.
//!
//! Defaults target Gemini's OpenAI-compatible API. Each answer retrieves the
//! best passages from the active index and sends them with a windowed slice
//! of the conversation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::traits::{ChatAdapter, DocumentIndex, Passage};
use crate::config::ProviderConfig;
use crate::session::ChatTurn;

const SYSTEM_PROMPT: &str = "You are a professional assistant answering questions about an uploaded PDF document.
- Answer from the document excerpts provided with each question.
- Be helpful, accurate and concise.
- If the excerpts do not contain the answer, say politely that the information is not available in the document.
- Keep a professional and friendly tone.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Retrieval-augmented chat over HTTP.
pub struct HttpChatAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    /// Prior user/assistant exchanges sent with each question.
    history_window: usize,
    top_k: usize,
}

impl std::fmt::Debug for HttpChatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatAdapter")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl HttpChatAdapter {
    pub fn new(config: &ProviderConfig, top_k: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            history_window: config.history_window,
            top_k,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// System prompt, the last `history_window` exchanges, then the question
    /// with its excerpts.
    pub fn build_messages(
        &self,
        passages: &[Passage],
        question: &str,
        history: &[ChatTurn],
    ) -> Vec<ChatMessage> {
        let keep = self.history_window.saturating_mul(2).min(history.len());
        let recent = &history[history.len() - keep..];

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
        messages.extend(
            recent
                .iter()
                .map(|turn| ChatMessage::new(turn.role.as_str(), turn.text.clone())),
        );

        let mut prompt = String::from("Document excerpts:\n");
        for (i, passage) in passages.iter().enumerate() {
            prompt.push_str(&format!("\n[{}] {}\n", i + 1, passage.text));
        }
        prompt.push_str(&format!("\nUser question: {question}"));
        messages.push(ChatMessage::new("user", prompt));
        messages
    }
}

#[async_trait]
impl ChatAdapter for HttpChatAdapter {
    async fn answer(
        &self,
        index: &dyn DocumentIndex,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let passages = index
            .search(question, self.top_k)
            .context("Failed to search document")?;
        let messages = self.build_messages(&passages, question, history);

        debug!(
            model = %self.model,
            passages = passages.len(),
            messages = messages.len(),
            "Calling LLM"
        );

        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %text, "LLM API error");
            bail!("LLM API returned {status}");
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            bail!("LLM returned an empty answer");
        }
        Ok(content)
    }

    fn display_name(&self) -> &str {
        &self.model
    }
}
