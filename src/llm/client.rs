//! Core `ChatBackend` trait and the `/v1/responses` streaming client.
//!
//! All connection details come from [`ChatConfig`]; nothing is hardcoded.

use std::io::BufReader;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::config::ChatConfig;
use crate::http::snippet;
use crate::llm::history::ChatMessage;
use crate::llm::sse::DeltaStream;

// ---------------------------------------------------------------------------
// ChatError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP transport or connection error.
    #[error("chat request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("chat request timed out")]
    Timeout,

    /// Non-success status; carries the start of the body.
    #[error("chat request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// The server reported an error inside the stream.
    #[error("chat stream error: {0}")]
    Stream(String),

    /// Reading the stream body failed part-way.
    #[error("chat stream interrupted: {0}")]
    Read(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// Reply text arriving incrementally.  Iteration ends when the reply is
/// complete; an `Err` item aborts it.
pub type ChatStream = Box<dyn Iterator<Item = Result<String, ChatError>> + Send>;

/// Streaming chat completion.
///
/// # Arguments
/// * `user_text` – the new user turn.
/// * `history`   – earlier messages, oldest first.
pub trait ChatBackend: Send + Sync {
    fn stream(&self, user_text: &str, history: &[ChatMessage]) -> Result<ChatStream, ChatError>;
}

// ---------------------------------------------------------------------------
// ResponsesClient
// ---------------------------------------------------------------------------

/// Calls an OpenResponses-style `/v1/responses` endpoint with `stream: true`.
///
/// The `Authorization: Bearer …` header is attached only when a non-empty
/// token is configured.
pub struct ResponsesClient {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    token: Option<String>,
}

impl ResponsesClient {
    pub fn from_config(config: &ChatConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.stream_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            url: format!("{}/v1/responses", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        }
    }
}

/// Request body: the bare string when there is no history, otherwise a list
/// of message items ending with the new user turn.
pub fn request_body(model: &str, user_text: &str, history: &[ChatMessage]) -> serde_json::Value {
    let input = if history.is_empty() {
        json!(user_text)
    } else {
        let items: Vec<_> = history
            .iter()
            .chain(std::iter::once(&ChatMessage::user(user_text)))
            .map(|m| json!({ "type": "message", "role": m.role, "content": m.content }))
            .collect();
        json!(items)
    };

    json!({
        "model":  model,
        "stream": true,
        "input":  input,
    })
}

impl ChatBackend for ResponsesClient {
    fn stream(&self, user_text: &str, history: &[ChatMessage]) -> Result<ChatStream, ChatError> {
        log::info!("llm: POST {} (stream=true, {} history messages)", self.url, history.len());

        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request_body(&self.model, user_text, history));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: snippet(&body, 300),
            });
        }

        Ok(Box::new(DeltaStream::new(BufReader::new(resp))))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
