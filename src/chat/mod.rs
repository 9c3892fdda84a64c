//! Chat endpoint client
//!
//! Posts a user message to `/api/chat` and exposes the streamed response as
//! an ordered sequence of [`StreamRecord`]s.

pub mod stream;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_MODEL, DEFAULT_VOICE};
use crate::{Error, Result};

pub use stream::{LineBuffer, StreamRecord, decode_line, ndjson_stream, record_stream};

/// Lazily decoded chat response; finite and not restartable
pub type RecordStream = BoxStream<'static, Result<StreamRecord>>;

/// Body of a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Client for the chat backend
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    /// Create a client for the backend at `base_url`
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client sharing an existing HTTP connection pool
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Backend base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a message and return the response record stream
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend answers with a non-success status
    pub async fn send(&self, request: &ChatRequest) -> Result<RecordStream> {
        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(%url, model = %request.model, voice = %request.voice, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat endpoint error");
            return Err(Error::Chat(format!("chat endpoint error {status}: {body}")));
        }

        Ok(record_stream(response.bytes_stream()).boxed())
    }
}
