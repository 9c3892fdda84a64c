//! Streaming client for the Ollama chat API

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::chat::ndjson_stream;
use crate::{Error, Result};

/// Completion text deltas in arrival order
pub type DeltaStream = BoxStream<'static, Result<String>>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One line of a streamed `/api/chat` response
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Ollama HTTP client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start a streamed single-turn completion
    ///
    /// # Errors
    ///
    /// Returns error if Ollama is unreachable or rejects the request
    pub async fn chat_stream(&self, model: &str, prompt: &str) -> Result<DeltaStream> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "Ollama request failed with status {status}: {body}"
            )));
        }

        let deltas = ndjson_stream::<_, _, _, ChatChunk>(response.bytes_stream()).map(|chunk| {
            let chunk = chunk?;
            if let Some(error) = chunk.error {
                return Err(Error::Llm(error));
            }
            Ok(chunk.message.map(|m| m.content).unwrap_or_default())
        });

        Ok(deltas.boxed())
    }

    /// Names of the locally installed models
    ///
    /// # Errors
    ///
    /// Returns error if Ollama is unreachable
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Llm(format!(
                "failed to list models: {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
