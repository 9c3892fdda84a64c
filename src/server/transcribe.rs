//! Speech-to-text through an OpenAI-compatible `/audio/transcriptions` endpoint

use crate::{Error, Result};

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Forwards uploaded clips to a Whisper-style transcription server
#[derive(Debug, Clone)]
pub struct Transcriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Transcriber {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Transcribe an uploaded clip
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unreachable, fails, or returns a malformed body
    pub async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), file_name, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name(file_name.to_string())
                    .mime_str(mime)
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription engine error");
            return Err(Error::Stt(format!("transcription engine error {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("malformed transcription response: {e}")))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
