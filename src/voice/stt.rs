//! Speech-to-text (STT) client for the chat backend

use crate::{Error, Result};

/// Response from the backend transcription endpoint
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Uploads recorded clips to `/api/speech-to-text`
#[derive(Debug, Clone)]
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
}

impl SpeechToText {
    /// Create a transcription client for the backend at `base_url`
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Transcribe a recorded clip
    ///
    /// # Arguments
    ///
    /// * `audio` - WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a non-success status, or a malformed body
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new().part(
            "audio",
            reqwest::multipart::Part::bytes(audio)
                .file_name("recording.wav")
                .mime_str("audio/wav")
                .map_err(|e| Error::Stt(e.to_string()))?,
        );

        let response = self
            .client
            .post(format!("{}/api/speech-to-text", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription endpoint error");
            return Err(Error::Stt(format!("transcription error {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("malformed transcription response: {e}")))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
