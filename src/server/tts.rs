//! Text-to-speech through an OpenAI-compatible `/audio/speech` endpoint

use base64::Engine as _;

use crate::{Error, Result};

/// Synthesizes sentences as MP3 clips
#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl SpeechSynthesizer {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Synthesize `text` with an engine voice and return MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unreachable or answers with a non-success status
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'static str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: "mp3",
        };

        let started = std::time::Instant::now();
        tracing::debug!(voice, chars = text.len(), "starting synthesis");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::info!(
            bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "synthesis complete"
        );
        Ok(audio.to_vec())
    }
}

/// Wrap MP3 bytes in an inline `data:` URL
#[must_use]
pub fn mp3_data_url(audio: &[u8]) -> String {
    format!(
        "data:audio/mp3;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(audio)
    )
}
