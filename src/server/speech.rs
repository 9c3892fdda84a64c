//! `POST /api/speech-to-text`: transcribe an uploaded recording

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};

use super::{ApiError, ServerState};

/// Transcription result
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionBody {
    pub text: String,
}

pub async fn speech_to_text(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionBody>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("audio") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("recording.wav").to_string();
        let mime = field.content_type().unwrap_or("audio/wav").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        tracing::info!(file_name = %file_name, bytes = data.len(), "received audio file");

        let text = state
            .transcriber
            .transcribe(data.to_vec(), &file_name, &mime)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "error processing speech-to-text request");
                ApiError::Upstream(e.to_string())
            })?;

        return Ok(Json(TranscriptionBody { text }));
    }

    Err(ApiError::BadRequest("missing audio field".to_string()))
}
