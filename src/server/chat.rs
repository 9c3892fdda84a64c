//! `POST /api/chat`: streamed completion with per-sentence speech
//!
//! The completion is split into sentences as it arrives; each sentence is
//! synthesized and written as one NDJSON line before the next is started.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::sentences::SentenceSplitter;
use super::tts::mp3_data_url;
use super::{ApiError, ServerState};
use crate::chat::{ChatRequest, StreamRecord};
use crate::config::find_voice;
use crate::{Error, Result};

/// Buffered lines between the generator task and the response body
const LINE_BUFFER: usize = 16;

/// Content type of the response body
pub const NDJSON: &str = "application/x-ndjson";

pub async fn chat(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Response, ApiError> {
    let voice = find_voice(&request.voice)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown voice: {}", request.voice)))?;

    tracing::info!(message = %request.message, model = %request.model, voice = voice.id, "received chat message");

    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(generate(state, request, voice.engine_voice, tx));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok(([(header::CONTENT_TYPE, NDJSON)], body).into_response())
}

async fn generate(
    state: Arc<ServerState>,
    request: ChatRequest,
    voice: &'static str,
    tx: mpsc::Sender<Result<String>>,
) {
    match produce(&state, &request, voice, &tx).await {
        Ok(records) => tracing::info!(records, "chat stream complete"),
        Err(_) if tx.is_closed() => tracing::info!("client disconnected"),
        Err(e) => {
            tracing::error!(error = %e, "error in chat stream");
            // Ends the body without a final chunk so the client sees a failure
            let _ = tx.send(Err(e)).await;
        }
    }
}

async fn produce(
    state: &ServerState,
    request: &ChatRequest,
    voice: &str,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<usize> {
    let mut deltas = state
        .ollama
        .chat_stream(&request.model, &request.message)
        .await?;
    let mut splitter = SentenceSplitter::new();
    let mut records = 0;

    while let Some(delta) = deltas.next().await {
        for sentence in splitter.push(&delta?) {
            emit(state, sentence, voice, tx).await?;
            records += 1;
        }
    }

    if let Some(sentence) = splitter.finish() {
        emit(state, sentence, voice, tx).await?;
        records += 1;
    }

    Ok(records)
}

async fn emit(
    state: &ServerState,
    sentence: String,
    voice: &str,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    let audio = state.tts.synthesize(&sentence, voice).await?;
    let record = StreamRecord {
        sentence,
        audio_url: mp3_data_url(&audio),
    };

    let mut line = serde_json::to_string(&record)?;
    line.push('\n');

    tx.send(Ok(line))
        .await
        .map_err(|_| Error::Chat("client disconnected".to_string()))
}
