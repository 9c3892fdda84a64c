//! Chat relay server
//!
//! Serves the endpoints the chat client talks to, backed by a local Ollama
//! instance and OpenAI-compatible speech engines.

mod chat;
mod health;
pub mod ollama;
pub mod sentences;
mod speech;
pub mod transcribe;
pub mod tts;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{Error, Result};

pub use chat::NDJSON;
pub use health::HealthResponse;
pub use ollama::OllamaClient;
pub use sentences::SentenceSplitter;
pub use speech::TranscriptionBody;
pub use transcribe::Transcriber;
pub use tts::{SpeechSynthesizer, mp3_data_url};

/// Largest accepted voice upload, about 17 minutes of 16 kHz mono 16-bit WAV
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Upstream clients shared by all handlers
#[derive(Debug, Clone)]
pub struct ServerState {
    pub ollama: OllamaClient,
    pub tts: SpeechSynthesizer,
    pub transcriber: Transcriber,
}

impl ServerState {
    /// Build upstream clients from configuration
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let http = reqwest::Client::new();
        Self {
            ollama: OllamaClient::new(http.clone(), &config.ollama_url),
            tts: SpeechSynthesizer::new(http.clone(), &config.tts_url, &config.tts_model),
            transcriber: Transcriber::new(http, &config.stt_url, &config.stt_model),
        }
    }
}

/// Relay API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_failed", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}

/// Build the relay router
///
/// # Errors
///
/// Returns error if `allowed_origin` is not a valid header value
pub fn router(state: Arc<ServerState>, allowed_origin: &str) -> Result<Router> {
    let origin = HeaderValue::from_str(allowed_origin)
        .map_err(|e| Error::Config(format!("invalid allowed origin {allowed_origin}: {e}")))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/chat", post(chat::chat))
        .route(
            "/api/speech-to-text",
            post(speech::speech_to_text).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Run the relay until the process is stopped
///
/// # Errors
///
/// Returns error if the listener cannot be bound or the server fails
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let state = Arc::new(ServerState::from_config(config));
    let app = router(state, &config.allowed_origin)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind relay server: {e}")))?;

    tracing::info!(
        port = config.port,
        ollama = %config.ollama_url,
        tts = %config.tts_url,
        stt = %config.stt_url,
        "relay server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Config(format!("relay server error: {e}")))?;

    Ok(())
}
