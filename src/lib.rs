//! Parley - Voice chat client and streaming relay for local language models
//!
//! This library provides:
//! - A chat session that streams sentence-by-sentence responses
//! - Ordered playback of synthesized clips with stale-callback protection
//! - Microphone recording and transcription for voice input
//! - A relay server that fronts Ollama and OpenAI-compatible speech engines
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ChatSession                  │
//! │  Conversation │ Playback │ Microphone │ STT  │
//! └──────────────────────┬───────────────────────┘
//!                        │ NDJSON over HTTP
//! ┌──────────────────────▼───────────────────────┐
//! │                 Relay server                 │
//! │  /api/chat │ /api/speech-to-text │ /health   │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │     Ollama  │  TTS engine  │  STT engine     │
//! └──────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod playback;
pub mod server;
pub mod session;
pub mod voice;

pub use chat::{ChatClient, ChatRequest, StreamRecord};
pub use config::{ClientConfig, Config, ServerConfig, SessionSettings};
pub use conversation::{Conversation, Message, MessageId, Role};
pub use error::{Error, Result};
pub use playback::{PlaybackController, PlaybackEvent};
pub use session::{ChatSession, SendOutcome, SessionEvent, SkipReason};
