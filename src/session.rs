//! Chat orchestrator
//!
//! Drives one send cycle at a time: user message in, streamed bot sentences
//! out, synthesized clips into the playback queue. Voice input records a clip,
//! transcribes it and feeds the transcript into the same send path.
//!
//! Failures inside a cycle are logged and reported through [`SendOutcome`];
//! they never become conversation messages.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;

use crate::chat::{ChatClient, ChatRequest, StreamRecord};
use crate::config::{ClientConfig, SessionSettings};
use crate::conversation::{Conversation, Message, Role};
use crate::playback::{ClipResolver, PlaybackController, SpeakerPlayer};
use crate::voice::{CpalMicrophone, Microphone, SpeechToText};
use crate::Result;

/// Broadcast channel capacity for session events
const CHANNEL_CAPACITY: usize = 256;

/// State changes a front end renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message was appended to the conversation
    MessageAdded(Message),
    /// The bot started or stopped responding
    BotTyping(bool),
    /// A recorded clip is being transcribed
    ProcessingSpeech(bool),
    /// The microphone started or stopped recording
    Recording(bool),
}

/// Why a send request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Input was empty or whitespace
    Empty,
    /// A response, transcription or recording is in progress
    Busy,
    /// `stop_recording` without an active recording
    NotRecording,
}

/// Result of a send or voice cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was sent
    Skipped(SkipReason),
    /// The response stream ran to completion
    Completed { records: usize },
    /// The cycle ended early on a logged failure
    Aborted { records: usize },
}

/// One user's chat session
pub struct ChatSession {
    chat: ChatClient,
    stt: SpeechToText,
    playback: PlaybackController,
    microphone: Box<dyn Microphone>,
    settings: SessionSettings,
    conversation: Conversation,
    bot_typing: bool,
    processing_speech: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Assemble a session from its collaborators
    #[must_use]
    pub fn new(
        chat: ChatClient,
        stt: SpeechToText,
        playback: PlaybackController,
        microphone: Box<dyn Microphone>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            chat,
            stt,
            playback,
            microphone,
            settings,
            conversation: Conversation::new(),
            bot_typing: false,
            processing_speech: false,
            events,
        }
    }

    /// Build a session that records from a cpal device and plays to the speakers
    ///
    /// # Errors
    ///
    /// Returns error if the configured server URL is invalid
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::new();
        let resolver = ClipResolver::new(http.clone(), &config.server_url)?;
        let playback = PlaybackController::new(Arc::new(SpeakerPlayer::new(resolver)));
        playback.set_enabled(config.audio_enabled);

        Ok(Self::new(
            ChatClient::with_client(http.clone(), &config.server_url),
            SpeechToText::new(http, &config.server_url),
            playback,
            Box::new(CpalMicrophone::new()),
            config.settings.clone(),
        ))
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Mutable selections; changes apply from the next send
    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    /// Playback queue handle, usable while a send is in progress
    #[must_use]
    pub const fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    #[must_use]
    pub const fn is_bot_typing(&self) -> bool {
        self.bot_typing
    }

    #[must_use]
    pub const fn is_processing_speech(&self) -> bool {
        self.processing_speech
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.microphone.is_recording()
    }

    /// Whether input should currently be refused
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.bot_typing || self.processing_speech || self.is_recording()
    }

    /// Enable or disable audio output; disabling stops and clears the queue
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.playback.set_enabled(enabled);
    }

    /// Send a user message and stream the response into the conversation
    pub async fn send(&mut self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Skipped(SkipReason::Empty);
        }
        if self.is_busy() {
            tracing::debug!("send refused while busy");
            return SendOutcome::Skipped(SkipReason::Busy);
        }

        self.playback.reset();
        self.add_message(Role::User, text);
        self.set_bot_typing(true);

        let request = ChatRequest {
            message: text.to_string(),
            voice: self.settings.voice().to_string(),
            model: self.settings.model().to_string(),
        };

        let outcome = self.stream_response(&request).await;
        self.set_bot_typing(false);
        outcome
    }

    /// Acquire the selected input device and start recording
    ///
    /// Returns `false` if recording could not start; state is left unchanged.
    pub fn start_recording(&mut self) -> bool {
        if self.is_busy() {
            tracing::debug!("recording refused while busy");
            return false;
        }

        self.playback.reset();
        let device = self.settings.input_device().map(ToString::to_string);
        match self.microphone.start(device.as_deref()) {
            Ok(()) => {
                tracing::info!(device = ?device, "recording started");
                self.emit(SessionEvent::Recording(true));
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start recording");
                false
            }
        }
    }

    /// Finish recording, transcribe the clip and send the transcript
    pub async fn stop_recording(&mut self) -> SendOutcome {
        if !self.microphone.is_recording() {
            return SendOutcome::Skipped(SkipReason::NotRecording);
        }

        let clip = self.microphone.finish();
        self.emit(SessionEvent::Recording(false));
        let clip = match clip {
            Ok(clip) => clip,
            Err(e) => {
                tracing::error!(error = %e, "failed to finalize recording");
                return SendOutcome::Aborted { records: 0 };
            }
        };

        self.set_processing_speech(true);
        let transcript = self.stt.transcribe(clip).await;
        self.set_processing_speech(false);

        match transcript {
            Ok(text) => self.send(&text).await,
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                SendOutcome::Aborted { records: 0 }
            }
        }
    }

    async fn stream_response(&mut self, request: &ChatRequest) -> SendOutcome {
        let mut stream = match self.chat.send(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "chat request failed");
                return SendOutcome::Aborted { records: 0 };
            }
        };

        let mut records = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => {
                    records += 1;
                    self.accept(record);
                }
                Err(e) => {
                    tracing::error!(error = %e, records, "chat stream failed");
                    return SendOutcome::Aborted { records };
                }
            }
        }

        tracing::debug!(records, "chat response complete");
        SendOutcome::Completed { records }
    }

    /// Queue a record's clip, then render its sentence
    fn accept(&mut self, record: StreamRecord) {
        self.playback.enqueue(record.audio_url);
        self.add_message(Role::Bot, record.sentence.trim());
    }

    fn add_message(&mut self, role: Role, text: &str) {
        match self.conversation.push(role, text) {
            Ok(message) => {
                let message = message.clone();
                self.emit(SessionEvent::MessageAdded(message));
            }
            Err(e) => tracing::error!(error = %e, "failed to append message"),
        }
    }

    fn set_bot_typing(&mut self, typing: bool) {
        self.bot_typing = typing;
        self.emit(SessionEvent::BotTyping(typing));
    }

    fn set_processing_speech(&mut self, processing: bool) {
        self.processing_speech = processing;
        self.emit(SessionEvent::ProcessingSpeech(processing));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
