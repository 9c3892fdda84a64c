//! Configuration management for Parley

pub mod file;

use crate::{Error, Result};

/// Default chat backend URL
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "phi4:latest";

/// Default voice identifier
pub const DEFAULT_VOICE: &str = "en-US-Standard-A";

/// A selectable language model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    /// Identifier sent to the backend
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
}

/// A selectable synthesis voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceOption {
    /// Identifier sent to the backend
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Voice name understood by the TTS engine
    pub engine_voice: &'static str,
}

/// Models offered for selection
pub const MODELS: &[ModelOption] = &[
    ModelOption { id: "phi4:latest", name: "Phi-4" },
    ModelOption { id: "deepseek-r1:32b", name: "DeepSeek R1" },
    ModelOption { id: "llama3.2:latest", name: "LLama3.2" },
    ModelOption { id: "nous-hermes2:latest", name: "Nous-Hermes2" },
];

/// Voices offered for selection
pub const VOICES: &[VoiceOption] = &[
    VoiceOption {
        id: "en-US-Standard-A",
        name: "US English (Female)",
        engine_voice: "af_bella",
    },
    VoiceOption {
        id: "en-US-Standard-B",
        name: "US English (Male)",
        engine_voice: "am_michael",
    },
    VoiceOption {
        id: "en-GB-Standard-A",
        name: "British English (Female)",
        engine_voice: "bf_isabella",
    },
    VoiceOption {
        id: "en-GB-Standard-B",
        name: "British English (Male)",
        engine_voice: "bm_george",
    },
];

/// Look up a model by identifier
#[must_use]
pub fn find_model(id: &str) -> Option<&'static ModelOption> {
    MODELS.iter().find(|m| m.id == id)
}

/// Look up a voice by identifier
#[must_use]
pub fn find_voice(id: &str) -> Option<&'static VoiceOption> {
    VOICES.iter().find(|v| v.id == id)
}

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat client configuration
    pub client: ClientConfig,

    /// Relay server configuration
    pub server: ServerConfig,
}

/// Chat client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat backend
    pub server_url: String,

    /// Initial model/voice/device selection
    pub settings: SessionSettings,

    /// Whether synthesized audio is played initially
    pub audio_enabled: bool,
}

/// User selections read when issuing requests
///
/// Changing a selection never affects a request already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    model: String,
    voice: String,
    input_device: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            input_device: None,
        }
    }
}

impl SessionSettings {
    /// Selected model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Selected voice identifier
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Selected input device, `None` for the system default
    #[must_use]
    pub fn input_device(&self) -> Option<&str> {
        self.input_device.as_deref()
    }

    /// Select a model from [`MODELS`]
    ///
    /// # Errors
    ///
    /// Returns error if the identifier is not in the catalog
    pub fn select_model(&mut self, id: &str) -> Result<()> {
        let model = find_model(id).ok_or_else(|| Error::Config(format!("unknown model: {id}")))?;
        self.model = model.id.to_string();
        tracing::debug!(model = model.id, "model selected");
        Ok(())
    }

    /// Select a voice from [`VOICES`]
    ///
    /// # Errors
    ///
    /// Returns error if the identifier is not in the catalog
    pub fn select_voice(&mut self, id: &str) -> Result<()> {
        let voice = find_voice(id).ok_or_else(|| Error::Config(format!("unknown voice: {id}")))?;
        self.voice = voice.id.to_string();
        tracing::debug!(voice = voice.id, "voice selected");
        Ok(())
    }

    /// Select an input device by name, `None` for the system default
    pub fn select_input_device(&mut self, device: Option<String>) {
        tracing::debug!(device = ?device, "input device selected");
        self.input_device = device.filter(|d| !d.trim().is_empty());
    }
}

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Ollama base URL
    pub ollama_url: String,

    /// OpenAI-compatible TTS base URL (e.g. Kokoro)
    pub tts_url: String,

    /// TTS model name
    pub tts_model: String,

    /// OpenAI-compatible STT base URL
    pub stt_url: String,

    /// STT model name
    pub stt_model: String,

    /// Browser origin allowed by CORS
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            ollama_url: "http://localhost:11434".to_string(),
            tts_url: "http://localhost:8880/v1".to_string(),
            tts_model: "kokoro".to_string(),
            stt_url: "http://localhost:8080/v1".to_string(),
            stt_model: "large-v3-turbo".to_string(),
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured model or voice is not in the catalog
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed config file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured model or voice is not in the catalog
    pub fn from_sources(
        fc: file::ParleyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut settings = SessionSettings::default();
        if let Some(model) = env("PARLEY_MODEL").or(fc.client.model) {
            settings.select_model(&model)?;
        }
        if let Some(voice) = env("PARLEY_VOICE").or(fc.client.voice) {
            settings.select_voice(&voice)?;
        }
        settings.select_input_device(env("PARLEY_INPUT_DEVICE").or(fc.client.input_device));

        let client = ClientConfig {
            server_url: env("PARLEY_SERVER_URL")
                .or(fc.client.server_url)
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            settings,
            audio_enabled: fc.client.audio_enabled.unwrap_or(true),
        };

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            port: env("PARLEY_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(defaults.port),
            ollama_url: env("OLLAMA_URL")
                .or(fc.server.ollama_url)
                .unwrap_or(defaults.ollama_url),
            tts_url: env("PARLEY_TTS_URL")
                .or(fc.server.tts_url)
                .unwrap_or(defaults.tts_url),
            tts_model: fc.server.tts_model.unwrap_or(defaults.tts_model),
            stt_url: env("PARLEY_STT_URL")
                .or(fc.server.stt_url)
                .unwrap_or(defaults.stt_url),
            stt_model: fc.server.stt_model.unwrap_or(defaults.stt_model),
            allowed_origin: fc
                .server
                .allowed_origin
                .unwrap_or(defaults.allowed_origin),
        };

        Ok(Self { client, server })
    }
}
