//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Chat client settings
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Relay server settings
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Chat client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Base URL of the chat backend (e.g. "http://localhost:8000")
    pub server_url: Option<String>,

    /// Model identifier (e.g. "phi4:latest")
    pub model: Option<String>,

    /// Voice identifier (e.g. "en-US-Standard-A")
    pub voice: Option<String>,

    /// Input device name
    pub input_device: Option<String>,

    /// Play synthesized audio
    pub audio_enabled: Option<bool>,
}

/// Relay server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub ollama_url: Option<String>,
    pub tts_url: Option<String>,
    pub tts_model: Option<String>,
    pub stt_url: Option<String>,
    pub stt_model: Option<String>,
    pub allowed_origin: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    config_file_path().map_or_else(ParleyConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> ParleyConfigFile {
    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
