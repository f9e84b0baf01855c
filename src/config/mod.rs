//! Application Configuration
//!
//! User settings and preferences stored in TOML format. API credentials may
//! also arrive through the environment (`OPENAI_API_KEY` and friends), which
//! takes precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default instruction text used when no instructions file is configured
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant providing real-time responses to the user's questions.\n\
IMPORTANT: Do not respond until the user has asked a complete question or given a command.\n\
Listen carefully to the user's voice input and only reply when they have finished speaking.\n\
Keep your answers concise and relevant.";

/// Errors surfaced by configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key in the config file or environment. The overlay still runs,
    /// but the session subsystem is never started.
    #[error("no OpenAI API key configured (set OPENAI_API_KEY or api.api_key)")]
    MissingApiKey,
    /// The key is present but does not look like an OpenAI key
    #[error("API key does not look like an OpenAI key (expected sk- prefix, >= 20 chars)")]
    SuspiciousApiKey,
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Realtime API settings
    pub api: ApiConfig,
    /// Audio capture settings
    pub audio: AudioConfig,
    /// Overlay settings
    pub overlay: OverlaySettings,
    /// Hotkey bindings
    pub hotkeys: HotkeyConfig,
    /// Screen-share detector settings
    pub detector: DetectorConfig,
}

/// OpenAI Realtime API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key; empty means "use the OPENAI_API_KEY environment variable"
    pub api_key: String,
    /// Realtime model name
    pub model: String,
    /// WebSocket endpoint base
    pub base_url: String,
    /// Voice used for audio modalities (the session itself is text-only)
    pub voice: String,
    /// Sampling temperature for the session
    pub temperature: f32,
    /// Optional file with custom instruction text, re-read on every connect
    pub instructions_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
            base_url: "wss://api.openai.com/v1/realtime".to_string(),
            voice: "alloy".to_string(),
            temperature: 0.6,
            instructions_file: None,
        }
    }
}

impl ApiConfig {
    /// Apply environment variable overrides on top of the file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.api_key = key;
            }
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(voice) = std::env::var("OPENAI_VOICE") {
            if !voice.is_empty() {
                self.voice = voice;
            }
        }
    }

    /// Check that a usable API key is present
    ///
    /// `MissingApiKey` disables the session subsystem entirely;
    /// `SuspiciousApiKey` is advisory (the key is still used).
    pub fn validate_key(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !self.api_key.starts_with("sk-") || self.api_key.len() < 20 {
            return Err(ConfigError::SuspiciousApiKey);
        }
        Ok(())
    }

    /// Load instruction text from the configured file, or the built-in default
    pub fn load_instructions(&self) -> String {
        if let Some(path) = &self.instructions_file {
            match std::fs::read_to_string(path) {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => {
                    tracing::warn!("Instructions file {:?} is empty, using default", path);
                }
                Err(e) => {
                    tracing::warn!("Failed to read instructions file {:?}: {}", path, e);
                }
            }
        }
        DEFAULT_INSTRUCTIONS.to_string()
    }
}

/// Audio capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Preferred input device name (substring match); loopback devices let the
    /// overlay listen to meeting audio instead of the microphone
    pub preferred_device: Option<String>,
    /// Capture sample rate expected by the Realtime API
    pub sample_rate: u32,
    /// Samples per chunk sent to the session worker
    pub chunk_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preferred_device: Some("BlackHole 16ch".to_string()),
            sample_rate: 24_000,
            chunk_frames: 1024,
        }
    }
}

/// Overlay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Overlay opacity at startup
    pub opacity: f32,
    /// Overlay scale at startup
    pub scale: f32,
    /// Base panel width in logical pixels (before scaling)
    pub width: f32,
    /// Base panel height in logical pixels (before scaling)
    pub height: f32,
    /// Hide the overlay while screen sharing is detected
    pub presentation_mode: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            scale: 1.0,
            width: 1000.0,
            height: 900.0,
            presentation_mode: true,
        }
    }
}

/// Hotkey bindings, parsed by the hotkey module at registration time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub toggle_visibility: String,
    pub increase_opacity: String,
    pub decrease_opacity: String,
    pub increase_scale: String,
    pub decrease_scale: String,
    pub toggle_presentation: String,
    pub quit: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        // Super maps to Cmd on macOS
        Self {
            toggle_visibility: "Super+Shift+H".to_string(),
            increase_opacity: "Super+Shift+Y".to_string(),
            decrease_opacity: "Super+Shift+T".to_string(),
            increase_scale: "Super+Shift+Up".to_string(),
            decrease_scale: "Super+Shift+Down".to_string(),
            toggle_presentation: "Super+Shift+P".to_string(),
            quit: "Super+Shift+Q".to_string(),
        }
    }
}

/// Screen-share detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Process table poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Process names (substring, case-insensitive) that count as screen sharing
    pub process_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            process_names: vec![
                "zoom.us".to_string(),
                "Microsoft Teams".to_string(),
                "obs".to_string(),
                "Google Meet".to_string(),
                "webexmta".to_string(),
                "screencapture".to_string(),
            ],
        }
    }
}

/// Get the path of the default config file
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "realtime-overlay", "RealtimeOverlay")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(config.api.api_key.is_empty());
        assert_eq!(config.api.model, "gpt-4o-realtime-preview-2024-10-01");
        assert_eq!(config.api.base_url, "wss://api.openai.com/v1/realtime");
        assert_eq!(config.api.voice, "alloy");
        assert!((config.api.temperature - 0.6).abs() < 0.01);

        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.audio.chunk_frames, 1024);
        assert_eq!(
            config.audio.preferred_device.as_deref(),
            Some("BlackHole 16ch")
        );

        assert!((config.overlay.opacity - 1.0).abs() < 0.01);
        assert!((config.overlay.scale - 1.0).abs() < 0.01);
        assert!(config.overlay.presentation_mode);

        assert_eq!(config.detector.poll_interval_ms, 2000);
        assert!(!config.detector.process_names.is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.api.model, parsed.api.model);
        assert_eq!(config.audio.sample_rate, parsed.audio.sample_rate);
        assert_eq!(config.hotkeys.toggle_visibility, parsed.hotkeys.toggle_visibility);
        assert_eq!(config.detector.poll_interval_ms, parsed.detector.poll_interval_ms);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig = toml::from_str("[overlay]\nopacity = 0.5\n").unwrap();

        assert!((parsed.overlay.opacity - 0.5).abs() < 0.01);
        // Everything unspecified comes from Default
        assert_eq!(parsed.api.voice, "alloy");
        assert_eq!(parsed.audio.chunk_frames, 1024);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.api.model = "gpt-4o-realtime-custom".to_string();
        config.overlay.scale = 1.5;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.api.model, "gpt-4o-realtime-custom");
        assert!((loaded.overlay.scale - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_key_missing() {
        let api = ApiConfig::default();
        assert!(matches!(api.validate_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_validate_key_suspicious() {
        let api = ApiConfig {
            api_key: "not-an-openai-key".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            api.validate_key(),
            Err(ConfigError::SuspiciousApiKey)
        ));
    }

    #[test]
    fn test_validate_key_ok() {
        let api = ApiConfig {
            api_key: "sk-0123456789abcdef0123456789".to_string(),
            ..ApiConfig::default()
        };
        assert!(api.validate_key().is_ok());
    }

    #[test]
    fn test_load_instructions_default_when_unset() {
        let api = ApiConfig::default();
        assert_eq!(api.load_instructions(), DEFAULT_INSTRUCTIONS);
    }

    #[test]
    fn test_load_instructions_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "Answer in pirate speak.").unwrap();

        let api = ApiConfig {
            instructions_file: Some(temp_file.path().to_path_buf()),
            ..ApiConfig::default()
        };
        assert_eq!(api.load_instructions(), "Answer in pirate speak.");
    }

    #[test]
    fn test_load_instructions_empty_file_falls_back() {
        let temp_file = NamedTempFile::new().unwrap();

        let api = ApiConfig {
            instructions_file: Some(temp_file.path().to_path_buf()),
            ..ApiConfig::default()
        };
        assert_eq!(api.load_instructions(), DEFAULT_INSTRUCTIONS);
    }
}
