//! Wire types for the Realtime API slice this app exchanges
//!
//! Only the handful of frames the overlay actually uses are modeled; every
//! other inbound event type is ignored.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;

/// Events sent to the server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "response.create")]
    ResponseCreate,
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
}

/// Session configuration sent on connect
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: TurnDetection,
    pub temperature: f32,
}

/// Server-side voice activity detection settings
#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.6,
            prefix_padding_ms: 300,
            silence_duration_ms: 600,
        }
    }
}

impl ClientEvent {
    /// The `session.update` frame for our text-only session
    pub fn session_update(api: &ApiConfig, instructions: String) -> Self {
        Self::SessionUpdate {
            session: SessionConfig {
                modalities: vec!["text".to_string()],
                instructions,
                voice: api.voice.clone(),
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                turn_detection: TurnDetection::default(),
                temperature: api.temperature,
            },
        }
    }

    /// An `input_audio_buffer.append` frame carrying base64 little-endian PCM16
    pub fn audio_append(pcm: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        Self::InputAudioAppend {
            audio: BASE64.encode(&bytes),
        }
    }
}

/// Events received from the server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta { delta: String },
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "error")]
    Error { error: ApiError },
    /// Any event type the overlay does not care about
    #[serde(other)]
    Other,
}

/// Error payload of an `error` event
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
