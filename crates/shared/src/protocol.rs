use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DisplayText, ExpressionId, SpeechTask};

/// Messages sent to the desktop shell process. Only meaningful when the
/// application runs in overlay ("pet") mode with a live shell channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ShellRequest {
    UpdateComponentHover {
        component_id: String,
        hovering: bool,
    },
    ShowContextMenu,
}

/// Outbound conversation-layer messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConversationOutbound {
    AudioPlayStart {
        display_text: DisplayText,
        forwarded: bool,
    },
    FrontendPlaybackComplete,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid base64 audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

/// Inbound speech-synthesis payload as it arrives from the messaging
/// layer, audio still base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_b64: Option<String>,
    #[serde(default)]
    pub volumes: Vec<f32>,
    #[serde(default = "default_slice_length_ms")]
    pub slice_length_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<DisplayText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ExpressionId>,
    #[serde(default)]
    pub forwarded: bool,
}

fn default_slice_length_ms() -> u32 {
    100
}

impl SpeechPayload {
    /// Decodes the wire payload into an immutable playback task.
    pub fn into_task(self) -> Result<SpeechTask, PayloadError> {
        let audio = match self.audio_b64 {
            Some(encoded) => STANDARD.decode(encoded.as_bytes())?,
            None => Vec::new(),
        };
        Ok(SpeechTask {
            audio,
            viseme_volumes: self.volumes,
            slice_duration_ms: self.slice_length_ms,
            display_text: self.display_text,
            expression: self.expression,
            forwarded: self.forwarded,
        })
    }
}
