use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

name_newtype!(MotionName);
name_newtype!(HitAreaName);
name_newtype!(ExpressionId);
name_newtype!(SpeakerId);

/// Motion name -> non-negative weight. BTreeMap keeps iteration
/// deterministic, which the fallback merge computation relies on.
pub type MotionWeightMap = BTreeMap<MotionName, f32>;

/// Hit-area name -> motion group played when that area is tapped.
pub type TapMotionMap = BTreeMap<HitAreaName, MotionWeightMap>;

/// Per-model configuration. Immutable per load; replacing it triggers a
/// full model reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub url: String,
    #[serde(default = "default_pointer_interactive")]
    pub pointer_interactive: bool,
    #[serde(default = "default_idle_motion_group")]
    pub idle_motion_group: String,
    #[serde(default)]
    pub default_emotion: Option<ExpressionId>,
    #[serde(default)]
    pub initial_x_shift: f32,
    #[serde(default)]
    pub initial_y_shift: f32,
    #[serde(default)]
    pub scale_hint: Option<f32>,
    #[serde(default)]
    pub tap_motions: TapMotionMap,
}

impl ModelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pointer_interactive: default_pointer_interactive(),
            idle_motion_group: default_idle_motion_group(),
            default_emotion: None,
            initial_x_shift: 0.0,
            initial_y_shift: 0.0,
            scale_hint: None,
            tap_motions: TapMotionMap::new(),
        }
    }
}

fn default_pointer_interactive() -> bool {
    true
}

fn default_idle_motion_group() -> String {
    "Idle".to_string()
}

/// One line of spoken (or silent, text-only) dialogue as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<SpeakerId>,
}

/// A chat-history entry derived from a speech line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub speaker: Option<SpeakerId>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// One unit of speech playback. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTask {
    /// Decoded audio bytes; empty for a silent (text-only) line.
    pub audio: Vec<u8>,
    /// Per-slice mouth-open volumes driving lip-sync.
    pub viseme_volumes: Vec<f32>,
    pub slice_duration_ms: u32,
    pub display_text: Option<DisplayText>,
    pub expression: Option<ExpressionId>,
    /// True when this task is an echo of a line another process already
    /// announced; suppresses the outbound playback-start notification.
    pub forwarded: bool,
}

impl SpeechTask {
    /// A text-only line with no audio to play.
    pub fn silent(display_text: DisplayText) -> Self {
        Self {
            audio: Vec::new(),
            viseme_volumes: Vec::new(),
            slice_duration_ms: 0,
            display_text: Some(display_text),
            expression: None,
            forwarded: false,
        }
    }
}
