//! Application settings: defaults first, then the TOML settings file,
//! then `AVATAR__*` environment overrides.

use std::fs;

use serde::Deserialize;
use shared::domain::ModelConfig;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub surface_width: u32,
    pub surface_height: u32,
    pub device_pixel_ratio: f32,
    pub frame_interval_ms: u64,
    /// Overlay ("pet") mode: transparent full-viewport stage with hover
    /// and context-menu relay to the desktop shell.
    pub pet_mode: bool,
    pub hover_component_id: String,
    pub models: Vec<ModelConfig>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            surface_width: 1080,
            surface_height: 1080,
            device_pixel_ratio: 1.0,
            frame_interval_ms: 16,
            pet_mode: false,
            hover_component_id: "avatar-stage".to_string(),
            models: Vec::new(),
        }
    }
}

pub fn load_settings(path: &str) -> StageSettings {
    let mut settings = StageSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<StageSettings>(&raw) {
            Ok(file_settings) => settings = file_settings,
            Err(error) => warn!(path, %error, "ignoring malformed settings file"),
        }
    }

    if let Ok(v) = std::env::var("AVATAR__PET_MODE") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.pet_mode = parsed;
        }
    }
    if let Ok(v) = std::env::var("AVATAR__FRAME_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.frame_interval_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("AVATAR__SURFACE_WIDTH") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.surface_width = parsed;
        }
    }
    if let Ok(v) = std::env::var("AVATAR__SURFACE_HEIGHT") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.surface_height = parsed;
        }
    }

    settings
}
