use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::domain::{ExpressionId, HitAreaName, MotionName};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    pub transparent_background: bool,
    pub device_pixel_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32, button: PointerButton },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32, button: PointerButton },
    UpOutside { x: f32, y: f32 },
    Enter,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPriority {
    None,
    Idle,
    Normal,
    /// Interrupts any in-progress motion immediately.
    Forced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelLoadOptions {
    pub auto_hit_test: bool,
    pub auto_focus: bool,
    pub idle_motion_group: String,
}

/// Decoded audio plus the per-slice mouth volumes driving lip-sync.
#[derive(Debug, Clone, PartialEq)]
pub struct LipSyncClip {
    pub audio: Vec<u8>,
    pub viseme_volumes: Vec<f32>,
    pub slice_duration_ms: u32,
}

/// Resolves once audio playback finishes; `Err` carries the playback
/// failure reported by the audio backend.
pub type SpeakFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Live handle to the animated model instance owned by the rendering
/// engine. Exactly one handle is attached to a surface at a time.
pub trait ModelHandle: fmt::Debug + Send + Sync {
    fn play(&self, motion: &MotionName, priority: MotionPriority) -> anyhow::Result<()>;
    fn set_expression(&self, expression: &ExpressionId) -> anyhow::Result<()>;
    fn reset_expression(&self);
    /// Hit-test a point in model-local coordinates; returns every area
    /// containing the point, innermost first.
    fn hit_test(&self, x: f32, y: f32) -> Vec<HitAreaName>;
    /// Converts surface coordinates into model-local coordinates.
    fn to_local(&self, x: f32, y: f32) -> (f32, f32);
    fn set_position(&self, x: f32, y: f32);
    fn position(&self) -> (f32, f32);
    fn set_scale(&self, scale: f32);
    /// Unscaled model dimensions as authored.
    fn natural_size(&self) -> (f32, f32);
    /// Starts lip-synced audio playback. A synchronous `Err` means setup
    /// failed before any audio started; the returned future resolves when
    /// playback completes or errors.
    fn speak(&self, clip: LipSyncClip) -> anyhow::Result<SpeakFuture>;
    fn destroy(&self);
    fn remove_all_listeners(&self);
}

/// Hardware-accelerated canvas the engine draws on.
pub trait RenderSurface: fmt::Debug + Send + Sync {
    fn attach(&self, model: Arc<dyn ModelHandle>) -> anyhow::Result<()>;
    fn detach(&self, model: &Arc<dyn ModelHandle>);
    fn render_frame(&self);
    fn size(&self) -> (u32, u32);
    fn subscribe_pointer_events(&self) -> broadcast::Receiver<PointerEvent>;
    fn destroy(&self);
}

#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self, options: SurfaceOptions) -> anyhow::Result<Arc<dyn RenderSurface>>;
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Fetches and parses the model asset; rejects on fetch or parse
    /// failure.
    async fn load(
        &self,
        url: &str,
        options: ModelLoadOptions,
    ) -> anyhow::Result<Arc<dyn ModelHandle>>;
}
