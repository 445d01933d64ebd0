//! Core runtime for the desktop avatar stage: model lifecycle, pointer
//! interaction, speech playback and sizing, coordinated over capability
//! traits so the rendering engine, desktop shell and audio backend stay
//! replaceable collaborators.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use shared::{
    domain::{ChatRecord, ModelConfig},
    protocol::{ConversationOutbound, ShellRequest},
};
use stage_integration::{
    ModelHandle, ModelLoadOptions, ModelLoader, RenderSurface, SurfaceFactory, SurfaceOptions,
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

pub mod config;
pub mod error;
pub mod interaction;
pub mod motion;
pub mod sizing;
pub mod speech;

pub use error::StageError;

const STAGE_EVENT_CAPACITY: usize = 64;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Events published by [`ModelLifecycle`]. Sizing and interaction
/// subscribe once and re-run their setup on each event instead of
/// reaching into shared mutable state.
#[derive(Debug, Clone)]
pub enum StageEvent {
    ModelReady {
        model: Arc<dyn ModelHandle>,
        config: ModelConfig,
    },
    ModelReleased,
    ContainerResized {
        width: u32,
        height: u32,
    },
    LoadFailed {
        url: String,
        reason: String,
    },
}

/// Channel to the desktop shell process; only wired in overlay mode.
pub trait ShellMessenger: Send + Sync {
    fn send(&self, request: ShellRequest);
}

pub struct MissingShellMessenger;

impl ShellMessenger for MissingShellMessenger {
    fn send(&self, _request: ShellRequest) {}
}

/// Outbound conversation-layer messaging (playback start/complete).
pub trait ConversationSink: Send + Sync {
    fn send(&self, message: ConversationOutbound);
}

pub struct MissingConversationSink;

impl ConversationSink for MissingConversationSink {
    fn send(&self, _message: ConversationOutbound) {}
}

pub trait SubtitleSink: Send + Sync {
    fn show(&self, text: &str);
}

pub struct MissingSubtitleSink;

impl SubtitleSink for MissingSubtitleSink {
    fn show(&self, _text: &str) {}
}

pub trait ChatHistorySink: Send + Sync {
    fn append(&self, record: ChatRecord);
}

pub struct MissingChatHistorySink;

impl ChatHistorySink for MissingChatHistorySink {
    fn append(&self, _record: ChatRecord) {}
}

/// Non-blocking user-facing notifications (toasts).
pub trait NotificationSink: Send + Sync {
    fn toast(&self, message: &str);
}

pub struct MissingNotificationSink;

impl NotificationSink for MissingNotificationSink {
    fn toast(&self, _message: &str) {}
}

pub struct MissingModelLoader;

#[async_trait]
impl ModelLoader for MissingModelLoader {
    async fn load(
        &self,
        url: &str,
        _options: ModelLoadOptions,
    ) -> anyhow::Result<Arc<dyn ModelHandle>> {
        Err(anyhow!("rendering engine adapter is unavailable for {url}"))
    }
}

pub struct MissingSurfaceFactory;

#[async_trait]
impl SurfaceFactory for MissingSurfaceFactory {
    async fn create(&self, _options: SurfaceOptions) -> anyhow::Result<Arc<dyn RenderSurface>> {
        Err(anyhow!("rendering engine adapter is unavailable"))
    }
}

/// Conversation-level interrupt switch shared between the speech queue
/// and the transport layer. Checked at task boundaries only; an
/// in-flight playback always runs to its own completion.
#[derive(Debug, Default)]
pub struct InterruptFlag(AtomicBool);

impl InterruptFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct SurfaceBinding {
    surface: Arc<dyn RenderSurface>,
    frame_task: JoinHandle<()>,
}

struct ActiveModel {
    handle: Arc<dyn ModelHandle>,
}

struct LifecycleState {
    surface: Option<SurfaceBinding>,
    active: Option<ActiveModel>,
    load_in_flight: bool,
}

/// Owns creation, hot-swap and teardown of the active animated-model
/// instance and its attachment to the render surface. The single writer
/// of the active handle; collaborators receive it through
/// [`StageEvent::ModelReady`] or [`ModelLifecycle::active_model`].
pub struct ModelLifecycle {
    loader: Arc<dyn ModelLoader>,
    inner: Mutex<LifecycleState>,
    events: broadcast::Sender<StageEvent>,
    readiness: watch::Sender<bool>,
    frame_interval_ms: u64,
}

impl ModelLifecycle {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Arc<Self> {
        Self::with_frame_interval(loader, DEFAULT_FRAME_INTERVAL_MS)
    }

    pub fn with_frame_interval(loader: Arc<dyn ModelLoader>, frame_interval_ms: u64) -> Arc<Self> {
        let (events, _) = broadcast::channel(STAGE_EVENT_CAPACITY);
        let (readiness, _) = watch::channel(false);
        Arc::new(Self {
            loader,
            inner: Mutex::new(LifecycleState {
                surface: None,
                active: None,
                load_in_flight: false,
            }),
            events,
            readiness,
            frame_interval_ms,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    /// True only between a successful load/attach and the next release
    /// or load attempt.
    pub fn is_ready(&self) -> bool {
        *self.readiness.borrow()
    }

    pub fn subscribe_readiness(&self) -> watch::Receiver<bool> {
        self.readiness.subscribe()
    }

    /// Initializes the render surface exactly once and starts the
    /// per-frame redraw loop; later calls are ignored.
    pub async fn attach_surface(&self, surface: Arc<dyn RenderSurface>) {
        let mut inner = self.inner.lock().await;
        if inner.surface.is_some() {
            debug!("render surface already attached; ignoring");
            return;
        }
        let frame_task = spawn_frame_task(Arc::clone(&surface), self.frame_interval_ms);
        inner.surface = Some(SurfaceBinding {
            surface,
            frame_task,
        });
        info!("render surface attached");
    }

    /// Loads `config` and swaps it in as the active model. A call while
    /// another load is in flight is dropped, not queued; callers that
    /// need a superseding load to apply must re-issue it after the
    /// current one settles.
    pub async fn load(&self, config: ModelConfig) -> Result<(), StageError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.load_in_flight {
                debug!(url = %config.url, "model load already in flight; dropping request");
                return Ok(());
            }
            inner.load_in_flight = true;
            // The outgoing model is released up front; a failed load
            // leaves the stage blank rather than half-swapped.
            release_active(&mut inner);
        }
        self.readiness.send_replace(false);
        info!(url = %config.url, "loading model");

        let options = ModelLoadOptions {
            auto_hit_test: config.pointer_interactive,
            auto_focus: false,
            idle_motion_group: config.idle_motion_group.clone(),
        };
        let loaded = self.loader.load(&config.url, options).await;

        let mut inner = self.inner.lock().await;
        inner.load_in_flight = false;
        let handle = match loaded {
            Ok(handle) => handle,
            Err(source) => {
                // Fail-safe: the stage goes blank instead of crashing.
                warn!(url = %config.url, error = %source, "model load failed; stage left blank");
                let _ = self.events.send(StageEvent::LoadFailed {
                    url: config.url.clone(),
                    reason: source.to_string(),
                });
                return Err(StageError::LoadFailure {
                    url: config.url,
                    source,
                });
            }
        };

        if let Some(binding) = &inner.surface {
            if let Err(source) = binding.surface.attach(Arc::clone(&handle)) {
                warn!(url = %config.url, error = %source, "surface attach failed");
                handle.destroy();
                let _ = self.events.send(StageEvent::LoadFailed {
                    url: config.url.clone(),
                    reason: source.to_string(),
                });
                return Err(StageError::LoadFailure {
                    url: config.url,
                    source,
                });
            }
        }

        if let Some(expression) = &config.default_emotion {
            if let Err(error) = handle.set_expression(expression) {
                warn!(expression = %expression, error = %error, "default emotion rejected");
            }
        }

        inner.active = Some(ActiveModel {
            handle: Arc::clone(&handle),
        });
        drop(inner);

        self.readiness.send_replace(true);
        info!(url = %config.url, "model attached and ready");
        let _ = self.events.send(StageEvent::ModelReady {
            model: handle,
            config,
        });
        Ok(())
    }

    /// Tears down the current handle and surface. Safe to call any
    /// number of times.
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        let had_stage = inner.active.is_some() || inner.surface.is_some();
        self.readiness.send_replace(false);
        release_active(&mut inner);
        if let Some(binding) = inner.surface.take() {
            binding.frame_task.abort();
            binding.surface.destroy();
        }
        drop(inner);
        if had_stage {
            let _ = self.events.send(StageEvent::ModelReleased);
            info!("stage released");
        }
    }

    /// The currently attached handle, if any. Collaborators hold the
    /// returned reference only for the duration of one operation.
    pub async fn active_model(&self) -> Option<Arc<dyn ModelHandle>> {
        self.inner
            .lock()
            .await
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.handle))
    }

    pub async fn active_surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.inner
            .lock()
            .await
            .surface
            .as_ref()
            .map(|binding| Arc::clone(&binding.surface))
    }

    /// Rebroadcasts a host-window resize for the sizing subscriber.
    pub fn notify_container_resized(&self, width: u32, height: u32) {
        let _ = self
            .events
            .send(StageEvent::ContainerResized { width, height });
    }
}

/// Fully releases the previous handle: listeners detached, removed from
/// the scene, engine resources freed. Runs before a replacement attaches
/// so the surface never holds two drawables.
fn release_active(inner: &mut LifecycleState) {
    let Some(active) = inner.active.take() else {
        return;
    };
    active.handle.remove_all_listeners();
    if let Some(binding) = &inner.surface {
        binding.surface.detach(&active.handle);
    }
    active.handle.destroy();
    debug!("previous model handle released");
}

fn spawn_frame_task(surface: Arc<dyn RenderSurface>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            surface.render_frame();
        }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
