//! Model placement: scale and position against the hosting container.

use std::sync::Arc;

use shared::domain::ModelConfig;
use stage_integration::ModelHandle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{ModelLifecycle, StageEvent};

/// Fraction of the container the auto-fit scale fills, leaving a margin
/// so motions do not clip at the edges.
const DEFAULT_FILL_RATIO: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

/// Scale and position for a model of `natural_size` inside `container`,
/// honoring the per-model overrides in `config`. In overlay mode the
/// container passed in is the full viewport.
pub fn compute_placement(
    container: (u32, u32),
    natural_size: (f32, f32),
    config: &ModelConfig,
) -> Placement {
    let (container_w, container_h) = (container.0 as f32, container.1 as f32);
    let (model_w, model_h) = natural_size;

    let scale = config.scale_hint.unwrap_or_else(|| {
        if model_w <= 0.0 || model_h <= 0.0 {
            return 1.0;
        }
        (container_w / model_w).min(container_h / model_h) * DEFAULT_FILL_RATIO
    });

    let x = (container_w - model_w * scale) / 2.0 + config.initial_x_shift;
    let y = (container_h - model_h * scale) / 2.0 + config.initial_y_shift;

    Placement { scale, x, y }
}

/// Re-applies placement whenever the model or the container changes.
/// Subscribes once to stage events; a resize with no model attached is
/// a no-op.
pub struct SizingReconciler {
    stage: Arc<ModelLifecycle>,
}

impl SizingReconciler {
    pub fn new(stage: Arc<ModelLifecycle>) -> Self {
        Self { stage }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        // Subscribe before spawning so a model becoming ready right after
        // this call is never missed.
        let mut events = self.stage.subscribe_events();
        tokio::spawn(async move {
            let mut current: Option<(Arc<dyn ModelHandle>, ModelConfig)> = None;
            while let Ok(event) = events.recv().await {
                match event {
                    StageEvent::ModelReady { model, config } => {
                        if let Some(surface) = self.stage.active_surface().await {
                            apply_placement(&model, &config, surface.size());
                        }
                        current = Some((model, config));
                    }
                    StageEvent::ContainerResized { width, height } => {
                        let Some((model, config)) = &current else {
                            debug!("container resized with no model attached; ignoring");
                            continue;
                        };
                        apply_placement(model, config, (width, height));
                    }
                    StageEvent::ModelReleased => current = None,
                    StageEvent::LoadFailed { .. } => {}
                }
            }
        })
    }
}

fn apply_placement(model: &Arc<dyn ModelHandle>, config: &ModelConfig, container: (u32, u32)) {
    let placement = compute_placement(container, model.natural_size(), config);
    model.set_scale(placement.scale);
    model.set_position(placement.x, placement.y);
    debug!(
        scale = placement.scale,
        x = placement.x,
        y = placement.y,
        "model placement applied"
    );
}
