//! Pointer gesture handling: drag-to-move, tap-to-motion, hover relay.

use std::sync::Arc;

use shared::{domain::ModelConfig, protocol::ShellRequest};
use stage_integration::{
    ModelHandle, MotionPriority, PointerButton, PointerEvent, RenderSurface,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{motion, ModelLifecycle, ShellMessenger, StageEvent};

/// Cumulative displacement from the press point beyond which a press
/// stops counting as a tap.
const TAP_SLOP_PX: f32 = 5.0;

/// What the surrounding task should do in response to a pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    None,
    MoveModel { x: f32, y: f32 },
    Tap { x: f32, y: f32 },
}

/// Transient drag/tap bookkeeping for one attached model. Reset on every
/// pointer-down/up cycle and dropped with the model binding.
#[derive(Debug, Default)]
pub struct GestureState {
    dragging: bool,
    is_tap: bool,
    pointer_offset_x: f32,
    pointer_offset_y: f32,
    press_x: f32,
    press_y: f32,
}

impl GestureState {
    pub fn on_pointer_down(&mut self, x: f32, y: f32, model_x: f32, model_y: f32) {
        self.dragging = true;
        self.is_tap = true;
        self.pointer_offset_x = x - model_x;
        self.pointer_offset_y = y - model_y;
        self.press_x = x;
        self.press_y = y;
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) -> GestureAction {
        if !self.dragging {
            return GestureAction::None;
        }
        let dx = x - self.press_x;
        let dy = y - self.press_y;
        if self.is_tap && (dx * dx + dy * dy).sqrt() >= TAP_SLOP_PX {
            self.is_tap = false;
        }
        GestureAction::MoveModel {
            x: x - self.pointer_offset_x,
            y: y - self.pointer_offset_y,
        }
    }

    pub fn on_pointer_up(&mut self, x: f32, y: f32) -> GestureAction {
        if !self.dragging {
            return GestureAction::None;
        }
        self.dragging = false;
        if self.is_tap {
            GestureAction::Tap { x, y }
        } else {
            GestureAction::None
        }
    }

    /// Pointer released outside the window: the drag ends without a tap.
    pub fn on_pointer_up_outside(&mut self) {
        self.dragging = false;
        self.is_tap = false;
    }

    pub fn dragging(&self) -> bool {
        self.dragging
    }
}

/// Binds the pointer-event stream to whichever model is currently ready.
/// Listens for [`StageEvent::ModelReady`] and rebinds on each one; the
/// previous binding task is aborted first, so listeners for a released
/// handle can never fire.
pub struct InteractionController {
    stage: Arc<ModelLifecycle>,
    shell: Arc<dyn ShellMessenger>,
    pet_mode: bool,
    hover_component_id: String,
}

impl InteractionController {
    pub fn new(
        stage: Arc<ModelLifecycle>,
        shell: Arc<dyn ShellMessenger>,
        pet_mode: bool,
        hover_component_id: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            shell,
            pet_mode,
            hover_component_id: hover_component_id.into(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        // Subscribe before spawning so a model becoming ready right after
        // this call is never missed.
        let mut events = self.stage.subscribe_events();
        tokio::spawn(async move {
            let mut binding: Option<JoinHandle<()>> = None;
            while let Ok(event) = events.recv().await {
                match event {
                    StageEvent::ModelReady { model, config } => {
                        if let Some(task) = binding.take() {
                            task.abort();
                        }
                        if !config.pointer_interactive {
                            debug!(url = %config.url, "pointer interaction disabled for model");
                            continue;
                        }
                        let Some(surface) = self.stage.active_surface().await else {
                            continue;
                        };
                        binding = Some(self.spawn_pointer_task(surface, model, config));
                    }
                    StageEvent::ModelReleased => {
                        if let Some(task) = binding.take() {
                            task.abort();
                        }
                    }
                    StageEvent::ContainerResized { .. } | StageEvent::LoadFailed { .. } => {}
                }
            }
            if let Some(task) = binding.take() {
                task.abort();
            }
        })
    }

    fn spawn_pointer_task(
        &self,
        surface: Arc<dyn RenderSurface>,
        model: Arc<dyn ModelHandle>,
        config: ModelConfig,
    ) -> JoinHandle<()> {
        let mut pointer_events = surface.subscribe_pointer_events();
        let shell = Arc::clone(&self.shell);
        let pet_mode = self.pet_mode;
        let hover_component_id = self.hover_component_id.clone();
        tokio::spawn(async move {
            let mut gesture = GestureState::default();
            while let Ok(event) = pointer_events.recv().await {
                match event {
                    PointerEvent::Down {
                        x,
                        y,
                        button: PointerButton::Primary,
                    } => {
                        let (model_x, model_y) = model.position();
                        gesture.on_pointer_down(x, y, model_x, model_y);
                    }
                    PointerEvent::Down { .. } => {}
                    PointerEvent::Move { x, y } => {
                        if let GestureAction::MoveModel { x, y } = gesture.on_pointer_move(x, y) {
                            model.set_position(x, y);
                        }
                    }
                    PointerEvent::Up { x, y, button } => {
                        if button == PointerButton::Secondary {
                            if pet_mode {
                                shell.send(ShellRequest::ShowContextMenu);
                            }
                            continue;
                        }
                        if let GestureAction::Tap { x, y } = gesture.on_pointer_up(x, y) {
                            play_tap_motion(&model, &config, x, y);
                        }
                    }
                    PointerEvent::UpOutside { .. } => gesture.on_pointer_up_outside(),
                    PointerEvent::Enter => {
                        if pet_mode {
                            shell.send(ShellRequest::UpdateComponentHover {
                                component_id: hover_component_id.clone(),
                                hovering: true,
                            });
                        }
                    }
                    PointerEvent::Leave => {
                        // The drag keeps visual priority over hover state.
                        if pet_mode && !gesture.dragging() {
                            shell.send(ShellRequest::UpdateComponentHover {
                                component_id: hover_component_id.clone(),
                                hovering: false,
                            });
                        }
                    }
                }
            }
        })
    }
}

fn play_tap_motion(model: &Arc<dyn ModelHandle>, config: &ModelConfig, x: f32, y: f32) {
    let (local_x, local_y) = model.to_local(x, y);
    let hit_areas = model.hit_test(local_x, local_y);
    let mut rng = rand::thread_rng();
    let Some(motion) = motion::resolve_tap_motion(&mut rng, &config.tap_motions, &hit_areas)
    else {
        debug!("tap resolved to no motion");
        return;
    };
    debug!(motion = %motion, "tap motion selected");
    if let Err(error) = model.play(&motion, MotionPriority::Forced) {
        warn!(motion = %motion, error = %error, "failed to start tap motion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_slop_drag_still_counts_as_tap() {
        let mut gesture = GestureState::default();
        gesture.on_pointer_down(100.0, 100.0, 0.0, 0.0);
        assert_eq!(
            gesture.on_pointer_move(103.0, 101.0),
            GestureAction::MoveModel { x: 3.0, y: 1.0 }
        );
        assert_eq!(
            gesture.on_pointer_up(103.0, 101.0),
            GestureAction::Tap { x: 103.0, y: 101.0 }
        );
        assert!(!gesture.dragging());
    }

    #[test]
    fn long_drag_suppresses_tap() {
        let mut gesture = GestureState::default();
        gesture.on_pointer_down(100.0, 100.0, 0.0, 0.0);
        assert_eq!(
            gesture.on_pointer_move(200.0, 100.0),
            GestureAction::MoveModel { x: 100.0, y: 0.0 }
        );
        assert_eq!(gesture.on_pointer_up(200.0, 100.0), GestureAction::None);
    }

    #[test]
    fn tap_flag_does_not_recover_after_slop_exceeded() {
        let mut gesture = GestureState::default();
        gesture.on_pointer_down(0.0, 0.0, 0.0, 0.0);
        gesture.on_pointer_move(10.0, 0.0);
        // Back to almost the press point; still not a tap.
        gesture.on_pointer_move(1.0, 0.0);
        assert_eq!(gesture.on_pointer_up(1.0, 0.0), GestureAction::None);
    }

    #[test]
    fn drag_offset_keeps_grab_point_under_pointer() {
        let mut gesture = GestureState::default();
        // Model at (40, 60), grabbed at (50, 70): offset is (10, 10).
        gesture.on_pointer_down(50.0, 70.0, 40.0, 60.0);
        assert_eq!(
            gesture.on_pointer_move(80.0, 90.0),
            GestureAction::MoveModel { x: 70.0, y: 80.0 }
        );
    }

    #[test]
    fn up_outside_cancels_without_tap() {
        let mut gesture = GestureState::default();
        gesture.on_pointer_down(10.0, 10.0, 0.0, 0.0);
        gesture.on_pointer_up_outside();
        assert!(!gesture.dragging());
        assert_eq!(gesture.on_pointer_up(10.0, 10.0), GestureAction::None);
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut gesture = GestureState::default();
        assert_eq!(gesture.on_pointer_move(10.0, 10.0), GestureAction::None);
    }
}
