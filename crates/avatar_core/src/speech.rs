//! Ordered speech playback: one lip-synced line at a time, strict FIFO.
//!
//! The queue is the system's only concurrency-control primitive: a
//! single worker task drains an unbounded channel, so task N+1 cannot
//! start until task N has resolved, success or error.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use shared::{
    domain::{ChatRecord, SpeechTask},
    protocol::ConversationOutbound,
};
use stage_integration::LipSyncClip;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    ChatHistorySink, ConversationSink, InterruptFlag, ModelLifecycle, NotificationSink,
    SubtitleSink,
};

struct QueueContext {
    stage: Arc<ModelLifecycle>,
    conversation: Arc<dyn ConversationSink>,
    subtitles: Arc<dyn SubtitleSink>,
    history: Arc<dyn ChatHistorySink>,
    notifications: Arc<dyn NotificationSink>,
    interrupt: Arc<InterruptFlag>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

/// FIFO of speech tasks with a single consumer. Expression and lip-sync
/// calls go to whichever model the lifecycle currently exposes.
pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<SpeechTask>,
    conversation: Arc<dyn ConversationSink>,
    interrupt: Arc<InterruptFlag>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    worker: JoinHandle<()>,
}

impl SpeechQueue {
    pub fn new(
        stage: Arc<ModelLifecycle>,
        conversation: Arc<dyn ConversationSink>,
        subtitles: Arc<dyn SubtitleSink>,
        history: Arc<dyn ChatHistorySink>,
        notifications: Arc<dyn NotificationSink>,
        interrupt: Arc<InterruptFlag>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());
        let context = QueueContext {
            stage,
            conversation: Arc::clone(&conversation),
            subtitles,
            history,
            notifications,
            interrupt: Arc::clone(&interrupt),
            pending: Arc::clone(&pending),
            drained: Arc::clone(&drained),
        };
        let worker = tokio::spawn(run_worker(rx, context));
        Self {
            tx,
            conversation,
            interrupt,
            pending,
            drained,
            worker,
        }
    }

    /// Appends a task to the FIFO; execution starts immediately when the
    /// queue is idle. Dropped silently while the conversation is
    /// interrupted.
    pub fn enqueue(&self, task: SpeechTask) {
        if self.interrupt.is_interrupted() {
            debug!("conversation interrupted; dropping queued speech task");
            return;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("speech worker is gone; dropping task");
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Resolves once every queued task has resolved and the queue is
    /// idle again.
    pub async fn wait_for_completion(&self) {
        loop {
            let drained = self.drained.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Waits for the current batch to drain, then tells the backend the
    /// frontend finished talking. One signal per synthesis batch.
    pub async fn notify_batch_complete(&self) {
        self.wait_for_completion().await;
        self.conversation
            .send(ConversationOutbound::FrontendPlaybackComplete);
    }

    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<SpeechTask>, context: QueueContext) {
    while let Some(task) = rx.recv().await {
        run_task(&context, task).await;
        if context.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            context.drained.notify_waiters();
        }
    }
}

/// One task from side effects to resolution. Playback errors resolve the
/// task rather than stalling the queue.
async fn run_task(context: &QueueContext, task: SpeechTask) {
    // Interrupts take effect at task boundaries only.
    if context.interrupt.is_interrupted() {
        debug!("conversation interrupted; resolving speech task without side effects");
        return;
    }

    if let Some(display_text) = &task.display_text {
        context.history.append(ChatRecord {
            speaker: display_text.speaker.clone(),
            text: display_text.text.clone(),
            received_at: Utc::now(),
        });
        context.subtitles.show(&display_text.text);
        if !task.forwarded {
            context.conversation.send(ConversationOutbound::AudioPlayStart {
                display_text: display_text.clone(),
                forwarded: true,
            });
        }
    }

    let model = context.stage.active_model().await;

    if let Some(expression) = &task.expression {
        match &model {
            Some(model) => {
                if let Err(error) = model.set_expression(expression) {
                    warn!(expression = %expression, error = %error, "failed to apply expression");
                }
            }
            None => debug!(expression = %expression, "no active model; skipping expression"),
        }
    }

    if task.audio.is_empty() {
        // Silent line, e.g. text only.
        return;
    }

    let Some(model) = model else {
        debug!("no active model; skipping audio playback");
        return;
    };

    let clip = LipSyncClip {
        audio: task.audio,
        viseme_volumes: task.viseme_volumes,
        slice_duration_ms: task.slice_duration_ms,
    };
    match model.speak(clip) {
        Ok(playback) => {
            if let Err(error) = playback.await {
                warn!(error = %error, "audio playback failed; resolving task anyway");
            }
        }
        Err(error) => {
            warn!(error = %error, "audio playback setup failed");
            context
                .notifications
                .toast(&format!("Audio playback failed: {error}"));
        }
    }

    // A per-line expression lasts for the line it came with.
    if task.expression.is_some() {
        model.reset_expression();
    }
}

#[cfg(test)]
#[path = "tests/speech_tests.rs"]
mod tests;
