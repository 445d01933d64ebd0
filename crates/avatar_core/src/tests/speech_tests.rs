use super::*;

use std::sync::atomic::AtomicBool;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use shared::domain::{DisplayText, ExpressionId, HitAreaName, ModelConfig, MotionName};
use stage_integration::{
    ModelHandle, ModelLoadOptions, ModelLoader, MotionPriority, SpeakFuture,
};

type EventLog = Arc<StdMutex<Vec<String>>>;

#[derive(Debug)]
struct SpeakingModel {
    log: EventLog,
    fail_setup: AtomicBool,
    fail_playback: AtomicBool,
}

impl SpeakingModel {
    fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            fail_setup: AtomicBool::new(false),
            fail_playback: AtomicBool::new(false),
        })
    }
}

impl ModelHandle for SpeakingModel {
    fn play(&self, _motion: &MotionName, _priority: MotionPriority) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_expression(&self, expression: &ExpressionId) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("expression:{expression}"));
        Ok(())
    }

    fn reset_expression(&self) {}

    fn hit_test(&self, _x: f32, _y: f32) -> Vec<HitAreaName> {
        Vec::new()
    }

    fn to_local(&self, x: f32, y: f32) -> (f32, f32) {
        (x, y)
    }

    fn set_position(&self, _x: f32, _y: f32) {}

    fn position(&self) -> (f32, f32) {
        (0.0, 0.0)
    }

    fn set_scale(&self, _scale: f32) {}

    fn natural_size(&self) -> (f32, f32) {
        (100.0, 100.0)
    }

    fn speak(&self, clip: LipSyncClip) -> anyhow::Result<SpeakFuture> {
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(anyhow!("unsupported audio buffer"));
        }
        let log = Arc::clone(&self.log);
        let label = String::from_utf8_lossy(&clip.audio).into_owned();
        let duration = Duration::from_millis(u64::from(clip.slice_duration_ms));
        let fail = self.fail_playback.load(Ordering::SeqCst);
        let playback: SpeakFuture = Box::pin(async move {
            log.lock().unwrap().push(format!("speak-start:{label}"));
            tokio::time::sleep(duration).await;
            log.lock().unwrap().push(format!("speak-end:{label}"));
            if fail {
                Err(anyhow!("output device lost"))
            } else {
                Ok(())
            }
        });
        Ok(playback)
    }

    fn destroy(&self) {}

    fn remove_all_listeners(&self) {}
}

struct SingleModelLoader(Arc<SpeakingModel>);

#[async_trait]
impl ModelLoader for SingleModelLoader {
    async fn load(
        &self,
        _url: &str,
        _options: ModelLoadOptions,
    ) -> anyhow::Result<Arc<dyn ModelHandle>> {
        Ok(Arc::clone(&self.0) as Arc<dyn ModelHandle>)
    }
}

struct LoggingSinks {
    log: EventLog,
}

impl SubtitleSink for LoggingSinks {
    fn show(&self, text: &str) {
        self.log.lock().unwrap().push(format!("subtitle:{text}"));
    }
}

impl ChatHistorySink for LoggingSinks {
    fn append(&self, record: ChatRecord) {
        self.log
            .lock()
            .unwrap()
            .push(format!("history:{}", record.text));
    }
}

impl ConversationSink for LoggingSinks {
    fn send(&self, message: ConversationOutbound) {
        let entry = match message {
            ConversationOutbound::AudioPlayStart {
                display_text,
                forwarded,
            } => format!("outbound:audio-play-start:{}:{forwarded}", display_text.text),
            ConversationOutbound::FrontendPlaybackComplete => {
                "outbound:frontend-playback-complete".to_string()
            }
        };
        self.log.lock().unwrap().push(entry);
    }
}

impl NotificationSink for LoggingSinks {
    fn toast(&self, message: &str) {
        self.log.lock().unwrap().push(format!("toast:{message}"));
    }
}

struct Fixture {
    model: Arc<SpeakingModel>,
    queue: SpeechQueue,
    interrupt: Arc<InterruptFlag>,
    log: EventLog,
}

async fn fixture(load_model: bool) -> Fixture {
    let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let model = SpeakingModel::new(Arc::clone(&log));
    let loader = Arc::new(SingleModelLoader(Arc::clone(&model)));
    let stage = ModelLifecycle::new(loader);
    if load_model {
        stage
            .load(ModelConfig::new("mem://speaking"))
            .await
            .expect("load");
    }
    let sinks = Arc::new(LoggingSinks {
        log: Arc::clone(&log),
    });
    let interrupt = InterruptFlag::new();
    let queue = SpeechQueue::new(
        stage,
        Arc::clone(&sinks) as Arc<dyn ConversationSink>,
        Arc::clone(&sinks) as Arc<dyn SubtitleSink>,
        Arc::clone(&sinks) as Arc<dyn ChatHistorySink>,
        sinks as Arc<dyn NotificationSink>,
        Arc::clone(&interrupt),
    );
    Fixture {
        model,
        queue,
        interrupt,
        log,
    }
}

/// Forwarded by default so tests opt in to the outbound notification.
fn spoken_task(label: &str, duration_ms: u32) -> SpeechTask {
    SpeechTask {
        audio: label.as_bytes().to_vec(),
        viseme_volumes: vec![0.5],
        slice_duration_ms: duration_ms,
        display_text: Some(DisplayText {
            text: label.to_string(),
            speaker: None,
        }),
        expression: None,
        forwarded: true,
    }
}

fn entries(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn tasks_run_strictly_one_at_a_time_in_fifo_order() {
    let f = fixture(true).await;
    f.queue.enqueue(spoken_task("one", 60));
    f.queue.enqueue(spoken_task("two", 40));
    f.queue.enqueue(spoken_task("three", 20));
    f.queue.wait_for_completion().await;

    assert_eq!(
        entries(&f.log),
        [
            "history:one",
            "subtitle:one",
            "speak-start:one",
            "speak-end:one",
            "history:two",
            "subtitle:two",
            "speak-start:two",
            "speak-end:two",
            "history:three",
            "subtitle:three",
            "speak-start:three",
            "speak-end:three",
        ]
        .map(String::from)
    );
}

#[tokio::test]
async fn interrupted_enqueue_is_dropped_silently() {
    let f = fixture(true).await;
    f.interrupt.interrupt();
    f.queue.enqueue(spoken_task("dropped", 10));
    f.queue.wait_for_completion().await;

    assert!(f.queue.is_idle());
    assert!(entries(&f.log).is_empty());

    // Resuming the conversation lets new lines through again.
    f.interrupt.resume();
    f.queue.enqueue(spoken_task("resumed", 10));
    f.queue.wait_for_completion().await;
    assert!(entries(&f.log).contains(&"speak-end:resumed".to_string()));
}

#[tokio::test]
async fn interrupt_takes_effect_only_at_task_boundaries() {
    let f = fixture(true).await;
    f.queue.enqueue(spoken_task("first", 200));
    f.queue.enqueue(spoken_task("second", 10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    f.interrupt.interrupt();
    f.queue.wait_for_completion().await;

    let log = entries(&f.log);
    // The in-flight playback ran to its own completion.
    assert!(log.contains(&"speak-end:first".to_string()));
    // The queued task resolved without side effects.
    assert!(!log.iter().any(|entry| entry.contains("second")));
}

#[tokio::test]
async fn silent_line_resolves_without_playback() {
    let f = fixture(true).await;
    f.queue.enqueue(SpeechTask::silent(DisplayText {
        text: "just text".to_string(),
        speaker: None,
    }));
    f.queue.wait_for_completion().await;

    assert_eq!(
        entries(&f.log),
        [
            "history:just text",
            "subtitle:just text",
            "outbound:audio-play-start:just text:true",
        ]
        .map(String::from)
    );
}

#[tokio::test]
async fn forwarded_echo_suppresses_playback_start_notification() {
    let f = fixture(true).await;
    f.queue.enqueue(spoken_task("echoed", 10));
    f.queue.wait_for_completion().await;

    assert!(!entries(&f.log)
        .iter()
        .any(|entry| entry.starts_with("outbound:")));
}

#[tokio::test]
async fn playback_error_resolves_task_and_queue_advances() {
    let f = fixture(true).await;
    f.model.fail_playback.store(true, Ordering::SeqCst);
    f.queue.enqueue(spoken_task("one", 10));
    f.queue.enqueue(spoken_task("two", 10));
    f.queue.wait_for_completion().await;

    let log = entries(&f.log);
    assert!(log.contains(&"speak-end:one".to_string()));
    assert!(log.contains(&"speak-end:two".to_string()));
    // Async playback errors never raise a toast.
    assert!(!log.iter().any(|entry| entry.starts_with("toast:")));
}

#[tokio::test]
async fn synchronous_setup_failure_toasts_and_queue_advances() {
    let f = fixture(true).await;
    f.model.fail_setup.store(true, Ordering::SeqCst);
    f.queue.enqueue(spoken_task("one", 10));
    f.queue.wait_for_completion().await;

    let log = entries(&f.log);
    assert!(!log.iter().any(|entry| entry.starts_with("speak-start:")));
    assert!(log.iter().any(|entry| entry.starts_with("toast:")));

    f.model.fail_setup.store(false, Ordering::SeqCst);
    f.queue.enqueue(spoken_task("two", 10));
    f.queue.wait_for_completion().await;
    assert!(entries(&f.log).contains(&"speak-end:two".to_string()));
}

#[tokio::test]
async fn batch_complete_signal_fires_once_after_drain() {
    let f = fixture(true).await;
    f.queue.enqueue(spoken_task("one", 40));
    f.queue.enqueue(spoken_task("two", 30));
    f.queue.notify_batch_complete().await;

    let log = entries(&f.log);
    assert_eq!(
        log.last().map(String::as_str),
        Some("outbound:frontend-playback-complete")
    );
    assert_eq!(
        log.iter()
            .filter(|entry| *entry == "outbound:frontend-playback-complete")
            .count(),
        1
    );
    let last_playback = log
        .iter()
        .position(|entry| entry == "speak-end:two")
        .expect("second playback finished");
    assert!(last_playback < log.len() - 1);
}

#[tokio::test]
async fn expression_is_applied_before_playback_starts() {
    let f = fixture(true).await;
    let mut task = spoken_task("one", 10);
    task.expression = Some(ExpressionId::from("smile"));
    f.queue.enqueue(task);
    f.queue.wait_for_completion().await;

    let log = entries(&f.log);
    let expression_at = log
        .iter()
        .position(|entry| entry == "expression:smile")
        .expect("expression applied");
    let playback_at = log
        .iter()
        .position(|entry| entry == "speak-start:one")
        .expect("playback started");
    assert!(expression_at < playback_at);
}

#[tokio::test]
async fn missing_model_skips_playback_but_keeps_text_flow() {
    let f = fixture(false).await;
    f.queue.enqueue(spoken_task("one", 10));
    f.queue.wait_for_completion().await;

    assert_eq!(
        entries(&f.log),
        ["history:one", "subtitle:one"].map(String::from)
    );
}
