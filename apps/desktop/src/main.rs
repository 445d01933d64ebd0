use std::sync::Arc;

use anyhow::Result;
use avatar_core::{
    config, interaction::InteractionController, sizing::SizingReconciler, speech::SpeechQueue,
    InterruptFlag, MissingChatHistorySink, MissingConversationSink, MissingModelLoader,
    MissingNotificationSink, MissingShellMessenger, MissingSubtitleSink, MissingSurfaceFactory,
    ModelLifecycle,
};
use clap::Parser;
use shared::{domain::ModelConfig, protocol::ShellRequest};
use stage_integration::{SurfaceFactory, SurfaceOptions};
use tracing::warn;

#[derive(Parser, Debug)]
struct Args {
    /// Path to the stage settings file.
    #[arg(long, default_value = "avatar.toml")]
    settings: String,
    /// Overrides the first configured model URL.
    #[arg(long)]
    model_url: Option<String>,
    /// Run as a transparent desktop-pet overlay.
    #[arg(long)]
    pet_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.settings);
    if args.pet_mode {
        settings.pet_mode = true;
    }

    let stage = ModelLifecycle::with_frame_interval(
        Arc::new(MissingModelLoader),
        settings.frame_interval_ms,
    );

    let surface_factory = MissingSurfaceFactory;
    match surface_factory
        .create(SurfaceOptions {
            width: settings.surface_width,
            height: settings.surface_height,
            transparent_background: settings.pet_mode,
            device_pixel_ratio: settings.device_pixel_ratio,
        })
        .await
    {
        Ok(surface) => stage.attach_surface(surface).await,
        Err(error) => warn!(%error, "render surface unavailable; running headless"),
    }

    let _sizing_task = SizingReconciler::new(Arc::clone(&stage)).spawn();
    let _interaction_task = InteractionController::new(
        Arc::clone(&stage),
        Arc::new(MissingShellMessenger),
        settings.pet_mode,
        settings.hover_component_id.clone(),
    )
    .spawn();

    let interrupt = InterruptFlag::new();
    let _speech_queue = SpeechQueue::new(
        Arc::clone(&stage),
        Arc::new(MissingConversationSink),
        Arc::new(MissingSubtitleSink),
        Arc::new(MissingChatHistorySink),
        Arc::new(MissingNotificationSink),
        interrupt,
    );

    let model = args
        .model_url
        .map(ModelConfig::new)
        .or_else(|| settings.models.first().cloned());
    match model {
        Some(config) => {
            if let Err(error) = stage.load(config).await {
                warn!(%error, "initial model load failed");
            }
        }
        None => {
            println!("No model configured; pass --model-url or add [[models]] to avatar.toml.")
        }
    }

    let hover = ShellRequest::UpdateComponentHover {
        component_id: settings.hover_component_id,
        hovering: true,
    };
    println!(
        "Prepared shell hover payload: {}",
        serde_json::to_string(&hover)?
    );
    println!("Rendering engine adapter (Live2D bridge) is TODO in this minimal skeleton.");

    Ok(())
}
