/// Offline batch example
///
/// Run with:
/// cargo run --example offline_batch --package ai-pipeline

use ai_pipeline::{
    build_requests, GenerationSettings, MediaCache, OfflineBackend, Orchestrator, OutputType,
    StaticCredentials,
};
use anyhow::Result;
use jobs::{ProgressBoard, ProgressSender};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Offline Batch Example ===\n");

    let media_dir = std::env::temp_dir().join("ai-pipeline-offline-batch");
    let orchestrator = Orchestrator::new(
        Arc::new(OfflineBackend::new()),
        Arc::new(StaticCredentials::new(Some("offline".to_string()))),
        MediaCache::new(&media_dir),
    )
    .with_poll_interval(Duration::from_millis(200));

    // Two image prompts, two images each
    let mut settings = GenerationSettings::default();
    settings.set_prompts("A lighthouse at dusk\nA fox in the snow");
    settings.number_of_images = 2;

    let (progress, events) = ProgressSender::channel();
    let requests = build_requests(&settings)?;
    let outputs = orchestrator
        .run_batch(OutputType::Image, &requests, &progress)
        .await?;

    for output in &outputs {
        println!("Slot {}: {}", output.slot, output.prompt);
        for asset in &output.assets {
            println!("  {} ({} bytes)", asset.mime_type, asset.bytes.len());
        }
    }

    // Now a video batch, watching the progress board
    settings.set_output_type(OutputType::Video);
    settings.set_prompts("Waves rolling onto a beach");
    let requests = build_requests(&settings)?;
    let outputs = orchestrator
        .run_batch(OutputType::Video, &requests, &progress)
        .await?;

    let mut board = ProgressBoard::new();
    for event in events.try_iter() {
        println!("  [{}] {}", event.slot, event.status.message());
        board.apply(&event);
    }
    println!("\nActive jobs after the batch: {}", board.len());

    for asset in outputs.iter().flat_map(|o| &o.assets) {
        println!("✓ Video cached at {}", asset.display_url);
    }

    Ok(())
}
