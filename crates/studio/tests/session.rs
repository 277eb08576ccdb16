use ai_pipeline::{
    AspectRatio, AssetHandle, GenerationError, GenerationSettings, MediaCache, OfflineBackend,
    Orchestrator, OutputType, StaticCredentials,
};
use jobs::SequenceProgress;
use project::{HistoryAsset, HistoryRecord, HistoryStore, MemoryKvStore, MAX_HISTORY_ITEMS};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use studio::{Studio, StudioEvent, BULK_UPSCALE_FAILED};

fn new_studio(backend: &Arc<OfflineBackend>, dir: &Path) -> Studio {
    let orchestrator = Orchestrator::new(
        backend.clone(),
        Arc::new(StaticCredentials::new(Some("test-key".into()))),
        MediaCache::new(dir.join("media")),
    )
    .with_poll_interval(Duration::ZERO);
    let history = HistoryStore::new(Arc::new(MemoryKvStore::new()));
    Studio::new(orchestrator, history)
}

fn image_settings(studio: &mut Studio, prompts: &str) {
    let settings = studio.settings_mut();
    settings.set_output_type(OutputType::Image);
    settings.set_prompts(prompts);
    settings.number_of_images = 1;
}

fn video_settings(studio: &mut Studio, prompts: &str) {
    let settings = studio.settings_mut();
    settings.set_output_type(OutputType::Video);
    settings.set_prompts(prompts);
}

#[tokio::test]
async fn generate_two_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A cat\nA dog");

    let results = studio.generate().await.unwrap();
    let prompts: Vec<&str> = results.iter().map(|a| a.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["A cat", "A dog"]);

    let history = studio.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].settings.prompts, "A cat\nA dog");
    assert_eq!(history[0].assets.len(), 2);
    assert!(studio.banner().is_none());
}

#[tokio::test]
async fn empty_prompts_are_rejected_locally() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "  \n\n");

    let err = studio.generate().await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyPrompts));
    assert_eq!(studio.banner(), Some("Please enter at least one prompt."));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn failed_batch_sets_banner_and_keeps_no_history() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    backend.fail_prompts_containing("dog");
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A cat\nA dog");

    assert!(studio.generate().await.is_err());
    assert!(studio.banner().is_some());
    assert!(studio.results().is_empty());
    assert!(studio.history().is_empty());
}

#[tokio::test]
async fn extend_splices_after_source() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    video_settings(&mut studio, "A wave\nA storm");
    studio.generate().await.unwrap();

    let at = studio.extend_video(0, "the tide goes out").await.unwrap();
    assert_eq!(at, 1);

    let results = studio.results();
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[1].prompt,
        "Extension: \"the tide goes out\" (Original: A wave)"
    );
    assert_eq!(results[2].prompt, "A storm");
    assert!(results[1].can_extend());

    let history = studio.history();
    assert_eq!(history.len(), 2);
    let snapshot = &history[0].settings;
    assert_eq!(snapshot.output_type, OutputType::Video);
    assert_eq!(snapshot.aspect_ratio, AspectRatio::Landscape);
    assert_eq!(snapshot.prompts, results[1].prompt);
    assert!(snapshot.reference_image.is_none());
}

#[tokio::test]
async fn reloaded_video_cannot_be_extended() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    video_settings(&mut studio, "A wave");
    studio.generate().await.unwrap();

    let id = studio.history()[0].id;
    assert!(studio.load_history(id).await.unwrap());
    let reloaded = &studio.results()[0];
    assert!(reloaded.continuation.is_none());
    assert!(reloaded.display_url.starts_with("file://"));

    let calls = backend.calls();
    let err = studio.extend_video(0, "more").await.unwrap_err();
    assert!(matches!(err, GenerationError::MissingContinuation));
    assert_eq!(backend.calls(), calls);
    assert!(studio
        .banner()
        .is_some_and(|b| b.contains("Original video data is missing")));
}

#[tokio::test]
async fn unwritable_media_cache_sets_banner_on_load() {
    let dir = tempfile::tempdir().unwrap();
    // A file where the cache directory should be
    std::fs::write(dir.path().join("media"), b"").unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());

    let record = HistoryRecord {
        id: 1,
        settings: GenerationSettings::default(),
        assets: vec![HistoryAsset {
            kind: OutputType::Video,
            prompt: "A wave".to_string(),
            bytes: b"mp4".to_vec(),
            mime_type: "video/mp4".to_string(),
            is_upscaled: false,
        }],
    };

    let err = studio.load_record(&record).await.unwrap_err();
    assert!(matches!(err, GenerationError::Io(_)));
    assert!(studio.banner().is_some_and(|b| b.starts_with("media cache error")));
    assert!(studio.results().is_empty());
}

#[tokio::test]
async fn animation_uses_selection_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A\nB\nC");
    studio.generate().await.unwrap();

    assert!(studio.toggle_select(2));
    assert!(studio.toggle_select(0));
    let first_frame = studio.results()[2].bytes.clone();

    let at = studio.create_animation("they dance").await.unwrap();
    assert_eq!(at, 3);
    assert_eq!(studio.results()[3].prompt, "Animation: they dance");
    assert!(studio.selection().is_empty());

    let history = studio.history();
    let snapshot = &history[0].settings;
    assert_eq!(snapshot.aspect_ratio, AspectRatio::Landscape);
    assert_eq!(
        snapshot.reference_image.as_ref().map(|r| r.bytes.clone()),
        Some(first_frame)
    );
}

#[tokio::test]
async fn animation_needs_two_images() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A");
    studio.generate().await.unwrap();
    studio.toggle_select(0);

    let calls = backend.calls();
    let err = studio.create_animation("solo").await.unwrap_err();
    assert!(matches!(err, GenerationError::AnimationImageCount(1)));
    assert_eq!(backend.calls(), calls);
}

#[tokio::test]
async fn selection_is_capped_at_three_images() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A\nB\nC\nD");
    studio.generate().await.unwrap();

    for i in 0..3 {
        assert!(studio.toggle_select(i));
    }
    assert!(!studio.toggle_select(3));
    assert_eq!(studio.selection().indices(), &[0, 1, 2]);
}

#[tokio::test]
async fn bulk_upscale_tolerates_one_failure() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A\nB\nC");
    studio.generate().await.unwrap();

    for i in 0..3 {
        studio.toggle_select(i);
    }
    let original = studio.results()[1].clone();
    backend.fail_upscale_of(&original.bytes);
    let events = studio.subscribe();

    let report = studio.bulk_upscale().await.unwrap();
    assert_eq!(report.upscaled, 2);
    assert_eq!(report.failed, 1);

    let results = studio.results();
    assert!(results[0].is_upscaled);
    assert_eq!(results[1], original);
    assert!(results[2].is_upscaled);
    assert_eq!(results[2].prompt, "(Upscaled) C");

    assert_eq!(studio.banner(), Some(BULK_UPSCALE_FAILED));
    assert!(studio.selection().is_empty());
    assert!(studio.bulk_progress().is_none());

    let events: Vec<StudioEvent> = events.try_iter().collect();

    let snapshots: Vec<&Vec<AssetHandle>> = events
        .iter()
        .filter_map(|e| match e {
            StudioEvent::Results(results) => Some(results),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots[0][0].is_upscaled);
    assert!(!snapshots[0][1].is_upscaled);
    assert!(!snapshots[0][2].is_upscaled);
    assert_eq!(snapshots[1][1], original);
    assert!(!snapshots[1][2].is_upscaled);
    assert!(snapshots[2][2].is_upscaled);

    let progress: Vec<SequenceProgress> = events
        .iter()
        .filter_map(|e| match e {
            StudioEvent::BulkProgress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert_eq!(
        progress.last(),
        Some(&SequenceProgress {
            current: 3,
            total: 3
        })
    );
}

#[tokio::test]
async fn bulk_upscale_without_targets_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A");
    studio.generate().await.unwrap();
    studio.upscale_image(0).await.unwrap();
    studio.toggle_select(0);

    let calls = backend.calls();
    let err = studio.bulk_upscale().await.unwrap_err();
    assert!(matches!(err, GenerationError::NothingToUpscale));
    assert_eq!(backend.calls(), calls);
}

#[tokio::test]
async fn history_keeps_latest_twenty() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());

    for i in 0..=MAX_HISTORY_ITEMS {
        image_settings(&mut studio, &format!("prompt {i}"));
        studio.generate().await.unwrap();
    }

    let history = studio.history();
    assert_eq!(history.len(), MAX_HISTORY_ITEMS);
    assert_eq!(history[0].assets[0].prompt, format!("prompt {}", MAX_HISTORY_ITEMS));
    assert!(history.iter().all(|r| r.assets[0].prompt != "prompt 0"));

    studio.clear_history();
    assert!(studio.history().is_empty());
}

#[tokio::test]
async fn export_writes_every_result() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(OfflineBackend::new());
    let mut studio = new_studio(&backend, dir.path());
    image_settings(&mut studio, "A cat\nA cat");
    studio.generate().await.unwrap();

    let written = studio.export(&dir.path().join("export")).unwrap();
    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("A_cat.jpg"));
    assert!(written[1].ends_with("A_cat_1.jpg"));
}
