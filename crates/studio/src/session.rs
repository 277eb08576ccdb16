//! The working view: current settings, results, selection and the error
//! banner, plus every user-level operation on them.

use crate::events::{StudioEvent, StudioEvents};
use crate::export::export_assets;
use crate::selection::SelectionSet;
use ai_pipeline::{
    build_requests, AspectRatio, AssetHandle, GenerationError, GenerationResult,
    GenerationSettings, ImageStyle, OutputType, Orchestrator, TemplatePreset,
};
use crossbeam_channel::Receiver;
use jobs::{ProgressSender, SequenceProgress};
use project::{HistoryAsset, HistoryRecord, HistoryStore};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub struct Studio {
    pub(crate) orchestrator: Orchestrator,
    history: HistoryStore,
    settings: GenerationSettings,
    pub(crate) results: Vec<AssetHandle>,
    pub(crate) selection: SelectionSet,
    pub(crate) banner: Option<String>,
    pub(crate) bulk_progress: Option<SequenceProgress>,
    progress: ProgressSender,
    pub(crate) events: StudioEvents,
}

impl Studio {
    pub fn new(orchestrator: Orchestrator, history: HistoryStore) -> Self {
        Self {
            orchestrator,
            history,
            settings: GenerationSettings::default(),
            results: Vec::new(),
            selection: SelectionSet::new(),
            banner: None,
            bulk_progress: None,
            progress: ProgressSender::disabled(),
            events: StudioEvents::default(),
        }
    }

    /// Route per-job progress to this sender
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn subscribe(&mut self) -> Receiver<StudioEvent> {
        self.events.subscribe()
    }

    /// Close every subscription; their receivers drain and then disconnect
    pub fn unsubscribe_all(&mut self) {
        self.events.clear();
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GenerationSettings {
        &mut self.settings
    }

    pub fn results(&self) -> &[AssetHandle] {
        &self.results
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    /// Progress of the bulk pass in flight, if any
    pub fn bulk_progress(&self) -> Option<SequenceProgress> {
        self.bulk_progress
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.get_all()
    }

    pub fn apply_template(&mut self, template: TemplatePreset) {
        self.settings.apply_template(template);
    }

    /// Append a suggested prompt as a new line
    pub fn add_suggestion(&mut self, prompt: &str) {
        self.settings.add_prompt(prompt);
    }

    /// Replace the prompt text with a suggestion
    pub fn use_suggestion(&mut self, prompt: &str) {
        self.settings.set_prompts(prompt);
    }

    /// Add an asset produced outside a batch, e.g. an image file
    pub fn push_asset(&mut self, asset: AssetHandle) -> usize {
        self.results.push(asset);
        self.publish_results();
        self.results.len() - 1
    }

    /// Run a batch from the current settings, replacing the results
    pub async fn generate(&mut self) -> GenerationResult<&[AssetHandle]> {
        let requests = match build_requests(&self.settings) {
            Ok(requests) => requests,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_banner(None);
        self.results.clear();
        self.selection.clear();
        self.publish_results();
        self.publish_selection();

        let outputs = match self
            .orchestrator
            .run_batch(self.settings.output_type, &requests, &self.progress)
            .await
        {
            Ok(outputs) => outputs,
            Err(e) => return Err(self.fail(e)),
        };

        self.results = outputs.into_iter().flat_map(|o| o.assets).collect();
        info!(assets = self.results.len(), "generation finished");
        self.publish_results();

        let assets = self.results.iter().map(HistoryAsset::from).collect();
        self.record(self.settings.clone(), assets);
        Ok(&self.results)
    }

    /// Extend the video at `index`; the new video lands right after it.
    /// Returns the new asset's index.
    pub async fn extend_video(&mut self, index: usize, prompt: &str) -> GenerationResult<usize> {
        let Some(source) = self.results.get(index).cloned() else {
            return Err(self.fail(GenerationError::MissingContinuation));
        };
        if !source.can_extend() {
            return Err(self.fail(GenerationError::MissingContinuation));
        }
        self.set_banner(None);

        let extended = match self
            .orchestrator
            .extend_video(&source, prompt, &self.progress)
            .await
        {
            Ok(asset) => asset,
            Err(e) => return Err(self.fail(e)),
        };

        let aspect_ratio = extended
            .continuation
            .as_ref()
            .map(|t| t.aspect_ratio())
            .unwrap_or(AspectRatio::Landscape);
        let snapshot = chained_snapshot(&extended.prompt, aspect_ratio, None);
        let history_asset = HistoryAsset::from(&extended);

        let at = index + 1;
        self.results.insert(at, extended);
        self.selection.shift_for_insert(at);
        self.publish_results();

        self.record(snapshot, vec![history_asset]);
        Ok(at)
    }

    /// Animate the selected images, in selection order. The video is
    /// appended and the selection cleared.
    pub async fn create_animation(&mut self, prompt: &str) -> GenerationResult<usize> {
        let frames: Vec<AssetHandle> = self
            .selection
            .indices()
            .iter()
            .filter_map(|&i| self.results.get(i).cloned())
            .collect();
        self.set_banner(None);

        let video = match self
            .orchestrator
            .create_animation(&frames, prompt, &self.progress)
            .await
        {
            Ok(asset) => asset,
            Err(e) => return Err(self.fail(e)),
        };

        let reference = frames.first().map(AssetHandle::to_reference);
        let snapshot = chained_snapshot(&video.prompt, AspectRatio::Landscape, reference);
        let history_asset = HistoryAsset::from(&video);

        self.results.push(video);
        self.selection.clear();
        self.publish_results();
        self.publish_selection();

        self.record(snapshot, vec![history_asset]);
        Ok(self.results.len() - 1)
    }

    /// Upscale one image in place
    pub async fn upscale_image(&mut self, index: usize) -> GenerationResult<&AssetHandle> {
        let Some(asset) = self.results.get(index).cloned() else {
            return Err(self.fail(GenerationError::NoSuchAsset(index)));
        };
        if !asset.is_image() {
            return Err(self.fail(GenerationError::NotAnImage));
        }
        self.set_banner(None);

        let upscaled = match self.orchestrator.upscale(&asset).await {
            Ok(upscaled) => upscaled,
            Err(e) => return Err(self.fail(e)),
        };
        self.results[index] = upscaled;
        self.publish_results();
        Ok(&self.results[index])
    }

    /// Select or deselect a result
    pub fn toggle_select(&mut self, index: usize) -> bool {
        let changed = self.selection.toggle(index, &self.results);
        if changed {
            self.publish_selection();
        }
        changed
    }

    /// Restore a history record's settings and assets. Loaded videos
    /// cannot be extended.
    pub async fn load_record(&mut self, record: &HistoryRecord) -> GenerationResult<()> {
        let mut assets = Vec::with_capacity(record.assets.len());
        for asset in &record.assets {
            let handle = match asset.kind {
                OutputType::Image => {
                    AssetHandle::image(&asset.prompt, asset.bytes.clone(), &asset.mime_type)
                }
                OutputType::Video => {
                    let stored = self
                        .orchestrator
                        .media()
                        .store(&asset.bytes, &asset.mime_type)
                        .await;
                    let url = match stored {
                        Ok(url) => url,
                        Err(e) => return Err(self.fail(e.into())),
                    };
                    AssetHandle::video(&asset.prompt, asset.bytes.clone(), &asset.mime_type, url, None)
                }
            };
            assets.push(AssetHandle {
                is_upscaled: asset.is_upscaled,
                ..handle
            });
        }

        self.settings = record.settings.clone();
        self.results = assets;
        self.selection.clear();
        self.set_banner(None);
        self.publish_results();
        self.publish_selection();
        info!(id = record.id, assets = self.results.len(), "history record loaded");
        Ok(())
    }

    /// Load the record with `id`; false if there is none
    pub async fn load_history(&mut self, id: i64) -> GenerationResult<bool> {
        match self.history.find(id) {
            Some(record) => self.load_record(&record).await.map(|_| true),
            None => Ok(false),
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.events.emit(StudioEvent::HistoryChanged);
    }

    /// Prompt ideas for a theme in the current output type
    pub async fn suggest_prompts(&self, theme: &str) -> GenerationResult<Vec<String>> {
        self.orchestrator
            .suggest_prompts(theme, self.settings.output_type)
            .await
            .map_err(|e| {
                error!("failed to get prompt suggestions: {}", e);
                e
            })
    }

    /// Write all results into `dir`
    pub fn export(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        export_assets(&self.results, dir)
    }

    fn record(&mut self, settings: GenerationSettings, assets: Vec<HistoryAsset>) {
        if self.history.append(settings, assets).is_some() {
            self.events.emit(StudioEvent::HistoryChanged);
        }
    }

    pub(crate) fn set_banner(&mut self, banner: Option<String>) {
        if self.banner != banner {
            self.banner = banner.clone();
            self.events.emit(StudioEvent::Banner(banner));
        }
    }

    pub(crate) fn fail(&mut self, error: GenerationError) -> GenerationError {
        if error.is_input_error() {
            warn!("{}", error);
        } else {
            error!("{}", error);
        }
        self.set_banner(Some(error.to_string()));
        error
    }

    pub(crate) fn publish_results(&mut self) {
        self.events.emit(StudioEvent::Results(self.results.clone()));
    }

    pub(crate) fn publish_selection(&mut self) {
        self.events
            .emit(StudioEvent::Selection(self.selection.indices().to_vec()));
    }
}

/// Settings recorded for extend and animate results
fn chained_snapshot(
    prompt: &str,
    aspect_ratio: AspectRatio,
    reference_image: Option<ai_pipeline::ReferenceImage>,
) -> GenerationSettings {
    GenerationSettings {
        output_type: OutputType::Video,
        prompts: prompt.to_string(),
        style: ImageStyle::Realistic,
        aspect_ratio,
        template: TemplatePreset::Custom,
        reference_image,
        maintain_consistency: false,
        number_of_images: 1,
    }
}
