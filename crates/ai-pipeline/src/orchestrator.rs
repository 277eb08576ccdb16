//! Batch orchestration
//!
//! Fans a list of requests out into concurrent jobs against the backend,
//! reports per-slot progress over the jobs channel and joins the results
//! fail-fast. Video jobs share one submit/poll/download primitive with the
//! chained operations.

use crate::asset::{AspectRatio, AssetHandle, ContinuationToken, OutputType};
use crate::backends::{GeneratedVideo, GenerationBackend, VideoOperation, DEFAULT_POLL_INTERVAL_SECS};
use crate::credentials::CredentialGate;
use crate::error::{GenerationError, GenerationResult};
use crate::media::MediaCache;
use crate::request::GenerationRequest;
use jobs::{join_all, ProgressSender, SlotProgress, VIDEO_READY_MESSAGE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Everything one request produced, in slot order within a batch
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub slot: usize,
    pub prompt: String,
    pub assets: Vec<AssetHandle>,
}

#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    credentials: Arc<dyn CredentialGate>,
    media: MediaCache,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialGate>,
        media: MediaCache,
    ) -> Self {
        Self {
            backend,
            credentials,
            media,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialGate> {
        &self.credentials
    }

    pub fn media(&self) -> &MediaCache {
        &self.media
    }

    /// Run every request concurrently. Exactly one output per request, in
    /// slot order; any failing job fails the batch.
    pub async fn run_batch(
        &self,
        kind: OutputType,
        requests: &[GenerationRequest],
        progress: &ProgressSender,
    ) -> GenerationResult<Vec<JobOutput>> {
        match kind {
            OutputType::Image => self.run_image_batch(requests, progress).await,
            OutputType::Video => self.run_video_batch(requests, progress).await,
        }
    }

    pub async fn run_image_batch(
        &self,
        requests: &[GenerationRequest],
        progress: &ProgressSender,
    ) -> GenerationResult<Vec<JobOutput>> {
        info!(jobs = requests.len(), "starting image batch");
        let outputs = join_all(requests.iter().map(|req| self.image_job(req, progress))).await?;
        info!(
            assets = outputs.iter().map(|o| o.assets.len()).sum::<usize>(),
            "image batch complete"
        );
        Ok(outputs)
    }

    pub async fn run_video_batch(
        &self,
        requests: &[GenerationRequest],
        progress: &ProgressSender,
    ) -> GenerationResult<Vec<JobOutput>> {
        self.credentials.ensure_selected().await;

        info!(jobs = requests.len(), "starting video batch");
        let outputs = join_all(requests.iter().map(|req| self.video_job(req, progress))).await?;
        info!(videos = outputs.len(), "video batch complete");
        Ok(outputs)
    }

    async fn image_job(
        &self,
        req: &GenerationRequest,
        progress: &ProgressSender,
    ) -> GenerationResult<JobOutput> {
        let reporter = progress.slot(req.slot, &req.prompt);
        reporter.pending();

        let result = match &req.reference_image {
            Some(reference) => self.backend.edit_image(&req.prompt, reference).await,
            None => {
                self.backend
                    .generate_images(
                        &req.prompt,
                        req.style.unwrap_or_default(),
                        req.aspect_ratio,
                        req.maintain_consistency,
                        req.want_count,
                    )
                    .await
            }
        };

        let images = match result {
            Ok(images) => images,
            Err(e) => return Err(self.fail(&reporter, e).await),
        };
        if images.is_empty() {
            warn!(slot = req.slot, prompt = %req.prompt, "no images returned");
        }

        reporter.done();
        Ok(JobOutput {
            slot: req.slot,
            prompt: req.prompt.clone(),
            assets: images
                .into_iter()
                .map(|img| AssetHandle::image(req.prompt.clone(), img.bytes, img.mime_type))
                .collect(),
        })
    }

    async fn video_job(
        &self,
        req: &GenerationRequest,
        progress: &ProgressSender,
    ) -> GenerationResult<JobOutput> {
        let mut reporter = progress.slot(req.slot, &req.prompt);

        let result = async {
            let operation = self
                .backend
                .submit_video(&req.prompt, req.aspect_ratio, req.reference_image.as_ref())
                .await?;
            let video = self
                .poll_until_done(
                    operation,
                    &mut reporter,
                    VIDEO_READY_MESSAGE,
                    &format!(
                        "Video generation for prompt \"{}\" failed to return a video.",
                        req.prompt
                    ),
                )
                .await?;
            self.materialize_video(&req.prompt, video, req.aspect_ratio)
                .await
        }
        .await;

        match result {
            Ok(asset) => {
                reporter.done();
                Ok(JobOutput {
                    slot: req.slot,
                    prompt: req.prompt.clone(),
                    assets: vec![asset],
                })
            }
            Err(e) => Err(self.fail(&reporter, e).await),
        }
    }

    /// Poll a submitted operation to completion. Emits the first narrative
    /// message right away and the next one after every poll, then the
    /// `ready` message once done.
    pub(crate) async fn poll_until_done(
        &self,
        mut operation: VideoOperation,
        reporter: &mut SlotProgress,
        ready: &str,
        missing: &str,
    ) -> GenerationResult<GeneratedVideo> {
        reporter.advance();

        let mut polls = 0usize;
        while !operation.done {
            tokio::time::sleep(self.poll_interval).await;
            operation = self.backend.poll_video(&operation).await?;
            polls += 1;
            reporter.advance();
        }
        debug!(operation = %operation.name, polls, "operation finished");

        reporter.finishing(ready);
        operation
            .video
            .ok_or_else(|| GenerationError::MissingVideo(missing.to_string()))
    }

    /// Download the finished video and give it a local display URL
    pub(crate) async fn materialize_video(
        &self,
        prompt: &str,
        video: GeneratedVideo,
        aspect_ratio: AspectRatio,
    ) -> GenerationResult<AssetHandle> {
        let bytes = self.backend.fetch_video(&video).await?;
        let url = self.media.store(&bytes, VIDEO_MIME_TYPE).await?;
        let token = ContinuationToken::new(video.raw, aspect_ratio);

        Ok(AssetHandle::video(prompt, bytes, VIDEO_MIME_TYPE, url, Some(token)))
    }

    /// Pass a remote error through credential recovery
    pub(crate) async fn recover(&self, error: GenerationError) -> GenerationError {
        self.credentials.recover(error).await
    }

    async fn fail(&self, reporter: &SlotProgress, error: GenerationError) -> GenerationError {
        let error = self.recover(error).await;
        warn!(slot = reporter.slot(), "job failed: {}", error);
        reporter.failed(&error);
        error
    }
}
