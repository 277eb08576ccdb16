//! Operations chained on earlier results: extending a video, animating a
//! handful of images, upscaling, and prompt ideas.

use crate::asset::{data_url, AspectRatio, AssetHandle, OutputType, ReferenceImage};
use crate::error::{GenerationError, GenerationResult};
use crate::orchestrator::Orchestrator;
use jobs::{ProgressSender, ANIMATION_READY_MESSAGE, EXTENSION_READY_MESSAGE};
use tracing::info;

pub const MIN_ANIMATION_FRAMES: usize = 2;
pub const MAX_ANIMATION_FRAMES: usize = 3;

pub const UPSCALED_PREFIX: &str = "(Upscaled) ";

/// Prompt recorded for an extension of `source_prompt`
pub fn extension_prompt(prompt: &str, source_prompt: &str) -> String {
    format!("Extension: \"{}\" (Original: {})", prompt, source_prompt)
}

/// Prompt recorded for an animation
pub fn animation_prompt(prompt: &str) -> String {
    format!("Animation: {}", prompt)
}

impl Orchestrator {
    /// Continue a freshly generated video. Fails before any remote call when
    /// the source is not a video or carries no continuation token.
    pub async fn extend_video(
        &self,
        source: &AssetHandle,
        prompt: &str,
        progress: &ProgressSender,
    ) -> GenerationResult<AssetHandle> {
        let token = match (&source.kind, &source.continuation) {
            (OutputType::Video, Some(token)) => token,
            _ => return Err(GenerationError::MissingContinuation),
        };
        self.credentials().ensure_selected().await;

        let aspect_ratio = token.aspect_ratio();
        let mut reporter = progress.slot(0, &format!("Extending: \"{}\"", prompt));

        let result = async {
            let operation = self
                .backend()
                .submit_extend(token, prompt, aspect_ratio)
                .await?;
            let video = self
                .poll_until_done(
                    operation,
                    &mut reporter,
                    EXTENSION_READY_MESSAGE,
                    "Video extension did not return a valid video URI.",
                )
                .await?;
            self.materialize_video(&extension_prompt(prompt, &source.prompt), video, aspect_ratio)
                .await
        }
        .await;

        match result {
            Ok(asset) => {
                reporter.done();
                info!(aspect = %aspect_ratio, "video extended");
                Ok(asset)
            }
            Err(e) => {
                let e = self.recover(e).await;
                reporter.failed(&e);
                Err(e)
            }
        }
    }

    /// Build one 16:9 video from 2-3 images, in the order given
    pub async fn create_animation(
        &self,
        frames: &[AssetHandle],
        prompt: &str,
        progress: &ProgressSender,
    ) -> GenerationResult<AssetHandle> {
        if !(MIN_ANIMATION_FRAMES..=MAX_ANIMATION_FRAMES).contains(&frames.len()) {
            return Err(GenerationError::AnimationImageCount(frames.len()));
        }
        if frames.iter().any(|frame| !frame.is_image()) {
            return Err(GenerationError::NotAnImage);
        }
        self.credentials().ensure_selected().await;

        let references: Vec<ReferenceImage> = frames.iter().map(AssetHandle::to_reference).collect();
        let mut reporter = progress.slot(0, &format!("Animation: \"{}\"", prompt));

        let result = async {
            let operation = self.backend().submit_animation(prompt, &references).await?;
            let video = self
                .poll_until_done(
                    operation,
                    &mut reporter,
                    ANIMATION_READY_MESSAGE,
                    "Animation generation did not return a valid video URI.",
                )
                .await?;
            self.materialize_video(&animation_prompt(prompt), video, AspectRatio::Landscape)
                .await
        }
        .await;

        match result {
            Ok(asset) => {
                reporter.done();
                info!(frames = frames.len(), "animation created");
                Ok(asset)
            }
            Err(e) => {
                let e = self.recover(e).await;
                reporter.failed(&e);
                Err(e)
            }
        }
    }

    /// Upscaled copy of an image asset
    pub async fn upscale(&self, asset: &AssetHandle) -> GenerationResult<AssetHandle> {
        if !asset.is_image() {
            return Err(GenerationError::NotAnImage);
        }

        let upscaled = match self.backend().upscale_image(&asset.to_reference()).await {
            Ok(image) => image,
            Err(e) => return Err(self.recover(e).await),
        };

        Ok(AssetHandle {
            display_url: data_url(&upscaled.mime_type, &upscaled.bytes),
            bytes: upscaled.bytes,
            mime_type: upscaled.mime_type,
            prompt: format!("{}{}", UPSCALED_PREFIX, asset.prompt),
            is_upscaled: true,
            ..asset.clone()
        })
    }

    /// Prompt ideas for a theme
    pub async fn suggest_prompts(
        &self,
        theme: &str,
        output_type: OutputType,
    ) -> GenerationResult<Vec<String>> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(GenerationError::EmptyTheme);
        }

        match self.backend().suggest_prompts(theme, output_type).await {
            Ok(ideas) => Ok(ideas),
            Err(e) => Err(self.recover(e).await),
        }
    }
}
