/// Offline backend
///
/// Produces deterministic placeholder media locally: images are flat JPEG
/// swatches colored from a hash of the prompt and shaped to the requested
/// aspect ratio, videos are opaque byte blobs. Video operations finish after
/// a configurable number of polls. Failures can be injected per prompt or per
/// image, and every call is counted.
use super::{
    BackendType, GeneratedImage, GeneratedVideo, GenerationBackend, VideoOperation,
};
use crate::asset::{AspectRatio, ContinuationToken, ImageStyle, OutputType, ReferenceImage};
use crate::error::{GenerationError, GenerationResult, ENTITY_NOT_FOUND};
use image::{imageops::FilterType, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Longest side of a generated placeholder, in pixels
const PLACEHOLDER_SIZE: u32 = 256;

struct PendingVideo {
    prompt: String,
    polls_left: usize,
}

/// Offline backend
pub struct OfflineBackend {
    polls_until_done: usize,
    reject_key: bool,
    failing_prompts: Mutex<Vec<String>>,
    failing_upscales: Mutex<HashSet<String>>,
    operations: Mutex<HashMap<String, PendingVideo>>,
    next_operation: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for OfflineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineBackend {
    /// Create new offline backend; videos finish after two polls
    pub fn new() -> Self {
        Self {
            polls_until_done: 2,
            reject_key: false,
            failing_prompts: Mutex::new(Vec::new()),
            failing_upscales: Mutex::new(HashSet::new()),
            operations: Mutex::new(HashMap::new()),
            next_operation: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of polls before a video operation reports done
    pub fn with_polls_until_done(mut self, polls: usize) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Answer every call as if the credential no longer resolves
    pub fn with_rejected_key(mut self) -> Self {
        self.reject_key = true;
        self
    }

    /// Fail any call whose prompt contains `marker`
    pub fn fail_prompts_containing(&self, marker: impl Into<String>) {
        self.failing_prompts.lock().push(marker.into());
    }

    /// Fail upscaling of exactly these image bytes
    pub fn fail_upscale_of(&self, bytes: &[u8]) {
        self.failing_upscales.lock().insert(fingerprint(bytes));
    }

    /// Total number of backend calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, prompt: Option<&str>) -> GenerationResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.reject_key {
            return Err(GenerationError::Remote {
                status: 404,
                message: ENTITY_NOT_FOUND.to_string(),
            });
        }

        if let Some(prompt) = prompt {
            let failing = self.failing_prompts.lock();
            if failing.iter().any(|marker| prompt.contains(marker.as_str())) {
                return Err(GenerationError::Remote {
                    status: 500,
                    message: format!("Simulated failure for prompt \"{}\"", prompt),
                });
            }
        }
        Ok(())
    }

    fn start(&self, prompt: &str) -> VideoOperation {
        let id = self.next_operation.fetch_add(1, Ordering::SeqCst);
        let name = format!("operations/offline-{}", id);

        if self.polls_until_done == 0 {
            return finished(name, prompt);
        }

        self.operations.lock().insert(
            name.clone(),
            PendingVideo {
                prompt: prompt.to_string(),
                polls_left: self.polls_until_done,
            },
        );
        VideoOperation::pending(name)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for OfflineBackend {
    fn name(&self) -> &str {
        "Offline"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Offline
    }

    async fn generate_images(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
        _maintain_consistency: bool,
        count: u32,
    ) -> GenerationResult<Vec<GeneratedImage>> {
        self.enter(Some(prompt))?;

        (0..count)
            .map(|variant| {
                let seed = format!("{}|{}|{}", prompt, style.label(), variant);
                placeholder(&seed, aspect_ratio)
            })
            .collect()
    }

    async fn edit_image(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
    ) -> GenerationResult<Vec<GeneratedImage>> {
        self.enter(Some(prompt))?;

        let seed = format!("{}|{}", prompt, fingerprint(&reference.bytes));
        let aspect = image::load_from_memory(&reference.bytes)
            .map(|img| closest_aspect(img.width(), img.height()))
            .unwrap_or_default();
        Ok(vec![placeholder(&seed, aspect)?])
    }

    async fn upscale_image(&self, image: &ReferenceImage) -> GenerationResult<GeneratedImage> {
        self.enter(None)?;

        if self.failing_upscales.lock().contains(&fingerprint(&image.bytes)) {
            return Err(GenerationError::MissingImage(
                "Image upscaling failed to return an image.".to_string(),
            ));
        }

        let source = image::load_from_memory(&image.bytes)?;
        let upscaled = source.resize_exact(
            source.width() * 2,
            source.height() * 2,
            FilterType::Triangle,
        );
        Ok(GeneratedImage {
            bytes: encode_jpeg(&upscaled.to_rgb8())?,
            mime_type: "image/jpeg".to_string(),
        })
    }

    async fn submit_video(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
        _reference: Option<&ReferenceImage>,
    ) -> GenerationResult<VideoOperation> {
        self.enter(Some(prompt))?;
        Ok(self.start(prompt))
    }

    async fn submit_extend(
        &self,
        token: &ContinuationToken,
        prompt: &str,
        _aspect_ratio: AspectRatio,
    ) -> GenerationResult<VideoOperation> {
        self.enter(Some(prompt))?;
        let source = token.video().get("prompt").and_then(|p| p.as_str()).unwrap_or("");
        Ok(self.start(&format!("{} + {}", source, prompt)))
    }

    async fn submit_animation(
        &self,
        prompt: &str,
        references: &[ReferenceImage],
    ) -> GenerationResult<VideoOperation> {
        self.enter(Some(prompt))?;
        let frames: Vec<String> = references.iter().map(|r| fingerprint(&r.bytes)).collect();
        Ok(self.start(&format!("{} [{}]", prompt, frames.join(","))))
    }

    async fn poll_video(&self, operation: &VideoOperation) -> GenerationResult<VideoOperation> {
        self.enter(None)?;

        let mut operations = self.operations.lock();
        let Some(pending) = operations.get_mut(&operation.name) else {
            return Err(GenerationError::Remote {
                status: 404,
                message: format!("Unknown operation {}", operation.name),
            });
        };

        pending.polls_left = pending.polls_left.saturating_sub(1);
        if pending.polls_left > 0 {
            return Ok(VideoOperation::pending(operation.name.clone()));
        }

        let prompt = pending.prompt.clone();
        operations.remove(&operation.name);
        Ok(finished(operation.name.clone(), &prompt))
    }

    async fn fetch_video(&self, video: &GeneratedVideo) -> GenerationResult<Vec<u8>> {
        self.enter(None)?;

        let prompt = video.raw.get("prompt").and_then(|p| p.as_str()).ok_or_else(|| {
            GenerationError::MissingVideo(format!("No offline video at {}", video.uri))
        })?;
        let mut bytes = b"OFFLINE-MP4\0".to_vec();
        bytes.extend_from_slice(&Sha256::digest(prompt.as_bytes()));
        Ok(bytes)
    }

    async fn suggest_prompts(
        &self,
        theme: &str,
        output_type: OutputType,
    ) -> GenerationResult<Vec<String>> {
        self.enter(Some(theme))?;

        let subject = match output_type {
            OutputType::Image => "A detailed illustration",
            OutputType::Video => "A slow cinematic pan",
        };
        Ok([
            "at golden hour",
            "in a misty forest",
            "on a neon-lit street at night",
            "under a starry sky",
            "in soft studio lighting",
        ]
        .iter()
        .map(|setting| format!("{} of {} {}", subject, theme.trim(), setting))
        .collect())
    }
}

fn finished(name: String, prompt: &str) -> VideoOperation {
    let uri = format!("offline://videos/{}", fingerprint(prompt.as_bytes()));
    VideoOperation {
        name,
        done: true,
        video: Some(GeneratedVideo {
            raw: json!({ "uri": uri, "prompt": prompt }),
            uri,
        }),
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..8])
}

fn closest_aspect(width: u32, height: u32) -> AspectRatio {
    let ratio = width as f32 / height.max(1) as f32;
    AspectRatio::ALL
        .iter()
        .copied()
        .min_by(|a, b| {
            let distance = |r: &AspectRatio| {
                let (w, h) = r.proportions();
                (w as f32 / h as f32 - ratio).abs()
            };
            distance(a).total_cmp(&distance(b))
        })
        .unwrap_or_default()
}

/// Flat swatch with a soft vertical gradient, colored by the seed
fn placeholder(seed: &str, aspect_ratio: AspectRatio) -> GenerationResult<GeneratedImage> {
    let digest = Sha256::digest(seed.as_bytes());
    let (pw, ph) = aspect_ratio.proportions();
    let longest = pw.max(ph);
    let width = PLACEHOLDER_SIZE * pw / longest;
    let height = PLACEHOLDER_SIZE * ph / longest;

    let base = [digest[0], digest[1], digest[2]];
    let img = RgbImage::from_fn(width, height, |_, y| {
        let shade = (y * 64 / height.max(1)) as u8;
        Rgb(base.map(|c| c.saturating_add(shade)))
    });

    Ok(GeneratedImage {
        bytes: encode_jpeg(&img)?,
        mime_type: "image/jpeg".to_string(),
    })
}

fn encode_jpeg(img: &RgbImage) -> GenerationResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
    Ok(bytes)
}
