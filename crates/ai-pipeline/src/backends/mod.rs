//! Generation backends abstraction
//!
//! Provides a uniform async interface over the remote generation service:
//! - Gemini API (Imagen, Gemini image, Veo)
//! - Offline (deterministic local placeholders, no network)

pub mod gemini;
pub mod offline;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiBackend;
pub use offline::OfflineBackend;

use crate::asset::{AspectRatio, ContinuationToken, ImageStyle, OutputType, ReferenceImage};
use crate::error::{GenerationError, GenerationResult};

/// Instruction sent alongside an image to upscale it
pub const UPSCALE_PROMPT: &str = "Upscale this image to the highest possible resolution, enhancing details and clarity without altering the original composition or subject. Make it 4K.";

/// Default wait between operation polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// Google Generative Language API
    #[default]
    Gemini,
    /// Local placeholder generation
    Offline,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Image returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Finished video as described by the service
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVideo {
    /// Download location; needs the credential appended
    pub uri: String,

    /// Full video object, kept for continuation
    pub raw: serde_json::Value,
}

/// Handle to a long-running video operation
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub video: Option<GeneratedVideo>,
}

impl VideoOperation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            video: None,
        }
    }
}

/// Remote generation client
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Backend type
    fn backend_type(&self) -> BackendType;

    /// Text-to-image, one round trip
    async fn generate_images(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
        maintain_consistency: bool,
        count: u32,
    ) -> GenerationResult<Vec<GeneratedImage>>;

    /// Edit a reference image according to the prompt
    async fn edit_image(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
    ) -> GenerationResult<Vec<GeneratedImage>>;

    /// Upscale; fails with `MissingImage` when no image comes back
    async fn upscale_image(&self, image: &ReferenceImage) -> GenerationResult<GeneratedImage>;

    /// Start a text- or image-to-video operation
    async fn submit_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        reference: Option<&ReferenceImage>,
    ) -> GenerationResult<VideoOperation>;

    /// Start an extension of a previously generated video
    async fn submit_extend(
        &self,
        token: &ContinuationToken,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> GenerationResult<VideoOperation>;

    /// Start a 16:9 video built from 2-3 reference images
    async fn submit_animation(
        &self,
        prompt: &str,
        references: &[ReferenceImage],
    ) -> GenerationResult<VideoOperation>;

    /// Refresh an operation; returns the same handle with `done` updated
    async fn poll_video(&self, operation: &VideoOperation) -> GenerationResult<VideoOperation>;

    /// Download a finished video
    async fn fetch_video(&self, video: &GeneratedVideo) -> GenerationResult<Vec<u8>>;

    /// Prompt ideas for a theme
    async fn suggest_prompts(
        &self,
        theme: &str,
        output_type: OutputType,
    ) -> GenerationResult<Vec<String>>;
}

/// Model identifiers per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub image: String,
    pub image_edit: String,
    pub video: String,
    /// Used for extension and animation
    pub video_hq: String,
    pub text: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image: "imagen-4.0-generate-001".to_string(),
            image_edit: "gemini-2.5-flash-image".to_string(),
            video: "veo-3.1-fast-generate-preview".to_string(),
            video_hq: "veo-3.1-generate-preview".to_string(),
            text: "gemini-2.5-flash".to_string(),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type
    pub backend_type: BackendType,

    /// API base URL (defaults to the public endpoint)
    pub api_url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Where downloaded videos are cached
    pub media_dir: PathBuf,

    /// Seconds between operation polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub models: ModelConfig,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl BackendConfig {
    /// Create new backend config
    pub fn new(backend_type: BackendType, media_dir: PathBuf) -> Self {
        Self {
            backend_type,
            api_url: None,
            api_key: None,
            media_dir,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            models: ModelConfig::default(),
        }
    }

    /// With API endpoint
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// With API key
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// With poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// Backend factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create backend from config
    pub fn create(config: &BackendConfig) -> GenerationResult<Arc<dyn GenerationBackend>> {
        match config.backend_type {
            BackendType::Gemini => {
                let backend = GeminiBackend::new(config)?;
                Ok(Arc::new(backend))
            }
            BackendType::Offline => Ok(Arc::new(OfflineBackend::new())),
        }
    }
}

/// Instruction asking the text model for prompt ideas as a JSON array
pub fn build_ideas_prompt(theme: &str, output_type: OutputType) -> String {
    let medium = match output_type {
        OutputType::Image => "image",
        OutputType::Video => "short video",
    };
    format!(
        "Generate 5 creative, detailed and visually descriptive {medium} generation prompts based on the theme: \"{theme}\". \
         Each prompt should be a single sentence suitable for an AI {medium} generator. \
         Return ONLY a JSON array of strings."
    )
}

/// Parse the text model's answer into prompt strings, tolerating code fences
pub fn parse_ideas(text: &str) -> GenerationResult<Vec<String>> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    let ideas: Vec<String> = serde_json::from_str(text.trim())?;
    Ok(ideas
        .into_iter()
        .map(|idea| idea.trim().to_string())
        .filter(|idea| !idea.is_empty())
        .collect())
}

pub(crate) fn require_api_key(config: &BackendConfig) -> GenerationResult<String> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or(GenerationError::MissingApiKey)
}
