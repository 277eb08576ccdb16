//! AI pipeline for batch image and video generation
//!
//! Turns user settings into generation requests, runs them concurrently
//! against a generation backend with per-slot progress, and chains further
//! operations (extend, animate, upscale) on earlier results.

pub mod asset;
pub mod backends;
pub mod chained;
pub mod credentials;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod request;

pub use asset::{
    data_url, AspectRatio, AssetHandle, ContinuationToken, ImageStyle, OutputType, ReferenceImage,
};
pub use backends::{
    BackendConfig, BackendFactory, BackendType, GeminiBackend, GenerationBackend, OfflineBackend,
};
pub use chained::{animation_prompt, extension_prompt, UPSCALED_PREFIX};
pub use credentials::{CredentialGate, StaticCredentials};
pub use error::{GenerationError, GenerationResult};
pub use media::MediaCache;
pub use orchestrator::{JobOutput, Orchestrator};
pub use request::{build_requests, GenerationRequest, GenerationSettings, TemplatePreset};
