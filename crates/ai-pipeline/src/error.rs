//! Errors surfaced by generation, chaining and refinement operations.

use crate::asset::AspectRatio;
use thiserror::Error;

/// Marker the remote service puts in its message when the credential no
/// longer resolves to a project or model.
pub const ENTITY_NOT_FOUND: &str = "Requested entity was not found.";

#[derive(Debug, Error)]
pub enum GenerationError {
    // Input validation: reported before any remote call.
    #[error("Please enter at least one prompt.")]
    EmptyPrompts,

    #[error("Invalid aspect ratio {0} for video generation. Only 16:9 and 9:16 are supported.")]
    InvalidVideoAspect(AspectRatio),

    #[error("Animation requires between 2 and 3 reference images, got {0}.")]
    AnimationImageCount(usize),

    #[error("Cannot extend this asset. Original video data is missing or it was loaded from history.")]
    MissingContinuation,

    #[error("Only images can be upscaled.")]
    NotAnImage,

    #[error("No asset at index {0}.")]
    NoSuchAsset(usize),

    #[error("No images selected for upscaling or selected images are already upscaled.")]
    NothingToUpscale,

    #[error("Please enter a theme to generate ideas from.")]
    EmptyTheme,

    // Credentials
    #[error("API Key selection failed or was invalid. Please select a valid API key and try again.")]
    InvalidCredential,

    #[error("No API key configured. Set GEMINI_API_KEY or add api_key to the config file.")]
    MissingApiKey,

    // Remote content and transport
    #[error("{0}")]
    MissingImage(String),

    #[error("{0}")]
    MissingVideo(String),

    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("media cache error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

impl GenerationError {
    /// True for the error the remote service returns when the selected
    /// credential is invalid or expired.
    pub fn is_entity_not_found(&self) -> bool {
        match self {
            Self::Remote { message, .. } => message.contains(ENTITY_NOT_FOUND),
            _ => false,
        }
    }

    /// True for errors raised locally before anything was sent.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPrompts
                | Self::InvalidVideoAspect(_)
                | Self::AnimationImageCount(_)
                | Self::MissingContinuation
                | Self::NotAnImage
                | Self::NoSuchAsset(_)
                | Self::NothingToUpscale
                | Self::EmptyTheme
        )
    }
}

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_not_found_detection() {
        let err = GenerationError::Remote {
            status: 404,
            message: format!("NOT_FOUND: {}", ENTITY_NOT_FOUND),
        };
        assert!(err.is_entity_not_found());

        let other = GenerationError::Remote {
            status: 500,
            message: "internal".to_string(),
        };
        assert!(!other.is_entity_not_found());
        assert!(!GenerationError::MissingContinuation.is_entity_not_found());
    }

    #[test]
    fn test_input_errors() {
        assert!(GenerationError::EmptyPrompts.is_input_error());
        assert!(GenerationError::AnimationImageCount(4).is_input_error());
        assert!(!GenerationError::InvalidCredential.is_input_error());
    }

    #[test]
    fn test_missing_continuation_message() {
        let msg = GenerationError::MissingContinuation.to_string();
        assert!(msg.contains("Original video data is missing"));
    }
}
