//! Generated asset model
//!
//! Output kinds, framing and style options, reference images and the
//! in-memory handle for a generated image or video.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of asset a batch produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutputType {
    #[default]
    Image,
    Video,
}

impl OutputType {
    /// File extension used when exporting this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "Image"),
            Self::Video => write!(f, "Video"),
        }
    }
}

/// Output framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        Self::Square,
        Self::Landscape,
        Self::Portrait,
        Self::Standard,
        Self::Tall,
    ];

    /// Wire value, e.g. `"16:9"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::Tall => "3:4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Square => "Square (1:1)",
            Self::Landscape => "Landscape (16:9)",
            Self::Portrait => "Portrait (9:16)",
            Self::Standard => "Standard (4:3)",
            Self::Tall => "Tall (3:4)",
        }
    }

    /// Video models only render 16:9 and 9:16.
    pub fn is_video_compatible(&self) -> bool {
        matches!(self, Self::Landscape | Self::Portrait)
    }

    /// Width and height proportions
    pub fn proportions(&self) -> (u32, u32) {
        match self {
            Self::Square => (1, 1),
            Self::Landscape => (16, 9),
            Self::Portrait => (9, 16),
            Self::Standard => (4, 3),
            Self::Tall => (3, 4),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| format!("unknown aspect ratio '{}'", s))
    }
}

/// Visual style applied to image prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ImageStyle {
    #[default]
    Realistic,
    Cinematic,
    Anime,
    Photographic,
    Fantasy,
    Watercolor,
    #[serde(rename = "Low Poly")]
    LowPoly,
    #[serde(rename = "Concept Art")]
    ConceptArt,
    Retro,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 9] = [
        Self::Realistic,
        Self::Cinematic,
        Self::Anime,
        Self::Photographic,
        Self::Fantasy,
        Self::Watercolor,
        Self::LowPoly,
        Self::ConceptArt,
        Self::Retro,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Realistic => "Realistic",
            Self::Cinematic => "Cinematic",
            Self::Anime => "Anime",
            Self::Photographic => "Photographic",
            Self::Fantasy => "Fantasy",
            Self::Watercolor => "Watercolor",
            Self::LowPoly => "Low Poly",
            Self::ConceptArt => "Concept Art",
            Self::Retro => "Retro",
        }
    }

    /// Prompt suffix that steers the image model toward this style
    pub fn modifier(&self) -> &'static str {
        match self {
            Self::Realistic => "realistic, photorealistic, high detail, sharp focus",
            Self::Cinematic => "cinematic, dramatic lighting, wide-angle, movie still",
            Self::Anime => "anime style, vibrant colors, cel shading, detailed background",
            Self::Photographic => "photographic, high resolution, professional photo",
            Self::Fantasy => "fantasy art, epic, magical, intricate details, mythical",
            Self::Watercolor => "watercolor painting style, soft edges, blended colors",
            Self::LowPoly => "low poly, geometric, stylized, minimalist",
            Self::ConceptArt => {
                "concept art, detailed sketches, world-building, character design, environmental design"
            }
            Self::Retro => {
                "retro aesthetic, vintage photo, film grain, faded colors, light leaks, 1970s photography style"
            }
        }
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ImageStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .iter()
            .copied()
            .find(|style| style.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown style '{}'", s))
    }
}

/// Serde adapter storing raw bytes as standard base64 text
pub mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Image bytes supplied as conditioning input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    #[serde(rename = "base64", with = "base64_bytes")]
    pub bytes: Vec<u8>,

    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Load an image file, guessing the MIME type from its extension
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = match path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/jpeg",
        };
        Ok(Self::new(bytes, mime_type))
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Opaque reference to a generated video, needed to extend it later.
///
/// Deliberately not serializable: it never reaches history.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationToken {
    video: serde_json::Value,
    aspect_ratio: AspectRatio,
}

impl ContinuationToken {
    pub fn new(video: serde_json::Value, aspect_ratio: AspectRatio) -> Self {
        Self {
            video,
            aspect_ratio,
        }
    }

    /// The service's own description of the video, passed back verbatim
    pub fn video(&self) -> &serde_json::Value {
        &self.video
    }

    /// Framing of the video this token refers to
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }
}

/// A generated image or video held in the working view
#[derive(Debug, Clone, PartialEq)]
pub struct AssetHandle {
    pub kind: OutputType,

    /// Raw media bytes
    pub bytes: Vec<u8>,

    pub mime_type: String,

    /// Prompt the asset was generated from, with any annotations
    pub prompt: String,

    /// Locally addressable URL for display (`data:` for images, `file://` for videos)
    pub display_url: String,

    pub is_upscaled: bool,

    /// Present only for freshly generated videos
    pub continuation: Option<ContinuationToken>,
}

impl AssetHandle {
    /// Image asset addressed by an inline data URL
    pub fn image(prompt: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        Self {
            kind: OutputType::Image,
            display_url: data_url(&mime_type, &bytes),
            bytes,
            mime_type,
            prompt: prompt.into(),
            is_upscaled: false,
            continuation: None,
        }
    }

    /// Video asset addressed by an already materialized URL
    pub fn video(
        prompt: impl Into<String>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        display_url: String,
        continuation: Option<ContinuationToken>,
    ) -> Self {
        Self {
            kind: OutputType::Video,
            bytes,
            mime_type: mime_type.into(),
            prompt: prompt.into(),
            display_url,
            is_upscaled: false,
            continuation,
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == OutputType::Image
    }

    /// Whether this asset still carries what is needed to extend it
    pub fn can_extend(&self) -> bool {
        self.kind == OutputType::Video && self.continuation.is_some()
    }

    /// Bytes and type, for sending back to the service as input
    pub fn to_reference(&self) -> ReferenceImage {
        ReferenceImage::new(self.bytes.clone(), self.mime_type.clone())
    }
}

/// `data:` URL embedding the bytes
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_wire_format() {
        let json = serde_json::to_string(&AspectRatio::Landscape).unwrap();
        assert_eq!(json, "\"16:9\"");
        let parsed: AspectRatio = "9:16".parse().unwrap();
        assert_eq!(parsed, AspectRatio::Portrait);
        assert!(parsed.is_video_compatible());
        assert!(!AspectRatio::Standard.is_video_compatible());
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("low-poly".parse::<ImageStyle>().unwrap(), ImageStyle::LowPoly);
        assert_eq!("Concept Art".parse::<ImageStyle>().unwrap(), ImageStyle::ConceptArt);
        assert!("vaporwave".parse::<ImageStyle>().is_err());
        let json = serde_json::to_string(&ImageStyle::LowPoly).unwrap();
        assert_eq!(json, "\"Low Poly\"");
    }

    #[test]
    fn test_reference_image_json_uses_base64() {
        let reference = ReferenceImage::new(vec![1, 2, 3], "image/png");
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["base64"], "AQID");
        assert_eq!(json["mimeType"], "image/png");
    }

    #[test]
    fn test_image_handle_display_url() {
        let asset = AssetHandle::image("A cat", vec![0xff, 0xd8], "image/jpeg");
        assert_eq!(asset.display_url, "data:image/jpeg;base64,/9g=");
        assert!(asset.is_image());
        assert!(!asset.can_extend());
    }

    #[test]
    fn test_video_handle_extendable_only_with_token() {
        let token = ContinuationToken::new(serde_json::json!({"uri": "x"}), AspectRatio::Landscape);
        let video = AssetHandle::video("clip", vec![0], "video/mp4", "file:///tmp/a.mp4".into(), Some(token));
        assert!(video.can_extend());

        let stripped = AssetHandle {
            continuation: None,
            ..video
        };
        assert!(!stripped.can_extend());
    }
}
