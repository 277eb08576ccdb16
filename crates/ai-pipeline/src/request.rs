//! Generation settings and request building
//!
//! Turns the user's multi-line prompt text plus settings into normalized,
//! immutable per-slot requests.

use crate::asset::{AspectRatio, ImageStyle, OutputType, ReferenceImage};
use crate::error::{GenerationError, GenerationResult};
use serde::{Deserialize, Serialize};

/// Appended to every image prompt when consistency is requested
pub const CONSISTENCY_PROMPT: &str = "Maintain strong visual consistency across all generations. Preserve the same subject design, proportions, facial structure, and key visual identity. Keep identical lighting direction, color palette, tone, and camera angle for each generation. Ensure the art style, rendering quality, and level of detail remain consistent. Reproduce materials, costume, environment, and color harmony from the reference image. Do not alter the face, body shape, or camera composition between outputs. Use a consistent cinematic concept art style, same lens and lighting setup for all images. Negative: no variations in face, body, lighting, or composition; no inconsistent background or costume changes.";

pub const MIN_IMAGES_PER_PROMPT: u32 = 1;
pub const MAX_IMAGES_PER_PROMPT: u32 = 8;

/// Canned prompt sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TemplatePreset {
    #[default]
    Custom,
    #[serde(rename = "Product Mockup")]
    ProductMockup,
    #[serde(rename = "YouTube Thumbnail")]
    YoutubeThumbnail,
    #[serde(rename = "Character Sheet")]
    CharacterSheet,
    #[serde(rename = "Wallpaper Pack")]
    WallpaperPack,
}

impl TemplatePreset {
    pub const ALL: [TemplatePreset; 5] = [
        Self::Custom,
        Self::ProductMockup,
        Self::YoutubeThumbnail,
        Self::CharacterSheet,
        Self::WallpaperPack,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Custom => "Custom Prompts",
            Self::ProductMockup => "Product Mockup",
            Self::YoutubeThumbnail => "YouTube Thumbnail",
            Self::CharacterSheet => "Character Sheet",
            Self::WallpaperPack => "Wallpaper Pack",
        }
    }

    /// Prompt lines for the preset; `None` for `Custom`
    pub fn prompts(&self) -> Option<&'static str> {
        match self {
            Self::Custom => None,
            Self::ProductMockup => Some(
                "A modern smartwatch on a sleek display stand, studio lighting, clean background\n\
                 A bottle of craft beer with a custom label, condensation droplets, on a rustic wooden table\n\
                 A pair of designer sunglasses on a white marble surface, soft shadows",
            ),
            Self::YoutubeThumbnail => Some(
                "An expressive gamer with a headset reacting with excitement, vibrant neon background, high contrast\n\
                 A person pointing at a shocking headline with a red arrow, exaggerated expression\n\
                 A dramatic before-and-after comparison shot, split screen, bold text",
            ),
            Self::CharacterSheet => Some(
                "Full body concept art of a futuristic sci-fi soldier, neutral standing pose\n\
                 Headshot of the sci-fi soldier, smiling expression\n\
                 Action pose of the sci-fi soldier, firing a laser rifle",
            ),
            Self::WallpaperPack => Some(
                "A breathtaking 4K wallpaper of a serene Japanese garden with a cherry blossom tree\n\
                 A vibrant abstract digital art wallpaper with flowing neon lines\n\
                 A fantasy landscape wallpaper of a castle in the clouds at sunset, 4K HD",
            ),
        }
    }
}

impl std::str::FromStr for TemplatePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .iter()
            .copied()
            .find(|t| {
                let label = t.label().to_ascii_lowercase();
                label == wanted || label.trim_end_matches(" prompts") == wanted
            })
            .ok_or_else(|| format!("unknown template '{}'", s))
    }
}

/// Everything the user configured for a batch; also the history snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub output_type: OutputType,

    /// Raw prompt text, one prompt per line
    pub prompts: String,

    pub style: ImageStyle,

    pub aspect_ratio: AspectRatio,

    pub template: TemplatePreset,

    pub reference_image: Option<ReferenceImage>,

    pub maintain_consistency: bool,

    pub number_of_images: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            output_type: OutputType::Image,
            prompts: "Cinematic sunrise over a still ocean, golden light spreading across waves, light mist, calm atmosphere, ultra-realistic.".to_string(),
            style: ImageStyle::Retro,
            aspect_ratio: AspectRatio::Square,
            template: TemplatePreset::Custom,
            reference_image: None,
            maintain_consistency: false,
            number_of_images: 1,
        }
    }
}

impl GenerationSettings {
    /// Switch output type; video falls back to 16:9 when the current
    /// framing is not renderable as video
    pub fn set_output_type(&mut self, output_type: OutputType) {
        self.output_type = output_type;
        if output_type == OutputType::Video && !self.aspect_ratio.is_video_compatible() {
            self.aspect_ratio = AspectRatio::Landscape;
        }
    }

    /// Replace the prompt text; manual edits always leave template mode
    pub fn set_prompts(&mut self, prompts: impl Into<String>) {
        self.prompts = prompts.into();
        self.template = TemplatePreset::Custom;
    }

    /// Append one prompt line
    pub fn add_prompt(&mut self, prompt: &str) {
        if self.prompts.trim().is_empty() {
            self.prompts = prompt.to_string();
        } else {
            self.prompts = format!("{}\n{}", self.prompts, prompt);
        }
        self.template = TemplatePreset::Custom;
    }

    /// Apply a preset's prompts and the settings it implies
    pub fn apply_template(&mut self, template: TemplatePreset) {
        self.template = template;
        let Some(prompts) = template.prompts() else {
            return;
        };
        self.prompts = prompts.to_string();
        match template {
            TemplatePreset::WallpaperPack => {
                self.aspect_ratio = AspectRatio::Landscape;
                self.style = ImageStyle::Fantasy;
            }
            TemplatePreset::ProductMockup => {
                self.style = ImageStyle::Realistic;
                self.aspect_ratio = AspectRatio::Standard;
            }
            TemplatePreset::CharacterSheet => {
                self.style = ImageStyle::ConceptArt;
                self.maintain_consistency = true;
            }
            TemplatePreset::YoutubeThumbnail | TemplatePreset::Custom => {}
        }
    }

    /// Non-blank prompt lines in order
    pub fn prompt_list(&self) -> Vec<String> {
        self.prompts
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect()
    }
}

/// One normalized unit of work; `slot` is its position in the batch
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub slot: usize,
    pub prompt: String,
    pub style: Option<ImageStyle>,
    pub aspect_ratio: AspectRatio,
    pub reference_image: Option<ReferenceImage>,
    pub want_count: u32,
    pub maintain_consistency: bool,
}

/// Build the per-prompt requests for a batch
pub fn build_requests(settings: &GenerationSettings) -> GenerationResult<Vec<GenerationRequest>> {
    let prompts = settings.prompt_list();
    if prompts.is_empty() {
        return Err(GenerationError::EmptyPrompts);
    }

    let (aspect_ratio, want_count, style) = match settings.output_type {
        OutputType::Image => (
            settings.aspect_ratio,
            settings
                .number_of_images
                .clamp(MIN_IMAGES_PER_PROMPT, MAX_IMAGES_PER_PROMPT),
            Some(settings.style),
        ),
        OutputType::Video => (video_aspect_ratio(settings)?, 1, None),
    };

    Ok(prompts
        .into_iter()
        .enumerate()
        .map(|(slot, prompt)| GenerationRequest {
            slot,
            prompt,
            style,
            aspect_ratio,
            reference_image: settings.reference_image.clone(),
            want_count,
            maintain_consistency: settings.maintain_consistency,
        })
        .collect())
}

fn video_aspect_ratio(settings: &GenerationSettings) -> GenerationResult<AspectRatio> {
    if settings.reference_image.is_some() {
        // Image-conditioned video keeps portrait, everything else renders landscape
        return Ok(match settings.aspect_ratio {
            AspectRatio::Portrait => AspectRatio::Portrait,
            _ => AspectRatio::Landscape,
        });
    }
    if settings.aspect_ratio.is_video_compatible() {
        Ok(settings.aspect_ratio)
    } else {
        Err(GenerationError::InvalidVideoAspect(settings.aspect_ratio))
    }
}

/// Full text sent to the image model for one prompt
pub fn compose_image_prompt(prompt: &str, style: ImageStyle, maintain_consistency: bool) -> String {
    let mut full = format!("{}, {}", prompt, style.modifier());
    if maintain_consistency {
        full.push_str(". ");
        full.push_str(CONSISTENCY_PROMPT);
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(prompts: &str) -> GenerationSettings {
        GenerationSettings {
            prompts: prompts.to_string(),
            ..GenerationSettings::default()
        }
    }

    #[test]
    fn test_build_requests_skips_blank_lines() {
        let requests = build_requests(&settings("A cat\n\n   \nA dog\n")).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].prompt, "A cat");
        assert_eq!(requests[0].slot, 0);
        assert_eq!(requests[1].prompt, "A dog");
        assert_eq!(requests[1].slot, 1);
    }

    #[test]
    fn test_build_requests_rejects_empty() {
        let err = build_requests(&settings(" \n\t\n")).unwrap_err();
        assert!(matches!(err, GenerationError::EmptyPrompts));
    }

    #[test]
    fn test_image_count_is_clamped() {
        let mut s = settings("A cat");
        s.number_of_images = 40;
        assert_eq!(build_requests(&s).unwrap()[0].want_count, MAX_IMAGES_PER_PROMPT);
        s.number_of_images = 0;
        assert_eq!(build_requests(&s).unwrap()[0].want_count, MIN_IMAGES_PER_PROMPT);
    }

    #[test]
    fn test_video_requires_video_framing() {
        let mut s = settings("A wave");
        s.output_type = OutputType::Video;
        s.aspect_ratio = AspectRatio::Standard;
        let err = build_requests(&s).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidVideoAspect(AspectRatio::Standard)));

        s.reference_image = Some(ReferenceImage::new(vec![1], "image/png"));
        let requests = build_requests(&s).unwrap();
        assert_eq!(requests[0].aspect_ratio, AspectRatio::Landscape);
        assert_eq!(requests[0].want_count, 1);
        assert!(requests[0].style.is_none());
    }

    #[test]
    fn test_switching_to_video_fixes_framing() {
        let mut s = settings("A wave");
        s.aspect_ratio = AspectRatio::Tall;
        s.set_output_type(OutputType::Video);
        assert_eq!(s.aspect_ratio, AspectRatio::Landscape);
    }

    #[test]
    fn test_compose_prompt() {
        let plain = compose_image_prompt("A cat", ImageStyle::Anime, false);
        assert_eq!(plain, format!("A cat, {}", ImageStyle::Anime.modifier()));

        let consistent = compose_image_prompt("A cat", ImageStyle::Anime, true);
        assert!(consistent.ends_with(CONSISTENCY_PROMPT));
    }

    #[test]
    fn test_templates() {
        let mut s = settings("anything");
        s.apply_template(TemplatePreset::CharacterSheet);
        assert_eq!(s.style, ImageStyle::ConceptArt);
        assert!(s.maintain_consistency);
        assert_eq!(s.prompt_list().len(), 3);

        s.add_prompt("One more");
        assert_eq!(s.template, TemplatePreset::Custom);
        assert_eq!(s.prompt_list().len(), 4);

        assert_eq!("wallpaper-pack".parse::<TemplatePreset>().unwrap(), TemplatePreset::WallpaperPack);
        assert_eq!("custom".parse::<TemplatePreset>().unwrap(), TemplatePreset::Custom);
    }

    #[test]
    fn test_settings_snapshot_json_shape() {
        let json = serde_json::to_value(GenerationSettings::default()).unwrap();
        assert_eq!(json["outputType"], "Image");
        assert_eq!(json["aspectRatio"], "1:1");
        assert_eq!(json["numberOfImages"], 1);
    }
}
