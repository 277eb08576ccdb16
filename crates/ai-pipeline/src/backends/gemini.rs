/// Gemini API backend integration
///
/// Talks to the Generative Language REST API: Imagen for text-to-image,
/// Gemini image models for edits and upscales, Veo long-running operations
/// for video, and a text model for prompt ideas.
use super::{
    build_ideas_prompt, parse_ideas, require_api_key, BackendConfig, BackendType,
    GeneratedImage, GeneratedVideo, GenerationBackend, ModelConfig, VideoOperation,
    UPSCALE_PROMPT,
};
use crate::asset::{AspectRatio, ContinuationToken, ImageStyle, OutputType, ReferenceImage};
use crate::error::{GenerationError, GenerationResult};
use crate::request::compose_image_prompt;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Public API endpoint
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const VIDEO_RESOLUTION: &str = "720p";

/// Gemini API backend
pub struct GeminiBackend {
    api_url: String,
    api_key: String,
    models: ModelConfig,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Create new Gemini backend
    pub fn new(config: &BackendConfig) -> GenerationResult<Self> {
        let api_key = require_api_key(config)?;
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            models: config.models.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_url, model, method)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> GenerationResult<Value> {
        debug!(url, "POST");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn get(&self, url: &str) -> GenerationResult<Value> {
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> GenerationResult<GenerateContentResponse> {
        let value = self
            .post(&self.model_url(model, "generateContent"), request)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn start_operation(&self, model: &str, body: Value) -> GenerationResult<VideoOperation> {
        let value = self
            .post(&self.model_url(model, "predictLongRunning"), &body)
            .await?;
        parse_operation(&value)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Gemini
    }

    async fn generate_images(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
        maintain_consistency: bool,
        count: u32,
    ) -> GenerationResult<Vec<GeneratedImage>> {
        let body = json!({
            "instances": [{ "prompt": compose_image_prompt(prompt, style, maintain_consistency) }],
            "parameters": {
                "sampleCount": count,
                "aspectRatio": aspect_ratio.as_str(),
                "outputMimeType": "image/jpeg",
            },
        });

        let value = self
            .post(&self.model_url(&self.models.image, "predict"), &body)
            .await?;
        let response: PredictResponse = serde_json::from_value(value)?;

        response
            .predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded.map(|data| (data, p.mime_type)))
            .map(|(data, mime_type)| {
                Ok(GeneratedImage {
                    bytes: decode(&data)?,
                    mime_type: mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
                })
            })
            .collect()
    }

    async fn edit_image(
        &self,
        prompt: &str,
        reference: &ReferenceImage,
    ) -> GenerationResult<Vec<GeneratedImage>> {
        let request = GenerateContentRequest::image_edit(reference, prompt);
        let response = self
            .generate_content(&self.models.image_edit, &request)
            .await?;

        response.inline_images()
    }

    async fn upscale_image(&self, image: &ReferenceImage) -> GenerationResult<GeneratedImage> {
        let request = GenerateContentRequest::image_edit(image, UPSCALE_PROMPT);
        let response = self
            .generate_content(&self.models.image_edit, &request)
            .await?;

        // Only the first part counts; a text-only answer means no image.
        match response.first_part().and_then(|part| part.inline_data.as_ref()) {
            Some(blob) => Ok(GeneratedImage {
                bytes: decode(&blob.data)?,
                mime_type: blob.mime_type.clone(),
            }),
            None => Err(GenerationError::MissingImage(
                "Image upscaling failed to return an image.".to_string(),
            )),
        }
    }

    async fn submit_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        reference: Option<&ReferenceImage>,
    ) -> GenerationResult<VideoOperation> {
        let mut instance = json!({ "prompt": prompt });
        if let Some(reference) = reference {
            instance["image"] = inline_image(reference);
        }

        let body = json!({
            "instances": [instance],
            "parameters": video_parameters(aspect_ratio),
        });
        self.start_operation(&self.models.video, body).await
    }

    async fn submit_extend(
        &self,
        token: &ContinuationToken,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> GenerationResult<VideoOperation> {
        let body = json!({
            "instances": [{ "prompt": prompt, "video": token.video() }],
            "parameters": video_parameters(aspect_ratio),
        });
        self.start_operation(&self.models.video_hq, body).await
    }

    async fn submit_animation(
        &self,
        prompt: &str,
        references: &[ReferenceImage],
    ) -> GenerationResult<VideoOperation> {
        let reference_images: Vec<Value> = references
            .iter()
            .map(|r| json!({ "image": inline_image(r), "referenceType": "asset" }))
            .collect();

        let body = json!({
            "instances": [{ "prompt": prompt, "referenceImages": reference_images }],
            "parameters": video_parameters(AspectRatio::Landscape),
        });
        self.start_operation(&self.models.video_hq, body).await
    }

    async fn poll_video(&self, operation: &VideoOperation) -> GenerationResult<VideoOperation> {
        let value = self
            .get(&format!("{}/{}", self.api_url, operation.name))
            .await?;
        parse_operation(&value)
    }

    async fn fetch_video(&self, video: &GeneratedVideo) -> GenerationResult<Vec<u8>> {
        let url = download_url(&video.uri, &self.api_key);
        let response = self.client.get(&url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        debug!(size = bytes.len(), "downloaded video");
        Ok(bytes.to_vec())
    }

    async fn suggest_prompts(
        &self,
        theme: &str,
        output_type: OutputType,
    ) -> GenerationResult<Vec<String>> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text(build_ideas_prompt(theme, output_type))],
            }],
            generation_config: GenerationConfig {
                response_modalities: None,
                response_mime_type: Some("application/json".to_string()),
            },
        };
        let response = self.generate_content(&self.models.text, &request).await?;

        let text = response
            .first_part()
            .and_then(|part| part.text.as_deref())
            .unwrap_or("[]");
        parse_ideas(text)
    }
}

/// Map a non-success response to `Remote`, preferring the service's message
async fn check_status(response: reqwest::Response) -> GenerationResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(remote_error(status.as_u16(), &body))
}

fn remote_error(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string());
    GenerationError::Remote { status, message }
}

fn decode(data: &str) -> GenerationResult<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data.as_bytes())?)
}

fn inline_image(reference: &ReferenceImage) -> Value {
    json!({
        "bytesBase64Encoded": reference.base64(),
        "mimeType": reference.mime_type,
    })
}

fn video_parameters(aspect_ratio: AspectRatio) -> Value {
    json!({
        "aspectRatio": aspect_ratio.as_str(),
        "resolution": VIDEO_RESOLUTION,
        "sampleCount": 1,
    })
}

fn download_url(uri: &str, api_key: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", uri, separator, api_key)
}

/// Turn an operation resource into a handle; a finished operation carrying
/// an error becomes `Remote`
fn parse_operation(value: &Value) -> GenerationResult<VideoOperation> {
    let operation: OperationResponse = serde_json::from_value(value.clone())?;

    if let Some(error) = operation.error {
        return Err(GenerationError::Remote {
            status: error.code.unwrap_or_default(),
            message: error.message,
        });
    }

    let video = value
        .pointer("/response/generateVideoResponse/generatedSamples/0/video")
        .and_then(|raw| {
            raw.get("uri").and_then(Value::as_str).map(|uri| GeneratedVideo {
                uri: uri.to_string(),
                raw: raw.clone(),
            })
        });

    Ok(VideoOperation {
        name: operation.name,
        done: operation.done,
        video,
    })
}

/// generateContent request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Image part followed by the instruction, image output only
    fn image_edit(reference: &ReferenceImage, instruction: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part {
                        inline_data: Some(Blob {
                            data: reference.base64(),
                            mime_type: reference.mime_type.clone(),
                        }),
                        text: None,
                    },
                    Part::text(instruction),
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                response_mime_type: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            inline_data: None,
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    data: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    fn first_part(&self) -> Option<&Part> {
        self.parts().first()
    }

    fn inline_images(&self) -> GenerationResult<Vec<GeneratedImage>> {
        self.parts()
            .iter()
            .filter_map(|part| part.inline_data.as_ref())
            .map(|blob| {
                Ok(GeneratedImage {
                    bytes: decode(&blob.data)?,
                    mime_type: blob.mime_type.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Imagen predict response
#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// Long-running operation resource
#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn backend() -> GeminiBackend {
        let config = BackendConfig::new(BackendType::Gemini, PathBuf::from("/tmp/media"))
            .with_api_key("test-key-123".to_string())
            .with_api_url("http://localhost:9/v1beta/".to_string());
        GeminiBackend::new(&config).unwrap()
    }

    #[test]
    fn test_gemini_backend_creation() {
        let backend = backend();
        assert_eq!(backend.name(), "Gemini");
        assert_eq!(backend.backend_type(), BackendType::Gemini);
        assert_eq!(
            backend.model_url("imagen-4.0-generate-001", "predict"),
            "http://localhost:9/v1beta/models/imagen-4.0-generate-001:predict"
        );
    }

    #[test]
    fn test_edit_request_serialization() {
        let reference = ReferenceImage::new(vec![1, 2, 3], "image/png");
        let request = GenerateContentRequest::image_edit(&reference, "make it blue");
        let json = serde_json::to_value(&request).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], "make it blue");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn test_parse_pending_and_finished_operation() {
        let pending = parse_operation(&json!({ "name": "models/veo/operations/abc" })).unwrap();
        assert!(!pending.done);
        assert!(pending.video.is_none());

        let done = parse_operation(&json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://host/files/v1:download?alt=media" } }
            ]}}
        }))
        .unwrap();
        assert!(done.done);
        let video = done.video.unwrap();
        assert_eq!(video.uri, "https://host/files/v1:download?alt=media");
        assert_eq!(video.raw["uri"], video.uri.as_str());
    }

    #[test]
    fn test_operation_error_becomes_remote() {
        let err = parse_operation(&json!({
            "name": "op",
            "done": true,
            "error": { "code": 404, "message": "Requested entity was not found." }
        }))
        .unwrap_err();
        assert!(err.is_entity_not_found());
    }

    #[test]
    fn test_remote_error_message_extraction() {
        let body = r#"{"error":{"code":400,"message":"bad prompt","status":"INVALID_ARGUMENT"}}"#;
        match remote_error(400, body) {
            GenerationError::Remote { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad prompt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(remote_error(502, "gateway").to_string(), "gateway");
    }

    #[test]
    fn test_download_url_appends_key() {
        assert_eq!(download_url("https://h/v?alt=media", "k"), "https://h/v?alt=media&key=k");
        assert_eq!(download_url("https://h/v", "k"), "https://h/v?key=k");
    }

    #[test]
    fn test_first_part_without_image() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot do that" }] } }]
        }))
        .unwrap();
        assert!(response.first_part().unwrap().inline_data.is_none());
        assert!(response.inline_images().unwrap().is_empty());
    }
}
