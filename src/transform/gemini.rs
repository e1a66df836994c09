//! Gemini (Google) image transform backend.

use crate::error::{parse_retry_after, sanitize_error_message, GenBatchError, Result};
use crate::image::{GeneratedImage, GenerationMetadata, ImageFormat};
use crate::transform::{ImageTransform, TransformRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini accepts temperatures in `[0, 2]`.
const GEMINI_MAX_TEMPERATURE: f32 = 2.0;

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "gemini-3-pro-image-preview",
        }
    }
}

/// Builder for [`GeminiTransform`].
#[derive(Debug, Clone, Default)]
pub struct GeminiTransformBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiTransformBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API base URL (e.g. for a proxy).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets a per-request timeout on the HTTP client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the transform, resolving the API key.
    ///
    /// The HTTP client itself is created on first use.
    pub fn build(self) -> Result<GeminiTransform> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GenBatchError::Auth(
                    "GEMINI_API_KEY / GOOGLE_API_KEY not set and no API key provided".into(),
                )
            })?;

        Ok(GeminiTransform {
            client: OnceCell::new(),
            api_key,
            model: self.model,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: self.timeout,
        })
    }
}

/// Image transform backed by the Gemini `generateContent` endpoint.
pub struct GeminiTransform {
    client: OnceCell<reqwest::Client>,
    api_key: String,
    model: GeminiModel,
    base_url: String,
    timeout: Option<Duration>,
}

impl GeminiTransform {
    /// Creates a new `GeminiTransformBuilder`.
    pub fn builder() -> GeminiTransformBuilder {
        GeminiTransformBuilder::new()
    }

    /// Returns the shared HTTP client, creating it on first use.
    ///
    /// A failed initialization leaves the cell empty, so the next call tries again.
    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                let client = builder.build()?;
                tracing::debug!(model = self.model.as_str(), "initialized Gemini client");
                Ok::<_, GenBatchError>(client)
            })
            .await
    }

    async fn transform_impl(&self, request: &TransformRequest) -> Result<GeneratedImage> {
        let start = Instant::now();

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );

        let body = GeminiRequest::from_transform_request(request);

        let response = self
            .client()
            .await?
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let metadata = GenerationMetadata {
            model: Some(self.model.as_str().to_string()),
            seed: request.seed,
            temperature: request.temperature,
            duration_ms: Some(start.elapsed().as_millis() as u64),
        };

        Self::image_from_response(gemini_response, metadata)
    }

    fn image_from_response(
        response: GeminiResponse,
        metadata: GenerationMetadata,
    ) -> Result<GeneratedImage> {
        // Blocked prompts come back as HTTP 200 with prompt feedback
        if let Some(ref feedback) = response.prompt_feedback {
            if let Some(ref reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .clone()
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(GenBatchError::ContentBlocked(msg));
            }
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            GenBatchError::UnexpectedResponse("No candidates in Gemini response".into())
        })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST"
                | "SPII" => {
                    return Err(GenBatchError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {}",
                        finish_reason
                    )));
                }
                "MAX_TOKENS" => {
                    return Err(GenBatchError::Truncated(
                        "Gemini stopped at the output token limit before returning an image"
                            .into(),
                    ));
                }
                "IMAGE_OTHER" | "NO_IMAGE" => {
                    return Err(GenBatchError::UnexpectedResponse(format!(
                        "Generation failed: {}. Try a different instruction.",
                        finish_reason
                    )));
                }
                _ => {}
            }
        }

        let content = candidate.content.ok_or_else(|| {
            GenBatchError::UnexpectedResponse("No content in Gemini candidate".into())
        })?;

        let inline_data = content
            .parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| {
                GenBatchError::UnexpectedResponse("No image data in Gemini response".into())
            })?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&inline_data.data)
            .map_err(|e| GenBatchError::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(&inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();

        Ok(GeneratedImage::new(data, format, metadata))
    }

    fn parse_error(
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> GenBatchError {
        let text = sanitize_error_message(text);
        let lower = text.to_lowercase();
        if status == 401 || status == 403 {
            return GenBatchError::Auth(text);
        }
        // Gemini reports a bad key as 400 INVALID_ARGUMENT
        if status == 400
            && (lower.contains("api key not valid") || lower.contains("api_key_invalid"))
        {
            return GenBatchError::Auth(text);
        }
        if status == 404 {
            return GenBatchError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            );
        }
        if status == 413 {
            return GenBatchError::Truncated(format!("payload exceeded the size limit: {text}"));
        }
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return GenBatchError::RateLimited { retry_after };
        }
        if lower.contains("safety")
            || lower.contains("blocked")
            || lower.contains("content_policy")
            || lower.contains("prohibited")
        {
            return GenBatchError::ContentBlocked(text);
        }
        GenBatchError::Api {
            status,
            message: text,
        }
    }
}

#[async_trait]
impl ImageTransform for GeminiTransform {
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage> {
        self.transform_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    fn max_temperature(&self) -> f32 {
        GEMINI_MAX_TEMPERATURE
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client()
            .await?
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            status => {
                let headers = response.headers().clone();
                let text = response.text().await.unwrap_or_default();
                Err(Self::parse_error(status, &text, &headers))
            }
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl GeminiRequest {
    fn from_transform_request(req: &TransformRequest) -> Self {
        // Images first, in request order, then the instruction
        let mut parts: Vec<GeminiRequestPart> = req
            .images
            .iter()
            .map(|image| GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.to_base64(),
                },
            })
            .collect();

        parts.push(GeminiRequestPart::Text {
            text: req.instruction.clone(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
                seed: req.seed,
                temperature: req
                    .temperature
                    .map(|t| t.clamp(0.0, GEMINI_MAX_TEMPERATURE)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::EncodedImage;
    use reqwest::header::HeaderMap;

    fn encoded(format: ImageFormat) -> EncodedImage {
        EncodedImage {
            data: vec![1, 2, 3],
            format,
            width: 1,
            height: 1,
        }
    }

    fn parse(json: &str) -> Result<GeneratedImage> {
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        GeminiTransform::image_from_response(resp, GenerationMetadata::default())
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::NanoBanana.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiModel::default(), GeminiModel::NanoBanana);
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let transform = GeminiTransformBuilder::new()
            .api_key("test-key")
            .model(GeminiModel::NanoBananaPro)
            .base_url("http://localhost:9000/v1beta/")
            .build()
            .unwrap();
        assert_eq!(transform.base_url, "http://localhost:9000/v1beta");
        assert_eq!(transform.max_temperature(), 2.0);
        assert!(transform.client.get().is_none());
    }

    #[tokio::test]
    async fn test_client_is_created_once() {
        let transform = GeminiTransform::builder()
            .api_key("test-key")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let first = transform.client().await.unwrap() as *const reqwest::Client;
        let second = transform.client().await.unwrap() as *const reqwest::Client;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transform = GeminiTransform::builder()
            .api_key("test-key")
            .base_url("http://127.0.0.1:1")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let req = TransformRequest::new(vec![encoded(ImageFormat::Png)], "Make it dusk");

        let err = transform.transform(&req).await.unwrap_err();

        assert!(matches!(err, GenBatchError::Network(_)), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connectivity"), "{err}");
        assert!(transform.client.get().is_some());
    }

    #[test]
    fn test_request_places_images_before_instruction() {
        let req = TransformRequest::new(
            vec![encoded(ImageFormat::Png), encoded(ImageFormat::Jpeg)],
            "Make it dusk",
        );
        let gemini_req = GeminiRequest::from_transform_request(&req);
        let json = serde_json::to_value(&gemini_req).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert_eq!(parts[1]["inline_data"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["text"], "Make it dusk");
    }

    #[test]
    fn test_request_generation_config() {
        let req = TransformRequest::new(vec![encoded(ImageFormat::Png)], "x")
            .with_seed(42)
            .with_temperature(0.75);
        let json = serde_json::to_value(GeminiRequest::from_transform_request(&req)).unwrap();
        let config = &json["generationConfig"];

        assert_eq!(config["seed"], 42);
        assert_eq!(config["temperature"], 0.75);
        assert_eq!(config["responseModalities"][0], "IMAGE");
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_request_omits_unset_parameters_and_clamps_temperature() {
        let req = TransformRequest::new(vec![], "x");
        let json = serde_json::to_value(GeminiRequest::from_transform_request(&req)).unwrap();
        assert!(json["generationConfig"].get("seed").is_none());
        assert!(json["generationConfig"].get("temperature").is_none());

        let hot = TransformRequest::new(vec![], "x").with_temperature(3.5);
        let json = serde_json::to_value(GeminiRequest::from_transform_request(&hot)).unwrap();
        assert_eq!(json["generationConfig"]["temperature"], 2.0);
    }

    #[test]
    fn test_response_with_image() {
        let image = parse(
            r#"{
                "candidates": [{
                    "content": {
                        "parts": [
                            {"text": "here you go"},
                            {"inlineData": {"mimeType": "image/jpeg", "data": "AQID"}}
                        ]
                    },
                    "finishReason": "STOP"
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_response_prompt_feedback_block() {
        let err = parse(
            r#"{
                "candidates": [],
                "promptFeedback": {
                    "blockReason": "SAFETY",
                    "blockReasonMessage": "Prompt was blocked due to safety"
                }
            }"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);
        assert!(err.to_string().contains("Prompt was blocked due to safety"));
    }

    #[test]
    fn test_response_safety_finish_reason() {
        let err = parse(r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);
    }

    #[test]
    fn test_response_max_tokens_is_truncated() {
        let err = parse(r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }

    #[test]
    fn test_response_shape_errors_are_malformed() {
        let no_candidates = parse(r#"{}"#).unwrap_err();
        assert_eq!(no_candidates.kind(), ErrorKind::MalformedResponse);

        let no_image = parse(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#).unwrap_err();
        assert_eq!(no_image.kind(), ErrorKind::MalformedResponse);

        let bad_base64 = parse(
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "%%%"}}]}}]}"#,
        )
        .unwrap_err();
        assert_eq!(bad_base64.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_parse_error_invalid_key() {
        let headers = HeaderMap::new();
        let err = GeminiTransform::parse_error(
            400,
            r#"{"error": {"message": "API key not valid. Please pass a valid API key."}}"#,
            &headers,
        );
        assert_eq!(err.kind(), ErrorKind::Credentials);
        assert!(err.to_string().starts_with("authentication failed"));

        let err = GeminiTransform::parse_error(403, "forbidden", &headers);
        assert!(matches!(err, GenBatchError::Auth(_)));
    }

    #[test]
    fn test_parse_error_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        let err = GeminiTransform::parse_error(429, "quota", &headers);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_parse_error_other() {
        let headers = HeaderMap::new();
        let blocked = GeminiTransform::parse_error(400, "request blocked by policy", &headers);
        assert_eq!(blocked.kind(), ErrorKind::SafetyBlocked);

        let too_large = GeminiTransform::parse_error(413, "too large", &headers);
        assert_eq!(too_large.kind(), ErrorKind::Truncated);

        let server = GeminiTransform::parse_error(500, "internal", &headers);
        assert!(matches!(server, GenBatchError::Api { status: 500, .. }));
    }
}
