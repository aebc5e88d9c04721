//! OpenAI-compatible HTTP client for chat completions, model listing and
//! image generation.
//!
//! One `reqwest::Client` is built at startup and shared by every handler.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use teacherdesk_shared::constants::DEFAULT_IMAGE_MODEL;
use teacherdesk_shared::types::{
    ChatMessage, ChatReply, ChatRole, GeneratedImage, ImageGenerationRequest, ImageQuality,
    ImageSize, ImageStyle, ModelInfo, TokenUsage,
};

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Parse(String),
}

/// Coarse classification of upstream failures, used to pick the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Auth,
    RateLimited,
    QuotaExceeded,
    ContentPolicy,
    Unavailable,
    Other,
}

impl OpenAiError {
    pub fn kind(&self) -> UpstreamKind {
        match self {
            OpenAiError::Api { status, code, .. } => match (code.as_deref(), *status) {
                (Some("invalid_api_key"), _) | (_, 401) => UpstreamKind::Auth,
                (Some("insufficient_quota"), _) => UpstreamKind::QuotaExceeded,
                (Some("rate_limit_exceeded"), _) | (_, 429) => UpstreamKind::RateLimited,
                (Some("content_policy_violation"), _) => UpstreamKind::ContentPolicy,
                (_, s) if s >= 500 => UpstreamKind::Unavailable,
                _ => UpstreamKind::Other,
            },
            OpenAiError::Http(e) if e.is_connect() || e.is_timeout() => UpstreamKind::Unavailable,
            OpenAiError::Http(_) | OpenAiError::Parse(_) => UpstreamKind::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: String,
    choices: Vec<CompletionChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    role: ChatRole,
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: ImageSize,
    quality: ImageQuality,
    style: ImageStyle,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    code: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    /// * `api_key` - bearer token sent with every request
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<ChatReply, OpenAiError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };
        debug!(model, messages = messages.len(), "Requesting chat completion");

        let resp: CompletionResponse = self
            .execute(self.http.post(self.url("/chat/completions")).json(&body))
            .await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OpenAiError::Parse("completion has no choices".to_string()))?;

        Ok(ChatReply {
            message: ChatMessage {
                role: choice.message.role,
                content: choice.message.content.unwrap_or_default(),
            },
            model: resp.model,
            usage: resp.usage,
        })
    }

    /// Chat-capable models (`gpt-*`, no instruct variants), sorted by id.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, OpenAiError> {
        let list: ModelList = self.execute(self.http.get(self.url("/models"))).await?;
        let mut models: Vec<ModelInfo> = list
            .data
            .into_iter()
            .filter(|m| m.id.starts_with("gpt-") && !m.id.contains("instruct"))
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }

    pub async fn generate_image(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<GeneratedImage, OpenAiError> {
        let body = ImageRequest {
            model: DEFAULT_IMAGE_MODEL,
            prompt: request.prompt.trim(),
            n: 1,
            size: request.size,
            quality: request.quality,
            style: request.style,
            response_format: "url",
        };
        debug!(size = ?request.size, quality = ?request.quality, "Requesting image generation");

        let resp: ImageResponse = self
            .execute(self.http.post(self.url("/images/generations")).json(&body))
            .await?;

        let image = resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| OpenAiError::Parse("image response has no data".to_string()))?;
        let image_url = image
            .url
            .ok_or_else(|| OpenAiError::Parse("image response has no url".to_string()))?;

        Ok(GeneratedImage {
            image_url,
            revised_prompt: image.revised_prompt,
            library_id: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<R: DeserializeOwned>(&self, req: RequestBuilder) -> Result<R, OpenAiError> {
        let resp = req.bearer_auth(&self.api_key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }
        resp.json::<R>()
            .await
            .map_err(|e| OpenAiError::Parse(e.to_string()))
    }
}

/// Build an `Api` error from a non-2xx body, which is usually
/// `{"error": {"message", "type", "code"}}` but may be anything.
fn api_error(status: u16, body: &str) -> OpenAiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => OpenAiError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => OpenAiError::Api {
            status,
            code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: Option<&str>) -> OpenAiError {
        OpenAiError::Api {
            status,
            code: code.map(str::to_string),
            message: "x".into(),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(api(401, None).kind(), UpstreamKind::Auth);
        assert_eq!(api(400, Some("invalid_api_key")).kind(), UpstreamKind::Auth);
        assert_eq!(api(429, Some("insufficient_quota")).kind(), UpstreamKind::QuotaExceeded);
        assert_eq!(api(429, Some("rate_limit_exceeded")).kind(), UpstreamKind::RateLimited);
        assert_eq!(api(429, None).kind(), UpstreamKind::RateLimited);
        assert_eq!(
            api(400, Some("content_policy_violation")).kind(),
            UpstreamKind::ContentPolicy
        );
        assert_eq!(api(502, None).kind(), UpstreamKind::Unavailable);
        assert_eq!(api(404, Some("model_not_found")).kind(), UpstreamKind::Other);
        assert_eq!(OpenAiError::Parse("bad".into()).kind(), UpstreamKind::Other);
    }

    #[test]
    fn test_api_error_parses_openai_body() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        match api_error(401, body) {
            OpenAiError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 401);
                assert_eq!(code.as_deref(), Some("invalid_api_key"));
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_keeps_plain_body() {
        let err = api_error(503, "upstream connect error");
        assert_eq!(err.kind(), UpstreamKind::Unavailable);
        assert!(err.to_string().contains("upstream connect error"));
    }

    #[test]
    fn test_image_request_wire_format() {
        let body = ImageRequest {
            model: DEFAULT_IMAGE_MODEL,
            prompt: "A labelled plant cell",
            n: 1,
            size: ImageSize::Portrait,
            quality: ImageQuality::Hd,
            style: ImageStyle::Natural,
            response_format: "url",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "dall-e-3");
        assert_eq!(value["size"], "1024x1792");
        assert_eq!(value["quality"], "hd");
        assert_eq!(value["style"], "natural");
    }
}
