use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use teacherdesk_shared::{ApiResponse, TimeoutError, ValidationError};

use crate::openai::{OpenAiError, UpstreamKind};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Request body too large (max {max} bytes)")]
    PayloadTooLarge { max: usize },

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("AI provider error: {0}")]
    Upstream(#[from] OpenAiError),

    #[error("Upstream request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl From<ValidationError> for ServerError {
    fn from(e: ValidationError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<TimeoutError<OpenAiError>> for ServerError {
    fn from(e: TimeoutError<OpenAiError>) -> Self {
        match e {
            TimeoutError::Elapsed(after) => ServerError::Timeout(after),
            TimeoutError::Operation(inner) => ServerError::Upstream(inner),
        }
    }
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, self.to_string()),
            ServerError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ServerError::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ServerError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            ServerError::Upstream(e) => match e.kind() {
                UpstreamKind::Auth => (
                    StatusCode::UNAUTHORIZED,
                    "AI provider rejected the API key".to_string(),
                ),
                UpstreamKind::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "AI provider rate limit reached, try again later".to_string(),
                ),
                UpstreamKind::QuotaExceeded => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "AI provider quota exceeded".to_string(),
                ),
                UpstreamKind::ContentPolicy => (
                    StatusCode::BAD_REQUEST,
                    "Request rejected by the AI provider's content policy".to_string(),
                ),
                UpstreamKind::Unavailable => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AI provider is unavailable".to_string(),
                ),
                UpstreamKind::Other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let mut response = (status, axum::Json(ApiResponse::<()>::err(message))).into_response();
        if let ServerError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: ServerError) -> StatusCode {
        e.into_response().status()
    }

    fn upstream(status: u16, code: Option<&str>) -> ServerError {
        ServerError::Upstream(OpenAiError::Api {
            status,
            code: code.map(str::to_string),
            message: "upstream".into(),
        })
    }

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(status_of(ServerError::MethodNotAllowed), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            status_of(ServerError::PayloadTooLarge { max: 1024 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(ServerError::NotConfigured("OPENAI_API_KEY")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(upstream(401, None)), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(upstream(429, Some("insufficient_quota"))),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_of(upstream(500, None)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(upstream(400, Some("content_policy_violation"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(upstream(404, Some("model_not_found"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ServerError::Timeout(Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ServerError::RateLimited {
            retry_after_secs: 12,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }

    #[test]
    fn test_timeout_error_conversion() {
        let elapsed: ServerError = TimeoutError::<OpenAiError>::Elapsed(Duration::from_millis(5)).into();
        assert!(matches!(elapsed, ServerError::Timeout(_)));

        let inner: ServerError =
            TimeoutError::Operation(OpenAiError::Parse("bad json".into())).into();
        assert!(matches!(inner, ServerError::Upstream(OpenAiError::Parse(_))));
    }
}
