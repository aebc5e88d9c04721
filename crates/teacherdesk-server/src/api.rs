use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, Uri},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use teacherdesk_shared::constants::{
    DEFAULT_DATABASE_TIMEOUT, DEFAULT_MODELS_TIMEOUT, FALLBACK_CHAT_MODELS, TEACHER_SYSTEM_PROMPT,
};
use teacherdesk_shared::types::{
    ChatMessage, ChatReply, ChatRequest, GeneratedImage, ImageGenerationRequest, ModelInfo,
};
use teacherdesk_shared::{with_timeout, with_timeout_and_retry, ApiResponse, RetryOptions};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::instant::{InstantAdmin, NewLibraryMaterial};
use crate::openai::OpenAiClient;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// `None` when `OPENAI_API_KEY` is not set.
    pub openai: Option<OpenAiClient>,
    /// `None` when the InstantDB admin credentials are not set.
    pub instant: Option<InstantAdmin>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    /// Build the upstream clients once; handlers share them for the life of
    /// the process.
    pub fn new(config: ServerConfig) -> Self {
        let openai = config
            .openai_api_key
            .as_ref()
            .map(|key| OpenAiClient::new(config.openai_base_url.clone(), key.clone()));
        let instant = config
            .instant
            .clone()
            .map(|creds| InstantAdmin::new(config.instant_api_url.clone(), creds));
        let rate_limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window);

        Self {
            openai,
            instant,
            rate_limiter,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    fn openai(&self) -> Result<&OpenAiClient, ServerError> {
        self.openai
            .as_ref()
            .ok_or(ServerError::NotConfigured("OPENAI_API_KEY"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/health", get(health_check).fallback(method_not_allowed))
        .route(
            "/api/health/services",
            get(service_health).fallback(method_not_allowed),
        )
        .route("/api/chat", post(chat_completion).fallback(method_not_allowed))
        .route("/api/chat/models", get(list_models).fallback(method_not_allowed))
        .route(
            "/api/images/generate",
            post(generate_image).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin, except in production with `FRONTEND_URL` set.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    match config.frontend_url.as_deref() {
        Some(url) if config.is_production() => match HeaderValue::from_str(url) {
            Ok(origin) => cors.allow_origin(origin),
            Err(_) => {
                warn!(value = %url, "Invalid FRONTEND_URL, allowing any origin");
                cors.allow_origin(Any)
            }
        },
        _ => cors.allow_origin(Any),
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    environment: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ServiceStatus {
    Configured,
    Reachable,
    Unreachable,
    NotConfigured,
}

#[derive(Serialize)]
struct ServiceHealth {
    openai: ServiceStatus,
    database: ServiceStatus,
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}

/// Report which upstream services are usable. The AI provider is required,
/// the database is optional.
async fn service_health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ServiceHealth>>, ServerError> {
    state.openai()?;

    let database = match &state.instant {
        None => ServiceStatus::NotConfigured,
        Some(db) => {
            let probe = json!({ "teachers": { "$": { "limit": 1 } } });
            match with_timeout(db.query(&probe), DEFAULT_DATABASE_TIMEOUT, None).await {
                Ok(_) => ServiceStatus::Reachable,
                Err(e) => {
                    warn!(error = %e, "InstantDB health probe failed");
                    ServiceStatus::Unreachable
                }
            }
        }
    };

    Ok(Json(ApiResponse::ok(ServiceHealth {
        openai: ServiceStatus::Configured,
        database,
    })))
}

async fn chat_completion(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ChatReply>>, ServerError> {
    let Json(request) = payload.map_err(json_rejection)?;
    request.validate()?;
    let client = state.openai()?;

    let model = request
        .model
        .as_deref()
        .unwrap_or(state.config.chat_model.as_str());
    let messages = with_system_prompt(&request);

    let reply = with_timeout(
        client.chat(model, &messages, request.temperature, request.max_tokens),
        state.config.chat_timeout,
        None,
    )
    .await?;

    info!(
        model = %reply.model,
        total_tokens = reply.usage.map(|u| u.total_tokens),
        "Chat completion served"
    );
    Ok(Json(ApiResponse::ok(reply)))
}

/// Bodies cut off by `DefaultBodyLimit` answer 413, anything else 400.
fn json_rejection(rejection: JsonRejection) -> ServerError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge {
            max: MAX_BODY_BYTES,
        }
    } else {
        ServerError::BadRequest(rejection.body_text())
    }
}

/// Prepend the teacher-assistant prompt unless the caller sent its own.
fn with_system_prompt(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.has_system_message() {
        messages.push(ChatMessage::system(TEACHER_SYSTEM_PROMPT));
    }
    messages.extend(request.messages.iter().cloned());
    messages
}

async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ModelInfo>>>, ServerError> {
    let client = state.openai()?;

    let fallback: Vec<ModelInfo> = FALLBACK_CHAT_MODELS
        .iter()
        .map(|id| ModelInfo {
            id: id.to_string(),
            owned_by: "openai".to_string(),
        })
        .collect();
    let models = with_timeout(client.list_models(), DEFAULT_MODELS_TIMEOUT, Some(fallback)).await?;

    Ok(Json(ApiResponse::ok(models)))
}

async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<ImageGenerationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<GeneratedImage>>, ServerError> {
    let Json(request) = payload.map_err(json_rejection)?;
    request.validate()?;
    let client = state.openai()?;

    let mut image = with_timeout(
        client.generate_image(&request),
        state.config.image_timeout,
        None,
    )
    .await?;

    if let (Some(user_id), Some(db)) = (request.user_id.as_deref(), state.instant.as_ref()) {
        image.library_id = save_to_library(db, user_id, &request, &image).await;
    }

    info!(
        saved = image.library_id.is_some(),
        size = ?request.size,
        "Image generated"
    );
    Ok(Json(ApiResponse::ok(image)))
}

/// Store the generated image as a library entry. Best effort: a database
/// failure is logged and the image is still returned.
async fn save_to_library(
    db: &InstantAdmin,
    user_id: &str,
    request: &ImageGenerationRequest,
    image: &GeneratedImage,
) -> Option<String> {
    let title = request.library_title();
    let material = NewLibraryMaterial {
        user_id,
        title: &title,
        kind: "image",
        content: &image.image_url,
        description: image
            .revised_prompt
            .as_deref()
            .or(Some(request.prompt.trim())),
        tags: &["image", "ai-generated"],
    };

    // One id for every attempt: a write that landed before a failed response
    // is overwritten on retry instead of duplicated.
    let id = Uuid::new_v4();
    let options = RetryOptions::new("instantdb", DEFAULT_DATABASE_TIMEOUT);
    match with_timeout_and_retry(|| db.save_library_material(id, &material), options).await {
        Ok(id) => Some(id.to_string()),
        Err(e) => {
            warn!(user = %user_id, error = %e, "Failed to save generated image to library");
            None
        }
    }
}

async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}

async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
