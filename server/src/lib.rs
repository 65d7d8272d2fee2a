pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::FormRejection, DefaultBodyLimit, Multipart,
        Path, Request, State,
    },
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use clone_core::{CloneError, CloneManager, OutputStore, VoiceCloner, VoiceStore};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, MetricsResponse};
use crate::validation::{
    validate_audio_file_name, validate_clone_request, validate_upload_file_name, validate_user_id,
};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CloneManager>,
    pub metrics: AppMetrics,
    pub config: ServerConfig,
}

impl AppState {
    /// Open both directories and wrap an already checked backend.
    pub fn new(config: ServerConfig, cloner: Arc<dyn VoiceCloner>) -> anyhow::Result<Self> {
        let voices = VoiceStore::open(&config.voices_dir)?;
        let outputs = OutputStore::open(&config.cloned_dir)?;
        info!(
            "Using directories: {}, {}",
            voices.dir().display(),
            outputs.dir().display()
        );
        let manager = CloneManager::new(
            voices,
            outputs,
            cloner,
            config.language.clone(),
            config.max_concurrent_synthesis,
            config.synthesis_timeout(),
        );
        Ok(Self {
            manager: Arc::new(manager),
            metrics: AppMetrics::new(),
            config,
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
pub struct RecordVoiceResponse {
    message: &'static str,
    file_path_on_server: String,
}

#[derive(Deserialize)]
pub struct CloneVoiceForm {
    user_id: Option<String>,
    text: Option<String>,
}

#[derive(Serialize)]
pub struct CloneVoiceResponse {
    audio_url: String,
}

/// Build the application with every route and middleware layer.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;

    // one token every `60s / rate`, bursting up to the per-minute budget
    let rate = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond((60_000 / rate as u64).max(1))
            .burst_size(rate)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", rate);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    let api = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route(
            "/record_voice",
            post(record_voice).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/clone_voice", post(clone_voice))
        // catch-all so traversal attempts reach validation instead of the router
        .route("/audio/{*filename}", get(get_audio))
        .route("/metrics", get(metrics_endpoint));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    match (&config.cors_allowed_origins, origins.is_empty()) {
        (Some(_), false) => {
            info!("CORS configured for {} origin(s)", origins.len());
            base.allow_origin(AllowOrigin::list(origins))
        }
        (Some(_), true) => {
            warn!("CORS_ALLOWED_ORIGINS has no valid origin, falling back to permissive CORS");
            base.allow_origin(Any)
        }
        (None, _) => {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
            base.allow_origin(Any)
        }
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    request
        .headers_mut()
        .insert("x-request-id", request_id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", request_id);
    response
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.request_count.fetch_add(1, Ordering::Relaxed);
    next.run(request).await
}

pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check endpoint called.");
    Json(HealthResponse {
        status: "running",
        message: "TTS API is operational.",
    })
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

pub async fn record_voice(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecordVoiceResponse>, ApiError> {
    let started = Instant::now();
    let result = store_upload(&state, multipart).await;
    state.metrics.record_voice.observe(started.elapsed(), result.is_ok());
    result
}

async fn store_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecordVoiceResponse>, ApiError> {
    let mut multipart = multipart
        .map_err(|e| ApiError::InvalidInput(format!("Invalid multipart body: {}", e.body_text())))?;

    let mut user_id: Option<String> = None;
    let mut audio: Option<(Option<String>, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::from_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => user_id = Some(field.text().await.map_err(ApiError::from_multipart)?),
            "audio" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
                audio = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    let user_id = validate_user_id(user_id.as_deref())?;
    let (file_name, bytes) = audio.ok_or_else(|| {
        ApiError::InvalidInput("No file uploaded or filename missing.".to_string())
    })?;
    let ext = validate_upload_file_name(file_name.as_deref())?;
    if bytes.is_empty() {
        return Err(ApiError::InvalidInput("Uploaded audio file is empty.".to_string()));
    }

    info!("Receiving voice for user '{}' ({} bytes)", user_id, bytes.len());
    let path = state
        .manager
        .record_sample(user_id, &ext, &bytes)
        .await
        .map_err(|e| {
            error!("Error saving voice file for user '{}': {}", user_id, e);
            ApiError::InternalError("Could not save voice file.".to_string())
        })?;

    Ok(Json(RecordVoiceResponse {
        message: "Voice recorded successfully",
        file_path_on_server: path.display().to_string(),
    }))
}

pub async fn clone_voice(
    State(state): State<AppState>,
    form: Result<Form<CloneVoiceForm>, FormRejection>,
) -> Result<Json<CloneVoiceResponse>, ApiError> {
    let started = Instant::now();
    let result = synthesize(&state, form).await;
    state.metrics.clone_voice.observe(started.elapsed(), result.is_ok());
    result
}

async fn synthesize(
    state: &AppState,
    form: Result<Form<CloneVoiceForm>, FormRejection>,
) -> Result<Json<CloneVoiceResponse>, ApiError> {
    let Form(form) = form
        .map_err(|e| ApiError::InvalidInput(format!("Invalid form body: {}", e.body_text())))?;
    let (user_id, text) = validate_clone_request(form.user_id.as_deref(), form.text.as_deref())?;

    let audio = match state.manager.clone_voice(user_id, text).await {
        Ok(audio) => audio,
        Err(e) => {
            if matches!(e, CloneError::NoSample(_)) {
                warn!("No voice samples found for user_id: {}", user_id);
            } else {
                state.metrics.synthesis.record_failure();
            }
            return Err(e.into());
        }
    };
    state
        .metrics
        .synthesis
        .record_success(audio.elapsed, audio.duration_ms);

    Ok(Json(CloneVoiceResponse {
        audio_url: format!("/audio/{}", audio.file_name),
    }))
}

pub async fn get_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = serve_artifact(&state, &filename).await;
    state.metrics.audio.observe(started.elapsed(), result.is_ok());
    result
}

async fn serve_artifact(state: &AppState, filename: &str) -> Result<Response, ApiError> {
    validate_audio_file_name(filename)?;

    let not_found = || ApiError::NotFound("Audio file not found".to_string());
    let path = match state.manager.artifact(filename).await {
        Ok(Some(path)) => path,
        Ok(None) => {
            warn!("Audio file not found: {}", filename);
            return Err(not_found());
        }
        Err(e) => return Err(ApiError::InternalError(format!("Could not read audio file: {e}"))),
    };

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => not_found(),
        _ => ApiError::InternalError(format!("Could not read audio file: {e}")),
    })?;
    info!("Serving audio file: {}", path.display());

    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response())
}

/// Periodically delete stored files older than `max_age`.
pub async fn run_retention(manager: Arc<CloneManager>, max_age: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match manager.prune(max_age).await {
            Ok((0, 0)) => debug!("Retention sweep removed nothing"),
            Ok((samples, artifacts)) => info!(
                "Retention sweep removed {} sample(s) and {} artifact(s)",
                samples, artifacts
            ),
            Err(e) => error!("Retention sweep failed: {}", e),
        }
    }
}
