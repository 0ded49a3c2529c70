//! HTTP surface: summarize endpoint, artifact downloads and a liveness probe.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::extractors::SourceKind;
use crate::output::ArtifactStore;
use crate::pipeline::{SummaryPipeline, SummaryRequest};
use crate::summarize::{ApiKeys, Provider};
use crate::utils::sanitize_filename;
use crate::DigestError;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SummaryPipeline>,
    pub store: Arc<ArtifactStore>,
}

impl AppState {
    pub fn new(config: Config) -> crate::Result<Self> {
        let store = ArtifactStore::new(config.app.output_dir.clone());
        let pipeline = SummaryPipeline::new(config)?;

        Ok(Self {
            pipeline: Arc::new(pipeline),
            store: Arc::new(store),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarizeBody {
    pub video: String,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
}

impl From<SummarizeBody> for SummaryRequest {
    fn from(body: SummarizeBody) -> Self {
        SummaryRequest {
            input: body.video,
            provider: body.provider,
            keys: ApiKeys {
                openai: body.openai_api_key,
                gemini: body.gemini_api_key,
                youtube: body.youtube_api_key,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub id: String,
    pub source_kind: SourceKind,
    pub source_url: String,
    pub title: String,
    pub author: String,
    pub provider: Provider,
    /// Summary fragment
    pub summary: String,
    /// Full report document
    pub html: String,
    pub transcript: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

/// Pipeline failure rendered as a JSON error body
#[derive(Debug)]
pub struct ApiError(DigestError);

impl From<DigestError> for ApiError {
    fn from(err: DigestError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            DigestError::UnrecognizedUrl(_) | DigestError::MissingApiKey(_) => StatusCode::BAD_REQUEST,
            DigestError::InvalidApiKey(_) => StatusCode::UNAUTHORIZED,
            DigestError::VideoNotFound(_) | DigestError::TweetNotFound(_) => StatusCode::NOT_FOUND,
            DigestError::NoCaptionsAvailable | DigestError::NoVideoInTweet => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DigestError::ContentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DigestError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DigestError::SummarizationFailed { status: Some(429), .. } => StatusCode::TOO_MANY_REQUESTS,
            DigestError::SummarizationFailed { status: Some(503), .. } => StatusCode::SERVICE_UNAVAILABLE,
            DigestError::MetadataFetch { .. }
            | DigestError::ModelUnavailable(_)
            | DigestError::ResponseTruncated
            | DigestError::SummarizationFailed { .. }
            | DigestError::Http(_) => StatusCode::BAD_GATEWAY,
            DigestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.0.user_message(),
            kind: self.0.kind(),
        };

        (status, Json(body)).into_response()
    }
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/summarize", post(summarize))
        .route("/api/download/transcript/:id", get(download_transcript))
        .route("/api/download/summary/:id", get(download_summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let request = SummaryRequest::from(body);
    let report = state.pipeline.run(&request).await?;

    report.persist(&state.store)?;

    Ok(Json(SummarizeResponse {
        id: report.reference.id().to_string(),
        source_kind: report.result.source_kind,
        source_url: report.reference.source_url(),
        title: report.metadata.title,
        author: report.metadata.author_name,
        provider: report.result.provider,
        summary: report.result.summary_html,
        html: report.report_html,
        transcript: report.transcript,
    }))
}

async fn download_transcript(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.read_transcript(&id) {
        Ok(Some(text)) => attachment(text, "text/plain; charset=utf-8", format!("{}_transcript.txt", sanitize_filename(&id))),
        Ok(None) => not_found("Transcript"),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn download_summary(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.read_summary(&id) {
        Ok(Some(html)) => attachment(html, "text/html; charset=utf-8", format!("{}_summary.html", sanitize_filename(&id))),
        Ok(None) => not_found("Summary"),
        Err(e) => ApiError(e).into_response(),
    }
}

fn attachment(body: String, content_type: &'static str, filename: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("{what} not found"), "kind": "not_found"})),
    )
        .into_response()
}

/// Bind and serve until Ctrl+C
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}:{}: {}", config.server.host, config.server.port, e))?;

    let state = AppState::new(config)?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
