use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::error::DiagnosisError;
use crate::models::ReportRequest;
use crate::pipeline::{self, intake, normalize::normalize, report};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }
}

pub fn create_app(config: AppConfig) -> Router {
    build_router(AppState::new(config))
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/crop-analyze", post(analyze_crop))
        .route("/api/download-crop-report", post(download_report))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20 MB (multipart overhead)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Crop Diagnosis Service",
        "version": "1.0.0",
        "description": "AI-powered crop disease diagnosis from plant photographs",
        "endpoints": {
            "POST /api/crop-analyze": "Diagnose an uploaded crop image (multipart field 'image')",
            "POST /api/download-crop-report": "Render a diagnosis as a downloadable PDF report",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Diagnosis endpoint: one image in, a normalized record plus the echoed
/// image out. The echo lets callers request a report later without keeping
/// any state here.
async fn analyze_crop(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Value> {
    let upload = intake::receive_upload(&mut multipart, &state.config.upload_dir)
        .await
        .map_err(error_response)?;

    let (record, image) = pipeline::diagnose(&state.http, &state.config, &upload)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "result": record, "image": image })))
}

/// Report endpoint: re-normalizes the supplied result (so partial or stale
/// records still render), writes the PDF to transient storage, waits for the
/// flush signal, streams it back and deletes the file.
async fn download_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Response, ApiError> {
    let provisional = request
        .result
        .ok_or_else(|| bad_request_error("No analysis result provided"))?;
    let record = normalize(&provisional);

    info!(disease = %record.disease, "generating report");

    let image = request.image;
    let pdf = tokio::task::spawn_blocking(move || report::render_report(&record, image.as_deref()))
        .await
        .map_err(|e| {
            error!("report task panicked: {}", e);
            internal_error("Failed to generate PDF report")
        })?
        .map_err(error_response)?;

    let file = report::write_report_file(&state.config.reports_dir, &pdf)
        .await
        .map_err(error_response)?;

    // Read back from the synced file; the guard deletes it when this scope
    // ends, after the bytes for the response are in hand.
    let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
        error!("failed to read report file back: {}", e);
        internal_error("Failed to generate PDF report")
    })?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        ),
    ];
    Ok((headers, bytes).into_response())
}

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

/// Collapses pipeline failures to the caller-facing statuses. Operator detail
/// is logged here and never echoed.
fn error_response(err: DiagnosisError) -> ApiError {
    match err {
        DiagnosisError::MissingInput => bad_request_error("No image file uploaded"),
        DiagnosisError::UpstreamAuth => internal_error(
            "Inference API key is not configured or is invalid. \
             Please check your OPENROUTER_API_KEY environment variable.",
        ),
        DiagnosisError::UpstreamQuota => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "API quota exceeded. Please try again later." })),
        ),
        DiagnosisError::UpstreamTransport(detail) => {
            error!("inference call failed: {}", detail);
            internal_error("Failed to analyze image with AI service. Please try again.")
        }
        DiagnosisError::UploadStorage(detail) => {
            error!("upload storage failed: {}", detail);
            internal_error("An error occurred while analyzing the image")
        }
        DiagnosisError::ReportGeneration(detail) => {
            error!("report generation failed: {}", detail);
            internal_error("Failed to generate PDF report")
        }
    }
}
