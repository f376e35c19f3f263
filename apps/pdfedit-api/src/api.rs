//! API handlers for the pdfedit server
//!
//! Provides REST endpoints for:
//! - Uploading a document and extracting its first-page text
//! - Fetching the uploaded document
//! - Queuing text replacements
//! - Committing the replacements into a new document

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdfedit_core::{
    commit_session, extract_first_page, BBox, Edit, RunSnapshot, SessionId, SessionStore, TextRun,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::sanitize_filename;

/// Build the full router around shared state.
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/pdf/:session_id", get(handle_get_pdf))
        .route("/api/edit/:session_id", post(handle_edit))
        .route("/api/save/:session_id", post(handle_save))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfedit-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub session_id: SessionId,
    pub filename: String,
    pub text_data: Vec<TextRun>,
}

fn is_pdf_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Handler: POST /api/upload
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((name, bytes));
        break;
    }

    let (raw_name, bytes) = upload.ok_or(ApiError::NoFile)?;
    let filename = sanitize_filename(&raw_name);
    if raw_name.is_empty() || !is_pdf_name(&raw_name) || !is_pdf_name(&filename) {
        return Err(ApiError::InvalidFile);
    }

    let id = SessionId::generate();
    let path = state.files.save_upload(&id, &filename, &bytes).await?;
    info!(session_id = %id, filename = %filename, size = bytes.len(), "upload stored");

    let extraction = {
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || extract_first_page(&state.engine, &bytes)).await
    };
    let text_data = match extraction {
        Ok(Ok(runs)) => runs,
        Ok(Err(e)) => {
            state.files.discard(&path).await;
            return Err(ApiError::from(e));
        }
        Err(e) => {
            state.files.discard(&path).await;
            return Err(ApiError::from(e));
        }
    };

    let admission = state.sessions.insert(id, filename.clone(), path);
    state.files.discard_sessions(&admission.evicted).await;
    debug!(session_id = %admission.id, runs = text_data.len(), "text extracted");

    Ok(Json(UploadResponse {
        session_id: admission.id,
        filename,
        text_data,
    }))
}

/// Handler: GET /api/pdf/:session_id
pub async fn handle_get_pdf(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let info = state
        .settle(state.sessions.get(&SessionId::from(session_id)))
        .await?;
    let bytes = state.files.read(&info.source_path).await?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes).into_response())
}

/// Edit request body
#[derive(Deserialize)]
pub struct EditRequest {
    pub bbox: BBox,
    pub new_text: String,
    #[serde(default)]
    pub original: RunSnapshot,
}

/// Edit response
#[derive(Serialize)]
pub struct EditResponse {
    pub success: bool,
    pub changes_count: usize,
}

/// Handler: POST /api/edit/:session_id
///
/// The body is parsed by hand so that a malformed bbox or color is reported
/// as 400 with the usual error body.
pub async fn handle_edit(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<EditResponse>, ApiError> {
    let id = SessionId::from(session_id);
    state.settle(state.sessions.get(&id)).await?;

    let req: EditRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    req.original.validate()?;

    let edit = Edit::new(req.bbox, req.new_text, req.original);
    let changes_count = state
        .settle(state.sessions.with_lock(&id, |s| s.ledger.upsert(edit)))
        .await?;
    debug!(session_id = %id, changes_count, "edit recorded");

    Ok(Json(EditResponse {
        success: true,
        changes_count,
    }))
}

/// Handler: POST /api/save/:session_id
pub async fn handle_save(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = SessionId::from(session_id);

    let committed = {
        let state = Arc::clone(&state);
        let id = id.clone();
        tokio::task::spawn_blocking(move || commit_session(&state.sessions, &state.engine, &id))
            .await?
    };
    let output = state.settle(committed).await?;

    let path = state
        .files
        .save_edited(&id, &output.filename, &output.bytes)
        .await?;
    info!(
        session_id = %id,
        path = %path.display(),
        drawn = output.metrics.drawn,
        fell_back = output.metrics.fell_back,
        dropped = output.metrics.dropped,
        "edited document written"
    );

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        output.filename
    ))
    .map_err(|e| ApiError::Internal(e.to_string()))?;
    let count = |n: usize| HeaderValue::from(n);

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
        (header::CONTENT_DISPOSITION, disposition),
        (HeaderName::from_static("x-edits-drawn"), count(output.metrics.drawn)),
        (
            HeaderName::from_static("x-edits-fallback"),
            count(output.metrics.fell_back),
        ),
        (
            HeaderName::from_static("x-edits-dropped"),
            count(output.metrics.dropped),
        ),
    ];
    Ok((headers, output.bytes).into_response())
}
