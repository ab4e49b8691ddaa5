// HTTP route handlers for uploads and reports

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::UserHash;
use crate::error::{AppError, AppResult};
use crate::ingest::{Receipt, Upload};
use crate::metrics;
use crate::poll::PollDecision;
use crate::render::render_report;
use crate::state::AppState;
use crate::store::validate_id;
use crate::templates::{self, HTML_CONTENT_TYPE, TEXT_CONTENT_TYPE};

/// Uploads larger than this are rejected with 413.
pub const MAX_UPLOAD_BYTES: usize = 1 << 20;

pub const NOTEBOOK_FIELD: &str = "notebook";
pub const EXERCISE_FIELD: &str = "exercise_id";

pub static X_REPORT_URL: HeaderName = HeaderName::from_static("x-report-url");

/// GET / - Upload form
pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Html<&'static str>> {
    if state.auth.session().is_some() {
        state.auth.authenticate(&headers)?;
    }
    Ok(Html(templates::UPLOAD_FORM))
}

/// GET /health - Liveness check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn favicon() -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/x-icon")], templates::FAVICON)
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler() -> AppResult<Response> {
    let body = metrics::encode().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

/// POST /upload - Ingest a notebook and answer with a page
pub async fn upload(
    State(state): State<Arc<AppState>>,
    UserHash(hash): UserHash,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    handle_upload(&state, &hash, multipart, false).await
}

/// POST /upload.txt - Same as /upload, answered in plain text
pub async fn upload_txt(
    State(state): State<Arc<AppState>>,
    UserHash(hash): UserHash,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    handle_upload(&state, &hash, multipart, true).await
}

async fn handle_upload(
    state: &AppState,
    hash: &str,
    multipart: Result<Multipart, MultipartRejection>,
    raw: bool,
) -> AppResult<Response> {
    let result = try_upload(state, hash, multipart, raw).await;
    match &result {
        Ok(_) => {
            metrics::UPLOADS
                .with_label_values(&[state.ingest.dispatch().mode()])
                .inc();
        }
        Err(e) => {
            metrics::UPLOAD_FAILURES.inc();
            warn!(error = %e, "Upload failed");
        }
    }
    result
}

async fn try_upload(
    state: &AppState,
    hash: &str,
    multipart: Result<Multipart, MultipartRejection>,
    raw: bool,
) -> AppResult<Response> {
    let upload = read_upload(multipart?).await?;
    let receipt = state.ingest.submit(upload, hash).await?;
    upload_response(&receipt, raw)
}

impl From<MultipartRejection> for AppError {
    fn from(e: MultipartRejection) -> Self {
        AppError::BadRequest(format!("expected a multipart upload: {}", e.body_text()))
    }
}

fn field_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("uploads are limited to {} bytes", MAX_UPLOAD_BYTES))
    } else {
        AppError::BadRequest(e.body_text())
    }
}

async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut notebook = None;
    let mut requested_exercise_id = None;

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            NOTEBOOK_FIELD => {
                notebook = Some(field.bytes().await.map_err(field_error)?.to_vec());
            }
            EXERCISE_FIELD => {
                let text = field.text().await.map_err(field_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    requested_exercise_id = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let notebook = notebook.ok_or_else(|| AppError::BadRequest("Missing required 'notebook' field".into()))?;
    debug!(bytes = notebook.len(), exercise = ?requested_exercise_id, "Read upload");
    Ok(Upload {
        notebook,
        requested_exercise_id,
    })
}

fn upload_response(receipt: &Receipt, raw: bool) -> AppResult<Response> {
    let report_url = HeaderValue::from_str(&receipt.report_url)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut response = match (&receipt.report, raw) {
        (Some(report), true) => text_response(report.clone()),
        (Some(report), false) => {
            let page = render_report(&receipt.submission_id, report)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            Html(page).into_response()
        }
        (None, true) => text_response(receipt.report_url.clone().into_bytes()),
        (None, false) => Html(templates::upload_succeeded(&receipt.report_url)).into_response(),
    };
    response.headers_mut().insert(X_REPORT_URL.clone(), report_url);
    Ok(response)
}

fn text_response(body: Vec<u8>) -> Response {
    ([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
}

/// GET /report/:name - Rendered report, raw result (`.txt`) or a wait page
pub async fn get_report(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> AppResult<Response> {
    let (id, raw) = match name.strip_suffix(".txt") {
        Some(id) => (id, true),
        None => (name.as_str(), false),
    };
    validate_id(id)?;

    if let Some(result) = state.store.read_result(id).await? {
        state.polls.forget(id);
        metrics::POLLS.with_label_values(&["ready"]).inc();
        if raw {
            return Ok(text_response(result));
        }
        let page = render_report(id, &result).map_err(|e| AppError::Internal(e.to_string()))?;
        return Ok(Html(page).into_response());
    }

    let page = match state.polls.observe(id) {
        PollDecision::Wait(reload) => {
            metrics::POLLS.with_label_values(&["wait"]).inc();
            templates::wait_page(reload)
        }
        PollDecision::GiveUp => {
            metrics::POLLS.with_label_values(&["give_up"]).inc();
            debug!(submission_id = %id, "Giving up on pending report");
            templates::GIVE_UP.to_string()
        }
    };
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, HTML_CONTENT_TYPE), (CACHE_CONTROL, "no-store")],
        page,
    )
        .into_response())
}
