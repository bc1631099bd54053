//! API request handlers.

use super::error::ApiError;
use super::types::{AppState, ConvertResponse, HealthResponse, InfoResponse, LimitsInfo};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

const SERVICE_TITLE: &str = "PDF to Markdown Converter";

/// Convert endpoint handler.
///
/// POST /convert
///
/// Accepts multipart form data with a `file` field holding a `.pdf` upload.
/// The upload is converted in memory and never written anywhere. Requests
/// that are not multipart at all get the same JSON error body as any other
/// malformed upload.
pub async fn convert_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadMultipart(e.body_text()))?;
    let start = Instant::now();
    let max_mb = state.config.max_file_size_mb;
    let max_bytes = state.config.max_file_size_bytes();

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_mb))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if !file_name.ends_with(".pdf") {
            return Err(ApiError::NotPdfFilename);
        }

        let data = field.bytes().await.map_err(|e| multipart_error(e, max_mb))?;
        if data.len() > max_bytes {
            log::warn!("Rejected upload '{}' of {} bytes", file_name, data.len());
            return Err(ApiError::FileTooLarge { max_mb });
        }

        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or(ApiError::MissingFile)?;
    log::info!("Processing '{}' ({} bytes)", file_name, data.len());

    let converter = Arc::clone(&state.converter);
    let document = tokio::task::spawn_blocking(move || converter.convert(&data))
        .await
        .map_err(|e| ApiError::Internal(format!("conversion task failed: {}", e)))??;

    let elapsed = start.elapsed().as_secs_f64();
    log::info!(
        "Conversion successful: {} pages processed in {:.2} seconds.",
        document.pages_processed,
        elapsed
    );

    Ok(Json(ConvertResponse {
        pages_processed: document.pages_processed,
        processing_time_sec: (elapsed * 100.0).round() / 100.0,
        content: document.content,
    }))
}

/// Oversized bodies surface as multipart errors once the body limit trips
fn multipart_error(err: MultipartError, max_mb: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { max_mb }
    } else {
        ApiError::BadMultipart(err.body_text())
    }
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Server info endpoint handler.
///
/// GET /info
pub async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        title: SERVICE_TITLE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        limits: LimitsInfo {
            max_file_size_mb: state.config.max_file_size_mb,
            max_pages: state.converter.options().max_pages,
            rate_limit: state.limiter.limit().to_string(),
        },
        privacy: vec![
            "Files are never saved to disk or database.".to_string(),
            "Uploads are processed in memory and released after the response.".to_string(),
        ],
    })
}
