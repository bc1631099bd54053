//! API error type and its HTTP mapping.

use super::types::ErrorResponse;
use crate::PdfError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;

/// Errors returned by the HTTP layer; `Display` is the client-facing detail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("File too large. Maximum allowed size is {max_mb}MB.")]
    FileTooLarge { max_mb: usize },

    #[error("Rate limit exceeded: {limit}")]
    RateLimited { limit: String, retry_after: Duration },

    #[error("Only PDF files are allowed.")]
    NotPdfFilename,

    #[error("Field 'file' is required.")]
    MissingFile,

    #[error("Invalid multipart request: {0}")]
    BadMultipart(String),

    #[error("PDF too long ({pages} pages). Max is {max}.")]
    TooManyPages { pages: usize, max: usize },

    #[error("Encrypted PDFs are not supported.")]
    Encrypted,

    /// The cause is logged, never sent to the client
    #[error("An error occurred during conversion.")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::FileTooLarge { .. } | ApiError::TooManyPages { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotPdfFilename | ApiError::BadMultipart(_) | ApiError::Encrypted => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::TooManyPages { pages, max } => ApiError::TooManyPages { pages, max },
            PdfError::Encrypted => ApiError::Encrypted,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(cause) = &self {
            log::error!("Conversion failed: {}", cause);
        }

        let retry_after = match &self {
            ApiError::RateLimited { retry_after, .. } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let body = ErrorResponse {
            detail: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
