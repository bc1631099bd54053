//! Request guards for `POST /convert`: upload size, then rate limit.

use super::error::ApiError;
use super::types::AppState;
use crate::rate_limit::RateDecision;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// Reject uploads whose declared `Content-Length` exceeds the size limit.
///
/// Chunked uploads without a length are caught again when the field is read.
pub async fn limit_upload_size(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(length) = declared {
        if length > state.config.max_file_size_bytes() as u64 {
            log::warn!(
                "Rejected upload of {} bytes (limit {} MB)",
                length,
                state.config.max_file_size_mb
            );
            return ApiError::FileTooLarge {
                max_mb: state.config.max_file_size_mb,
            }
            .into_response();
        }
    }

    next.run(request).await
}

/// Count the request against its client's window.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request, state.config.trust_proxy_headers);

    match state.limiter.check(&key) {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            log::warn!("Rate limit exceeded for {}", key);
            ApiError::RateLimited {
                limit: state.limiter.limit().to_string(),
                retry_after,
            }
            .into_response()
        }
    }
}

/// Identify the client: first `X-Forwarded-For` hop when proxies are trusted,
/// else the peer address, else `unknown`.
pub fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
