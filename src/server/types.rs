//! API request/response types and shared state.

use crate::config::ServiceConfig;
use crate::convert::Converter;
use crate::rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Owns the page rendering pool
    pub converter: Arc<Converter>,
    pub limiter: Arc<RateLimiter>,
}

/// Successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub pages_processed: usize,
    /// Wall-clock seconds, rounded to two decimals
    pub processing_time_sec: f64,
    /// Markdown, one section per page
    pub content: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Active service limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsInfo {
    pub max_file_size_mb: usize,
    pub max_pages: usize,
    pub rate_limit: String,
}

/// Server information response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub title: String,
    pub version: String,
    pub limits: LimitsInfo,
    /// Data handling guarantees
    pub privacy: Vec<String>,
}

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
