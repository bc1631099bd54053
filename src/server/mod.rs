//! HTTP service for PDF to Markdown conversion.
//!
//! # Endpoints
//!
//! - `POST /convert` - Convert an uploaded PDF (multipart field `file`)
//! - `GET /health` - Health check
//! - `GET /info` - Service information and active limits
//!
//! `POST /convert` is guarded by an upload size check and a per-client rate
//! limit, in that order.
//!
//! ```bash
//! curl -F "file=@report.pdf" http://localhost:8000/convert
//! ```

mod error;
mod handlers;
mod middleware;
mod server;
mod types;

pub use error::ApiError;
pub use middleware::client_key;
pub use server::{create_router, serve};
pub use types::{
    AppState, ConvertResponse, ErrorResponse, HealthResponse, InfoResponse, LimitsInfo,
};
