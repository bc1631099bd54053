//! In-memory PDF to Markdown conversion using lopdf
//!
//! This crate provides:
//! - Positioned text and ruling extraction per page
//! - Table detection (ruling grids, then aligned text columns)
//! - Per-page Markdown assembly on a bounded rayon pool
//! - An axum HTTP service with upload-size, page-count and rate limits

pub mod config;
pub mod convert;
pub mod document;
pub mod extractor;
pub mod markdown;
pub mod rate_limit;
pub mod server;
pub mod tables;

pub use config::{AppEnv, ConfigError, DotenvStatus, RateLimit, ServiceConfig};
pub use convert::{process_page, ConvertOptions, ConvertedDocument, Converter};
pub use document::{load_document, page_count};
pub use extractor::{extract_page, PageContent, Rect, Segment, TextItem};
pub use markdown::{clean_text, PAGE_SEPARATOR};
pub use tables::{find_tables, table_to_markdown, Table, TableSettings};

/// Convert a PDF held in memory with default options
pub fn convert_pdf_mem(buffer: &[u8]) -> Result<ConvertedDocument, PdfError> {
    Converter::new(ConvertOptions::default())?.convert(buffer)
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Not a PDF file")]
    NotAPdf,
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("Invalid PDF structure")]
    InvalidStructure,
    #[error("PDF too long ({pages} pages). Max is {max}.")]
    TooManyPages { pages: usize, max: usize },
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}
