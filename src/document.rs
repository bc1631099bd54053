//! Loading uploaded PDF bytes into a lopdf document

use crate::PdfError;
use lopdf::Document;

/// The header may be preceded by junk; readers look this far for it
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Parse a PDF held in memory.
///
/// Buffers without a `%PDF-` header are rejected before parsing; encrypted
/// documents and documents without a catalog are rejected after.
pub fn load_document(buffer: &[u8]) -> Result<Document, PdfError> {
    if !has_pdf_header(buffer) {
        return Err(PdfError::NotAPdf);
    }

    let doc = match Document::load_mem(buffer) {
        Ok(doc) => doc,
        // Failing to read an encrypted file is reported as the encryption
        Err(_) if contains(buffer, b"/Encrypt") => return Err(PdfError::Encrypted),
        Err(e) => return Err(e.into()),
    };

    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }
    if doc.catalog().is_err() {
        return Err(PdfError::InvalidStructure);
    }

    Ok(doc)
}

/// Number of pages in the document's page tree
pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

fn has_pdf_header(buffer: &[u8]) -> bool {
    let window = &buffer[..buffer.len().min(HEADER_SEARCH_WINDOW)];
    contains(window, b"%PDF-")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
