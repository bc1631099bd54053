//! Document conversion: page limit, parallel page rendering, assembly

use crate::document::{load_document, page_count};
use crate::extractor::{extract_page, group_into_blocks, group_into_lines, page_box, Rect};
use crate::markdown::{clean_text, page_error, render_page, PAGE_SEPARATOR};
use crate::tables::{find_tables, table_to_markdown, TableSettings};
use crate::PdfError;
use lopdf::{Document, ObjectId};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Strip this much from the top and bottom of a page (running headers/footers)
const CONTENT_MARGIN: f32 = 40.0;

/// Blocks with this many characters or fewer are dropped as noise
const MIN_BLOCK_CHARS: usize = 5;

/// Options for document conversion
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Documents with more pages are rejected
    pub max_pages: usize,
    /// Threads in the page rendering pool
    pub workers: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_pages: 300,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Result of converting one document
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub pages_processed: usize,
    /// Page sections joined with [`PAGE_SEPARATOR`]
    pub content: String,
}

/// Converts PDFs on a bounded pool shared by every caller
pub struct Converter {
    options: ConvertOptions,
    pool: rayon::ThreadPool,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Result<Self, PdfError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .thread_name(|i| format!("pdf2md-worker-{}", i))
            .build()
            .map_err(|e| PdfError::WorkerPool(e.to_string()))?;

        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert a PDF held in memory to Markdown.
    ///
    /// Pages render in parallel; sections come back in document order. A
    /// page that fails renders as an error section instead.
    pub fn convert(&self, buffer: &[u8]) -> Result<ConvertedDocument, PdfError> {
        let start = Instant::now();
        let doc = load_document(buffer)?;

        let total = page_count(&doc);
        if total > self.options.max_pages {
            log::warn!(
                "Rejecting document with {} pages (limit {})",
                total,
                self.options.max_pages
            );
            return Err(PdfError::TooManyPages {
                pages: total,
                max: self.options.max_pages,
            });
        }

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

        log::debug!(
            "Converting {} pages ({} bytes) on {} workers",
            pages.len(),
            buffer.len(),
            self.pool.current_num_threads()
        );

        let sections: Vec<String> = self.pool.install(|| {
            pages
                .par_iter()
                .map(|&(page_num, page_id)| process_page(&doc, page_id, page_num))
                .collect()
        });

        log::info!(
            "Converted {} pages in {:.2}s",
            pages.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(ConvertedDocument {
            pages_processed: pages.len(),
            content: sections.join(PAGE_SEPARATOR),
        })
    }
}

/// Render one page to its Markdown section; never fails
pub fn process_page(doc: &Document, page_id: ObjectId, page_num: u32) -> String {
    render_or_error(page_num, || render_page_content(doc, page_id, page_num))
}

fn render_or_error(page_num: u32, render: impl FnOnce() -> Result<String, PdfError>) -> String {
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(markdown)) => markdown,
        Ok(Err(e)) => {
            log::warn!("Page {} failed: {}", page_num, e);
            page_error(page_num, &e)
        }
        Err(_) => {
            log::error!("Page {} panicked during rendering", page_num);
            page_error(page_num, &"internal error while rendering page")
        }
    }
}

fn render_page_content(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<String, PdfError> {
    let content_box = page_box(doc, page_id).inset_vertical(CONTENT_MARGIN);
    let content = extract_page(doc, page_id, page_num)?.clip(&content_box);

    let mut table_sections = Vec::new();
    let mut table_areas: Vec<Rect> = Vec::new();
    for table in find_tables(&content.items, &content.segments, &TableSettings::default()) {
        if let Some(markdown) = table_to_markdown(&table) {
            table_sections.push(markdown);
            table_areas.push(table.bbox);
        }
    }

    let mut blocks = group_into_blocks(group_into_lines(content.items));
    // Top to bottom, then left to right
    blocks.sort_by(|a, b| {
        b.bbox
            .y1
            .total_cmp(&a.bbox.y1)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let text_parts: Vec<String> = blocks
        .iter()
        .filter(|block| !table_areas.iter().any(|area| area.intersects(&block.bbox)))
        .map(|block| block.text())
        .filter(|text| text.trim().chars().count() > MIN_BLOCK_CHARS)
        .map(|text| clean_text(&text))
        .collect();

    Ok(render_page(page_num, &table_sections, &text_parts))
}
