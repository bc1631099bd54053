//! Positioned text and ruling extraction from PDF pages using lopdf
//!
//! One pass over a page's content stream yields the text items (position,
//! estimated width, font size) and the painted horizontal/vertical line
//! segments that table detection works from.

use crate::PdfError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Glyph advance (thousandths of an em) when a font carries no widths
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

/// Maximum drift for a line to still count as horizontal or vertical
const AXIS_TOLERANCE: f32 = 1.0;

/// TJ adjustments below this (thousandths of an em) are word gaps
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Lines closer than this factor of their font size belong to one block
const BLOCK_GAP_FACTOR: f32 = 1.5;

/// Used when a page has no usable CropBox or MediaBox (US Letter)
const DEFAULT_PAGE_BOX: Rect = Rect {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Axis-aligned rectangle in PDF user space (origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True when the two rectangles share a region of positive area
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Shrink the rectangle by `margin` at the top and at the bottom
    pub fn inset_vertical(&self, margin: f32) -> Rect {
        let y0 = self.y0 + margin;
        let y1 = (self.y1 - margin).max(y0);
        Rect { y0, y1, ..*self }
    }
}

/// A text item with position information
#[derive(Debug, Clone)]
pub struct TextItem {
    /// The text content
    pub text: String,
    /// X position of the text origin
    pub x: f32,
    /// Baseline Y position (PDF coordinates, origin at bottom-left)
    pub y: f32,
    /// Advance width, estimated from the font's glyph widths
    pub width: f32,
    /// Height (approximated from font size)
    pub height: f32,
    /// Font resource name
    pub font: String,
    /// Rendered font size
    pub font_size: f32,
    /// Page number (1-indexed)
    pub page: u32,
}

impl TextItem {
    /// Glyph box: a fifth of the size below the baseline, the rest above
    pub fn bbox(&self) -> Rect {
        Rect::new(
            self.x,
            self.y - self.height * 0.2,
            self.x + self.width.max(0.0),
            self.y + self.height * 0.8,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A painted straight line that is horizontal or vertical.
///
/// `position` is the y of a horizontal segment or the x of a vertical one;
/// `start..=end` is the covered range along the other axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub orientation: Orientation,
    pub position: f32,
    pub start: f32,
    pub end: f32,
}

impl Segment {
    pub fn horizontal(y: f32, x0: f32, x1: f32) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            position: y,
            start: x0.min(x1),
            end: x0.max(x1),
        }
    }

    pub fn vertical(x: f32, y0: f32, y1: f32) -> Self {
        Self {
            orientation: Orientation::Vertical,
            position: x,
            start: y0.min(y1),
            end: y0.max(y1),
        }
    }

    /// Build a segment between two points, dropping slanted and degenerate lines
    fn from_points(a: (f32, f32), b: (f32, f32)) -> Option<Self> {
        let dx = (b.0 - a.0).abs();
        let dy = (b.1 - a.1).abs();
        if dx <= AXIS_TOLERANCE && dy <= AXIS_TOLERANCE {
            None
        } else if dy <= AXIS_TOLERANCE {
            Some(Self::horizontal((a.1 + b.1) / 2.0, a.0, b.0))
        } else if dx <= AXIS_TOLERANCE {
            Some(Self::vertical((a.0 + b.0) / 2.0, a.1, b.1))
        } else {
            None
        }
    }

    pub fn length(&self) -> f32 {
        self.end - self.start
    }

    /// Cut the segment down to the part inside `clip`
    pub fn clamp_to(&self, clip: &Rect) -> Option<Self> {
        let (pos_min, pos_max, span_min, span_max) = match self.orientation {
            Orientation::Horizontal => (clip.y0, clip.y1, clip.x0, clip.x1),
            Orientation::Vertical => (clip.x0, clip.x1, clip.y0, clip.y1),
        };
        if self.position < pos_min || self.position > pos_max {
            return None;
        }
        let start = self.start.max(span_min);
        let end = self.end.min(span_max);
        (end > start).then_some(Self { start, end, ..*self })
    }
}

/// Everything table and block detection needs from one page
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub items: Vec<TextItem>,
    pub segments: Vec<Segment>,
}

impl PageContent {
    /// Keep only the text whose origin lies in `clip` and the ruling parts inside it
    pub fn clip(self, clip: &Rect) -> Self {
        let items = self
            .items
            .into_iter()
            .filter(|item| clip.contains_point(item.x, item.y))
            .collect();
        let segments = self
            .segments
            .iter()
            .filter_map(|segment| segment.clamp_to(clip))
            .collect();
        Self { items, segments }
    }
}

/// A line of text (grouped text items)
#[derive(Debug, Clone)]
pub struct TextLine {
    pub items: Vec<TextItem>,
    pub y: f32,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn font_size(&self) -> f32 {
        self.items.iter().map(|i| i.font_size).fold(0.0, f32::max)
    }

    pub fn bbox(&self) -> Rect {
        let mut items = self.items.iter().map(TextItem::bbox);
        let first = items.next().unwrap_or(Rect::new(0.0, self.y, 0.0, self.y));
        items.fold(first, |acc, r| acc.union(&r))
    }
}

/// A run of vertically adjacent lines, the unit text is emitted in
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
    pub bbox: Rect,
}

impl TextBlock {
    /// Line texts joined with newlines
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Visible area of a page: CropBox, else MediaBox, honouring inheritance
pub fn page_box(doc: &Document, page_id: ObjectId) -> Rect {
    [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .iter()
        .find_map(|key| {
            inherited_attribute(doc, page_id, key).and_then(|obj| rect_from_object(doc, obj))
        })
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// Look a page attribute up on the page, then on its ancestors
fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Bounded walk: malformed files can have cyclic Parent chains
    for _ in 0..32 {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn rect_from_object(doc: &Document, obj: &Object) -> Option<Rect> {
    let values = resolve(doc, obj).as_array().ok()?;
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| get_number(resolve(doc, v)))
        .collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1] => {
            let rect = Rect::new(*x0, *y0, *x1, *y1);
            (rect.width() > 0.0 && rect.height() > 0.0).then_some(rect)
        }
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    doc.dereference(obj).map(|(_, o)| o).unwrap_or(obj)
}

/// Extract text items and ruling segments from a single page.
///
/// A page whose content stream is missing, or holds bytes that decode to no
/// operators at all, is an error rather than an empty page.
pub fn extract_page(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<PageContent, PdfError> {
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let metrics: HashMap<&[u8], FontMetrics> = fonts
        .iter()
        .map(|(name, dict)| (name.as_slice(), FontMetrics::from_dict(doc, dict)))
        .collect();

    let content_data = page_content(doc, page_id)?;
    let content = Content::decode(&content_data)?;
    if content.operations.is_empty() && has_operators(&content_data) {
        return Err(PdfError::Parse("unreadable content stream".to_string()));
    }

    let mut walker = ContentWalker::new(doc, &fonts, &metrics, page_num);
    for op in &content.operations {
        walker.apply(op.operator.as_str(), &op.operands);
    }

    Ok(PageContent {
        items: walker.items,
        segments: walker.segments,
    })
}

/// Concatenate a page's content streams.
///
/// lopdf skips `Contents` references that do not resolve; those are
/// reported here instead.
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, PdfError> {
    let mut data = Vec::new();
    for id in doc.get_page_contents(page_id) {
        let stream = doc
            .get_object(id)
            .and_then(Object::as_stream)
            .map_err(|_| PdfError::Parse(format!("missing content stream {} {} R", id.0, id.1)))?;
        match stream.decompressed_content() {
            Ok(decoded) => data.extend_from_slice(&decoded),
            Err(_) => data.extend_from_slice(&stream.content),
        }
        data.push(b'\n');
    }
    Ok(data)
}

/// Anything besides whitespace and comment lines
fn has_operators(data: &[u8]) -> bool {
    data.split(|&b| b == b'\n' || b == b'\r').any(|line| {
        let line = line.trim_ascii();
        !line.is_empty() && !line.starts_with(b"%")
    })
}

/// Glyph widths of a font, enough to estimate how far a string advances
#[derive(Debug, Clone)]
struct FontMetrics {
    first_char: u32,
    widths: Vec<f32>,
    missing_width: f32,
    two_byte: bool,
}

impl FontMetrics {
    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map_or(false, |subtype| subtype == b"Type0");

        if two_byte {
            // Composite fonts: use the descendant's default width
            let default_width = font
                .get(b"DescendantFonts")
                .ok()
                .and_then(|d| resolve(doc, d).as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|f| resolve(doc, f).as_dict().ok())
                .and_then(|f| f.get(b"DW").ok())
                .and_then(get_number)
                .unwrap_or(DEFAULT_GLYPH_WIDTH);
            return Self {
                first_char: 0,
                widths: Vec::new(),
                missing_width: default_width,
                two_byte,
            };
        }

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| resolve(doc, o).as_i64().ok())
            .unwrap_or(0)
            .max(0) as u32;
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| get_number(resolve(doc, w)).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        let missing_width = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|d| resolve(doc, d).as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(get_number)
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_GLYPH_WIDTH);

        Self {
            first_char,
            widths,
            missing_width,
            two_byte,
        }
    }

    /// Advance of the encoded string, in thousandths of an em
    fn advance(&self, bytes: &[u8]) -> f32 {
        if self.two_byte {
            return (bytes.len() / 2) as f32 * self.missing_width;
        }
        bytes
            .iter()
            .map(|&code| {
                (code as u32)
                    .checked_sub(self.first_char)
                    .and_then(|idx| self.widths.get(idx as usize))
                    .copied()
                    .filter(|w| *w > 0.0)
                    .unwrap_or(self.missing_width)
            })
            .sum()
    }
}

/// Graphics and text state while interpreting a content stream
struct ContentWalker<'a> {
    doc: &'a Document,
    fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
    metrics: &'a HashMap<&'a [u8], FontMetrics>,
    page: u32,

    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,

    font: Vec<u8>,
    font_size: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text_block: bool,

    path: Vec<Segment>,
    current_point: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,

    items: Vec<TextItem>,
    segments: Vec<Segment>,
}

impl<'a> ContentWalker<'a> {
    fn new(
        doc: &'a Document,
        fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
        metrics: &'a HashMap<&'a [u8], FontMetrics>,
        page: u32,
    ) -> Self {
        Self {
            doc,
            fonts,
            metrics,
            page,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            font: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            in_text_block: false,
            path: Vec::new(),
            current_point: None,
            subpath_start: None,
            items: Vec::new(),
            segments: Vec::new(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            // Graphics state
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(saved) = self.ctm_stack.pop() {
                    self.ctm = saved;
                }
            }
            "cm" => {
                if let Some(matrix) = matrix_operand(operands) {
                    self.ctm = multiply_matrices(&matrix, &self.ctm);
                }
            }

            // Text objects and state
            "BT" => {
                self.in_text_block = true;
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "ET" => self.in_text_block = false,
            "Tf" => {
                if let [name, size, ..] = operands {
                    if let Ok(name) = name.as_name() {
                        self.font = name.to_vec();
                    }
                    if let Some(size) = get_number(size) {
                        self.font_size = size;
                    }
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(get_number) {
                    self.leading = leading;
                }
            }
            "Td" => self.move_line(operands, false),
            "TD" => self.move_line(operands, true),
            "Tm" => {
                if let Some(matrix) = matrix_operand(operands) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(),

            // Text showing
            "Tj" => {
                if let Some(operand) = operands.first() {
                    self.show(std::slice::from_ref(operand));
                }
            }
            "TJ" => {
                if let Some(Ok(parts)) = operands.first().map(Object::as_array) {
                    self.show(parts);
                }
            }
            "'" => {
                self.next_line();
                if let Some(operand) = operands.first() {
                    self.show(std::slice::from_ref(operand));
                }
            }
            "\"" => {
                self.next_line();
                if let Some(operand) = operands.get(2) {
                    self.show(std::slice::from_ref(operand));
                }
            }

            // Path construction
            "m" => {
                if let Some((x, y)) = point_operand(operands, 0) {
                    let p = transform_point(&self.ctm, x, y);
                    self.current_point = Some(p);
                    self.subpath_start = Some(p);
                }
            }
            "l" => {
                if let Some((x, y)) = point_operand(operands, 0) {
                    let p = transform_point(&self.ctm, x, y);
                    if let Some(from) = self.current_point {
                        self.add_path_segment(from, p);
                    }
                    self.current_point = Some(p);
                }
            }
            "c" => {
                if let Some((x, y)) = point_operand(operands, 4) {
                    self.current_point = Some(transform_point(&self.ctm, x, y));
                }
            }
            "v" | "y" => {
                if let Some((x, y)) = point_operand(operands, 2) {
                    self.current_point = Some(transform_point(&self.ctm, x, y));
                }
            }
            "re" => self.add_rectangle(operands),
            "h" => self.close_subpath(),

            // Path painting
            "s" | "b" | "b*" => {
                self.close_subpath();
                self.paint_path();
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint_path(),
            "n" => self.discard_path(),
            _ => {}
        }
    }

    fn move_line(&mut self, operands: &[Object], set_leading: bool) {
        let tx = operands.first().and_then(get_number);
        let ty = operands.get(1).and_then(get_number);
        if let (Some(tx), Some(ty)) = (tx, ty) {
            if set_leading {
                self.leading = -ty;
            }
            self.line_matrix = multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
            self.text_matrix = self.line_matrix;
        }
    }

    fn next_line(&mut self) {
        // Many producers never set TL; approximate the line height then
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.line_matrix =
            multiply_matrices(&[1.0, 0.0, 0.0, 1.0, 0.0, -leading], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// Emit one text item for a Tj/TJ-style show and advance the text matrix
    fn show(&mut self, parts: &[Object]) {
        if !self.in_text_block {
            return;
        }

        let (doc, fonts, all_metrics) = (self.doc, self.fonts, self.metrics);
        let font_dict = fonts.get(self.font.as_slice()).copied();
        let metrics = all_metrics.get(self.font.as_slice());

        let mut text = String::new();
        let mut advance = 0.0f32;
        for part in parts {
            match part {
                Object::String(bytes, _) => {
                    text.push_str(&decode_text(doc, font_dict, bytes));
                    advance += metrics.map_or(bytes.len() as f32 * DEFAULT_GLYPH_WIDTH, |m| {
                        m.advance(bytes)
                    });
                }
                other => {
                    if let Some(adjust) = get_number(other) {
                        if adjust < TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ')
                        {
                            text.push(' ');
                        }
                        advance -= adjust;
                    }
                }
            }
        }

        let tx = advance / 1000.0 * self.font_size;

        if !text.trim().is_empty() {
            let combined = multiply_matrices(&self.text_matrix, &self.ctm);
            let scale = matrix_scale(&combined);
            let rendered_size = self.font_size * scale;
            self.items.push(TextItem {
                text,
                x: combined[4],
                y: combined[5],
                width: (tx * scale).max(0.0),
                height: rendered_size,
                font: String::from_utf8_lossy(&self.font).into_owned(),
                font_size: rendered_size,
                page: self.page,
            });
        }

        self.text_matrix = multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    fn add_rectangle(&mut self, operands: &[Object]) {
        let numbers: Vec<f32> = operands.iter().take(4).filter_map(get_number).collect();
        if let [x, y, w, h] = numbers[..] {
            let corners = [
                transform_point(&self.ctm, x, y),
                transform_point(&self.ctm, x + w, y),
                transform_point(&self.ctm, x + w, y + h),
                transform_point(&self.ctm, x, y + h),
            ];
            for i in 0..4 {
                self.add_path_segment(corners[i], corners[(i + 1) % 4]);
            }
            self.current_point = Some(corners[0]);
            self.subpath_start = Some(corners[0]);
        }
    }

    fn add_path_segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        if let Some(segment) = Segment::from_points(from, to) {
            self.path.push(segment);
        }
    }

    fn close_subpath(&mut self) {
        if let (Some(current), Some(start)) = (self.current_point, self.subpath_start) {
            self.add_path_segment(current, start);
            self.current_point = Some(start);
        }
    }

    fn paint_path(&mut self) {
        self.segments.append(&mut self.path);
        self.current_point = None;
        self.subpath_start = None;
    }

    fn discard_path(&mut self) {
        self.path.clear();
        self.current_point = None;
        self.subpath_start = None;
    }
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn transform_point(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

/// Larger of the horizontal and vertical scale factors of a matrix
fn matrix_scale(m: &[f32; 6]) -> f32 {
    let scale_x = (m[0].powi(2) + m[1].powi(2)).sqrt();
    let scale_y = (m[2].powi(2) + m[3].powi(2)).sqrt();
    scale_x.max(scale_y)
}

fn matrix_operand(operands: &[Object]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut matrix = IDENTITY;
    for (slot, operand) in matrix.iter_mut().zip(operands) {
        *slot = get_number(operand)?;
    }
    Some(matrix)
}

fn point_operand(operands: &[Object], offset: usize) -> Option<(f32, f32)> {
    let x = operands.get(offset).and_then(get_number)?;
    let y = operands.get(offset + 1).and_then(get_number)?;
    Some((x, y))
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Decode a shown string through the font's encoding, with fallbacks
fn decode_text(doc: &Document, font: Option<&Dictionary>, bytes: &[u8]) -> String {
    if let Some(font) = font {
        if let Ok(encoding) = font.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return text;
            }
        }
    }

    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let utf16: Vec<u16> = rest
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

/// Represents a column region on a page
#[derive(Debug, Clone)]
struct ColumnRegion {
    x_min: f32,
    x_max: f32,
}

impl ColumnRegion {
    fn contains(&self, item: &TextItem) -> bool {
        item.x >= self.x_min && item.x < self.x_max
    }
}

/// Detect a two-column layout from gaps between item X positions
fn detect_columns(items: &[TextItem]) -> Vec<ColumnRegion> {
    if items.is_empty() {
        return vec![];
    }

    let x_min = items.iter().map(|i| i.x).fold(f32::INFINITY, f32::min);
    let x_max = items
        .iter()
        .map(|i| i.x + i.width.max(50.0))
        .fold(f32::NEG_INFINITY, f32::max);
    let single = vec![ColumnRegion { x_min, x_max }];

    // Narrow pages and sparse pages are read as one column
    let page_width = x_max - x_min;
    if page_width < 200.0 || items.len() < 20 {
        return single;
    }

    let mut x_positions: Vec<f32> = items.iter().map(|i| i.x).collect();
    x_positions.sort_by(f32::total_cmp);

    // A gap wider than a fifth of the text width separates columns
    let gap_threshold = page_width * 0.20;
    let mut boundaries = vec![x_min];
    boundaries.extend(
        x_positions
            .windows(2)
            .filter(|w| w[1] - w[0] > gap_threshold)
            .map(|w| (w[0] + w[1]) / 2.0),
    );
    boundaries.push(x_max + 1.0);

    let columns: Vec<ColumnRegion> = boundaries
        .windows(2)
        .map(|w| ColumnRegion {
            x_min: w[0],
            x_max: w[1],
        })
        .collect();
    if columns.len() < 2 {
        return single;
    }

    let counts: Vec<usize> = columns
        .iter()
        .map(|col| items.iter().filter(|i| col.contains(i)).count())
        .collect();
    let min_items = counts.iter().sum::<usize>() / 5;

    if columns.len() == 2 {
        return if counts.iter().all(|&c| c >= min_items) {
            columns
        } else {
            single
        };
    }

    // 3+ gaps: merge into the outermost substantial columns
    let first = counts.iter().position(|&c| c >= min_items);
    let last = counts.iter().rposition(|&c| c >= min_items);
    match (first, last) {
        (Some(first), Some(last)) if first != last => vec![
            ColumnRegion {
                x_min: columns[0].x_min,
                x_max: columns[first].x_max,
            },
            ColumnRegion {
                x_min: columns[last].x_min,
                x_max: columns[columns.len() - 1].x_max,
            },
        ],
        _ => single,
    }
}

/// Group one page's text items into lines, column by column
pub fn group_into_lines(items: Vec<TextItem>) -> Vec<TextLine> {
    let columns = detect_columns(&items);
    if columns.len() <= 1 {
        return group_single_column(items);
    }

    let mut lines = Vec::new();
    for column in &columns {
        let col_items: Vec<TextItem> = items
            .iter()
            .filter(|i| column.contains(i))
            .cloned()
            .collect();
        lines.extend(group_single_column(col_items));
    }
    lines
}

/// Group items from a single column into lines.
///
/// Stream order is kept (it is usually reading order); only consecutive items
/// sharing a baseline are merged.
fn group_single_column(items: Vec<TextItem>) -> Vec<TextLine> {
    let y_tolerance = 3.0;
    let mut lines: Vec<TextLine> = Vec::new();

    for item in items {
        match lines.last_mut() {
            Some(line) if (line.y - item.y).abs() < y_tolerance => line.items.push(item),
            _ => lines.push(TextLine {
                y: item.y,
                items: vec![item],
            }),
        }
    }

    for line in &mut lines {
        line.items.sort_by(|a, b| a.x.total_cmp(&b.x));
    }

    lines
}

/// Merge consecutive lines into blocks when they are stacked closely and
/// overlap horizontally
pub fn group_into_blocks(lines: Vec<TextLine>) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();

    for line in lines {
        let bbox = line.bbox();
        let joins_previous = blocks.last().map_or(false, |block| {
            block.lines.last().map_or(false, |prev| {
                let gap = prev.y - line.y;
                let limit = prev.font_size().max(line.font_size()) * BLOCK_GAP_FACTOR;
                gap > 0.0 && gap <= limit && block.bbox.overlaps_horizontally(&bbox)
            })
        });

        match blocks.last_mut() {
            Some(block) if joins_previous => {
                block.bbox = block.bbox.union(&bbox);
                block.lines.push(line);
            }
            _ => blocks.push(TextBlock {
                lines: vec![line],
                bbox,
            }),
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    fn item(text: &str, x: f32, y: f32) -> TextItem {
        TextItem {
            text: text.into(),
            x,
            y,
            width: text.len() as f32 * 6.0,
            height: 12.0,
            font: "F1".into(),
            font_size: 12.0,
            page: 1,
        }
    }

    fn single_page(operations: Vec<Operation>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    #[test]
    fn test_group_into_lines() {
        let items = vec![
            item("Hello", 100.0, 700.0),
            item("World", 160.0, 700.0),
            item("Next line", 100.0, 680.0),
        ];

        let lines = group_into_lines(items);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "Hello World");
        assert_eq!(lines[1].text(), "Next line");
    }

    #[test]
    fn test_blocks_split_on_large_gap() {
        let lines = group_into_lines(vec![
            item("First paragraph line one", 72.0, 700.0),
            item("first paragraph line two", 72.0, 686.0),
            item("Second paragraph", 72.0, 640.0),
        ]);

        let blocks = group_into_blocks(lines);
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0].text(),
            "First paragraph line one\nfirst paragraph line two"
        );
        assert_eq!(blocks[1].text(), "Second paragraph");
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert_eq!(a.inset_vertical(2.0), Rect::new(0.0, 2.0, 10.0, 8.0));
    }

    #[test]
    fn test_segment_orientation() {
        let h = Segment::from_points((10.0, 100.0), (200.0, 100.4)).unwrap();
        assert_eq!(h.orientation, Orientation::Horizontal);
        assert_eq!((h.start, h.end), (10.0, 200.0));

        let v = Segment::from_points((50.0, 300.0), (50.0, 100.0)).unwrap();
        assert_eq!(v.orientation, Orientation::Vertical);
        assert_eq!((v.start, v.end), (100.0, 300.0));

        assert!(Segment::from_points((0.0, 0.0), (100.0, 100.0)).is_none());
    }

    #[test]
    fn test_segment_clamp() {
        let clip = Rect::new(0.0, 40.0, 595.0, 802.0);
        let v = Segment::vertical(100.0, 10.0, 500.0).clamp_to(&clip).unwrap();
        assert_eq!((v.start, v.end), (40.0, 500.0));
        assert!(Segment::horizontal(20.0, 0.0, 100.0).clamp_to(&clip).is_none());
    }

    #[test]
    fn test_extract_page_text_and_rulings() {
        let (doc, page_id) = single_page(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello")]),
            Operation::new("Tj", vec![Object::string_literal("World")]),
            Operation::new("ET", vec![]),
            Operation::new("re", vec![100.into(), 400.into(), 200.into(), 100.into()]),
            Operation::new("S", vec![]),
            Operation::new("m", vec![0.into(), 0.into()]),
            Operation::new("l", vec![300.into(), 0.into()]),
            Operation::new("n", vec![]),
        ]);

        let content = extract_page(&doc, page_id, 1).unwrap();
        assert_eq!(content.items.len(), 2);
        assert_eq!(content.items[0].text, "Hello");
        assert_eq!((content.items[0].x, content.items[0].y), (72.0, 700.0));
        // Second show starts where the first one ended
        assert!(content.items[1].x > content.items[0].x);
        assert_eq!(content.items[1].y, 700.0);

        // Stroked rectangle gives four rulings; the unpainted line none
        assert_eq!(content.segments.len(), 4);
        let horizontal = content
            .segments
            .iter()
            .filter(|s| s.orientation == Orientation::Horizontal)
            .count();
        assert_eq!(horizontal, 2);
    }

    #[test]
    fn test_page_box_inherited_from_parent() {
        let (doc, page_id) = single_page(vec![]);
        assert_eq!(page_box(&doc, page_id), Rect::new(0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn test_clip_drops_header_items() {
        let content = PageContent {
            items: vec![item("Running header", 72.0, 820.0), item("Body", 72.0, 400.0)],
            segments: vec![],
        };
        let clipped = content.clip(&Rect::new(0.0, 0.0, 595.0, 842.0).inset_vertical(40.0));
        assert_eq!(clipped.items.len(), 1);
        assert_eq!(clipped.items[0].text, "Body");
    }

    #[test]
    fn test_missing_content_stream_is_error() {
        let (mut doc, page_id) = single_page(vec![]);
        let page = doc.get_dictionary_mut(page_id).unwrap();
        page.set("Contents", Object::Reference((9999, 0)));

        match extract_page(&doc, page_id, 1) {
            Err(PdfError::Parse(msg)) => assert!(msg.contains("9999 0 R"), "{}", msg),
            other => panic!("expected a parse error, got {:?}", other.map(|c| c.items.len())),
        }
    }

    #[test]
    fn test_garbage_content_stream_is_error() {
        let (mut doc, page_id) = single_page(vec![]);
        let garbage = doc.add_object(Stream::new(dictionary! {}, b"\x00\xff{{ ]] >>".to_vec()));
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Contents", garbage);

        assert!(matches!(
            extract_page(&doc, page_id, 1),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_or_comment_only_stream_is_blank_page() {
        let (mut doc, page_id) = single_page(vec![]);
        let comments = doc.add_object(Stream::new(dictionary! {}, b"% nothing drawn\n".to_vec()));
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Contents", comments);

        let content = extract_page(&doc, page_id, 1).unwrap();
        assert!(content.items.is_empty());
        assert!(content.segments.is_empty());
    }
}
