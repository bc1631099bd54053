//! Table detection and formatting
//!
//! Two strategies are tried per page, in order:
//! - `Lines`: a grid built from painted horizontal and vertical rulings
//! - `Text`: rows of text whose columns line up from row to row
//!
//! The text strategy only runs when the ruling strategy finds nothing.

use crate::extractor::{Orientation, Rect, Segment, TextItem};

/// Fewest items a page needs before the text strategy is attempted
const MIN_TEXT_TABLE_ITEMS: usize = 9;

/// Gap between x positions that starts a new column cluster within a row
const ROW_CLUSTER_GAP: f32 = 20.0;

/// Largest vertical gap between consecutive rows of one table
const MAX_ROW_GAP: f32 = 25.0;

/// Distance under which column starts of two rows count as aligned
const ALIGNMENT_TOLERANCE: f32 = 10.0;

/// Which detector produced a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStrategy {
    Lines,
    Text,
}

/// Tolerances for both strategies
#[derive(Debug, Clone)]
pub struct TableSettings {
    /// Rulings closer than this are snapped onto one line
    pub lines_snap_tolerance: f32,
    /// Baselines closer than twice this form one text row
    pub text_snap_tolerance: f32,
    /// Rulings shorter than this (after joining) are ignored
    pub edge_min_length: f32,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            lines_snap_tolerance: 3.0,
            text_snap_tolerance: 4.0,
            edge_min_length: 3.0,
        }
    }
}

/// A detected table
#[derive(Debug, Clone)]
pub struct Table {
    pub strategy: TableStrategy,
    /// Area covered by the table on the page
    pub bbox: Rect,
    /// Cell contents, rows top to bottom; an empty string is an empty cell
    pub cells: Vec<Vec<String>>,
}

/// Find the tables on one page
pub fn find_tables(
    items: &[TextItem],
    segments: &[Segment],
    settings: &TableSettings,
) -> Vec<Table> {
    let tables = find_line_tables(items, segments, settings);
    if !tables.is_empty() {
        return tables;
    }
    find_text_tables(items, settings)
}

// ---------------------------------------------------------------------------
// Lines strategy
// ---------------------------------------------------------------------------

fn find_line_tables(
    items: &[TextItem],
    segments: &[Segment],
    settings: &TableSettings,
) -> Vec<Table> {
    let tolerance = settings.lines_snap_tolerance;
    let min_length = settings.edge_min_length;
    let horizontal = merge_edges(segments, Orientation::Horizontal, tolerance, min_length);
    let vertical = merge_edges(segments, Orientation::Vertical, tolerance, min_length);
    if horizontal.len() < 2 || vertical.len() < 2 {
        return vec![];
    }

    connected_edges(&horizontal, &vertical, tolerance)
        .into_iter()
        .filter_map(|(h, v)| grid_table(items, &h, &v, tolerance))
        .collect()
}

/// Snap rulings of one orientation onto shared lines and join collinear pieces
fn merge_edges(
    segments: &[Segment],
    orientation: Orientation,
    tolerance: f32,
    min_length: f32,
) -> Vec<Segment> {
    let mut edges: Vec<Segment> = segments
        .iter()
        .filter(|s| s.orientation == orientation)
        .copied()
        .collect();
    edges.sort_by(|a, b| a.position.total_cmp(&b.position));

    let mut snapped: Vec<Segment> = Vec::with_capacity(edges.len());
    let mut cluster: Vec<Segment> = Vec::new();
    for edge in edges {
        let starts_new = cluster
            .first()
            .map_or(false, |first| edge.position - first.position > tolerance);
        if starts_new {
            snapped.extend(snap_cluster(&cluster));
            cluster.clear();
        }
        cluster.push(edge);
    }
    snapped.extend(snap_cluster(&cluster));

    snapped.sort_by(|a, b| {
        a.position
            .total_cmp(&b.position)
            .then(a.start.total_cmp(&b.start))
    });

    let mut joined: Vec<Segment> = Vec::with_capacity(snapped.len());
    for edge in snapped {
        match joined.last_mut() {
            Some(last) if last.position == edge.position && edge.start <= last.end + tolerance => {
                last.end = last.end.max(edge.end);
            }
            _ => joined.push(edge),
        }
    }

    joined.retain(|e| e.length() >= min_length);
    joined
}

/// Move every edge of a cluster onto the cluster's mean position
fn snap_cluster(cluster: &[Segment]) -> Vec<Segment> {
    if cluster.is_empty() {
        return vec![];
    }
    let mean = cluster.iter().map(|e| e.position).sum::<f32>() / cluster.len() as f32;
    cluster
        .iter()
        .map(|e| Segment {
            position: mean,
            ..*e
        })
        .collect()
}

fn edges_touch(h: &Segment, v: &Segment, tolerance: f32) -> bool {
    v.position >= h.start - tolerance
        && v.position <= h.end + tolerance
        && h.position >= v.start - tolerance
        && h.position <= v.end + tolerance
}

/// Split the rulings into groups that touch each other
fn connected_edges(
    horizontal: &[Segment],
    vertical: &[Segment],
    tolerance: f32,
) -> Vec<(Vec<Segment>, Vec<Segment>)> {
    let total = horizontal.len() + vertical.len();
    let mut parent: Vec<usize> = (0..total).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (hi, h) in horizontal.iter().enumerate() {
        for (vi, v) in vertical.iter().enumerate() {
            if edges_touch(h, v, tolerance) {
                let a = root(&mut parent, hi);
                let b = root(&mut parent, horizontal.len() + vi);
                if a != b {
                    parent[a] = b;
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<Segment>, Vec<Segment>)> = Vec::new();
    for idx in 0..total {
        let r = root(&mut parent, idx);
        let pos = match groups.iter().position(|(g, _, _)| *g == r) {
            Some(pos) => pos,
            None => {
                groups.push((r, Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        if idx < horizontal.len() {
            groups[pos].1.push(horizontal[idx]);
        } else {
            groups[pos].2.push(vertical[idx - horizontal.len()]);
        }
    }

    groups
        .into_iter()
        .filter(|(_, h, v)| h.len() >= 2 && v.len() >= 2)
        .map(|(_, h, v)| (h, v))
        .collect()
}

/// Distinct positions, merging values within `tolerance`
fn distinct_positions(edges: &[Segment], tolerance: f32) -> Vec<f32> {
    let mut positions: Vec<f32> = edges.iter().map(|e| e.position).collect();
    positions.sort_by(f32::total_cmp);
    positions.dedup_by(|b, a| (*b - *a).abs() <= tolerance);
    positions
}

fn grid_table(
    items: &[TextItem],
    horizontal: &[Segment],
    vertical: &[Segment],
    tolerance: f32,
) -> Option<Table> {
    let xs = distinct_positions(vertical, tolerance);
    let mut ys = distinct_positions(horizontal, tolerance);
    ys.reverse();

    let cols = xs.len().checked_sub(1)?;
    let rows = ys.len().checked_sub(1)?;
    // A lone framed box is a border, not a table
    if cols * rows < 2 {
        return None;
    }

    let mut cell_items: Vec<Vec<Vec<&TextItem>>> = vec![vec![Vec::new(); cols]; rows];
    for item in items {
        let px = item.x + 1.0;
        let py = item.y + item.height * 0.3;
        let col = xs.windows(2).position(|w| px >= w[0] && px < w[1]);
        let row = ys.windows(2).position(|w| py <= w[0] && py > w[1]);
        if let (Some(col), Some(row)) = (col, row) {
            cell_items[row][col].push(item);
        }
    }

    let cells = cell_items
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect();

    Some(Table {
        strategy: TableStrategy::Lines,
        bbox: Rect::new(xs[0], ys[rows], xs[cols], ys[0]),
        cells,
    })
}

// ---------------------------------------------------------------------------
// Text strategy
// ---------------------------------------------------------------------------

/// Items sharing a baseline (within tolerance)
#[derive(Debug, Clone)]
struct TextRow {
    y: f32,
    items: Vec<usize>,
}

fn find_text_tables(items: &[TextItem], settings: &TableSettings) -> Vec<Table> {
    if items.len() < MIN_TEXT_TABLE_ITEMS {
        return vec![];
    }

    let rows = group_rows(items, settings.text_snap_tolerance * 2.0);
    aligned_row_runs(items, &rows)
        .into_iter()
        .filter_map(|(first, last)| text_table(items, &rows[first..=last]))
        .collect()
}

/// Cluster items into rows, top to bottom
fn group_rows(items: &[TextItem], tolerance: f32) -> Vec<TextRow> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[b].y.total_cmp(&items[a].y));

    let mut rows: Vec<TextRow> = Vec::new();
    for idx in order {
        let y = items[idx].y;
        match rows.last_mut() {
            Some(row) if row.y - y <= tolerance => {
                row.items.push(idx);
                let n = row.items.len() as f32;
                row.y += (y - row.y) / n;
            }
            _ => rows.push(TextRow {
                y,
                items: vec![idx],
            }),
        }
    }
    rows
}

/// Left edges of the x-clusters in a row
fn cluster_starts(items: &[TextItem], row: &TextRow) -> Vec<f32> {
    let mut xs: Vec<f32> = row.items.iter().map(|&i| items[i].x).collect();
    xs.sort_by(f32::total_cmp);

    let mut starts: Vec<f32> = Vec::new();
    for x in xs {
        match starts.last() {
            Some(&last) if x - last <= ROW_CLUSTER_GAP => {}
            _ => starts.push(x),
        }
    }
    starts
}

/// Find runs of rows (as inclusive index ranges into `rows`) that look tabular.
///
/// Rows need 3+ column clusters to qualify; qualifying rows must follow each
/// other closely, and their column starts must line up across rows
/// (paragraph words drift from line to line, table columns do not).
fn aligned_row_runs(items: &[TextItem], rows: &[TextRow]) -> Vec<(usize, usize)> {
    let qualifying: Vec<(usize, Vec<f32>)> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| (idx, cluster_starts(items, row)))
        .filter(|(_, starts)| starts.len() >= 3)
        .collect();

    let mut runs: Vec<Vec<&(usize, Vec<f32>)>> = Vec::new();
    let mut current: Vec<&(usize, Vec<f32>)> = Vec::new();
    for row in &qualifying {
        let continues = current
            .last()
            .map_or(true, |prev| rows[prev.0].y - rows[row.0].y <= MAX_ROW_GAP);
        if !continues {
            runs.push(std::mem::take(&mut current));
        }
        current.push(row);
    }
    runs.push(current);

    runs.into_iter()
        .filter(|run| run.len() >= 3)
        .filter(|run| alignment_score(run.iter().map(|(_, starts)| starts.as_slice())) >= 0.5)
        .filter_map(|run| Some((run.first()?.0, run.last()?.0)))
        .collect()
}

/// Mean pairwise share of column starts that line up between two rows
fn alignment_score<'a>(rows: impl Iterator<Item = &'a [f32]>) -> f32 {
    let rows: Vec<&[f32]> = rows.collect();
    let matches = |a: &[f32], b: &[f32]| {
        a.iter()
            .filter(|&&x| b.iter().any(|&y| (x - y).abs() < ALIGNMENT_TOLERANCE))
            .count()
    };

    let mut total = 0.0f32;
    let mut pairs = 0u32;
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            let (a, b) = (rows[i], rows[j]);
            let longest = a.len().max(b.len());
            if longest > 0 {
                total += (matches(a, b) + matches(b, a)) as f32 / (2 * longest) as f32;
                pairs += 1;
            }
        }
    }

    if pairs == 0 {
        0.0
    } else {
        total / pairs as f32
    }
}

fn text_table(items: &[TextItem], rows: &[TextRow]) -> Option<Table> {
    let region: Vec<usize> = rows.iter().flat_map(|r| r.items.iter().copied()).collect();
    let columns = find_column_centers(items, &region);
    if columns.len() < 2 || columns.len() > 15 {
        return None;
    }

    let mut cell_items: Vec<Vec<Vec<&TextItem>>> =
        vec![vec![Vec::new(); columns.len()]; rows.len()];
    let mut bbox: Option<Rect> = None;
    for (row_idx, row) in rows.iter().enumerate() {
        for &idx in &row.items {
            let item = &items[idx];
            if let Some(col) = find_column_index(&columns, item.x) {
                cell_items[row_idx][col].push(item);
                let item_box = item.bbox();
                bbox = Some(bbox.map_or(item_box, |b| b.union(&item_box)));
            }
        }
    }

    let cells: Vec<Vec<String>> = cell_items
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect();

    // Most rows of a real table fill more than one column
    let multi_column_rows = cells
        .iter()
        .filter(|row| row.iter().filter(|c| !c.is_empty()).count() >= 2)
        .count();
    if multi_column_rows < (rows.len() / 2).max(1) {
        return None;
    }

    Some(Table {
        strategy: TableStrategy::Text,
        bbox: bbox?,
        cells,
    })
}

/// Column centres from clustering the x positions of a region's items
fn find_column_centers(items: &[TextItem], region: &[usize]) -> Vec<f32> {
    let mut xs: Vec<f32> = region.iter().map(|&i| items[i].x).collect();
    xs.sort_by(f32::total_cmp);
    let (Some(&first), Some(&last)) = (xs.first(), xs.last()) else {
        return vec![];
    };

    // Dense data clusters tighter than sparse data
    let avg_gap = if xs.len() > 1 {
        (last - first) / (xs.len() - 1) as f32
    } else {
        60.0
    };
    let threshold = avg_gap.clamp(25.0, 50.0);

    let mut centers = Vec::new();
    let mut cluster: Vec<f32> = Vec::new();
    for x in xs {
        if let Some(center) = mean(&cluster) {
            if x - center > threshold {
                centers.push(center);
                cluster.clear();
            }
        }
        cluster.push(x);
    }
    centers.extend(mean(&cluster));

    let count_near = |center: f32| {
        region
            .iter()
            .filter(|&&i| (items[i].x - center).abs() < threshold)
            .count()
    };

    let min_items = (region.len() / centers.len().max(1) / 4).max(2);
    let centers: Vec<f32> = centers.into_iter().filter(|&c| count_near(c) >= min_items).collect();

    // Paragraphs pile up at the left margin; tables spread out
    if centers
        .iter()
        .any(|&c| count_near(c) as f32 / region.len() as f32 > 0.60)
    {
        return vec![];
    }

    centers
}

fn mean(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}

/// Nearest column to `x`, if close enough given the column spacing
fn find_column_index(columns: &[f32], x: f32) -> Option<usize> {
    let threshold = if columns.len() >= 2 {
        let min_gap = columns
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(f32::INFINITY, f32::min);
        (min_gap / 2.0).clamp(25.0, 50.0)
    } else {
        50.0
    };

    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (x - **a).abs().total_cmp(&(x - **b).abs()))
        .filter(|(_, col_x)| (x - **col_x).abs() < threshold)
        .map(|(idx, _)| idx)
}

// ---------------------------------------------------------------------------
// Cells and rendering
// ---------------------------------------------------------------------------

/// Text of one cell: lines top to bottom separated by newlines
fn cell_text(mut items: Vec<&TextItem>) -> String {
    items.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<&TextItem>> = Vec::new();
    for item in items {
        match lines.last_mut() {
            Some(line) if (line[0].y - item.y).abs() < 3.0 => line.push(item),
            _ => lines.push(vec![item]),
        }
    }

    lines
        .iter_mut()
        .map(|line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            join_cell_items(line)
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join items of one cell line with subscript/superscript-aware spacing
fn join_cell_items(items: &[&TextItem]) -> String {
    let mut result = String::new();
    let mut prev: Option<&TextItem> = None;

    for item in items {
        let text = item.text.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(prev_item) = prev {
            // Smaller and shifted: sub/superscript, or returning from one
            let y_shift = (item.y - prev_item.y).abs() > 1.0;
            let is_sub_super = item.font_size / prev_item.font_size < 0.85 && y_shift;
            let was_sub_super = prev_item.font_size / item.font_size < 0.85 && y_shift;

            let glued = result.ends_with('-')
                || text.starts_with('-')
                || is_sub_super
                || was_sub_super;
            if !glued {
                result.push(' ');
            }
        }
        result.push_str(text);
        prev = Some(item);
    }

    result
}

/// Render a table as a Markdown pipe table.
///
/// Columns that are empty in every row are dropped, empty rows are skipped,
/// and a separator follows the first emitted row. Returns `None` when no row
/// survives, or when the table is long prose (200+ characters) with hardly any
/// digits, which is almost always a misdetected paragraph.
pub fn table_to_markdown(table: &Table) -> Option<String> {
    let width = table.cells.first()?.len();
    let valid_cols: Vec<bool> = (0..width)
        .map(|col| {
            table
                .cells
                .iter()
                .any(|row| row.get(col).map_or(false, |c| !c.trim().is_empty()))
        })
        .collect();

    let mut md = String::new();
    let mut header_done = false;
    for row in &table.cells {
        let clean_row: Vec<String> = row
            .iter()
            .zip(&valid_cols)
            .filter(|(_, valid)| **valid)
            .map(|(cell, _)| cell.replace('\n', " ").trim().to_string())
            .collect();
        if clean_row.iter().all(String::is_empty) {
            continue;
        }

        md.push_str("| ");
        md.push_str(&clean_row.join(" | "));
        md.push_str(" |\n");

        if !header_done {
            md.push_str("| ");
            md.push_str(&vec!["---"; clean_row.len()].join(" | "));
            md.push_str(" |\n");
            header_done = true;
        }
    }

    if md.is_empty() {
        return None;
    }

    let plain: String = md.chars().filter(|&c| c != '|' && c != '-').collect();
    let digits = plain.chars().filter(char::is_ascii_digit).count();
    (digits > 5 || plain.chars().count() < 200).then_some(md)
}
