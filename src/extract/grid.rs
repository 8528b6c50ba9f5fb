//! Gridded equipment-schedule extractor.
//!
//! Control schedules (機器番号 / 機器名称 / 電圧 / 容量) are drawn as ruled
//! tables, but the scans are too noisy to trust the rules. Tables are
//! located from scattered header words alone: header anchors are scored by
//! keyword categories, candidate regions grown around them, overlapping
//! candidates merged, and each candidate cropped and OCRed with an
//! iterative bottom expansion that keeps extending the crop while data rows
//! touch its lower edge. Column boundaries come from header keyword x
//! positions with fixed page-ratio fallbacks.

use crate::config::PageOptions;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::layout::{cluster_by_y, split_by_x_gap, RowCluster, WordBox};
use crate::ocr::{extract_words, OcrEngine};
use crate::output::write_delimited;
use crate::render::{count_pdf_pages, load_page_image, resolve_target_pages, run_pdftoppm};
use crate::text::{compact_text, contains_japanese, normalize_text};
use image::RgbImage;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Core data columns, in contract order.
pub const CORE_COLUMNS: [&str; 4] = ["機器番号", "機器名称", "電圧(V)", "容量(kW)"];

/// Drawing-number column appended to every row.
pub const DRAWING_NUMBER_COLUMN: &str = "図面番号";

/// Full output column order.
pub const OUTPUT_COLUMNS: [&str; 5] = ["機器番号", "機器名称", "電圧(V)", "容量(kW)", "図面番号"];

const DEFAULT_CENTER_RATIOS: [f32; 4] = [0.24, 0.35, 0.40, 0.44];
const HEADER_Y_CLUSTER: f32 = 22.0;
const DATA_START_OFFSET: f32 = 140.0;
const TABLE_HEADER_MIN_CATEGORIES: usize = 3;
const TABLE_HEADER_X_MARGIN: f32 = 60.0;
const TABLE_HEADER_RIGHT_MARGIN: f32 = 360.0;
const TABLE_HEADER_TOP_MARGIN: f32 = 24.0;
const TABLE_MAX_SCAN_HEIGHT: f32 = 360.0;
const TABLE_SCAN_BOTTOM_TOLERANCE: f32 = 24.0;
const TABLE_MIN_WIDTH: f32 = 140.0;
const TABLE_MIN_HEIGHT: f32 = 45.0;
const TABLE_MERGE_IOU: f32 = 0.55;
const TABLE_NEARBY_HEADER_Y: f32 = 14.0;
const TABLE_NEARBY_HEADER_X: f32 = 45.0;
const TABLE_MIN_START_OFFSET: f32 = 10.0;
const TABLE_MAX_START_OFFSET: f32 = 36.0;
const TABLE_DEFAULT_START_OFFSET: f32 = 24.0;
const TABLE_TRAILING_NON_DATA_GAP: usize = 1;
const TABLE_BOTTOM_NEAR_EDGE_PX: f32 = 28.0;
const TABLE_BOTTOM_EXPAND_STEP_PX: f32 = 36.0;
const TABLE_BOTTOM_EXPAND_MAX_TRIES: usize = 6;
const TABLE_BOTTOM_EXPAND_MAX_RATIO: f32 = 0.45;
const TABLE_BOTTOM_EXPAND_NO_GROWTH_STREAK: usize = 2;
const LEGACY_TRAILING_NON_DATA_GAP: usize = 2;
const TABLE_HEADER_CLUSTER_X_GAP: f32 = 180.0;
/// Pages extracted with the legacy half-page split before candidate
/// detection.
const LEGACY_FIRST_PAGES: [u32; 2] = [1, 2];
const DRAWING_NO_Y_CLUSTER: f32 = 22.0;
const DRAWING_NO_LABEL_TO_VALUE_MAX_OFFSET: f32 = 180.0;
const DRAWING_NO_LABEL_X_TOLERANCE_LEFT: f32 = 120.0;
const DRAWING_NO_LABEL_X_TOLERANCE_RIGHT: f32 = 320.0;
const DRAWING_NO_VALUE_Y_CLUSTER: f32 = 12.0;
const DRAWING_NO_BOTTOM_REGION_Y_RATIO: f32 = 0.70;
const DRAWING_NO_BOTTOM_REGION_X_RATIO: f32 = 0.70;

/// Name keywords that qualify a row as equipment data even without a code.
const ROW_FILTER_NAME_KEYWORDS: [&str; 15] = [
    "ポンプ",
    "排風",
    "送風",
    "送気",
    "排気",
    "装置",
    "電源",
    "フロート",
    "シャッター",
    "弁",
    "ファン",
    "雨水",
    "排水",
    "清水",
    "汚泥",
];

const HEADER_KEYWORDS: [&str; 10] = [
    "機器",
    "記号",
    "名称",
    "電圧",
    "容量",
    "備考",
    "起動",
    "回路",
    "whm",
    "インター",
];

const FOOTER_KEYWORDS: [&str; 9] = [
    "図面",
    "縮尺",
    "建築",
    "設計",
    "コード",
    "三菱",
    "主管",
    "日付",
    "登録",
];

lazy_static! {
    static ref DRAWING_NO_PATTERN: Regex =
        Regex::new(r"^[A-Z]{1,4}-[A-Z0-9]{1,8}(?:-[A-Z0-9]{1,8})*$").unwrap();
    static ref DASH_FOLD: Regex = Regex::new(r"[‐‑‒–—―ー−－]").unwrap();
    static ref CODE_WITH_TAIL: Regex = Regex::new(r"^([A-Z]{1,4}-[A-Z0-9-]{1,12})(.+)$").unwrap();
    static ref CODE_TRAILING_LETTERS: Regex =
        Regex::new(r"^([A-Z]{1,4}-[A-Z0-9-]*\d)[A-Z]{1,2}$").unwrap();
    static ref CODE_SHAPE: Regex = Regex::new(r"[A-Z]{1,4}-[A-Z0-9]{1,6}").unwrap();
    static ref LEADING_PUNCT: Regex = Regex::new(r"^[\.,，．。・･·:：;；]+").unwrap();
    static ref NUMBER_ONLY: Regex = Regex::new(r"^[+-]?\d+(?:\.\d+)?$").unwrap();
    static ref FIRST_NUMBER: Regex = Regex::new(r"[+-]?\d+(?:\.\d+)?").unwrap();
    static ref SIMPLE_VOLTAGE: Regex = Regex::new(r"^([+-]?\d+)V?$").unwrap();
    static ref THREE_PHASE_200: Regex = Regex::new(r"3[Φφ/+$＊*]?200").unwrap();
    static ref DIGIT_PATTERN: Regex = Regex::new(r"\d").unwrap();
    static ref LONG_DIGITS: Regex = Regex::new(r"^\d{2,}$").unwrap();
}

/// One of the four recognized header keyword categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderCategory {
    /// 機器番号 / 記号
    Code,
    /// 名称
    Name,
    /// 電圧 / (V)
    Voltage,
    /// 容量 / kW
    Power,
}

/// Inferred column boundaries for one table side or crop.
///
/// Invariant: `x_min < b12 < b23 < b34 < x_max`, enforced by clamping when
/// inferred centers sit too close together. Created once per table and
/// never mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnBounds {
    /// Left edge of the code column
    pub x_min: f32,
    /// Boundary between code and name
    pub b12: f32,
    /// Boundary between name and voltage
    pub b23: f32,
    /// Boundary between voltage and power
    pub b34: f32,
    /// Right edge of the power column
    pub x_max: f32,
    /// Y of the header row the bounds were inferred from
    pub header_y: f32,
}

/// A header text cluster scored by keyword categories.
#[derive(Debug, Clone)]
pub struct HeaderAnchor {
    /// Row-cluster center y
    pub row_y: f32,
    /// Bounding box of the header words
    pub bbox: Rect,
    /// Matched categories, sorted
    pub categories: BTreeSet<HeaderCategory>,
    /// Joined header text
    pub text: String,
}

/// A candidate table region inferred from a header anchor.
#[derive(Debug, Clone)]
pub struct TableCandidate {
    /// Data region including the header
    pub bbox: Rect,
    /// Header row y
    pub header_y: f32,
    /// Header text
    pub header_text: String,
    /// Matched categories
    pub categories: BTreeSet<HeaderCategory>,
}

/// One normalized data row from a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    /// 1-based row index within its side/table
    pub row_index: usize,
    /// Row-cluster center y (page space after crop offset)
    pub row_y: f32,
    /// Source tag: `L`/`R` for the legacy split, `T01`... for candidates
    pub side: String,
    /// 機器番号
    pub code: String,
    /// 機器名称
    pub name: String,
    /// 電圧(V)
    pub voltage: String,
    /// 容量(kW)
    pub power: String,
}

/// Result of one candidate-parsing pass.
#[derive(Debug, Clone)]
pub struct TableParseResult {
    /// 1-based candidate index on the page
    pub table_index: usize,
    /// Parsed rows, with `row_y` in page space
    pub rows: Vec<GridRow>,
    /// Bottom expansions performed
    pub expand_attempts: usize,
    /// Final crop bottom edge in page space
    pub final_crop_bottom: f32,
}

#[derive(Debug, Clone)]
struct RowsFromWordsResult {
    rows: Vec<GridRow>,
    saw_data: bool,
    last_data_cluster_bottom: Option<f32>,
    trailing_non_data_count: usize,
    stopped_by_footer: bool,
}

impl RowsFromWordsResult {
    fn empty() -> Self {
        Self {
            rows: vec![],
            saw_data: false,
            last_data_cluster_bottom: None,
            trailing_non_data_count: 0,
            stopped_by_footer: false,
        }
    }
}

/// Where a page's drawing number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingNumberSource {
    /// OCR word boxes on the rendered page
    Vision,
    /// The PDF's own text layer
    TextLayer,
    /// Not found
    None,
}

/// Optional PDF text-layer collaborator used as a drawing-number fallback
/// when OCR misses the title block.
pub trait TextLayerSource {
    /// Positioned words from the page's text layer, with the page's
    /// `(width, height)` in the same coordinate space. `None` when the
    /// page has no usable text layer.
    fn page_words(&self, page: u32) -> Option<(Vec<WordBox>, (u32, u32))>;
}

/// Text-layer source for PDFs with no text layer at all.
#[derive(Debug, Default)]
pub struct NoTextLayer;

impl TextLayerSource for NoTextLayer {
    fn page_words(&self, _page: u32) -> Option<(Vec<WordBox>, (u32, u32))> {
        None
    }
}

// ---------------------------------------------------------------------------
// header scoring
// ---------------------------------------------------------------------------

fn header_score(cluster: &RowCluster) -> usize {
    let text = normalize_text(&cluster.joined_text()).to_lowercase();
    let mut score = 0;
    for needle in ["機器", "記号", "名称"] {
        if text.contains(needle) {
            score += 1;
        }
    }
    if text.contains("電圧") || text.contains("(v") || text.contains("v)") {
        score += 1;
    }
    if text.contains("kw") || text.contains("容量") {
        score += 1;
    }
    score
}

/// Fuzzy keyword-category extraction from a row's text.
///
/// Near-synonym substrings count as one category, and a label split across
/// OCR tokens (機 + 器 + 番 + 号) still counts.
pub fn header_categories_from_text(text: &str) -> BTreeSet<HeaderCategory> {
    let normalized = compact_text(text).to_lowercase();
    let mut categories = BTreeSet::new();

    if normalized.contains("機器番号")
        || (normalized.contains("機器")
            && (normalized.contains("番号") || normalized.contains("記号")))
        || (normalized.contains('機')
            && normalized.contains('器')
            && normalized.contains('番')
            && normalized.contains('号'))
    {
        categories.insert(HeaderCategory::Code);
    }
    if normalized.contains("名称") || (normalized.contains('名') && normalized.contains('称')) {
        categories.insert(HeaderCategory::Name);
    }
    if normalized.contains("電圧")
        || (normalized.contains('電') && normalized.contains('圧'))
        || normalized.contains("(v")
        || normalized.contains("v)")
    {
        categories.insert(HeaderCategory::Voltage);
    }
    if normalized.contains("容量")
        || (normalized.contains('容') && normalized.contains('量'))
        || normalized.contains("kw")
    {
        categories.insert(HeaderCategory::Power);
    }
    categories
}

// ---------------------------------------------------------------------------
// header anchors and table candidates
// ---------------------------------------------------------------------------

/// Detect header anchors: y-cluster the page words, split each row by a
/// wide x gap, and keep groups matching at least
/// [`TABLE_HEADER_MIN_CATEGORIES`] keyword categories. Near-identical
/// anchors (a two-line header OCRed as two clusters) dedupe to the one
/// with more categories, then longer text.
pub fn detect_header_anchors(words: &[WordBox], y_cluster: f32) -> Vec<HeaderAnchor> {
    let clusters = cluster_by_y(words, y_cluster);
    let mut anchors: Vec<HeaderAnchor> = vec![];
    for cluster in &clusters {
        for segment in split_by_x_gap(cluster, TABLE_HEADER_CLUSTER_X_GAP) {
            let text = segment.joined_text();
            let categories = header_categories_from_text(&text);
            if categories.len() < TABLE_HEADER_MIN_CATEGORIES {
                continue;
            }
            let Some(bbox) = segment.bbox() else {
                continue;
            };
            anchors.push(HeaderAnchor {
                row_y: segment.row_y,
                bbox,
                categories,
                text,
            });
        }
    }

    anchors.sort_by(|a, b| a.row_y.total_cmp(&b.row_y).then(a.bbox.x0.total_cmp(&b.bbox.x0)));
    let mut deduped: Vec<HeaderAnchor> = vec![];
    for anchor in anchors {
        let Some(prev) = deduped.last() else {
            deduped.push(anchor);
            continue;
        };
        let same_row = (anchor.row_y - prev.row_y).abs() <= TABLE_NEARBY_HEADER_Y;
        let same_x = (anchor.bbox.x0 - prev.bbox.x0).abs() <= TABLE_NEARBY_HEADER_X;
        if same_row && same_x {
            let prev_score = prev.categories.len();
            let cur_score = anchor.categories.len();
            if cur_score > prev_score
                || (cur_score == prev_score && anchor.text.len() > prev.text.len())
            {
                *deduped.last_mut().expect("non-empty") = anchor;
            }
            continue;
        }
        deduped.push(anchor);
    }
    deduped
}

/// Infer a candidate's bounding box: start from the anchor's own bbox
/// expanded by fixed margins, then grow to cover nearby words in the scan
/// window below and beside the header.
fn infer_candidate_bbox(anchor: &HeaderAnchor, words: &[WordBox], frame: (u32, u32)) -> Rect {
    let (frame_w, frame_h) = (frame.0 as f32, frame.1 as f32);
    let header = anchor.bbox;
    let mut left = (header.x0 - TABLE_HEADER_X_MARGIN).max(0.0);
    let mut right = (header.x1 + TABLE_HEADER_RIGHT_MARGIN).min(frame_w);
    let top = (header.y0 - TABLE_HEADER_TOP_MARGIN).max(0.0);
    let max_bottom = (header.y1 + TABLE_MAX_SCAN_HEIGHT).min(frame_h);
    let scan_bottom = (max_bottom + TABLE_SCAN_BOTTOM_TOLERANCE).min(frame_h);

    let nearby: Vec<&WordBox> = words
        .iter()
        .filter(|w| {
            (left - 20.0) <= w.cx
                && w.cx <= (right + 20.0)
                && (header.y0 - 10.0) <= w.cy
                && (w.cy <= scan_bottom || (w.bbox.y0 <= scan_bottom && scan_bottom <= w.bbox.y1))
        })
        .collect();

    let bottom = if nearby.is_empty() {
        (header.y1 + 220.0).min(frame_h)
    } else {
        let min_x0 = nearby.iter().map(|w| w.bbox.x0).fold(f32::MAX, f32::min);
        let max_x1 = nearby.iter().map(|w| w.bbox.x1).fold(f32::MIN, f32::max);
        let max_y1 = nearby.iter().map(|w| w.bbox.y1).fold(f32::MIN, f32::max);
        left = left.min(min_x0 - 12.0).max(0.0);
        right = right.max(max_x1 + 12.0).min(frame_w);
        ((max_y1 + 20.0).max(header.y1 + 80.0)).min(frame_h)
    };
    let bottom = bottom.max(header.y1 + TABLE_MIN_HEIGHT);
    Rect::new(left, top, right, bottom)
}

fn merge_close_candidates(candidates: Vec<TableCandidate>) -> Vec<TableCandidate> {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| a.header_y.total_cmp(&b.header_y).then(a.bbox.x0.total_cmp(&b.bbox.x0)));

    let mut merged: Vec<TableCandidate> = vec![];
    for candidate in sorted {
        let Some(last) = merged.last_mut() else {
            merged.push(candidate);
            continue;
        };
        let near_header = (candidate.header_y - last.header_y).abs() <= TABLE_NEARBY_HEADER_Y
            && (candidate.bbox.x0 - last.bbox.x0).abs() <= TABLE_NEARBY_HEADER_X;
        let overlap = candidate.bbox.iou(&last.bbox) >= TABLE_MERGE_IOU;
        if near_header || overlap {
            let preferred_text = if candidate.header_text.len() > last.header_text.len() {
                candidate.header_text.clone()
            } else {
                last.header_text.clone()
            };
            let mut categories = last.categories.clone();
            categories.extend(candidate.categories.iter().copied());
            *last = TableCandidate {
                bbox: last.bbox.union(&candidate.bbox),
                header_y: last.header_y.min(candidate.header_y),
                header_text: preferred_text,
                categories,
            };
            continue;
        }
        merged.push(candidate);
    }
    merged
}

/// Detect candidate table regions from the full page's words.
///
/// Candidates that overlap enough merge; each candidate's bottom is then
/// clipped just above the next candidate below it when their column spans
/// overlap, preventing one table's region from swallowing the next table's
/// data.
pub fn detect_table_candidates(
    words: &[WordBox],
    frame: (u32, u32),
    y_cluster: f32,
) -> Vec<TableCandidate> {
    let anchors = detect_header_anchors(words, y_cluster);
    if anchors.is_empty() {
        return vec![];
    }

    let mut candidates: Vec<TableCandidate> = vec![];
    for anchor in &anchors {
        let bbox = infer_candidate_bbox(anchor, words, frame);
        if bbox.width() < TABLE_MIN_WIDTH || bbox.height() < TABLE_MIN_HEIGHT {
            continue;
        }
        candidates.push(TableCandidate {
            bbox,
            header_y: anchor.row_y,
            header_text: anchor.text.clone(),
            categories: anchor.categories.clone(),
        });
    }
    if candidates.is_empty() {
        return vec![];
    }

    let mut candidates = merge_close_candidates(candidates);
    for idx in 0..candidates.len() {
        let base = candidates[idx].clone();
        let mut next_top = base.bbox.y1;
        for later in &candidates[idx + 1..] {
            if later.header_y <= base.header_y {
                continue;
            }
            if base.bbox.x_overlap_ratio(&later.bbox) < 0.2 {
                continue;
            }
            if later.bbox.y0 < next_top {
                next_top = later.bbox.y0;
            }
        }
        if next_top < base.bbox.y1 {
            let clipped_bottom = (next_top - 6.0).max(base.bbox.y0 + TABLE_MIN_HEIGHT);
            candidates[idx].bbox = Rect::new(base.bbox.x0, base.bbox.y0, base.bbox.x1, clipped_bottom);
        }
    }
    candidates.sort_by(|a, b| a.header_y.total_cmp(&b.header_y).then(a.bbox.x0.total_cmp(&b.bbox.x0)));
    candidates
}

// ---------------------------------------------------------------------------
// column bounds
// ---------------------------------------------------------------------------

fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    Some(sorted[sorted.len() / 2])
}

#[derive(Clone, Copy)]
enum Pick {
    Min,
    Max,
    Median,
}

/// Infer column bounds from a crop's words by locating header keyword x
/// positions, with fixed page-width ratios as fallback.
pub fn infer_column_bounds(words: &[WordBox], side_width: u32) -> ColumnBounds {
    let clusters = cluster_by_y(words, HEADER_Y_CLUSTER);
    let default_bounds = || {
        let centers: Vec<f32> = DEFAULT_CENTER_RATIOS
            .iter()
            .map(|r| side_width as f32 * r)
            .collect();
        build_bounds_from_centers(&centers, 0.0, side_width)
    };
    if clusters.is_empty() {
        return default_bounds();
    }

    let best = clusters.iter().max_by(|a, b| {
        header_score(a)
            .cmp(&header_score(b))
            // Lowest row wins ties (reverse on y).
            .then(b.row_y.total_cmp(&a.row_y))
    });
    let Some(best) = best else {
        return default_bounds();
    };
    if header_score(best) < 2 {
        return default_bounds();
    }

    let header_words = best.words_by_x();
    let header_x_max = side_width as f32 * 0.55;

    let find_x = |predicate: &dyn Fn(&str) -> bool,
                  x_min: Option<f32>,
                  x_max: Option<f32>,
                  pick: Pick|
     -> Option<f32> {
        let values: Vec<f32> = header_words
            .iter()
            .filter(|w| {
                let t = normalize_text(&w.text).to_lowercase();
                x_min.map_or(true, |m| w.cx > m)
                    && x_max.map_or(true, |m| w.cx < m)
                    && predicate(&t)
            })
            .map(|w| w.cx)
            .collect();
        if values.is_empty() {
            return None;
        }
        match pick {
            Pick::Min => values.iter().copied().reduce(f32::min),
            Pick::Max => values.iter().copied().reduce(f32::max),
            Pick::Median => median(&values),
        }
    };

    let c1 = find_x(&|t| t.contains("記号"), None, Some(header_x_max), Pick::Max)
        .or_else(|| find_x(&|t| t.contains("機器"), None, Some(header_x_max), Pick::Max));
    let c2 = find_x(
        &|t| t.contains("名称"),
        Some(c1.unwrap_or(0.0) + 60.0),
        Some(header_x_max),
        Pick::Max,
    )
    .or_else(|| {
        find_x(
            &|t| t.contains('名') || t.contains('称'),
            Some(c1.unwrap_or(0.0) + 60.0),
            Some(header_x_max),
            Pick::Median,
        )
    });
    let c3 = find_x(
        &|t| t.contains('v') || t.contains("電圧") || t == "電",
        Some(c2.unwrap_or(0.0) + 20.0),
        Some(header_x_max),
        Pick::Min,
    );
    let c4 = find_x(
        &|t| t.contains("kw"),
        Some(c3.unwrap_or(0.0) + 20.0),
        Some(header_x_max),
        Pick::Min,
    )
    .or_else(|| {
        find_x(
            &|t| t.contains("容量"),
            Some(c3.unwrap_or(0.0) + 20.0),
            Some(header_x_max),
            Pick::Min,
        )
    });
    let c5 = find_x(
        &|t| {
            t.contains("配管")
                || t.contains("配線")
                || t.contains("サイズ")
                || t.contains("size")
                || ["配", "線", "サ", "ズ"].contains(&t)
        },
        Some(c4.unwrap_or(0.0) + 30.0),
        None,
        Pick::Min,
    );

    let c1f = c1.unwrap_or(side_width as f32 * DEFAULT_CENTER_RATIOS[0]);
    let mut c2f = c2.unwrap_or(side_width as f32 * DEFAULT_CENTER_RATIOS[1]);
    let mut c3f = c3.unwrap_or(side_width as f32 * DEFAULT_CENTER_RATIOS[2]);
    let mut c4f = c4.unwrap_or(side_width as f32 * DEFAULT_CENTER_RATIOS[3]);
    if c2f <= c1f + 40.0 {
        c2f = c1f + 120.0;
    }
    if c3f <= c2f + 30.0 {
        c3f = c2f + 90.0;
    }
    if c4f <= c3f + 20.0 {
        c4f = c3f + 80.0;
    }

    let mut bounds = build_bounds_from_centers(&[c1f, c2f, c3f, c4f], best.row_y, side_width);
    // A detected wiring-size column caps the table's right edge.
    if let Some(c5) = c5 {
        if c5 > c4f + 35.0 {
            let right_guard = (c4f + c5) / 2.0;
            if right_guard > bounds.b34 + 15.0 {
                bounds.x_max = bounds.x_max.min(right_guard);
            }
        }
    }
    bounds
}

/// Build bounds from four column centers: boundaries at the midpoints,
/// outer edges padded by 90 px and clamped to the crop.
pub fn build_bounds_from_centers(centers: &[f32], header_y: f32, side_width: u32) -> ColumnBounds {
    let (c1, c2, c3, c4) = (centers[0], centers[1], centers[2], centers[3]);
    let b12 = (c1 + c2) / 2.0;
    let b23 = (c2 + c3) / 2.0;
    let b34 = (c3 + c4) / 2.0;

    let x_min = (c1 - 90.0).max(0.0);
    let mut x_max = (c4 + 90.0).min(side_width as f32);
    if x_max <= b34 {
        x_max = (b34 + 60.0).min(side_width as f32);
    }

    ColumnBounds {
        x_min,
        b12,
        b23,
        b34,
        x_max,
        header_y,
    }
}

/// Assign a word center x to one of the four core columns, or `None` when
/// it falls outside the table.
pub fn assign_column(x: f32, bounds: &ColumnBounds) -> Option<usize> {
    if x < bounds.x_min || x > bounds.x_max {
        return None;
    }
    if x < bounds.b12 {
        Some(0)
    } else if x < bounds.b23 {
        Some(1)
    } else if x < bounds.b34 {
        Some(2)
    } else {
        Some(3)
    }
}

// ---------------------------------------------------------------------------
// cell normalization
// ---------------------------------------------------------------------------

fn clean_cell(text: &str) -> String {
    let text = normalize_text(text).trim().replace(' ', "");
    text.trim_matches(|c| "|,:;[]()".contains(c)).to_string()
}

/// Canonicalize capacity text: keep normal precision as-is, round
/// OCR-noise over-precision (more than 3 fractional digits) half-up to two
/// decimals.
pub fn normalize_power_text(power: &str) -> String {
    let mut text = compact_text(power).replace(',', "");
    if text.is_empty() {
        return String::new();
    }
    if !NUMBER_ONLY.is_match(&text) {
        match FIRST_NUMBER.find(&text) {
            Some(m) => text = m.as_str().to_string(),
            None => return String::new(),
        }
    }
    let Some((_, fractional)) = text.split_once('.') else {
        return text;
    };
    if fractional.len() <= 3 {
        return text;
    }

    let Ok(value) = text.parse::<f64>() else {
        return text;
    };
    let rounded = (value * 100.0).round() / 100.0;
    let mut formatted = format!("{rounded:.2}");
    if formatted.contains('.') {
        formatted = formatted.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    formatted
}

/// Canonicalize voltage text: the common three-phase 200 V notations all
/// collapse to `200`, `1/200` becomes `1φ200`, plain numbers lose a
/// trailing `V`.
pub fn normalize_voltage_text(volt: &str) -> String {
    let text = compact_text(volt).to_uppercase();
    if text.is_empty() {
        return String::new();
    }
    if text == "1/200" {
        return "1φ200".to_string();
    }

    let digits_only: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if THREE_PHASE_200.is_match(&text)
        || ["3200", "34200", "36200", "30200"].contains(&digits_only.as_str())
        || digits_only == "200"
    {
        return "200".to_string();
    }

    if let Some(captures) = SIMPLE_VOLTAGE.captures(&text) {
        return captures.get(1).expect("group").as_str().to_string();
    }
    text
}

/// Per-row repair of OCR artifacts: codes with glued name text, trailing
/// noise letters, names inferred from code prefixes.
pub fn normalize_row_cells(code: &str, name: &str, volt: &str, power: &str) -> [String; 4] {
    let mut code = code.to_string();
    let mut name = name.to_string();

    let code_upper = normalize_text(&code).to_uppercase();
    if let Some(captures) = CODE_WITH_TAIL.captures(&code_upper) {
        let pure_code = captures.get(1).expect("group").as_str().to_string();
        let tail: String = normalize_text(&code)
            .chars()
            .skip(pure_code.chars().count())
            .collect();
        if !tail.is_empty()
            && (contains_japanese(&tail)
                || ROW_FILTER_NAME_KEYWORDS.iter().any(|k| tail.contains(k)))
        {
            code = pure_code;
            name = format!("{tail}{name}");
        }
    }

    // OCR often glues stray letters onto a code's tail (e.g. EF-B2-2A).
    let mut code_upper = normalize_text(&code).to_uppercase();
    if name.is_empty() {
        if let Some(captures) = CODE_TRAILING_LETTERS.captures(&code_upper) {
            code = captures.get(1).expect("group").as_str().to_string();
            code_upper = code.clone();
        }
    }

    if !code.is_empty() && !CODE_SHAPE.is_match(&normalize_text(&code).to_uppercase()) {
        if !name.is_empty() {
            name = format!("{code}{name}");
            code = String::new();
            code_upper = String::new();
        }
    }

    name = LEADING_PUNCT.replace(&name, "").into_owned();
    name = name.trim_start_matches('-').to_string();

    if name.is_empty() {
        if code_upper.starts_with("EF-") || code_upper.starts_with("F-") {
            name = "排風機".to_string();
        } else if code_upper.starts_with("SF-") {
            name = "送風機".to_string();
        } else if code_upper.starts_with("PAC-") {
            name = "空調室内機".to_string();
        }
    }

    name = name.replace("室內", "室内");
    if name.starts_with("湧水ポンプ") || name.starts_with("清水ポンプ") {
        name = "清水ポンプ".to_string();
    }

    [
        clean_cell(&code),
        clean_cell(&name),
        clean_cell(&normalize_voltage_text(volt)),
        clean_cell(&normalize_power_text(power)),
    ]
}

// ---------------------------------------------------------------------------
// row classification
// ---------------------------------------------------------------------------

fn is_header_text(normalized: &str) -> bool {
    let lowered = normalized.to_lowercase();
    HEADER_KEYWORDS.iter().filter(|k| lowered.contains(*k)).count() >= 3
}

fn is_footer_text(normalized: &str) -> bool {
    let lowered = normalized.to_lowercase();
    FOOTER_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Data-row classification: equipment rows need a code plus some value, or
/// a recognized equipment name plus a numeric cell. Plan labels and room
/// names without numeric table values are rejected.
pub fn is_data_row(code: &str, name: &str, volt: &str, power: &str) -> bool {
    let code_norm = normalize_text(code).to_uppercase();
    let name_norm = normalize_text(name);
    let combined = format!("{code_norm}{name_norm}{volt}{power}").to_lowercase();

    let has_code = CODE_SHAPE.is_match(&code_norm);
    let has_name = !name_norm.is_empty();
    let has_voltage_num = DIGIT_PATTERN.is_match(volt);
    let has_power_num = DIGIT_PATTERN.is_match(power);

    if combined.is_empty() {
        return false;
    }
    if is_header_text(&combined) {
        return false;
    }
    if ["盤姿図", "主開閉器", "トリップ", "ロック連動"]
        .iter()
        .any(|k| combined.contains(k))
    {
        return false;
    }

    // Plan/location labels (SL-6, L-H2) carry a code shape but no values.
    if has_code && !(has_name || has_voltage_num || has_power_num) {
        return false;
    }
    // Room labels carry a name but no numeric values.
    if has_name && !has_code && !has_voltage_num && !has_power_num {
        return false;
    }

    if has_code && (has_name || has_voltage_num || has_power_num) {
        return true;
    }
    if ROW_FILTER_NAME_KEYWORDS.iter().any(|k| name_norm.contains(k))
        && (has_voltage_num || has_power_num)
    {
        return true;
    }
    if name_norm.contains("同上用フロートスイッチ") || name_norm.contains("操作電源") {
        return true;
    }
    has_name && (has_voltage_num || has_power_num)
}

// ---------------------------------------------------------------------------
// rows from words
// ---------------------------------------------------------------------------

/// Offset below the header where data rows begin, scaled to the header
/// words' glyph height.
pub fn infer_dynamic_data_start_y(words: &[WordBox], header_y: f32) -> f32 {
    let header_words: Vec<&WordBox> = words
        .iter()
        .filter(|w| (w.cy - header_y).abs() <= HEADER_Y_CLUSTER)
        .collect();
    if header_words.is_empty() {
        return header_y + TABLE_DEFAULT_START_OFFSET;
    }
    let header_bottom = header_words.iter().map(|w| w.bbox.y1).fold(f32::MIN, f32::max);
    let heights: Vec<f32> = header_words
        .iter()
        .map(|w| (w.bbox.y1 - w.bbox.y0).max(1.0))
        .collect();
    let median_height = median(&heights).unwrap_or(0.0);
    let offset = (median_height * 1.2).clamp(TABLE_MIN_START_OFFSET, TABLE_MAX_START_OFFSET);
    header_bottom + offset
}

/// Assemble normalized data rows from a crop's words.
pub fn rows_from_words(
    words: &[WordBox],
    bounds: &ColumnBounds,
    y_cluster: f32,
    start_y: Option<f32>,
    trailing_non_data_gap: usize,
) -> Vec<GridRow> {
    rows_from_words_with_meta(words, bounds, y_cluster, start_y, trailing_non_data_gap).rows
}

fn rows_from_words_with_meta(
    words: &[WordBox],
    bounds: &ColumnBounds,
    y_cluster: f32,
    start_y: Option<f32>,
    trailing_non_data_gap: usize,
) -> RowsFromWordsResult {
    let start_y = start_y.unwrap_or(bounds.header_y + DATA_START_OFFSET);
    let all_clusters = cluster_by_y(words, y_cluster);
    let clusters: Vec<&RowCluster> = all_clusters
        .iter()
        .filter(|cluster| {
            cluster.row_y >= start_y || {
                let top = cluster.words.iter().map(|w| w.bbox.y0).fold(f32::MAX, f32::min);
                let bottom = cluster.words.iter().map(|w| w.bbox.y1).fold(f32::MIN, f32::max);
                top <= start_y && start_y <= bottom
            }
        })
        .collect();

    let mut result = RowsFromWordsResult::empty();
    let mut row_idx = 1usize;
    for cluster in clusters {
        let mut cols: [Vec<&WordBox>; 4] = [vec![], vec![], vec![], vec![]];
        for w in &cluster.words {
            if let Some(col) = assign_column(w.cx, bounds) {
                cols[col].push(w);
            }
        }
        if cols.iter().all(|c| c.is_empty()) {
            continue;
        }
        for col in cols.iter_mut() {
            col.sort_by(|a, b| a.cx.total_cmp(&b.cx));
        }

        // A tall multi-digit word in the power column is usually bleed-over
        // from a neighboring diagram, not a capacity.
        let mut power_words: Vec<&WordBox> = cols[3].clone();
        if !power_words.is_empty() {
            let heights: Vec<f32> = cluster
                .words
                .iter()
                .map(|w| (w.bbox.y1 - w.bbox.y0).max(1.0))
                .collect();
            let median_height = median(&heights).unwrap_or(0.0);
            if median_height > 0.0 {
                let max_noise_height = (median_height * 2.2).max(36.0);
                let filtered: Vec<&WordBox> = power_words
                    .iter()
                    .copied()
                    .filter(|w| {
                        !((w.bbox.y1 - w.bbox.y0) > max_noise_height
                            && LONG_DIGITS.is_match(&compact_text(&w.text)))
                    })
                    .collect();
                if !filtered.is_empty() {
                    power_words = filtered;
                }
            }
        }

        let joined = |ws: &[&WordBox]| -> String { ws.iter().map(|w| w.text.as_str()).collect() };
        let [code, name, volt, power] = normalize_row_cells(
            &clean_cell(&joined(&cols[0])),
            &clean_cell(&joined(&cols[1])),
            &clean_cell(&joined(&cols[2])),
            &clean_cell(&joined(&power_words)),
        );

        let normalized = normalize_text(&format!("{code}{name}{volt}{power}"));
        if is_footer_text(&normalized) {
            result.stopped_by_footer = true;
            break;
        }
        if is_header_text(&normalized) || !is_data_row(&code, &name, &volt, &power) {
            if result.saw_data {
                result.trailing_non_data_count += 1;
                if result.trailing_non_data_count > trailing_non_data_gap {
                    break;
                }
            }
            continue;
        }

        result.saw_data = true;
        result.trailing_non_data_count = 0;
        result.last_data_cluster_bottom = Some(
            cluster.words.iter().map(|w| w.bbox.y1).fold(f32::MIN, f32::max),
        );
        result.rows.push(GridRow {
            row_index: row_idx,
            row_y: (cluster.row_y * 100.0).round() / 100.0,
            side: String::new(),
            code,
            name,
            voltage: volt,
            power,
        });
        row_idx += 1;
    }
    result
}

// ---------------------------------------------------------------------------
// crop OCR and iterative expansion
// ---------------------------------------------------------------------------

fn crop_image(page_image: &RgbImage, bbox: (u32, u32, u32, u32)) -> RgbImage {
    let (x0, y0, x1, y1) = bbox;
    image::imageops::crop_imm(page_image, x0, y0, x1 - x0, y1 - y0).to_image()
}

/// OCR a candidate crop, upscaling narrow crops for legibility and
/// rescaling the returned boxes back into crop space.
pub fn ocr_table_crop(engine: &dyn OcrEngine, crop: &RgbImage) -> Result<Vec<WordBox>> {
    if crop.width() < 1 || crop.height() < 1 {
        return Ok(vec![]);
    }
    let mut scale = 1.0f32;
    if crop.width() < 900 {
        scale = (900.0 / crop.width() as f32).clamp(1.0, 3.0);
    }
    if scale > 1.0 {
        let resized = image::imageops::resize(
            crop,
            (crop.width() as f32 * scale) as u32,
            (crop.height() as f32 * scale) as u32,
            image::imageops::FilterType::Lanczos3,
        );
        let words = extract_words(engine, &resized)?;
        return Ok(words.iter().map(|w| w.rescaled(scale)).collect());
    }
    extract_words(engine, crop)
}

/// Parse one table candidate, expanding the crop's bottom edge while data
/// rows keep touching it.
///
/// The loop trades OCR calls for completeness and terminates
/// deterministically: at most [`TABLE_BOTTOM_EXPAND_MAX_TRIES`] expansions,
/// total growth capped at [`TABLE_BOTTOM_EXPAND_MAX_RATIO`] of the initial
/// height, and a no-growth streak of
/// [`TABLE_BOTTOM_EXPAND_NO_GROWTH_STREAK`] stops early — unless the last
/// data row still touches the crop edge, which strongly suggests
/// truncation.
pub fn parse_table_candidate(
    engine: &dyn OcrEngine,
    page_image: &RgbImage,
    candidate: &TableCandidate,
    table_index: usize,
    y_cluster: f32,
) -> Result<TableParseResult> {
    let page_w = page_image.width() as f32;
    let page_h = page_image.height() as f32;
    let left = candidate.bbox.x0.max(0.0);
    let top = candidate.bbox.y0.max(0.0);
    let right = candidate.bbox.x1.min(page_w);
    let initial_bottom = candidate.bbox.y1.min(page_h);
    let initial_height = (candidate.bbox.y1 - candidate.bbox.y0).max(1.0);
    let max_bottom = (candidate.bbox.y1 + initial_height * TABLE_BOTTOM_EXPAND_MAX_RATIO).min(page_h);

    let mut current_bottom = initial_bottom;
    let mut expand_attempts = 0usize;
    let mut no_growth_streak = 0usize;
    let mut prev_row_count: Option<usize> = None;
    let mut final_crop_top = top as u32;
    let mut final_crop_bottom = initial_bottom as u32;
    let mut rows_result = RowsFromWordsResult::empty();

    for attempt in 0..=TABLE_BOTTOM_EXPAND_MAX_TRIES {
        let crop_bbox = (
            left as u32,
            top as u32,
            right as u32,
            current_bottom.min(page_h) as u32,
        );
        if crop_bbox.2 <= crop_bbox.0 || crop_bbox.3 <= crop_bbox.1 {
            break;
        }
        let crop = crop_image(page_image, crop_bbox);
        let words = ocr_table_crop(engine, &crop)?;

        rows_result = if words.is_empty() {
            RowsFromWordsResult::empty()
        } else {
            let bounds = infer_column_bounds(&words, crop.width());
            let start_y = infer_dynamic_data_start_y(&words, bounds.header_y);
            rows_from_words_with_meta(
                &words,
                &bounds,
                y_cluster,
                Some(start_y),
                TABLE_TRAILING_NON_DATA_GAP,
            )
        };
        final_crop_top = crop_bbox.1;
        final_crop_bottom = crop_bbox.3;

        if rows_result.stopped_by_footer || attempt >= TABLE_BOTTOM_EXPAND_MAX_TRIES {
            break;
        }
        if crop_bbox.3 as f32 >= page_h {
            break;
        }

        let near_edge_threshold = TABLE_BOTTOM_NEAR_EDGE_PX.max(y_cluster * 3.0);
        let near_bottom_edge = rows_result.last_data_cluster_bottom.is_some_and(|bottom| {
            let last_on_page = crop_bbox.1 as f32 + bottom;
            crop_bbox.3 as f32 - last_on_page <= near_edge_threshold
        });
        let unstable_tail = rows_result.trailing_non_data_count >= TABLE_TRAILING_NON_DATA_GAP;
        if !(rows_result.saw_data && (near_bottom_edge || unstable_tail)) {
            break;
        }

        let row_count = rows_result.rows.len();
        if prev_row_count.is_some_and(|prev| row_count <= prev) {
            no_growth_streak += 1;
        } else {
            no_growth_streak = 0;
        }
        prev_row_count = Some(row_count);
        // When the last data row still touches the crop bottom, keep
        // extending even without row growth; tails may appear after extra
        // steps.
        if no_growth_streak >= TABLE_BOTTOM_EXPAND_NO_GROWTH_STREAK && !near_bottom_edge {
            break;
        }

        let next_bottom = (crop_bbox.3 as f32 + TABLE_BOTTOM_EXPAND_STEP_PX).min(max_bottom);
        if next_bottom <= crop_bbox.3 as f32 {
            break;
        }
        current_bottom = next_bottom;
        expand_attempts += 1;
    }

    let mut rows = rows_result.rows;
    for row in rows.iter_mut() {
        row.row_y = ((row.row_y + final_crop_top as f32) * 100.0).round() / 100.0;
        row.side = format!("T{table_index:02}");
    }
    Ok(TableParseResult {
        table_index,
        rows,
        expand_attempts,
        final_crop_bottom: final_crop_bottom as f32,
    })
}

// ---------------------------------------------------------------------------
// drawing numbers
// ---------------------------------------------------------------------------

/// Normalize a drawing-number candidate; `None` when the text does not
/// match the `XX-NNN(-NNN)` shape.
pub fn normalize_drawing_number_candidate(text: &str) -> Option<String> {
    let normalized = normalize_text(text).to_uppercase();
    let normalized = normalized.replace(' ', "").replace('\u{3000}', "");
    let normalized = DASH_FOLD.replace_all(&normalized, "-").into_owned();
    let normalized = normalized
        .trim_matches(|c| "|,:;[](){}<>「」『』".contains(c))
        .to_string();
    if DRAWING_NO_PATTERN.is_match(&normalized) {
        Some(normalized)
    } else {
        None
    }
}

fn is_drawing_number_label(text: &str) -> bool {
    let normalized = compact_text(text);
    normalized.contains("図面番号")
        || (normalized.contains("図面") && normalized.contains("番号"))
}

/// Find a page's drawing number in its word boxes: first below the
/// 図面番号 label, then anywhere in the bottom-right title-block region.
pub fn extract_drawing_number_from_word_boxes(
    words: &[WordBox],
    frame_width: u32,
    frame_height: u32,
) -> String {
    if words.is_empty() {
        return String::new();
    }

    let clusters = cluster_by_y(words, DRAWING_NO_Y_CLUSTER);
    let label_cluster = clusters
        .iter()
        .filter(|cluster| is_drawing_number_label(&cluster.row_text()))
        .max_by(|a, b| a.row_y.total_cmp(&b.row_y));

    if let Some(label) = label_cluster {
        let label_y = label.row_y;
        let label_x_min = label.words.iter().map(|w| w.bbox.x0).fold(f32::MAX, f32::min);
        let label_x_max = label.words.iter().map(|w| w.bbox.x1).fold(f32::MIN, f32::max);
        let below: Vec<WordBox> = words
            .iter()
            .filter(|w| {
                w.cy > label_y + 1.0
                    && w.cy <= label_y + DRAWING_NO_LABEL_TO_VALUE_MAX_OFFSET
                    && w.bbox.x1 >= label_x_min - DRAWING_NO_LABEL_X_TOLERANCE_LEFT
                    && w.bbox.x0 <= label_x_max + DRAWING_NO_LABEL_X_TOLERANCE_RIGHT
            })
            .cloned()
            .collect();

        let mut value_clusters = cluster_by_y(&below, DRAWING_NO_VALUE_Y_CLUSTER);
        value_clusters.sort_by(|a, b| a.row_y.total_cmp(&b.row_y));
        for cluster in &value_clusters {
            let joined = cluster.joined_text();
            if let Some(candidate) = normalize_drawing_number_candidate(&joined) {
                return candidate;
            }
            for w in cluster.words_by_x() {
                if let Some(candidate) = normalize_drawing_number_candidate(&w.text) {
                    return candidate;
                }
            }
        }
    }

    let mut sorted: Vec<&WordBox> = words.iter().collect();
    sorted.sort_by(|a, b| a.cy.total_cmp(&b.cy).then(a.cx.total_cmp(&b.cx)));
    for w in sorted {
        if w.cy < frame_height as f32 * DRAWING_NO_BOTTOM_REGION_Y_RATIO {
            continue;
        }
        if w.cx < frame_width as f32 * DRAWING_NO_BOTTOM_REGION_X_RATIO {
            continue;
        }
        if let Some(candidate) = normalize_drawing_number_candidate(&w.text) {
            return candidate;
        }
    }
    String::new()
}

/// Resolve a page's drawing number from OCR words, falling back to the
/// PDF's text layer.
pub fn resolve_drawing_number(
    right_side_words: &[WordBox],
    right_side_size: (u32, u32),
    text_layer: &dyn TextLayerSource,
    page: u32,
) -> (String, DrawingNumberSource) {
    let from_vision = extract_drawing_number_from_word_boxes(
        right_side_words,
        right_side_size.0,
        right_side_size.1,
    );
    if !from_vision.is_empty() {
        return (from_vision, DrawingNumberSource::Vision);
    }

    if let Some((words, (width, height))) = text_layer.page_words(page) {
        let from_text = extract_drawing_number_from_word_boxes(&words, width, height);
        if !from_text.is_empty() {
            return (from_text, DrawingNumberSource::TextLayer);
        }
    }
    (String::new(), DrawingNumberSource::None)
}

// ---------------------------------------------------------------------------
// page extraction paths
// ---------------------------------------------------------------------------

struct PageExtraction {
    rows: Vec<GridRow>,
    right_side_words: Vec<WordBox>,
    right_side_size: (u32, u32),
    tables_detected: usize,
}

/// Candidate-detection path: whole-page OCR, header anchors, per-candidate
/// crop parsing.
fn extract_page_rows_by_candidates(
    engine: &dyn OcrEngine,
    page_image: &RgbImage,
    y_cluster: f32,
) -> Result<PageExtraction> {
    let page_words = extract_words(engine, page_image)?;
    let candidates = detect_table_candidates(
        &page_words,
        (page_image.width(), page_image.height()),
        HEADER_Y_CLUSTER,
    );

    let mut rows: Vec<GridRow> = vec![];
    let mut row_index = 1usize;
    for (idx, candidate) in candidates.iter().enumerate() {
        let table_index = idx + 1;
        let parsed =
            parse_table_candidate(engine, page_image, candidate, table_index, y_cluster)?;
        for mut row in parsed.rows {
            row.row_index = row_index;
            rows.push(row);
            row_index += 1;
        }
    }
    Ok(PageExtraction {
        rows,
        right_side_words: page_words,
        right_side_size: (page_image.width(), page_image.height()),
        tables_detected: candidates.len(),
    })
}

/// Legacy path: split the page into left/right halves, infer column bounds
/// per side, read rows straight down.
fn extract_page_rows_by_side_split(
    engine: &dyn OcrEngine,
    page_image: &RgbImage,
    y_cluster: f32,
) -> Result<PageExtraction> {
    let width = page_image.width();
    let height = page_image.height();
    let half = width / 2;

    let mut rows: Vec<GridRow> = vec![];
    let mut right_side_words: Vec<WordBox> = vec![];
    let mut right_side_size = (0u32, 0u32);

    for (side, x0, side_width) in [("L", 0u32, half), ("R", half, width - half)] {
        let side_image = crop_image(page_image, (x0, 0, x0 + side_width, height));
        let words = extract_words(engine, &side_image)?;
        if words.is_empty() {
            continue;
        }
        if side == "R" {
            right_side_words = words.clone();
            right_side_size = (side_image.width(), side_image.height());
        }
        let bounds = infer_column_bounds(&words, side_image.width());
        let side_rows = rows_from_words(
            &words,
            &bounds,
            y_cluster,
            None,
            LEGACY_TRAILING_NON_DATA_GAP,
        );
        for mut row in side_rows {
            row.side = side.to_string();
            rows.push(row);
        }
    }
    Ok(PageExtraction {
        rows,
        right_side_words,
        right_side_size,
        tables_detected: 0,
    })
}

// ---------------------------------------------------------------------------
// extractor entry point
// ---------------------------------------------------------------------------

/// Run summary returned by [`GridExtractor::extract`].
#[derive(Debug, Clone, Serialize)]
pub struct GridSummary {
    /// Output rows written
    pub rows: usize,
    /// Output column names, in order
    pub columns: Vec<String>,
    /// Output CSV path
    pub output_csv: PathBuf,
    /// First non-empty drawing number found across the pages
    pub drawing_number: String,
    /// Source of that drawing number
    pub drawing_number_source: DrawingNumberSource,
    /// Pages actually processed
    pub pages_processed: usize,
    /// 1-based pages that were targeted
    pub target_pages: Vec<u32>,
    /// Drawing number per page
    pub drawing_numbers_by_page: BTreeMap<u32, String>,
    /// Rows per page
    pub rows_by_page: BTreeMap<u32, usize>,
    /// Detected table candidates per page
    pub tables_detected_by_page: BTreeMap<u32, usize>,
    /// Pages where the primary path found nothing and the other path ran
    pub fallback_pages: Vec<u32>,
    /// Pages skipped after a per-page failure
    pub failed_pages: Vec<u32>,
}

/// Gridded-schedule extractor with its injected collaborators.
pub struct GridExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    text_layer: &'a dyn TextLayerSource,
    options: PageOptions,
}

impl<'a> GridExtractor<'a> {
    /// Build an extractor from its collaborators and page options.
    pub fn new(
        ocr: &'a dyn OcrEngine,
        text_layer: &'a dyn TextLayerSource,
        options: PageOptions,
    ) -> Self {
        Self {
            ocr,
            text_layer,
            options,
        }
    }

    fn extract_page(
        &self,
        page_image: &RgbImage,
        page: u32,
        fallback_pages: &mut Vec<u32>,
    ) -> Result<PageExtraction> {
        // Designated first pages use the legacy half-page layout; all other
        // pages lead with candidate detection. Either path falls back to
        // the other when it produces no rows.
        let legacy_first = LEGACY_FIRST_PAGES.contains(&page);
        let primary = if legacy_first {
            extract_page_rows_by_side_split(self.ocr, page_image, self.options.y_cluster)?
        } else {
            extract_page_rows_by_candidates(self.ocr, page_image, self.options.y_cluster)?
        };
        if !primary.rows.is_empty() {
            return Ok(primary);
        }
        fallback_pages.push(page);
        if legacy_first {
            extract_page_rows_by_candidates(self.ocr, page_image, self.options.y_cluster)
        } else {
            extract_page_rows_by_side_split(self.ocr, page_image, self.options.y_cluster)
        }
    }

    /// Extract the gridded schedule from a PDF into a CSV.
    pub fn extract(&self, pdf_path: &Path, out_csv: &Path) -> Result<GridSummary> {
        if !pdf_path.exists() {
            return Err(Error::InputNotFound(pdf_path.to_path_buf()));
        }
        let total_pages = count_pdf_pages(pdf_path)?;
        let target_pages = resolve_target_pages(total_pages, self.options.page)?;

        let work_dir = tempfile::tempdir()?;
        let mut all_rows: Vec<(u32, GridRow, String)> = vec![];
        let mut drawing_numbers_by_page: BTreeMap<u32, String> = BTreeMap::new();
        let mut drawing_sources_by_page: BTreeMap<u32, DrawingNumberSource> = BTreeMap::new();
        let mut rows_by_page: BTreeMap<u32, usize> = BTreeMap::new();
        let mut tables_detected_by_page: BTreeMap<u32, usize> = BTreeMap::new();
        let mut fallback_pages: Vec<u32> = vec![];
        let mut failed_pages: Vec<u32> = vec![];

        for &page in &target_pages {
            let png_path = run_pdftoppm(pdf_path, page, self.options.dpi, work_dir.path())?;
            let page_image = load_page_image(&png_path)?;
            let extraction = match self.extract_page(&page_image, page, &mut fallback_pages) {
                Ok(extraction) => extraction,
                Err(err) => {
                    log::warn!("page {page}: extraction failed, skipping: {err}");
                    failed_pages.push(page);
                    continue;
                }
            };

            let (drawing_number, source) = resolve_drawing_number(
                &extraction.right_side_words,
                extraction.right_side_size,
                self.text_layer,
                page,
            );
            drawing_numbers_by_page.insert(page, drawing_number.clone());
            drawing_sources_by_page.insert(page, source);
            rows_by_page.insert(page, extraction.rows.len());
            tables_detected_by_page.insert(page, extraction.tables_detected);
            for row in extraction.rows {
                all_rows.push((page, row, drawing_number.clone()));
            }
        }

        let (summary_drawing_number, summary_drawing_source) = target_pages
            .iter()
            .find_map(|page| {
                let number = drawing_numbers_by_page.get(page)?;
                if number.is_empty() {
                    return None;
                }
                Some((
                    number.clone(),
                    *drawing_sources_by_page
                        .get(page)
                        .unwrap_or(&DrawingNumberSource::None),
                ))
            })
            .unwrap_or((String::new(), DrawingNumberSource::None));

        all_rows.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.side.cmp(&b.1.side))
                .then(a.1.row_index.cmp(&b.1.row_index))
        });
        let row_count = all_rows.len();
        write_delimited(
            out_csv,
            &OUTPUT_COLUMNS,
            all_rows.iter().map(|(_, row, drawing)| {
                vec![
                    row.code.clone(),
                    row.name.clone(),
                    row.voltage.clone(),
                    row.power.clone(),
                    drawing.clone(),
                ]
            }),
            false,
        )?;

        Ok(GridSummary {
            rows: row_count,
            columns: OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            output_csv: out_csv.to_path_buf(),
            drawing_number: summary_drawing_number,
            drawing_number_source: summary_drawing_source,
            pages_processed: target_pages.len() - failed_pages.len(),
            target_pages,
            drawing_numbers_by_page,
            rows_by_page,
            tables_detected_by_page,
            fallback_pages,
            failed_pages,
        })
    }
}
