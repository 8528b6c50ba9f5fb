//! Spec-frame extractor.
//!
//! Intercom/security drawings describe each device in a bordered spec frame:
//! a title above, a product code near the top, and label/value rows
//! (電源電圧, 消費電流, 質量, ...) inside. OCR sees none of the borders, so
//! frames are reconstructed by chaining x-overlapping label segments into
//! blocks, then scoring nearby segments as the block's title and code.
//!
//! Output rows are ragged: title, code, then alternating label/value text.

use crate::config::PageOptions;
use crate::error::{Error, Result};
use crate::geometry::span_overlap_ratio;
use crate::layout::{cluster_by_y, split_by_x_gap, WordBox};
use crate::ocr::{extract_words, OcrEngine};
use crate::output::write_ragged;
use crate::render::{count_pdf_pages, load_page_image, resolve_target_pages, run_pdftoppm};
use crate::text::{compact_text, contains_japanese, normalize_text};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Label keywords recognized inside a spec frame, compact form.
const LABEL_KEYWORDS: [&str; 12] = [
    "電源電圧",
    "入力電圧",
    "出力電圧",
    "消費電流",
    "消費電力",
    "質量",
    "材質",
    "形状",
    "色調",
    "塗色",
    "塗装",
    "備考",
];

/// Compact substrings that disqualify a segment as a frame title.
const TITLE_EXCLUDE_TERMS: [&str; 5] = ["寸法", "注記", "取付参考例", "図面", "縮尺"];

const SPECIAL_IDENTIFIER_TOKENS: [&str; 1] = ["特注品"];

const TABLE_MIN_LABEL_COUNT: usize = 1;
const TABLE_MAX_WIDTH_RATIO: f32 = 2.1;
const READING_ORDER_Y_BAND: f32 = 140.0;
const TITLE_MAX_DISTANCE_TO_TABLE: f32 = 900.0;
const CODE_ASSIGN_MAX_SCORE: f32 = 420.0;
const PRODUCT_CODE_ASSIGN_MAX_SCORE: f32 = 520.0;
const CODE_ASSIGN_SOFT_MARGIN: f32 = 40.0;
const CODE_ASSIGN_SOFT_MIN_OVERLAP: f32 = 0.70;
const TITLE_SEGMENT_X_GAP: f32 = 40.0;
const TITLE_CODE_ROW_MIN_DIFF: f32 = 25.0;
const TITLE_CODE_ROW_MAX_DIFF: f32 = 70.0;
const CODE_TARGET_LEFT_MARGIN: f32 = 140.0;
const CODE_TARGET_RIGHT_MARGIN: f32 = 220.0;
const CODE_OVERLAP_PENALTY_WEIGHT: f32 = 220.0;

lazy_static! {
    static ref CODE_PATTERN: Regex =
        Regex::new(r"[A-Z]{1,4}-[A-Z0-9]+(?:\+[A-Z0-9-]+)?(?:トク)?").unwrap();
    static ref PRODUCT_CODE_PATTERN: Regex =
        Regex::new(r"商品コード[:：]?\s*([0-9A-Za-z-]{4,})").unwrap();
    static ref PAREN_PRODUCT_CODE_PATTERN: Regex =
        Regex::new(r"\(商品コード[:：]?[0-9A-Za-z-]{4,}\)").unwrap();
    static ref HEADER_MARKER_PATTERN: Regex = Regex::new(r"[A-Z]{1,3}\d{1,3}").unwrap();
    static ref DIGIT_PATTERN: Regex = Regex::new(r"\d").unwrap();
    static ref UNIT_VALUE_PATTERN: Regex =
        Regex::new(r"(?i)\d+(?:\.\d+)?(?:kg|g|v|a|w|hz|φ)").unwrap();
    static ref NON_CONTENT_PATTERN: Regex =
        Regex::new(r"^[^ぁ-んァ-ン一-龥A-Za-z0-9]+$").unwrap();
    static ref LEADING_ROW_NUMBER: Regex = Regex::new(r"^\d+\|").unwrap();
    static ref LEADING_MARKER_JA: Regex =
        Regex::new(r"^[A-Za-z]{1,4}\d{0,3}([ぁ-んァ-ン一-龥（(])").unwrap();
    static ref LEADING_LETTERS_JA: Regex =
        Regex::new(r"^[A-Za-z]{1,4}([ぁ-んァ-ン一-龥（(])").unwrap();
    static ref LEADING_BULLETS: Regex = Regex::new(r"^[◎○●◯◇◆□■△▲▽▼⊙⊗◉]+").unwrap();
    static ref SPEAKER_FIX: Regex = Regex::new(r"スピーカ([^ー]|$)").unwrap();
}

/// One text segment: a row cluster further split by horizontal gap.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 1-based source page
    pub page: u32,
    /// Row-cluster center y
    pub row_y: f32,
    /// Left edge
    pub x0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge
    pub top: f32,
    /// Bottom edge
    pub bottom: f32,
    /// Space-joined normalized text
    pub text: String,
    /// Compact (space-free) text
    pub text_compact: String,
}

impl Segment {
    fn signature(&self) -> (u32, i64, i64, String) {
        (
            self.page,
            (self.row_y * 100.0).round() as i64,
            (self.x0 * 100.0).round() as i64,
            self.text_compact.clone(),
        )
    }
}

/// A chained group of label segments believed to form one spec frame.
#[derive(Debug, Clone)]
pub struct TableBlock {
    /// 1-based source page
    pub page: u32,
    /// Left edge
    pub x0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge
    pub top: f32,
    /// Bottom edge
    pub bottom: f32,
    /// Member segments
    pub segments: Vec<Segment>,
}

impl TableBlock {
    fn key(&self) -> (u32, i64, i64, i64) {
        (
            self.page,
            self.top.round() as i64,
            self.x0.round() as i64,
            self.x1.round() as i64,
        )
    }

    fn absorb(&mut self, segment: Segment) {
        self.x0 = self.x0.min(segment.x0);
        self.x1 = self.x1.max(segment.x1);
        self.top = self.top.min(segment.top);
        self.bottom = self.bottom.max(segment.bottom);
        self.segments.push(segment);
    }
}

/// One output row: a device frame with its title, code, and label/value
/// pairs.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRow {
    /// 1-based source page
    pub page: u32,
    /// Top edge of the frame
    pub top: f32,
    /// Left edge of the frame
    pub x0: f32,
    /// Device title
    pub title: String,
    /// Product/device code; may be empty
    pub code: String,
    /// Label/value pairs in frame order
    pub pairs: Vec<(String, String)>,
}

impl FrameRow {
    /// Projected CSV cells: title, code, then label and value per pair,
    /// skipping empties.
    pub fn values(&self) -> Vec<String> {
        let mut values: Vec<String> = vec![];
        if !self.title.is_empty() {
            values.push(self.title.clone());
        }
        if !self.code.is_empty() {
            values.push(self.code.clone());
        }
        for (key, value) in &self.pairs {
            if !key.is_empty() {
                values.push(key.clone());
            }
            if !value.is_empty() {
                values.push(value.clone());
            }
        }
        values
    }
}

/// Run summary returned by [`FrameExtractor::extract`].
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    /// Output rows written
    pub rows: usize,
    /// Output CSV path
    pub output_csv: PathBuf,
    /// Pages actually processed
    pub pages_processed: usize,
    /// 1-based pages that were targeted
    pub target_pages: Vec<u32>,
    /// Frame rows per page
    pub rows_by_page: BTreeMap<u32, usize>,
    /// Pages skipped after a per-page failure
    pub failed_pages: Vec<u32>,
}

// ---------------------------------------------------------------------------
// segments
// ---------------------------------------------------------------------------

/// Build text segments from a page's words: y-cluster, then split each row
/// by horizontal gap.
pub fn build_segments_from_words(
    words: &[WordBox],
    page: u32,
    y_cluster: f32,
    x_gap: f32,
) -> Vec<Segment> {
    let clusters = cluster_by_y(words, y_cluster);
    let mut segments: Vec<Segment> = vec![];
    for cluster in &clusters {
        for group in split_by_x_gap(cluster, x_gap) {
            let tokens: Vec<String> = group
                .words_by_x()
                .iter()
                .map(|w| normalize_text(w.text.trim()))
                .filter(|t| !t.is_empty())
                .collect();
            if tokens.is_empty() {
                continue;
            }
            let text = tokens.join(" ");
            let compact = compact_text(&text).trim_matches('|').to_string();
            if compact.is_empty() {
                continue;
            }
            let x0 = group.words.iter().map(|w| w.bbox.x0).fold(f32::MAX, f32::min);
            let x1 = group.words.iter().map(|w| w.bbox.x1).fold(f32::MIN, f32::max);
            let top = group.words.iter().map(|w| w.bbox.y0).fold(f32::MAX, f32::min);
            let bottom = group.words.iter().map(|w| w.bbox.y1).fold(f32::MIN, f32::max);
            segments.push(Segment {
                page,
                row_y: cluster.row_y,
                x0,
                x1,
                top,
                bottom,
                text,
                text_compact: compact,
            });
        }
    }
    segments.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.row_y.total_cmp(&b.row_y))
            .then(a.x0.total_cmp(&b.x0))
    });
    segments
}

// ---------------------------------------------------------------------------
// classification
// ---------------------------------------------------------------------------

/// Repair known OCR artifacts before label matching (doubled characters,
/// swapped strokes).
fn normalize_for_label_detection(value: &str) -> String {
    let mut compact = compact_text(value).trim_matches('|').to_string();
    compact = compact.replace("電電源電圧", "電源電圧");
    compact = compact.replace("消消費電流", "消費電流");
    compact = compact.replace("消消費電力", "消費電力");
    compact = compact.replace("質本体", "質量本体");
    compact = compact.replace("材貝質", "材質");
    compact = compact.replace("形備状", "形状");
    compact = compact.replace("形備", "形状");
    if compact.starts_with('考') {
        compact = format!("備{compact}");
    }
    compact
}

fn is_table_segment(segment: &Segment) -> bool {
    let compact = normalize_for_label_detection(&segment.text_compact);
    LABEL_KEYWORDS.iter().any(|keyword| compact.contains(keyword))
}

/// Find a device or product code inside a segment's compact text.
pub fn find_code_in_segment(segment: &Segment) -> String {
    if let Some(matched) = CODE_PATTERN.find(&segment.text_compact) {
        return matched.as_str().to_string();
    }
    if let Some(matched) = PAREN_PRODUCT_CODE_PATTERN.find(&segment.text_compact) {
        return matched.as_str().to_string();
    }
    if let Some(captures) = PRODUCT_CODE_PATTERN.captures(&segment.text_compact) {
        if let Some(code) = captures.get(1) {
            return format!("商品コード:{}", code.as_str());
        }
    }
    for token in SPECIAL_IDENTIFIER_TOKENS {
        if segment.text_compact.contains(token) {
            return token.to_string();
        }
    }
    String::new()
}

fn is_code_candidate_segment(segment: &Segment) -> bool {
    let code = find_code_in_segment(segment);
    if code.is_empty() {
        return false;
    }
    let compact = &segment.text_compact;
    if LABEL_KEYWORDS.iter().any(|keyword| compact.contains(keyword)) {
        return false;
    }
    compact.chars().count() <= code.chars().count() + 14
}

/// Whether a segment could be a frame title: short-ish Japanese text with
/// no code, no unit values, no excluded terms.
pub fn is_title_candidate(segment: &Segment) -> bool {
    let compact = &segment.text_compact;
    let char_count = compact.chars().count();
    if !(3..=48).contains(&char_count) {
        return false;
    }
    if CODE_PATTERN.is_match(compact) || compact.contains("商品コード") {
        return false;
    }
    if SPECIAL_IDENTIFIER_TOKENS.iter().any(|t| compact.contains(t)) {
        return false;
    }
    if !contains_japanese(compact) {
        return false;
    }
    if LABEL_KEYWORDS.iter().any(|t| compact.contains(t))
        || TITLE_EXCLUDE_TERMS.iter().any(|t| compact.contains(t))
    {
        return false;
    }
    if compact.contains('約') && DIGIT_PATTERN.is_match(compact) {
        return false;
    }
    if UNIT_VALUE_PATTERN.is_match(&compact.to_lowercase()) {
        return false;
    }
    if NON_CONTENT_PATTERN.is_match(compact) {
        return false;
    }
    if compact.starts_with(['(', '（', '<', '＜', '[']) {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// block formation
// ---------------------------------------------------------------------------

/// Chain label segments into table blocks by x-overlap and vertical
/// proximity.
pub fn cluster_table_segments(segments: &[Segment]) -> Vec<TableBlock> {
    let mut sorted: Vec<&Segment> = segments.iter().collect();
    sorted.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.row_y.total_cmp(&b.row_y))
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut blocks: Vec<TableBlock> = vec![];
    for segment in sorted {
        let matched = blocks.iter_mut().find(|block| {
            block.page == segment.page
                && segment.row_y <= block.bottom + 140.0
                && span_overlap_ratio((segment.x0, segment.x1), (block.x0, block.x1)) >= 0.18
        });
        match matched {
            Some(block) => block.absorb(segment.clone()),
            None => blocks.push(TableBlock {
                page: segment.page,
                x0: segment.x0,
                x1: segment.x1,
                top: segment.top,
                bottom: segment.bottom,
                segments: vec![segment.clone()],
            }),
        }
    }
    blocks
}

fn is_continuation_text(text: &str) -> bool {
    let compact = normalize_for_label_detection(text);
    if compact.is_empty() || compact.chars().count() > 80 {
        return false;
    }
    if CODE_PATTERN.is_match(&compact) {
        return false;
    }
    if !extract_label_value_pairs(&compact).is_empty() {
        return false;
    }
    contains_japanese(&compact) || DIGIT_PATTERN.is_match(&compact)
}

/// Attach value-continuation segments (wrapped cell text) to the blocks
/// they visually belong to.
pub fn attach_continuation_segments(blocks: &mut [TableBlock], segments: &[Segment]) {
    if blocks.is_empty() {
        return;
    }
    for block in blocks.iter_mut() {
        let mut known: Vec<(u32, i64, i64, String)> =
            block.segments.iter().map(Segment::signature).collect();
        for segment in segments {
            let signature = segment.signature();
            if known.contains(&signature) {
                continue;
            }
            if segment.page != block.page {
                continue;
            }
            if segment.row_y < block.top - 8.0 || segment.row_y > block.bottom + 40.0 {
                continue;
            }
            if span_overlap_ratio((segment.x0, segment.x1), (block.x0, block.x1)) < 0.35 {
                continue;
            }
            if HEADER_MARKER_PATTERN.is_match(&segment.text_compact) {
                continue;
            }
            if is_title_candidate(segment) || !find_code_in_segment(segment).is_empty() {
                continue;
            }
            if !is_continuation_text(&segment.text_compact) {
                continue;
            }
            known.push(signature);
            block.absorb(segment.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// label/value pairs
// ---------------------------------------------------------------------------

fn clean_value(value: &str) -> String {
    value
        .trim_matches(|c| "|:：- ".contains(c))
        .replace('\u{3000}', "")
        .replace('黑', "黒")
}

/// Extract label/value pairs from a frame's flattened text.
///
/// Labels are located by substring search over the repaired compact text;
/// overlapping hits keep the earliest, and each value runs to the next
/// label. Adjacent pairs with the same label merge when one side is empty.
pub fn extract_label_value_pairs(text: &str) -> Vec<(String, String)> {
    let normalized = normalize_for_label_detection(text);
    let mut hits: Vec<(usize, usize, &str)> = vec![];
    for label in LABEL_KEYWORDS {
        let mut start = 0usize;
        while let Some(found) = normalized[start..].find(label) {
            let at = start + found;
            hits.push((at, at + label.len(), label));
            start = at + label.len();
        }
    }
    if hits.is_empty() {
        return vec![];
    }

    hits.sort_by(|a, b| a.0.cmp(&b.0).then((b.1 - b.0).cmp(&(a.1 - a.0))));
    let mut selected: Vec<(usize, usize, &str)> = vec![];
    for hit in hits {
        if selected.last().is_some_and(|last| hit.0 < last.1) {
            continue;
        }
        selected.push(hit);
    }

    // A label repeated at the very end with no value is an OCR echo.
    if selected.len() >= 2 {
        let (last_start, last_end, last_label) = *selected.last().expect("non-empty");
        let (_, _, prev_label) = selected[selected.len() - 2];
        if last_end >= normalized.len() && last_label == prev_label && last_start < normalized.len()
        {
            selected.pop();
        }
    }

    let mut pairs: Vec<(String, String)> = vec![];
    for (idx, &(_, end, label)) in selected.iter().enumerate() {
        let value_end = selected
            .get(idx + 1)
            .map(|next| next.0)
            .unwrap_or(normalized.len());
        let value = clean_value(&normalized[end..value_end]);
        pairs.push((label.to_string(), value));
    }

    let mut merged: Vec<(String, String)> = vec![];
    for (label, value) in pairs {
        if let Some(last) = merged.last_mut() {
            if last.0 == label {
                if value.is_empty() {
                    last.1 = clean_value(&last.1);
                    continue;
                }
                if last.1.is_empty() {
                    last.1 = value;
                    continue;
                }
            }
        }
        merged.push((label, value));
    }
    merged
}

fn extract_pairs_from_block(block: &TableBlock) -> (Vec<(String, String)>, usize) {
    let mut ordered: Vec<&Segment> = block.segments.iter().collect();
    ordered.sort_by(|a, b| a.row_y.total_cmp(&b.row_y).then(a.x0.total_cmp(&b.x0)));

    let mut pairs: Vec<(String, String)> = vec![];
    for segment in ordered {
        let detected = extract_label_value_pairs(&segment.text_compact);
        if !detected.is_empty() {
            pairs.extend(detected);
            continue;
        }
        if !pairs.is_empty() && is_continuation_text(&segment.text_compact) {
            let last = pairs.last_mut().expect("non-empty");
            last.1 = clean_value(&format!("{}{}", last.1, segment.text_compact));
        }
    }

    let filtered: Vec<(String, String)> =
        pairs.into_iter().filter(|(label, _)| !label.is_empty()).collect();
    let mut labels: Vec<&str> = filtered.iter().map(|(label, _)| label.as_str()).collect();
    labels.sort_unstable();
    labels.dedup();
    let label_count = labels.len();
    (filtered, label_count)
}

// ---------------------------------------------------------------------------
// title and code assignment
// ---------------------------------------------------------------------------

fn cluster_y_values(values: &[f32], tolerance: f32) -> Vec<(f32, usize)> {
    if values.is_empty() {
        return vec![];
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mut clusters: Vec<Vec<f32>> = vec![vec![sorted[0]]];
    for &value in &sorted[1..] {
        let last = clusters.last_mut().expect("seeded");
        if (value - *last.last().expect("non-empty")).abs() <= tolerance {
            last.push(value);
        } else {
            clusters.push(vec![value]);
        }
    }
    clusters
        .iter()
        .map(|cluster| (cluster.iter().sum::<f32>() / cluster.len() as f32, cluster.len()))
        .collect()
}

/// Y centers of rows carrying three or more code candidates — the header
/// strips of a frame sheet.
fn header_row_centers_from_codes(code_segments: &[&Segment]) -> Vec<f32> {
    let values: Vec<f32> = code_segments
        .iter()
        .filter(|segment| is_code_candidate_segment(segment))
        .map(|segment| segment.row_y)
        .collect();
    cluster_y_values(&values, 24.0)
        .into_iter()
        .filter(|&(_, count)| count >= 3)
        .map(|(center, _)| center)
        .collect()
}

fn filter_title_candidates_by_header_rows<'a>(
    title_candidates: &[&'a Segment],
    code_row_centers: &[f32],
) -> Vec<&'a Segment> {
    if code_row_centers.is_empty() {
        return title_candidates.to_vec();
    }
    let filtered: Vec<&Segment> = title_candidates
        .iter()
        .copied()
        .filter(|segment| {
            code_row_centers.iter().any(|&row_y| {
                let diff = row_y - segment.row_y;
                (TITLE_CODE_ROW_MIN_DIFF..=TITLE_CODE_ROW_MAX_DIFF).contains(&diff)
            })
        })
        .collect();
    if filtered.is_empty() {
        title_candidates.to_vec()
    } else {
        filtered
    }
}

fn estimate_header_y_for_block(block: &TableBlock, code_row_centers: &[f32]) -> f32 {
    if code_row_centers.is_empty() {
        return (block.top - 420.0).max(0.0);
    }
    let usable: Vec<f32> = code_row_centers
        .iter()
        .copied()
        .filter(|&row_y| row_y < block.top + 40.0)
        .collect();
    match usable.iter().copied().fold(None::<f32>, |acc, v| {
        Some(acc.map_or(v, |a| a.max(v)))
    }) {
        Some(nearest) => nearest - 47.0,
        None => (block.top - 420.0).max(0.0),
    }
}

fn pick_title_for_block<'a>(
    block: &TableBlock,
    title_candidates: &[&'a Segment],
    min_overlap: f32,
) -> Option<&'a Segment> {
    let block_center = (block.x0 + block.x1) / 2.0;
    title_candidates
        .iter()
        .copied()
        .filter(|segment| {
            segment.page == block.page
                && segment.row_y < block.top
                && (block.top - segment.row_y) <= TITLE_MAX_DISTANCE_TO_TABLE
                && span_overlap_ratio(
                    (segment.x0, segment.x1),
                    (block.x0 - 140.0, block.x1 + 140.0),
                ) >= min_overlap
        })
        .min_by(|a, b| {
            let score = |segment: &Segment| {
                let seg_center = (segment.x0 + segment.x1) / 2.0;
                (block.top - segment.row_y) + (seg_center - block_center).abs() * 0.2
            };
            score(a).total_cmp(&score(b))
        })
}

#[allow(clippy::too_many_arguments)]
fn pick_code_for_anchor(
    page: u32,
    anchor_x0: f32,
    anchor_x1: f32,
    anchor_y: f32,
    max_y: f32,
    code_segments: &[&Segment],
    x_pad_left: f32,
    x_pad_right: f32,
    min_overlap: f32,
) -> String {
    let anchor_center = (anchor_x0 + anchor_x1) / 2.0;
    let anchor_range = (anchor_x0 - x_pad_left, anchor_x1 + x_pad_right);
    let mut candidates: Vec<(f32, String)> = vec![];
    for segment in code_segments {
        if segment.page != page || !(anchor_y..=max_y).contains(&segment.row_y) {
            continue;
        }
        let code = find_code_in_segment(segment);
        if code.is_empty() {
            continue;
        }
        let overlap = span_overlap_ratio((segment.x0, segment.x1), anchor_range);
        if overlap < min_overlap {
            continue;
        }
        let seg_center = (segment.x0 + segment.x1) / 2.0;
        let score = (segment.row_y - anchor_y).abs() * 1.2
            + (seg_center - anchor_center).abs()
            + (1.0 - overlap) * 120.0;
        candidates.push((score, code));
    }
    candidates
        .into_iter()
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, code)| code)
        .unwrap_or_default()
}

fn pick_code_for_title(block: &TableBlock, header_y: f32, code_segments: &[&Segment]) -> String {
    let lower_y = header_y + 18.0;
    let upper_y = header_y + 190.0;
    let block_center = (block.x0 + block.x1) / 2.0;
    let target_range = (
        block.x0 - CODE_TARGET_LEFT_MARGIN,
        block.x1 + CODE_TARGET_RIGHT_MARGIN,
    );
    let mut candidates: Vec<(f32, String, f32)> = vec![];

    for segment in code_segments {
        if segment.page != block.page || !(lower_y..=upper_y).contains(&segment.row_y) {
            continue;
        }
        let code = find_code_in_segment(segment);
        if code.is_empty() {
            continue;
        }
        let is_product_code = code.contains("商品コード:");
        let is_special = SPECIAL_IDENTIFIER_TOKENS.contains(&code.as_str());
        let text = &segment.text_compact;
        if LABEL_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
            continue;
        }
        let overlap = span_overlap_ratio((segment.x0, segment.x1), target_range);
        if overlap <= 0.0 {
            continue;
        }

        let mut penalty = 0.0f32;
        if text.chars().count() > code.chars().count() + 12 {
            penalty += 120.0;
        }
        if (contains_japanese(text) || text.contains(':') || text.contains('：'))
            && !(is_product_code || is_special)
        {
            penalty += 80.0;
        }
        if segment.row_y > 3000.0 {
            penalty += 200.0;
        }
        penalty += (1.0 - overlap) * CODE_OVERLAP_PENALTY_WEIGHT;

        let seg_center = (segment.x0 + segment.x1) / 2.0;
        let score = (seg_center - block_center).abs()
            + (segment.row_y - lower_y).abs() * 2.0
            + penalty;
        candidates.push((score, code, overlap));
    }

    let Some((best_score, best_code, best_overlap)) = candidates
        .into_iter()
        .min_by(|a, b| a.0.total_cmp(&b.0))
    else {
        return String::new();
    };
    let threshold = if best_code.contains("商品コード:") {
        PRODUCT_CODE_ASSIGN_MAX_SCORE
    } else {
        CODE_ASSIGN_MAX_SCORE
    };
    if best_score > threshold {
        // Allow a high-overlap candidate just over the line: the frame's
        // code sometimes sits far from the block center but dead inside it.
        if !best_code.contains("商品コード:")
            && best_overlap >= CODE_ASSIGN_SOFT_MIN_OVERLAP
            && best_score <= threshold + CODE_ASSIGN_SOFT_MARGIN
        {
            return best_code;
        }
        return String::new();
    }
    best_code
}

// ---------------------------------------------------------------------------
// titles
// ---------------------------------------------------------------------------

/// Normalize a title: strip row numbers, marker prefixes, bullets, and
/// repair known truncations.
pub fn normalize_title(title: &str) -> String {
    let mut normalized = title.trim_matches(|c| "[]|".contains(c)).to_string();
    normalized = LEADING_ROW_NUMBER.replace(&normalized, "").into_owned();
    normalized = LEADING_MARKER_JA.replace(&normalized, "$1").into_owned();
    normalized = LEADING_LETTERS_JA.replace(&normalized, "$1").into_owned();
    normalized = LEADING_BULLETS.replace(&normalized, "").into_owned();
    normalized = normalized
        .trim_start_matches(['|', '・', '@'])
        .to_string();
    normalized = SPEAKER_FIX.replace_all(&normalized, "スピーカー$1").into_owned();
    normalized = normalized
        .replace('(', "（")
        .replace(')', "）")
        .replace('+', "＋");
    normalized.trim().to_string()
}

/// Split a compact title into chunks at header markers (A1, B12, ...).
/// Returns empty when fewer than two markers exist.
fn title_chunks_from_compact(compact: &str) -> Vec<String> {
    let markers: Vec<regex::Match<'_>> = HEADER_MARKER_PATTERN.find_iter(compact).collect();
    if markers.len() < 2 {
        return vec![];
    }
    let mut chunks: Vec<String> = vec![];
    for (idx, marker) in markers.iter().enumerate() {
        let start = marker.start();
        let end = markers
            .get(idx + 1)
            .map(|next| next.start())
            .unwrap_or(compact.len());
        let raw = &compact[start..end];
        let cleaned = HEADER_MARKER_PATTERN
            .replace(raw, "")
            .trim_matches(|c| " |・".contains(c))
            .to_string();
        if !cleaned.is_empty() {
            chunks.push(cleaned);
        }
    }
    chunks
}

/// Resolve the title text for one block when a shared title segment spans
/// several side-by-side frames: pick the chunk whose position matches the
/// block's center.
fn resolve_title_text_for_block(title_segment: &Segment, block: &TableBlock) -> String {
    let compact = &title_segment.text_compact;
    let chunks = title_chunks_from_compact(compact);
    if chunks.is_empty() {
        return normalize_title(compact);
    }
    let seg_width = (title_segment.x1 - title_segment.x0).max(1.0);
    let block_center = (block.x0 + block.x1) / 2.0;
    let ratio = ((block_center - title_segment.x0) / seg_width).clamp(0.0, 0.999_999);
    let index = ((ratio * chunks.len() as f32) as usize).min(chunks.len() - 1);
    normalize_title(&chunks[index])
}

/// Nudge a character-index split point toward the nearest known word start.
fn snap_split_boundary(chars: &[char], index: usize) -> usize {
    if index == 0 || index >= chars.len() {
        return index;
    }
    const KEYWORDS: [&str; 6] = [
        "セキュリティ",
        "ロビーインターホン",
        "住戸",
        "マグネット",
        "カメラ",
        "電源",
    ];
    let text: String = chars.iter().collect();
    let mut best = index;
    let mut best_distance = 999usize;
    for keyword in KEYWORDS {
        let mut search_from = 0usize;
        while let Some(byte_pos) = text[search_from..].find(keyword) {
            let abs_byte = search_from + byte_pos;
            let char_pos = text[..abs_byte].chars().count();
            let distance = char_pos.abs_diff(index);
            if distance < best_distance && distance <= 10 {
                best = char_pos;
                best_distance = distance;
            }
            search_from = abs_byte + keyword.len();
        }
    }
    best
}

/// Split one title segment's text across multiple assigned blocks by the
/// x-ratio of each inter-block gap, snapping to word boundaries. Falls back
/// to giving the first block everything when the split quality is poor.
fn split_title_text_by_blocks(
    title_segment: &Segment,
    blocks: &[&TableBlock],
) -> BTreeMap<(u32, i64, i64, i64), String> {
    let mut map: BTreeMap<(u32, i64, i64, i64), String> = BTreeMap::new();
    if blocks.is_empty() {
        return map;
    }
    let mut ordered: Vec<&TableBlock> = blocks.to_vec();
    ordered.sort_by(|a, b| a.x0.total_cmp(&b.x0));

    let source_text = normalize_title(&title_segment.text_compact);
    let chars: Vec<char> = source_text.chars().collect();
    if ordered.len() == 1 || chars.is_empty() {
        map.insert(ordered[0].key(), source_text);
        for block in &ordered[1..] {
            map.insert(block.key(), String::new());
        }
        return map;
    }

    let seg_width = (title_segment.x1 - title_segment.x0).max(1.0);
    let mut boundaries: Vec<usize> = vec![0];
    for pair in ordered.windows(2) {
        let split_x = (pair[0].x1 + pair[1].x0) / 2.0;
        let ratio = ((split_x - title_segment.x0) / seg_width).clamp(0.0, 1.0);
        boundaries.push((ratio * chars.len() as f32).round() as usize);
    }
    boundaries.push(chars.len());
    for idx in 1..boundaries.len() - 1 {
        boundaries[idx] = snap_split_boundary(&chars, boundaries[idx]);
    }
    for idx in 1..boundaries.len() {
        if boundaries[idx] <= boundaries[idx - 1] {
            boundaries[idx] = (boundaries[idx - 1] + 1).min(chars.len());
        }
    }
    let last = boundaries.len() - 1;
    boundaries[last] = chars.len();

    let mut parts: Vec<String> = vec![];
    for (idx, block) in ordered.iter().enumerate() {
        let start = boundaries[idx].min(chars.len());
        let end = if idx == ordered.len() - 1 {
            chars.len()
        } else {
            boundaries[idx + 1].min(chars.len())
        };
        let chunk: String = chars[start..end].iter().collect();
        let part = normalize_title(chunk.trim());
        map.insert(block.key(), part.clone());
        parts.push(part);
    }

    // Poor split quality: avoid destructive splitting.
    if parts.iter().any(|part| part.chars().count() < 4) {
        map.clear();
        map.insert(ordered[0].key(), source_text);
        for block in &ordered[1..] {
            map.insert(block.key(), String::new());
        }
    }
    map
}

fn filter_extreme_wide_blocks(parsed: Vec<ParsedBlock>) -> Vec<ParsedBlock> {
    if parsed.len() < 2 {
        return parsed;
    }
    let mut widths: Vec<f32> = parsed
        .iter()
        .map(|p| (p.block.x1 - p.block.x0).max(1.0))
        .collect();
    let mut sorted_widths = widths.clone();
    sorted_widths.sort_by(f32::total_cmp);
    let median = sorted_widths[sorted_widths.len() / 2];
    let max_width = median * TABLE_MAX_WIDTH_RATIO;
    let mut result: Vec<ParsedBlock> = vec![];
    for (parsed_block, width) in parsed.into_iter().zip(widths.drain(..)) {
        if width <= max_width {
            result.push(parsed_block);
        }
    }
    result
}

struct ParsedBlock {
    block: TableBlock,
    pairs: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// reading order and refinement
// ---------------------------------------------------------------------------

/// Sort frame rows in reading order: per page, band rows by top y (running
/// mean within [`READING_ORDER_Y_BAND`]), then left to right inside each
/// band.
pub fn sort_frame_rows_in_reading_order(rows: Vec<FrameRow>) -> Vec<FrameRow> {
    let mut ordered = rows;
    ordered.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.top.total_cmp(&b.top))
            .then(a.x0.total_cmp(&b.x0))
    });
    if ordered.is_empty() {
        return ordered;
    }

    let mut grouped: BTreeMap<u32, Vec<FrameRow>> = BTreeMap::new();
    for row in ordered {
        grouped.entry(row.page).or_default().push(row);
    }

    let mut result: Vec<FrameRow> = vec![];
    for (_, page_rows) in grouped {
        let mut bands: Vec<(f32, f32)> = vec![]; // (running mean y, count)
        let mut keys: Vec<(usize, f32, f32)> = vec![];
        for row in &page_rows {
            let mut band_index = None;
            for (idx, band) in bands.iter_mut().enumerate() {
                if (row.top - band.0).abs() <= READING_ORDER_Y_BAND {
                    band.0 = (band.0 * band.1 + row.top) / (band.1 + 1.0);
                    band.1 += 1.0;
                    band_index = Some(idx);
                    break;
                }
            }
            let band_index = band_index.unwrap_or_else(|| {
                bands.push((row.top, 1.0));
                bands.len() - 1
            });
            keys.push((band_index, row.x0, row.top));
        }

        let mut indexed: Vec<(usize, FrameRow)> = page_rows.into_iter().enumerate().collect();
        indexed.sort_by(|(a, _), (b, _)| {
            keys[*a]
                .0
                .cmp(&keys[*b].0)
                .then(keys[*a].1.total_cmp(&keys[*b].1))
                .then(keys[*a].2.total_cmp(&keys[*b].2))
        });
        result.extend(indexed.into_iter().map(|(_, row)| row));
    }
    result
}

/// Mounting-reference frames (取付参考例) describe installation examples,
/// not devices: their code and pairs are cleared, and truncated titles are
/// promoted from a sibling sensor frame on the same band.
fn refine_titles_for_reference_rows(rows: &mut [FrameRow]) {
    for row in rows.iter_mut() {
        row.title = normalize_title(&row.title);
    }

    let snapshot: Vec<(u32, f32, f32, String)> = rows
        .iter()
        .map(|row| (row.page, row.top, row.x0, row.title.clone()))
        .collect();

    for row in rows.iter_mut() {
        let note_text: String = row.pairs.iter().map(|(_, value)| value.as_str()).collect();
        if row.title.contains("取付参考例") {
            row.code.clear();
            row.pairs.clear();
            continue;
        }
        if !note_text.contains("取付") {
            continue;
        }

        let siblings: Vec<&(u32, f32, f32, String)> = snapshot
            .iter()
            .filter(|(page, top, x0, title)| {
                *page == row.page
                    && title.starts_with("マグネットセンサー")
                    && (top - row.top).abs() <= 220.0
                    && *x0 < row.x0
            })
            .collect();
        let should_promote = row.title == "マグネットセンサー"
            || row.title.contains("通線孔")
            || row.title.ends_with("ボックス");
        if should_promote && !siblings.is_empty() {
            let sibling = siblings
                .iter()
                .min_by(|a, b| (a.2 - row.x0).abs().total_cmp(&(b.2 - row.x0).abs()))
                .expect("non-empty");
            row.title = format!("{}取付参考例", sibling.3);
        } else if should_promote && row.title == "マグネットセンサー" {
            row.title = "マグネットセンサー取付参考例".to_string();
        }
        if row.title.contains("取付参考例") {
            row.code.clear();
            row.pairs.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// assembly
// ---------------------------------------------------------------------------

/// Assemble frame rows from a page's segments.
///
/// `title_segments` comes from a tighter x-gap split so side-by-side titles
/// stay separate; when absent, `segments` doubles as the title source.
pub fn build_frame_rows_from_segments(
    segments: &[Segment],
    title_segments: Option<&[Segment]>,
) -> Vec<FrameRow> {
    let table_segments: Vec<Segment> = segments
        .iter()
        .filter(|s| is_table_segment(s))
        .cloned()
        .collect();
    let mut blocks = cluster_table_segments(&table_segments);
    attach_continuation_segments(&mut blocks, segments);

    let title_source = title_segments.unwrap_or(segments);
    let all_title_candidates: Vec<&Segment> = title_source
        .iter()
        .filter(|s| is_title_candidate(s))
        .collect();
    let code_segments: Vec<&Segment> = segments
        .iter()
        .filter(|s| !find_code_in_segment(s).is_empty())
        .collect();
    let code_row_centers = header_row_centers_from_codes(&code_segments);
    let title_candidates =
        filter_title_candidates_by_header_rows(&all_title_candidates, &code_row_centers);

    let mut parsed_blocks: Vec<ParsedBlock> = vec![];
    for block in blocks.iter() {
        let (pairs, label_count) = extract_pairs_from_block(block);
        if label_count >= TABLE_MIN_LABEL_COUNT {
            parsed_blocks.push(ParsedBlock {
                block: block.clone(),
                pairs,
            });
        }
    }
    let mut parsed_blocks = filter_extreme_wide_blocks(parsed_blocks);
    parsed_blocks.sort_by(|a, b| {
        a.block
            .page
            .cmp(&b.block.page)
            .then(a.block.top.total_cmp(&b.block.top))
            .then(a.block.x0.total_cmp(&b.block.x0))
    });

    // First pass: pick a title segment per block; a segment picked by
    // several side-by-side blocks will be split between them.
    let mut title_segment_by_block: BTreeMap<(u32, i64, i64, i64), Segment> = BTreeMap::new();
    let mut assignments: Vec<(Segment, Vec<&TableBlock>)> = vec![];
    for parsed in &parsed_blocks {
        let block = &parsed.block;
        let title_segment = pick_title_for_block(block, &title_candidates, 0.15)
            .or_else(|| pick_title_for_block(block, &all_title_candidates, 0.05));
        let Some(title_segment) = title_segment else {
            continue;
        };
        title_segment_by_block.insert(block.key(), title_segment.clone());
        match assignments
            .iter_mut()
            .find(|(seg, _)| seg.signature() == title_segment.signature())
        {
            Some((_, assigned)) => assigned.push(block),
            None => assignments.push((title_segment.clone(), vec![block])),
        }
    }

    let mut split_title_by_block: BTreeMap<(u32, i64, i64, i64), String> = BTreeMap::new();
    for (title_segment, assigned_blocks) in &assignments {
        if assigned_blocks.len() == 1 {
            let block = assigned_blocks[0];
            split_title_by_block
                .insert(block.key(), resolve_title_text_for_block(title_segment, block));
        } else {
            split_title_by_block.extend(split_title_text_by_blocks(title_segment, assigned_blocks));
        }
    }

    let mut frame_rows: Vec<FrameRow> = vec![];
    let mut used_titles: Vec<(u32, i64, i64, String)> = vec![];
    for parsed in &parsed_blocks {
        let block = &parsed.block;
        let block_key = block.key();
        let mut title_segment = title_segment_by_block.get(&block_key).cloned();
        let mut title = split_title_by_block.get(&block_key).cloned().unwrap_or_default();
        if let Some(segment) = &title_segment {
            used_titles.push(segment.signature());
        }

        if title.is_empty() {
            let header_y_estimate = estimate_header_y_for_block(block, &code_row_centers);
            let nearby_header_titles: Vec<&Segment> = all_title_candidates
                .iter()
                .copied()
                .filter(|segment| {
                    segment.page == block.page
                        && segment.row_y < block.top
                        && (segment.row_y - header_y_estimate).abs() <= 150.0
                })
                .collect();
            let fallback_pool: &[&Segment] = if nearby_header_titles.is_empty() {
                &all_title_candidates
            } else {
                &nearby_header_titles
            };
            if let Some(fallback) = pick_title_for_block(block, fallback_pool, 0.02) {
                title = resolve_title_text_for_block(fallback, block);
                used_titles.push(fallback.signature());
                title_segment = Some(fallback.clone());
            }
        }

        let mut code = match &title_segment {
            Some(segment) => pick_code_for_title(block, segment.row_y, &code_segments),
            None => String::new(),
        };
        if code.is_empty() {
            if let Some(segment) = &title_segment {
                code = pick_code_for_anchor(
                    block.page,
                    block.x0,
                    block.x1,
                    segment.row_y,
                    segment.row_y + 220.0,
                    &code_segments,
                    80.0,
                    120.0,
                    0.35,
                );
            }
        }

        if title.is_empty() {
            continue;
        }
        frame_rows.push(FrameRow {
            page: block.page,
            top: block.top,
            x0: block.x0,
            title,
            code,
            pairs: parsed.pairs.clone(),
        });
    }

    // Fallback: a sheet with no label blocks at all may still carry titled,
    // coded frames (pictogram-only pages). Skipped whenever table-based
    // frames were found to avoid unrelated large-frame pickup.
    if frame_rows.is_empty() {
        for segment in &title_candidates {
            if used_titles.contains(&segment.signature()) {
                continue;
            }
            let code = pick_code_for_anchor(
                segment.page,
                segment.x0,
                segment.x1,
                segment.row_y,
                segment.row_y + 260.0,
                &code_segments,
                200.0,
                300.0,
                0.01,
            );
            if code.is_empty() {
                let lone_title = title_candidates.len() == 1;
                let no_blocks = blocks.is_empty();
                let no_codes = code_segments.is_empty();
                if !(lone_title && no_blocks && no_codes) {
                    continue;
                }
            }
            frame_rows.push(FrameRow {
                page: segment.page,
                top: segment.top,
                x0: segment.x0,
                title: normalize_title(&segment.text_compact),
                code,
                pairs: vec![],
            });
        }
    }

    let mut normalized_rows: Vec<FrameRow> = vec![];
    for mut row in frame_rows {
        if row.title.starts_with('[') && row.title.ends_with(']') {
            row.title = row.title.trim_matches(['[', ']']).to_string();
        }
        if row.values().is_empty() {
            continue;
        }
        normalized_rows.push(row);
    }

    refine_titles_for_reference_rows(&mut normalized_rows);

    let mut deduped: Vec<FrameRow> = vec![];
    let mut seen: Vec<(u32, Vec<String>)> = vec![];
    for row in sort_frame_rows_in_reading_order(normalized_rows) {
        let signature = (row.page, row.values());
        if seen.contains(&signature) {
            continue;
        }
        seen.push(signature);
        deduped.push(row);
    }
    deduped
}

// ---------------------------------------------------------------------------
// extractor entry point
// ---------------------------------------------------------------------------

/// Spec-frame extractor.
pub struct FrameExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    options: PageOptions,
    x_gap: f32,
}

impl<'a> FrameExtractor<'a> {
    /// Build an extractor. `x_gap` is the segment split distance; titles
    /// always use the tighter [`TITLE_SEGMENT_X_GAP`].
    pub fn new(ocr: &'a dyn OcrEngine, options: PageOptions, x_gap: f32) -> Self {
        Self { ocr, options, x_gap }
    }

    /// Extract spec frames from a PDF into a ragged CSV.
    pub fn extract(&self, pdf_path: &Path, out_csv: &Path) -> Result<FrameSummary> {
        if !pdf_path.exists() {
            return Err(Error::InputNotFound(pdf_path.to_path_buf()));
        }
        let total_pages = count_pdf_pages(pdf_path)?;
        let target_pages = resolve_target_pages(total_pages, self.options.page)?;

        let work_dir = tempfile::tempdir()?;
        let mut all_rows: Vec<FrameRow> = vec![];
        let mut rows_by_page: BTreeMap<u32, usize> = BTreeMap::new();
        let mut failed_pages: Vec<u32> = vec![];

        for &page in &target_pages {
            let png_path = run_pdftoppm(pdf_path, page, self.options.dpi, work_dir.path())?;
            let page_image = load_page_image(&png_path)?;
            match extract_words(self.ocr, &page_image) {
                Ok(words) => {
                    let segments =
                        build_segments_from_words(&words, page, self.options.y_cluster, self.x_gap);
                    let title_segments = build_segments_from_words(
                        &words,
                        page,
                        self.options.y_cluster,
                        TITLE_SEGMENT_X_GAP,
                    );
                    let page_rows =
                        build_frame_rows_from_segments(&segments, Some(&title_segments));
                    rows_by_page.insert(page, page_rows.len());
                    all_rows.extend(page_rows);
                }
                Err(err) => {
                    log::warn!("page {page}: extraction failed, skipping: {err}");
                    failed_pages.push(page);
                }
            }
        }

        let all_rows = sort_frame_rows_in_reading_order(all_rows);
        let csv_rows: Vec<Vec<String>> = all_rows.iter().map(FrameRow::values).collect();
        let row_count = csv_rows.len();
        write_ragged(out_csv, csv_rows, true)?;

        Ok(FrameSummary {
            rows: row_count,
            output_csv: out_csv.to_path_buf(),
            pages_processed: target_pages.len() - failed_pages.len(),
            target_pages,
            rows_by_page,
            failed_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, page: u32, row_y: f32, x0: f32, x1: f32) -> Segment {
        Segment {
            page,
            row_y,
            x0,
            x1,
            top: row_y - 10.0,
            bottom: row_y + 10.0,
            text: text.to_string(),
            text_compact: compact_text(text),
        }
    }

    #[test]
    fn test_label_value_pairs_basic() {
        let pairs = extract_label_value_pairs("電源電圧DC24V消費電流10mA質量約50g");
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("電源電圧".to_string(), "DC24V".to_string()));
        assert_eq!(pairs[1], ("消費電流".to_string(), "10mA".to_string()));
        assert_eq!(pairs[2], ("質量".to_string(), "約50g".to_string()));
    }

    #[test]
    fn test_label_value_pairs_ocr_repair() {
        let pairs = extract_label_value_pairs("電電源電圧DC24V");
        assert_eq!(pairs, vec![("電源電圧".to_string(), "DC24V".to_string())]);
    }

    #[test]
    fn test_label_value_pairs_none() {
        assert!(extract_label_value_pairs("ただのテキスト").is_empty());
    }

    #[test]
    fn test_find_code_in_segment() {
        let s = segment("GX-8DK", 1, 100.0, 0.0, 80.0);
        assert_eq!(find_code_in_segment(&s), "GX-8DK");

        let s = segment("商品コード: 1234-AB", 1, 100.0, 0.0, 80.0);
        assert_eq!(find_code_in_segment(&s), "商品コード:1234-AB");

        let s = segment("特注品", 1, 100.0, 0.0, 80.0);
        assert_eq!(find_code_in_segment(&s), "特注品");

        let s = segment("ただの名称", 1, 100.0, 0.0, 80.0);
        assert_eq!(find_code_in_segment(&s), "");
    }

    #[test]
    fn test_title_candidacy() {
        assert!(is_title_candidate(&segment(
            "ロビーインターホン",
            1,
            100.0,
            0.0,
            200.0
        )));
        // Codes, units, and excluded terms are not titles.
        assert!(!is_title_candidate(&segment("GX-8DK", 1, 100.0, 0.0, 80.0)));
        assert!(!is_title_candidate(&segment("質量約50g", 1, 100.0, 0.0, 80.0)));
        assert!(!is_title_candidate(&segment("取付参考例", 1, 100.0, 0.0, 80.0)));
        assert!(!is_title_candidate(&segment("ab", 1, 100.0, 0.0, 80.0)));
    }

    #[test]
    fn test_cluster_table_segments_chains_by_overlap() {
        let segments = vec![
            segment("電源電圧DC24V", 1, 100.0, 0.0, 200.0),
            segment("消費電流10mA", 1, 140.0, 10.0, 210.0),
            // Far right: separate frame.
            segment("電源電圧AC100V", 1, 100.0, 800.0, 1000.0),
        ];
        let blocks = cluster_table_segments(&segments);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].segments.len(), 2);
    }

    #[test]
    fn test_normalize_title_strips_markers() {
        assert_eq!(normalize_title("A1ロビーインターホン"), "ロビーインターホン");
        assert_eq!(normalize_title("◎カメラユニット"), "カメラユニット");
        assert_eq!(normalize_title("スピーカ付"), "スピーカー付");
        assert_eq!(normalize_title("3|住戸モニター"), "住戸モニター");
    }

    #[test]
    fn test_frame_rows_from_segments_end_to_end() {
        let segments = vec![
            segment("ロビーインターホン", 1, 60.0, 20.0, 220.0),
            segment("GX-8DK", 1, 100.0, 40.0, 140.0),
            segment("電源電圧DC24V", 1, 160.0, 10.0, 210.0),
            segment("消費電流10mA", 1, 200.0, 10.0, 210.0),
        ];
        let rows = build_frame_rows_from_segments(&segments, None);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.title, "ロビーインターホン");
        assert_eq!(row.code, "GX-8DK");
        assert_eq!(row.pairs.len(), 2);
        let values = row.values();
        assert_eq!(values[0], "ロビーインターホン");
        assert_eq!(values[1], "GX-8DK");
    }

    #[test]
    fn test_reference_rows_cleared() {
        let mut rows = vec![FrameRow {
            page: 1,
            top: 100.0,
            x0: 10.0,
            title: "取付参考例".to_string(),
            code: "GX-1".to_string(),
            pairs: vec![("備考".to_string(), "取付方法".to_string())],
        }];
        refine_titles_for_reference_rows(&mut rows);
        assert!(rows[0].code.is_empty());
        assert!(rows[0].pairs.is_empty());
    }

    #[test]
    fn test_reading_order_bands() {
        let row = |top: f32, x0: f32, title: &str| FrameRow {
            page: 1,
            top,
            x0,
            title: title.to_string(),
            code: String::new(),
            pairs: vec![],
        };
        let rows = vec![
            row(100.0, 600.0, "right-top"),
            row(130.0, 10.0, "left-top"),
            row(400.0, 10.0, "left-bottom"),
        ];
        let sorted = sort_frame_rows_in_reading_order(rows);
        // Same band: left before right despite slightly larger top.
        assert_eq!(sorted[0].title, "left-top");
        assert_eq!(sorted[1].title, "right-top");
        assert_eq!(sorted[2].title, "left-bottom");
    }

    #[test]
    fn test_continuation_attachment() {
        let labeled = segment("備考取付方法", 1, 100.0, 0.0, 200.0);
        let continuation = segment("内部配線は24Vまで", 1, 130.0, 10.0, 190.0);
        let mut blocks = cluster_table_segments(std::slice::from_ref(&labeled));
        attach_continuation_segments(&mut blocks, &[labeled, continuation.clone()]);
        assert_eq!(blocks[0].segments.len(), 2);
    }
}
