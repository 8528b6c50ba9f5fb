//! Luminaire schedule extractor.
//!
//! Reconstructs 器具記号 / メーカー / 相当型番 rows from fixture schedule
//! pages. These schedules are hand-typed: maker and model appear as
//! `MAKER:MODEL`, as free text with no separator, or as a "same as above"
//! notation; multi-line cells leave continuation rows with no symbol of
//! their own; and whole schedules repeat side by side at consistent x
//! offsets with no grid to separate them. Each of those conventions is
//! handled by an explicit, named rule — no single general parser can
//! resolve the ambiguity.

use crate::config::{LineAssistConfig, LineAssistMode, PageOptions};
use crate::error::{Error, Result};
use crate::layout::{
    cluster_by_y, cluster_x_positions, nearest_center_index, RowCluster, WordBox,
};
use crate::lines::{
    build_line_blocks, line_assist_confidence, merge_vertical_lines, section_bounds_from_clusters,
    should_run_line_assist, GateRow, ImageLineDetector, LineAssistOutcome, RejectReason,
    SectionBounds, VectorLineSource,
};
use crate::ocr::{extract_words, OcrEngine};
use crate::output::write_delimited;
use crate::render::{count_pdf_pages, load_page_image, resolve_target_pages, run_pdftoppm};
use crate::text::{compact_text, normalize_dash, normalize_text};
use image::RgbImage;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Output column order — part of the contract consumed by reconciliation.
pub const OUTPUT_COLUMNS: [&str; 3] = ["器具記号", "メーカー", "相当型番"];

/// Emergency-lighting codes excluded from the final schedule. They parse as
/// valid equipment codes but belong to the certification sheet, not the
/// fixture schedule.
const EXCLUDED_EMERGENCY_CODES: [&str; 7] = ["EDL", "EDM", "ECL", "ECM", "ECH", "ES1", "ES2"];

/// Allow-listed symbol prefixes, checked in order.
const CODE_PREFIXES: [&str; 18] = [
    "CD", "CR", "CT", "UK", "WL", "CL", "XC", "X'C", "YC", "Y'C", "DL", "LL", "L", "TP", "GL",
    "SP", "ES", "EC",
];

/// Maximum vertical distance a continuation row may inherit a symbol across.
const PROPAGATION_MAX_DISTANCE: f32 = 120.0;

/// Tolerance for unsupervised block-center clustering.
const BLOCK_CENTER_TOLERANCE: f32 = 220.0;

lazy_static! {
    static ref MODEL_PATTERN: Regex =
        Regex::new(r"\b([A-Z]{2,}(?:\s*-\s*[A-Z0-9]{1,20})+)\b").unwrap();
    static ref MULTIPLIER_SUFFIX_PATTERN: Regex =
        Regex::new(r"^\s*(?:\(\s*[xX×✕]\s*\d+\s*\)|[xX×✕]\s*\d+)").unwrap();
    static ref COLON_MODEL_PATTERN: Regex = Regex::new(
        r"\b([A-Za-z][A-Za-z0-9&._-]{1,30})\s*[:：]\s*([A-Z]{2,}(?:\s*-\s*[A-Z0-9]{1,20})+)"
    )
    .unwrap();
    static ref MAKER_COLON_REST_PATTERN: Regex =
        Regex::new(r"([A-Za-z][A-Za-z0-9&._-]{1,30})\s*[:：]\s*(.+)").unwrap();
    static ref CODE_SUFFIX_PATTERN: Regex = Regex::new(r"^\d{1,2}[A-Z]?$").unwrap();
    static ref CODE_SUFFIX_G_PATTERN: Regex = Regex::new(r"^\d{1,2}G$").unwrap();
    static ref FOOTNOTE_SPLIT_PATTERN: Regex = Regex::new(r"\s+\d+\.\s").unwrap();
    static ref DASH_SPACING_PATTERN: Regex = Regex::new(r"\s*-\s*").unwrap();
    static ref MULTI_SPACE_PATTERN: Regex = Regex::new(r"\s{2,}").unwrap();
    static ref SEPARATOR_SPACING_PATTERN: Regex = Regex::new(r"\s*([,、/／|])\s*").unwrap();
    static ref WATTAGE_PATTERN: Regex = Regex::new(r"(?i)\d+(?:\.\d+)?\s*W").unwrap();
    static ref MODEL_MATCH_STRIP_PATTERN: Regex = Regex::new(r"[\s\-_ー―−–—‐ｰ]+").unwrap();
    static ref DOUJOU_GUARD_PATTERN: Regex =
        Regex::new(r"(ガ[ー-]?ド|犬[-ー]?f|一卡付|卡付|カード|力[ー一-]?[fľł]?付)").unwrap();
    static ref DIGIT_PATTERN: Regex = Regex::new(r"\d").unwrap();
}

/// How a candidate's model text was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// A segment anchored by an equipment code token
    CodedSegment,
    /// A bare `MAKER:MODEL` pair with no code on the row
    ColonPair,
    /// A bare model-shaped token on a wattage row with no code
    BareModel,
}

/// One parsed equipment entry, before output projection.
///
/// `model_x` always reflects where the model-bearing token sits, not the
/// row's leftmost x; continuation rows are matched on model position, not
/// symbol position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCandidate {
    /// 1-based source page
    pub page: u32,
    /// Section (header occurrence) on the page
    pub section_index: usize,
    /// Inferred column block
    pub block_index: usize,
    /// Row-cluster center y
    pub row_y: f32,
    /// Leftmost x of the row's equipment segment
    pub row_x: f32,
    /// X of the model-bearing token
    pub model_x: f32,
    /// Equipment symbol; `None` until continuation propagation resolves it
    pub symbol: Option<String>,
    /// Model text, possibly `MAKER:MODEL`
    pub equivalent_model: String,
    /// Recognition rule that produced this candidate
    pub origin: CandidateOrigin,
}

impl RowCandidate {
    fn gate_row(&self) -> GateRow {
        GateRow {
            row_x: self.row_x,
            model_x: self.model_x,
            has_symbol: self.symbol.as_deref().is_some_and(|s| !s.trim().is_empty()),
            has_model: !self.equivalent_model.trim().is_empty(),
        }
    }
}

/// One final output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuminaireRow {
    /// 器具記号
    pub symbol: String,
    /// メーカー
    pub manufacturer: String,
    /// 相当型番
    pub model: String,
}

/// Run summary returned by [`LuminaireExtractor::extract`].
#[derive(Debug, Clone, Serialize)]
pub struct LuminaireSummary {
    /// Output rows written
    pub rows: usize,
    /// Output column names, in order
    pub columns: Vec<String>,
    /// Output CSV path
    pub output_csv: PathBuf,
    /// Pages actually processed
    pub pages_processed: usize,
    /// 1-based pages that were targeted
    pub target_pages: Vec<u32>,
    /// Candidate rows per page
    pub rows_by_page: BTreeMap<u32, usize>,
    /// Pages skipped after a per-page failure
    pub failed_pages: Vec<u32>,
}

// ---------------------------------------------------------------------------
// token classification
// ---------------------------------------------------------------------------

fn normalize_code_token(value: &str) -> String {
    let normalized = normalize_text(value).replace('’', "'").replace('`', "'");
    normalized
        .trim_matches(|c| "[](){}<>|,.;".contains(c))
        .to_string()
}

/// Whether a token is a valid equipment code.
///
/// A lone block letter (`L`, `D`, ...) is NOT a standalone symbol: the
/// prefix must be followed by a 1–2 digit suffix, optionally one letter or
/// a `G` guard marker.
pub fn is_equipment_code_token(value: &str) -> bool {
    let token = normalize_code_token(value);
    if token.is_empty() {
        return false;
    }
    let upper = token.to_uppercase();
    if EXCLUDED_EMERGENCY_CODES.contains(&upper.as_str()) {
        return true;
    }
    for prefix in CODE_PREFIXES {
        let Some(suffix) = upper.strip_prefix(prefix) else {
            continue;
        };
        if suffix.is_empty() {
            return false;
        }
        if CODE_SUFFIX_PATTERN.is_match(suffix) || CODE_SUFFIX_G_PATTERN.is_match(suffix) {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// model text cleanup
// ---------------------------------------------------------------------------

/// Clean extracted model text: fold dash variants, drop trailing numbered
/// footnotes and 。-terminated prose, tighten spacing around hyphens.
/// Multiplier annotations (×2, (x3)) are preserved upstream because they
/// carry the equipment count.
pub fn cleanup_model_text(value: &str) -> String {
    let mut text = normalize_dash(value);
    if let Some(found) = FOOTNOTE_SPLIT_PATTERN.find(&text) {
        text.truncate(found.start());
    }
    if let Some(pos) = text.find('。') {
        text.truncate(pos);
    }
    let text = text.trim_matches(|c| " |[]".contains(c));
    let text = DASH_SPACING_PATTERN.replace_all(text, "-");
    let text = MULTI_SPACE_PATTERN.replace_all(&text, " ");
    text.trim().to_string()
}

fn append_multiplier_suffix(text: &str, model: &str, model_end: usize) -> String {
    let suffix = MULTIPLIER_SUFFIX_PATTERN
        .find(&text[model_end..])
        .map(|m| m.as_str())
        .unwrap_or("");
    cleanup_model_text(&format!("{model}{suffix}"))
}

fn normalize_for_model_matching(value: &str) -> String {
    let upper = normalize_text(value).to_uppercase();
    MODEL_MATCH_STRIP_PATTERN.replace_all(&upper, "").into_owned()
}

fn is_emergency_certification_model(model: &str) -> bool {
    let normalized = normalize_for_model_matching(model);
    !normalized.is_empty()
        && normalized.starts_with("LALE")
        && DIGIT_PATTERN.is_match(&normalized)
}

fn should_skip_output_row(symbol: &str, model: &str) -> bool {
    if model.is_empty() {
        return true;
    }
    let compact_symbol = compact_text(symbol).to_uppercase();
    if EXCLUDED_EMERGENCY_CODES.contains(&compact_symbol.as_str()) {
        return true;
    }
    is_emergency_certification_model(model)
}

fn strip_times_marker_from_model(value: &str) -> String {
    let normalized = normalize_text(value);
    let normalized = MULTI_SPACE_PATTERN.replace_all(&normalized, " ");
    let normalized = SEPARATOR_SPACING_PATTERN.replace_all(&normalized, " $1 ");
    let normalized = MULTI_SPACE_PATTERN.replace_all(&normalized, " ");
    normalized
        .trim_matches(|c| " ,、/／|".contains(c))
        .to_string()
}

/// Split a stored `MAKER:MODEL` value into its parts. A value without a
/// colon has no manufacturer.
pub fn split_equivalent_model(value: &str) -> (String, String) {
    let text = normalize_text(value).trim().replace('：', ":");
    match text.split_once(':') {
        Some((maker, model)) => (maker.trim().to_string(), strip_times_marker_from_model(model)),
        None => (String::new(), strip_times_marker_from_model(&text)),
    }
}

/// Normalize the various OCR misreadings of the "same as above" notation.
///
/// Returns an empty string when the text is not a 同上 marker at all; the
/// guard-attachment suffix is detected by a secondary keyword match over
/// known misrecognitions (カード, 犬-F, 卡付, ...).
pub fn normalize_doujou_model(segment_text: &str) -> String {
    let compact = compact_text(segment_text).to_lowercase();
    if !compact.contains("同上") {
        return String::new();
    }
    if DOUJOU_GUARD_PATTERN.is_match(&compact) {
        return "同上ガード付".to_string();
    }
    "同上".to_string()
}

// ---------------------------------------------------------------------------
// row-level candidate extraction
// ---------------------------------------------------------------------------

/// Map a byte position in `tokens.join(" ")` back to a token index.
///
/// Empty-token rows map to 0; an out-of-range position maps to the last
/// token rather than surprising fallback-to-first behavior.
fn byte_pos_to_token_index(tokens: &[String], byte_pos: usize) -> usize {
    let mut cursor = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        let next_cursor = cursor + token.len();
        if (cursor..next_cursor).contains(&byte_pos) {
            return idx;
        }
        cursor = next_cursor + 1;
    }
    tokens.len().saturating_sub(1)
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

struct RowContext<'a> {
    words: Vec<&'a WordBox>,
    tokens: Vec<String>,
}

impl<'a> RowContext<'a> {
    fn from_cluster(cluster: &'a RowCluster) -> Self {
        let words = cluster.words_by_x();
        let tokens = words
            .iter()
            .map(|w| normalize_dash(w.text.trim()))
            .collect();
        Self { words, tokens }
    }

    fn joined(&self) -> String {
        self.tokens.join(" ")
    }
}

/// A candidate before page/section stamping.
#[derive(Debug, Clone)]
struct ParsedCandidate {
    row_x: f32,
    model_x: f32,
    symbol: Option<String>,
    equivalent_model: String,
    origin: CandidateOrigin,
}

fn extract_maker_and_model(segment_text: &str) -> Option<(String, String, usize)> {
    let captures = MAKER_COLON_REST_PATTERN.captures(segment_text)?;
    let maker = captures.get(1)?;
    let model = cleanup_model_text(captures.get(2)?.as_str());
    Some((maker.as_str().trim().to_string(), model, maker.start()))
}

fn extract_model_without_colon_with_start(segment_text: &str) -> Option<(String, usize)> {
    let text = cleanup_model_text(segment_text);
    let captures = MODEL_PATTERN.captures(&text)?;
    let matched = captures.get(1)?;
    Some((
        append_multiplier_suffix(&text, matched.as_str(), matched.end()),
        matched.start(),
    ))
}

/// Continuation rows sometimes carry only `MAKER:MODEL` text. No wattage
/// guard here on purpose: such rows still need extraction.
fn extract_colon_model_only_candidates(row: &RowContext<'_>) -> Vec<ParsedCandidate> {
    if row.words.len() < 2 {
        return vec![];
    }
    let row_text = row.joined();
    let mut candidates: Vec<ParsedCandidate> = vec![];
    let mut seen: Vec<(usize, String)> = vec![];
    for captures in COLON_MODEL_PATTERN.captures_iter(&row_text) {
        let (Some(maker), Some(model_match)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let maker_text = maker.as_str().trim();
        let model = append_multiplier_suffix(&row_text, model_match.as_str(), model_match.end());
        if maker_text.is_empty() || model.is_empty() {
            continue;
        }
        let equivalent_model = format!("{maker_text}:{model}");
        let token_index = byte_pos_to_token_index(&row.tokens, maker.start());
        let key = (token_index, equivalent_model.clone());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        let x = round2(row.words[token_index].bbox.x0);
        candidates.push(ParsedCandidate {
            row_x: x,
            model_x: x,
            symbol: None,
            equivalent_model,
            origin: CandidateOrigin::ColonPair,
        });
    }
    candidates
}

/// Bare model tokens on a row that mentions a wattage; used for
/// continuation rows whose code column is blank.
fn extract_model_only_candidates(row: &RowContext<'_>) -> Vec<ParsedCandidate> {
    if row.words.len() < 2 {
        return vec![];
    }
    let row_text = row.joined();
    if !WATTAGE_PATTERN.is_match(&row_text) {
        return vec![];
    }
    let mut candidates: Vec<ParsedCandidate> = vec![];
    let mut seen: Vec<(usize, String)> = vec![];
    for captures in MODEL_PATTERN.captures_iter(&row_text) {
        let Some(matched) = captures.get(1) else {
            continue;
        };
        let model = append_multiplier_suffix(&row_text, matched.as_str(), matched.end());
        if model.is_empty() {
            continue;
        }
        let token_index = byte_pos_to_token_index(&row.tokens, matched.start());
        let key = (token_index, model.clone());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        let x = round2(row.words[token_index].bbox.x0);
        candidates.push(ParsedCandidate {
            row_x: x,
            model_x: x,
            symbol: None,
            equivalent_model: model,
            origin: CandidateOrigin::BareModel,
        });
    }
    candidates
}

/// Parse one row cluster into candidate records.
///
/// Rows are segmented at each equipment-code token; each segment yields at
/// most one candidate. Rows without any code fall back to the colon-pair
/// rule, then the bare-model rule.
pub fn extract_candidates_from_cluster(cluster: &RowCluster) -> Vec<RowCandidate> {
    let row = RowContext::from_cluster(cluster);
    if row.words.is_empty() {
        return vec![];
    }

    let code_indexes: Vec<usize> = row
        .tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| is_equipment_code_token(token))
        .map(|(idx, _)| idx)
        .collect();

    let parsed: Vec<ParsedCandidate> = if code_indexes.is_empty() {
        let has_colon_token = row.tokens.iter().any(|t| t.contains(':') || t.contains('：'));
        let mut fallback = vec![];
        if has_colon_token {
            fallback = extract_colon_model_only_candidates(&row);
        }
        if fallback.is_empty() {
            fallback = extract_model_only_candidates(&row);
        }
        fallback
    } else {
        let mut segments = vec![];
        for (position, &code_start) in code_indexes.iter().enumerate() {
            let code_end = code_indexes
                .get(position + 1)
                .copied()
                .unwrap_or(row.tokens.len());
            if let Some(candidate) = parse_code_segment(&row, code_start, code_end) {
                segments.push(candidate);
            }
        }
        segments
    };

    parsed
        .into_iter()
        .map(|candidate| RowCandidate {
            page: 0,
            section_index: 0,
            block_index: 0,
            row_y: round2(cluster.row_y),
            row_x: candidate.row_x,
            model_x: candidate.model_x,
            symbol: candidate.symbol,
            equivalent_model: candidate.equivalent_model,
            origin: candidate.origin,
        })
        .collect()
}

fn parse_code_segment(
    row: &RowContext<'_>,
    code_start: usize,
    code_end: usize,
) -> Option<ParsedCandidate> {
    let segment_tokens = &row.tokens[code_start..code_end];
    let segment_text = segment_tokens.join(" ").trim().to_string();
    if segment_text.is_empty() {
        return None;
    }

    let symbol = normalize_code_token(&segment_tokens[0]);
    let row_x = round2(row.words[code_start].bbox.x0);
    let mut model_x = row_x;
    let mut equivalent_model = String::new();

    if segment_text.contains(':') || segment_text.contains('：') {
        if let Some((maker, model, maker_start)) = extract_maker_and_model(&segment_text) {
            if !maker.is_empty() && !model.is_empty() {
                equivalent_model = format!("{maker}:{model}");
                let maker_token_index = byte_pos_to_token_index(segment_tokens, maker_start);
                model_x = round2(row.words[code_start + maker_token_index].bbox.x0);
            } else if !model.is_empty() {
                equivalent_model = model;
            }
        }
    } else {
        let remainder = segment_tokens[1..].join(" ");
        equivalent_model = normalize_doujou_model(&remainder);
        if equivalent_model.is_empty() {
            if let Some((model, model_start)) = extract_model_without_colon_with_start(&remainder) {
                equivalent_model = model;
                let model_token_index =
                    1 + byte_pos_to_token_index(&segment_tokens[1..], model_start);
                if code_start + model_token_index < row.words.len() {
                    model_x = round2(row.words[code_start + model_token_index].bbox.x0);
                }
            }
        }
    }

    if equivalent_model.is_empty() {
        return None;
    }
    Some(ParsedCandidate {
        row_x,
        model_x,
        symbol: Some(symbol),
        equivalent_model,
        origin: CandidateOrigin::CodedSegment,
    })
}

// ---------------------------------------------------------------------------
// block assignment and continuation propagation
// ---------------------------------------------------------------------------

/// Assign every candidate the index of its nearest block center.
///
/// With no centers at all every candidate lands in block 0; no candidate is
/// ever dropped here.
pub fn assign_block_indexes(candidates: &mut [RowCandidate], x_centers: &[f32]) {
    for row in candidates.iter_mut() {
        row.block_index = nearest_center_index(row.row_x, x_centers).unwrap_or(0);
    }
}

fn has_symbol(candidate: &RowCandidate) -> bool {
    candidate.symbol.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Propagate equipment symbols into continuation rows within one section.
///
/// Pure transformation: the input is untouched and a new vector is
/// returned, so the confidence gate can run it twice (baseline vs
/// line-derived block assignment) without cross-run mutation artifacts.
///
/// Rows are grouped by exact `row_y`. A group with no symbol at all
/// inherits from the nearest prior symbol-bearing group within
/// [`PROPAGATION_MAX_DISTANCE`]; beyond that the rows stay unresolved
/// rather than inheriting a distant, unrelated symbol. Equal-sized groups
/// map positionally; unequal sizes fall back to nearest-`model_x` matching
/// without replacement. A final per-block forward fill catches rows no
/// group-level rule matched.
pub fn propagate_symbols(candidates: &[RowCandidate]) -> Vec<RowCandidate> {
    let mut rows: Vec<RowCandidate> = candidates.to_vec();

    // Group indexes by exact row_y (candidates round to 2dp on creation).
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry((row.row_y * 100.0).round() as i64).or_default().push(idx);
    }
    let group_list: Vec<(f32, Vec<usize>)> = groups
        .into_iter()
        .map(|(key, mut indexes)| {
            indexes.sort_by(|&a, &b| rows[a].row_x.total_cmp(&rows[b].row_x));
            (key as f32 / 100.0, indexes)
        })
        .collect();

    for position in 0..group_list.len() {
        let (y, ref current) = group_list[position];
        if current.iter().any(|&idx| has_symbol(&rows[idx])) {
            continue;
        }

        let mut source: Option<(f32, Vec<usize>)> = None;
        for (prev_y, prev_indexes) in group_list[..position].iter().rev() {
            let bearing: Vec<usize> = prev_indexes
                .iter()
                .copied()
                .filter(|&idx| has_symbol(&rows[idx]))
                .collect();
            if !bearing.is_empty() {
                source = Some((*prev_y, bearing));
                break;
            }
        }
        let Some((source_y, source_indexes)) = source else {
            continue;
        };
        if (y - source_y).abs() > PROPAGATION_MAX_DISTANCE {
            continue;
        }

        // Snapshot the source fields before mutating the targets.
        let sources: Vec<(Option<String>, usize, f32)> = source_indexes
            .iter()
            .map(|&idx| {
                (
                    rows[idx].symbol.clone(),
                    rows[idx].block_index,
                    rows[idx].model_x,
                )
            })
            .collect();

        if current.len() == sources.len() {
            for (&target_idx, source) in current.iter().zip(sources.iter()) {
                rows[target_idx].symbol = source.0.clone();
                rows[target_idx].block_index = source.1;
                rows[target_idx].model_x = source.2;
            }
        } else {
            let mut available: Vec<usize> = (0..sources.len()).collect();
            let all_sources: Vec<usize> = (0..sources.len()).collect();
            for &target_idx in current {
                let target_model_x = rows[target_idx].model_x;
                // All sources consumed: reuse the full set rather than
                // leaving the row unresolved.
                let pool: &[usize] = if available.is_empty() {
                    &all_sources
                } else {
                    &available
                };
                let Some(&best) = pool.iter().min_by(|&&a, &&b| {
                    (sources[a].2 - target_model_x)
                        .abs()
                        .total_cmp(&(sources[b].2 - target_model_x).abs())
                }) else {
                    continue;
                };
                rows[target_idx].symbol = sources[best].0.clone();
                rows[target_idx].block_index = sources[best].1;
                rows[target_idx].model_x = sources[best].2;
                available.retain(|&idx| idx != best);
            }
        }
    }

    // Second pass: forward fill inside each block in y-order.
    let mut by_block: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        by_block.entry(row.block_index).or_default().push(idx);
    }
    for indexes in by_block.values_mut() {
        indexes.sort_by(|&a, &b| {
            rows[a]
                .row_y
                .total_cmp(&rows[b].row_y)
                .then(rows[a].row_x.total_cmp(&rows[b].row_x))
        });
        let mut last_symbol: Option<String> = None;
        for &idx in indexes.iter() {
            if has_symbol(&rows[idx]) {
                last_symbol = rows[idx].symbol.clone();
            } else if last_symbol.is_some() {
                rows[idx].symbol = last_symbol.clone();
            }
        }
    }

    rows
}

/// Count rows carrying a model but no resolved symbol.
pub fn count_unresolved_symbols(candidates: &[RowCandidate]) -> usize {
    candidates
        .iter()
        .filter(|row| !row.equivalent_model.trim().is_empty() && !has_symbol(row))
        .count()
}

/// Mean distance between each row's `model_x` and its block's model
/// centroid. Lower is better aligned.
pub fn average_model_block_alignment(candidates: &[RowCandidate]) -> f32 {
    let mut by_block: BTreeMap<usize, Vec<f32>> = BTreeMap::new();
    for row in candidates {
        by_block.entry(row.block_index).or_default().push(row.model_x);
    }
    if by_block.is_empty() {
        return 0.0;
    }
    let centers: BTreeMap<usize, f32> = by_block
        .iter()
        .map(|(&block, xs)| (block, xs.iter().sum::<f32>() / xs.len() as f32))
        .collect();

    let distances: Vec<f32> = candidates
        .iter()
        .filter_map(|row| centers.get(&row.block_index).map(|c| (row.model_x - c).abs()))
        .collect();
    if distances.is_empty() {
        return 0.0;
    }
    distances.iter().sum::<f32>() / distances.len() as f32
}

// ---------------------------------------------------------------------------
// line-assist gate
// ---------------------------------------------------------------------------

/// Run line detection over a section and adopt the refined block
/// assignment only when it measurably improves resolution quality.
#[allow(clippy::too_many_arguments)]
pub fn apply_line_assist_if_confident(
    section_candidates: &mut [RowCandidate],
    section_bounds: &SectionBounds,
    baseline_x_centers: &[f32],
    page_image: &RgbImage,
    page_number: u32,
    vector_source: &dyn VectorLineSource,
    image_detector: &dyn ImageLineDetector,
    config: &LineAssistConfig,
) -> LineAssistOutcome {
    if section_candidates.is_empty() {
        return LineAssistOutcome::not_invoked(RejectReason::NoSectionCandidates);
    }

    let started = Instant::now();
    let page_px = (page_image.width(), page_image.height());
    let vector_scan = vector_source.vertical_lines(page_number, section_bounds, page_px);
    let image_scan = image_detector.vertical_lines(
        page_image,
        section_bounds,
        config.latency_budget_ms,
        started,
    );
    if let Some(note) = &image_scan.note {
        log::debug!("line-assist image source degraded: {note}");
    }

    let merged = merge_vertical_lines(
        &vector_scan.positions,
        &image_scan.positions,
        config.tuning.merge_tolerance,
    );
    let line_blocks = build_line_blocks(
        &merged,
        (section_bounds.x_min, section_bounds.x_max),
        &config.tuning,
    );

    let gate_rows: Vec<GateRow> = section_candidates.iter().map(RowCandidate::gate_row).collect();
    let confidence = line_assist_confidence(
        &gate_rows,
        &line_blocks,
        vector_scan.positions.len(),
        image_scan.positions.len(),
        baseline_x_centers.len(),
        &config.tuning,
    );

    let mut outcome = LineAssistOutcome {
        invoked: true,
        adopted: false,
        confidence,
        rejected_reason: None,
        trigger_reasons: vec![],
        vector_line_count: vector_scan.positions.len(),
        image_line_count: image_scan.positions.len(),
        line_block_count: line_blocks.len(),
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    };

    if confidence < config.min_confidence {
        outcome.rejected_reason = Some(RejectReason::ConfidenceBelowThreshold);
        return outcome;
    }
    if line_blocks.is_empty() {
        outcome.rejected_reason = Some(RejectReason::NoLineBlocks);
        return outcome;
    }

    let block_centers: Vec<f32> = line_blocks.iter().map(|&(l, r)| (l + r) / 2.0).collect();

    let baseline_rows = propagate_symbols(section_candidates);
    let baseline_unresolved = count_unresolved_symbols(&baseline_rows);
    let baseline_alignment = average_model_block_alignment(&baseline_rows);

    let mut assisted_rows: Vec<RowCandidate> = section_candidates.to_vec();
    assign_block_indexes(&mut assisted_rows, &block_centers);
    let assisted_rows = propagate_symbols(&assisted_rows);
    let assisted_unresolved = count_unresolved_symbols(&assisted_rows);
    let assisted_alignment = average_model_block_alignment(&assisted_rows);

    let unresolved_improved = assisted_unresolved < baseline_unresolved;
    let alignment_improved =
        assisted_alignment + config.tuning.alignment_gain_margin < baseline_alignment;
    // A refinement must never lose resolved rows: an alignment gain does
    // not excuse a higher unresolved count.
    if assisted_unresolved > baseline_unresolved
        || (!unresolved_improved && !alignment_improved)
    {
        outcome.rejected_reason = Some(RejectReason::NoQualityGain);
        return outcome;
    }

    for (row, assisted) in section_candidates.iter_mut().zip(assisted_rows.iter()) {
        row.block_index = assisted.block_index;
    }
    outcome.adopted = true;
    outcome.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    outcome
}

// ---------------------------------------------------------------------------
// header detection and page flow
// ---------------------------------------------------------------------------

/// Whether a row of text is a luminaire schedule header.
pub fn is_header_row(row_text: &str) -> bool {
    let text = compact_text(row_text);
    text.contains("相当型番") && text.contains("器具記")
}

/// Parse one page's word boxes into stamped candidate rows.
///
/// This is the per-page core: header/section detection, per-row token
/// segmentation, unsupervised block assignment, optional line-assist
/// refinement, continuation propagation.
#[allow(clippy::too_many_arguments)]
pub fn extract_page_candidates(
    words: &[WordBox],
    page_number: u32,
    page_image: &RgbImage,
    y_cluster: f32,
    vector_source: &dyn VectorLineSource,
    image_detector: &dyn ImageLineDetector,
    config: &LineAssistConfig,
    outcomes: &mut Vec<LineAssistOutcome>,
) -> Vec<RowCandidate> {
    let clusters = cluster_by_y(words, y_cluster);
    let header_indexes: Vec<usize> = clusters
        .iter()
        .enumerate()
        .filter(|(_, cluster)| is_header_row(&cluster.row_text()))
        .map(|(idx, _)| idx)
        .collect();
    if header_indexes.is_empty() {
        log::debug!(
            "page {page_number}: no schedule header among {} clusters",
            clusters.len()
        );
        return vec![];
    }

    let mut candidates: Vec<RowCandidate> = vec![];
    for (section_index, &header_index) in header_indexes.iter().enumerate() {
        let next_header_index = header_indexes
            .get(section_index + 1)
            .copied()
            .unwrap_or(clusters.len());
        let section_clusters = &clusters[header_index + 1..next_header_index];

        let mut section_candidates: Vec<RowCandidate> = vec![];
        for cluster in section_clusters {
            for mut candidate in extract_candidates_from_cluster(cluster) {
                candidate.page = page_number;
                candidate.section_index = section_index;
                section_candidates.push(candidate);
            }
        }

        let mut x_values: Vec<f32> = section_candidates
            .iter()
            .filter(|row| has_symbol(row))
            .map(|row| row.row_x)
            .collect();
        if x_values.is_empty() {
            x_values = section_candidates.iter().map(|row| row.row_x).collect();
        }
        let x_centers = cluster_x_positions(&x_values, BLOCK_CENTER_TOLERANCE);
        assign_block_indexes(&mut section_candidates, &x_centers);

        let section_bounds = section_bounds_from_clusters(
            section_clusters,
            page_image.width(),
            page_image.height(),
        );

        let gate_rows: Vec<GateRow> =
            section_candidates.iter().map(RowCandidate::gate_row).collect();
        let (should_run, trigger_reasons) = match config.mode {
            LineAssistMode::Force => (true, vec!["forced"]),
            LineAssistMode::Auto => {
                should_run_line_assist(&gate_rows, &x_centers, &section_bounds, &config.tuning)
            }
            LineAssistMode::Off => (false, vec![]),
        };

        let mut outcome = if should_run {
            apply_line_assist_if_confident(
                &mut section_candidates,
                &section_bounds,
                &x_centers,
                page_image,
                page_number,
                vector_source,
                image_detector,
                config,
            )
        } else {
            LineAssistOutcome::not_invoked(RejectReason::ModeOffOrNotTriggered)
        };
        outcome.trigger_reasons = trigger_reasons;
        if config.debug {
            log::debug!(
                "page {page_number} section {section_index}: line-assist adopted={} confidence={:.2} reason={:?}",
                outcome.adopted,
                outcome.confidence,
                outcome.rejected_reason
            );
        }
        outcomes.push(outcome);

        candidates.extend(propagate_symbols(&section_candidates));
    }
    candidates
}

/// Project candidates into final output rows.
///
/// Sorting by (page, section, block, row_y, row_x) is the stable total
/// order downstream reconciliation relies on; running this twice on the
/// same candidate set yields identical output regardless of input order.
pub fn build_output_rows(candidates: &[RowCandidate]) -> Vec<LuminaireRow> {
    let mut sorted: Vec<&RowCandidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.section_index.cmp(&b.section_index))
            .then(a.block_index.cmp(&b.block_index))
            .then(a.row_y.total_cmp(&b.row_y))
            .then(a.row_x.total_cmp(&b.row_x))
    });

    let mut rows: Vec<LuminaireRow> = vec![];
    for candidate in sorted {
        let (manufacturer, model) = split_equivalent_model(candidate.equivalent_model.trim());
        let symbol = candidate.symbol.clone().unwrap_or_default().trim().to_string();
        if should_skip_output_row(&symbol, &model) {
            continue;
        }
        rows.push(LuminaireRow {
            symbol,
            manufacturer,
            model,
        });
    }
    rows
}

// ---------------------------------------------------------------------------
// extractor entry point
// ---------------------------------------------------------------------------

/// Per-run diagnostics report, written as JSON when a diagnostics
/// directory is configured.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    /// Input PDF path
    pub input_pdf: PathBuf,
    /// Line-assist configuration in effect
    pub line_assist: LineAssistConfig,
    /// Per-section line-assist outcomes across the run
    pub line_assist_outcomes: Vec<LineAssistOutcome>,
    /// Candidate rows before output filtering
    pub candidate_rows_total: usize,
    /// Rows written to the CSV
    pub output_rows_total: usize,
}

/// Luminaire schedule extractor with its injected collaborators.
pub struct LuminaireExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    image_detector: &'a dyn ImageLineDetector,
    line_assist: LineAssistConfig,
    options: PageOptions,
    diagnostics_dir: Option<PathBuf>,
}

impl<'a> LuminaireExtractor<'a> {
    /// Build an extractor from its collaborators and configuration.
    pub fn new(
        ocr: &'a dyn OcrEngine,
        image_detector: &'a dyn ImageLineDetector,
        line_assist: LineAssistConfig,
        options: PageOptions,
    ) -> Self {
        Self {
            ocr,
            image_detector,
            line_assist,
            options,
            diagnostics_dir: None,
        }
    }

    /// Write a JSON diagnostics report into `dir` after each run.
    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    /// Extract the schedule from a PDF into a CSV.
    ///
    /// Pages are processed independently: a page whose OCR or parse fails
    /// is logged and skipped, and the remaining pages still complete. Input
    /// errors (missing file, page out of range, rasterization failure)
    /// abort the file.
    pub fn extract(&self, pdf_path: &Path, out_csv: &Path) -> Result<LuminaireSummary> {
        if !pdf_path.exists() {
            return Err(Error::InputNotFound(pdf_path.to_path_buf()));
        }
        let vector_source = crate::lines::PdfVectorLines::open(pdf_path)?;
        let total_pages = count_pdf_pages(pdf_path)?;
        let target_pages = resolve_target_pages(total_pages, self.options.page)?;

        let work_dir = tempfile::tempdir()?;
        let mut candidates: Vec<RowCandidate> = vec![];
        let mut rows_by_page: BTreeMap<u32, usize> = BTreeMap::new();
        let mut failed_pages: Vec<u32> = vec![];
        let mut outcomes: Vec<LineAssistOutcome> = vec![];

        for &page in &target_pages {
            let png_path = run_pdftoppm(pdf_path, page, self.options.dpi, work_dir.path())?;
            let page_image = load_page_image(&png_path)?;
            let page_candidates = match extract_words(self.ocr, &page_image) {
                Ok(words) => extract_page_candidates(
                    &words,
                    page,
                    &page_image,
                    self.options.y_cluster,
                    &vector_source,
                    self.image_detector,
                    &self.line_assist,
                    &mut outcomes,
                ),
                Err(err) => {
                    log::warn!("page {page}: extraction failed, skipping: {err}");
                    failed_pages.push(page);
                    continue;
                }
            };
            rows_by_page.insert(page, page_candidates.len());
            candidates.extend(page_candidates);
        }

        let rows = build_output_rows(&candidates);
        write_delimited(
            out_csv,
            &OUTPUT_COLUMNS,
            rows.iter()
                .map(|row| vec![row.symbol.clone(), row.manufacturer.clone(), row.model.clone()]),
            true,
        )?;

        if let Some(dir) = &self.diagnostics_dir {
            let report = DiagnosticsReport {
                input_pdf: pdf_path.to_path_buf(),
                line_assist: self.line_assist.clone(),
                line_assist_outcomes: outcomes,
                candidate_rows_total: candidates.len(),
                output_rows_total: rows.len(),
            };
            std::fs::create_dir_all(dir)?;
            let report_path = dir.join("luminaire_diagnostics.json");
            std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;
            log::info!("wrote diagnostics to {}", report_path.display());
        }

        Ok(LuminaireSummary {
            rows: rows.len(),
            columns: OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect(),
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
    use crate::geometry::Rect;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
        WordBox::new(text, Rect::new(x0, y0, x1, y1))
    }

    fn cluster_of(words: Vec<WordBox>) -> RowCluster {
        let mut iter = words.into_iter();
        let mut cluster = RowCluster::seed(iter.next().unwrap());
        for w in iter {
            cluster.push(w);
        }
        cluster
    }

    fn candidate(
        symbol: Option<&str>,
        model: &str,
        row_y: f32,
        row_x: f32,
        model_x: f32,
        block: usize,
    ) -> RowCandidate {
        RowCandidate {
            page: 1,
            section_index: 0,
            block_index: block,
            row_y,
            row_x,
            model_x,
            symbol: symbol.map(|s| s.to_string()),
            equivalent_model: model.to_string(),
            origin: CandidateOrigin::CodedSegment,
        }
    }

    #[test]
    fn test_equipment_code_token_recognition() {
        assert!(is_equipment_code_token("CT12"));
        assert!(is_equipment_code_token("TP2"));
        assert!(is_equipment_code_token("DL9"));
        assert!(is_equipment_code_token("CT2G"));
        assert!(is_equipment_code_token("L1"));
        // A bare prefix letter is a block placeholder, not a symbol.
        assert!(!is_equipment_code_token("L"));
        assert!(!is_equipment_code_token("CT"));
        assert!(!is_equipment_code_token("ZZ9"));
        assert!(!is_equipment_code_token(""));
    }

    #[test]
    fn test_cleanup_model_preserves_multiplier_strips_footnote() {
        assert_eq!(
            cleanup_model_text("TAD - ELT7W1-146J27-24A ×6"),
            "TAD-ELT7W1-146J27-24A ×6"
        );
        assert_eq!(cleanup_model_text("LZD-93039 1. 注記あり"), "LZD-93039");
    }

    #[test]
    fn test_doujou_normalization_with_guard() {
        assert_eq!(normalize_doujou_model("同上 犬-F 付"), "同上ガード付");
        assert_eq!(normalize_doujou_model("同上"), "同上");
        assert_eq!(normalize_doujou_model("DAIKO"), "");
    }

    #[test]
    fn test_coded_segment_with_colon_pair() {
        let cluster = cluster_of(vec![
            word("CT12", 10.0, 100.0, 60.0, 120.0),
            word("DAIKO", 122.0, 100.0, 180.0, 120.0),
            word(":", 182.0, 100.0, 186.0, 120.0),
            word("DSY-4394YWG", 190.0, 100.0, 320.0, 120.0),
        ]);
        let candidates = extract_candidates_from_cluster(&cluster);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.symbol.as_deref(), Some("CT12"));
        let (maker, model) = split_equivalent_model(&c.equivalent_model);
        assert_eq!(maker, "DAIKO");
        assert_eq!(model, "DSY-4394YWG");
        assert_eq!(c.origin, CandidateOrigin::CodedSegment);
    }

    #[test]
    fn test_model_x_tracks_model_token() {
        let cluster = cluster_of(vec![
            word("CT1", 10.0, 100.0, 50.0, 120.0),
            word("ダウンライト", 60.0, 100.0, 160.0, 120.0),
            word("DAIKO:LZD-93039", 500.0, 100.0, 700.0, 120.0),
        ]);
        let candidates = extract_candidates_from_cluster(&cluster);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].row_x, 10.0);
        assert_eq!(candidates[0].model_x, 500.0);
    }

    #[test]
    fn test_colon_only_row_yields_unsymboled_candidate() {
        let cluster = cluster_of(vec![
            word("DAIKO", 500.0, 140.0, 560.0, 160.0),
            word(":", 562.0, 140.0, 566.0, 160.0),
            word("LZA-93039", 570.0, 140.0, 680.0, 160.0),
        ]);
        let candidates = extract_candidates_from_cluster(&cluster);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].symbol.is_none());
        assert_eq!(candidates[0].equivalent_model, "DAIKO:LZA-93039");
    }

    #[test]
    fn test_bare_model_requires_wattage() {
        let no_wattage = cluster_of(vec![
            word("some", 0.0, 0.0, 40.0, 20.0),
            word("XG-1234", 50.0, 0.0, 130.0, 20.0),
        ]);
        assert!(extract_candidates_from_cluster(&no_wattage).is_empty());

        let with_wattage = cluster_of(vec![
            word("9.5W", 0.0, 0.0, 40.0, 20.0),
            word("XG-1234", 50.0, 0.0, 130.0, 20.0),
        ]);
        let candidates = extract_candidates_from_cluster(&with_wattage);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].equivalent_model, "XG-1234");
    }

    #[test]
    fn test_header_row_detection() {
        assert!(is_header_row("器具記号 名称 相当型番"));
        assert!(!is_header_row("器具記号 名称"));
        assert!(!is_header_row("相当型番"));
    }

    #[test]
    fn test_propagation_same_count_positional() {
        let input = vec![
            candidate(Some("CT1"), "A:M-100", 100.0, 10.0, 10.0, 0),
            candidate(Some("TP2"), "B:M-200", 100.0, 500.0, 500.0, 1),
            candidate(None, "A:M-101", 140.0, 12.0, 12.0, 0),
            candidate(None, "B:M-201", 140.0, 505.0, 505.0, 1),
        ];
        let result = propagate_symbols(&input);
        assert_eq!(result[2].symbol.as_deref(), Some("CT1"));
        assert_eq!(result[3].symbol.as_deref(), Some("TP2"));
        // Input untouched (pure transformation).
        assert!(input[2].symbol.is_none());
    }

    #[test]
    fn test_propagation_refuses_beyond_max_distance() {
        let input = vec![
            candidate(Some("CT1"), "A:M-100", 100.0, 10.0, 10.0, 0),
            candidate(None, "A:M-101", 300.0, 10.0, 10.0, 0),
        ];
        // Separate block so forward fill does not apply.
        let mut input = input;
        input[1].block_index = 1;
        let result = propagate_symbols(&input);
        assert!(result[1].symbol.is_none());
    }

    #[test]
    fn test_propagation_unequal_counts_nearest_model_x() {
        let input = vec![
            candidate(Some("CT1"), "A:M-100", 100.0, 10.0, 10.0, 0),
            candidate(Some("TP2"), "B:M-200", 100.0, 500.0, 500.0, 1),
            candidate(None, "B:M-201", 140.0, 498.0, 498.0, 1),
        ];
        let result = propagate_symbols(&input);
        // Single continuation row matches the nearer model_x source (TP2).
        assert_eq!(result[2].symbol.as_deref(), Some("TP2"));
    }

    #[test]
    fn test_propagation_forward_fill_within_block() {
        let input = vec![
            candidate(Some("GL3"), "A:M-100", 100.0, 10.0, 10.0, 0),
            candidate(Some("CT9"), "C:M-900", 130.0, 480.0, 480.0, 1),
            // Same row as a symbol-bearing row, so group-level propagation
            // skips the group; forward fill must still resolve it.
            candidate(None, "A:M-101", 130.0, 12.0, 12.0, 0),
        ];
        let result = propagate_symbols(&input);
        assert_eq!(result[2].symbol.as_deref(), Some("GL3"));
    }

    #[test]
    fn test_emergency_rows_filtered_from_output() {
        let input = vec![
            candidate(Some("EDL"), "P:LZ-1", 100.0, 10.0, 10.0, 0),
            candidate(Some("CT1"), "P:LALE-123", 130.0, 10.0, 10.0, 0),
            candidate(Some("CT2"), "P:LZD-93039", 160.0, 10.0, 10.0, 0),
        ];
        let rows = build_output_rows(&input);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "CT2");
    }

    #[test]
    fn test_output_rows_deterministic_under_input_order() {
        let a = candidate(Some("CT1"), "P:M-1", 100.0, 10.0, 10.0, 0);
        let b = candidate(Some("CT2"), "P:M-2", 130.0, 10.0, 10.0, 0);
        let c = candidate(Some("TP1"), "P:M-3", 100.0, 500.0, 500.0, 1);
        let forward = build_output_rows(&[a.clone(), b.clone(), c.clone()]);
        let backward = build_output_rows(&[c, b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_block_assignment_total_coverage() {
        let mut candidates = vec![
            candidate(Some("CT1"), "P:M-1", 100.0, 10.0, 10.0, 9),
            candidate(None, "P:M-2", 130.0, 700.0, 700.0, 9),
        ];
        assign_block_indexes(&mut candidates, &[0.0, 650.0]);
        assert_eq!(candidates[0].block_index, 0);
        assert_eq!(candidates[1].block_index, 1);

        // Empty centers still assign every record a block.
        assign_block_indexes(&mut candidates, &[]);
        assert!(candidates.iter().all(|c| c.block_index == 0));
    }

    #[test]
    fn test_split_equivalent_model_without_colon() {
        let (maker, model) = split_equivalent_model("LZD-93039");
        assert_eq!(maker, "");
        assert_eq!(model, "LZD-93039");
    }

    #[test]
    fn test_fullwidth_colon_split() {
        let (maker, model) = split_equivalent_model("DAIKO：LZD-93039");
        assert_eq!(maker, "DAIKO");
        assert_eq!(model, "LZD-93039");
    }
}
