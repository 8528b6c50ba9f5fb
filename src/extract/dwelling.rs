//! In-dwelling luminaire extractor.
//!
//! Dwelling pages carry a titled pictorial section (住戸内照明器具姿図)
//! rather than a headed table: equipment codes sit on an anchor strip just
//! below the title, and maker/model text floats under each pictogram. The
//! extractor locates the section by its title row, recovers the anchor
//! codes (including OCR-split ones like `D` + `1`), parses maker/model
//! pairs out of free row text, and attributes unsymboled pairs to the
//! nearest anchor by x position.

use crate::config::PageOptions;
use crate::error::{Error, Result};
use crate::layout::{cluster_by_y, cluster_x_positions, nearest_center_index, RowCluster, WordBox};
use crate::ocr::{extract_words, OcrEngine};
use crate::output::write_delimited;
use crate::render::{count_pdf_pages, load_page_image, resolve_target_pages, run_pdftoppm};
use crate::text::{compact_text, normalize_dash, normalize_text};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Output column order — shared contract with the luminaire schedule.
pub const OUTPUT_COLUMNS: [&str; 3] = ["器具記号", "メーカー", "相当型番"];

/// Max horizontal distance a pair may sit from its anchor code.
const ANCHOR_MAX_DISTANCE: f32 = 520.0;

/// Max gap between an OCR-split code letter and its digits.
const SPLIT_CODE_MAX_GAP: f32 = 20.0;

/// Anchor strip height below the section title.
const ANCHOR_STRIP_HEIGHT: f32 = 120.0;

/// Block clustering tolerance for this layout.
const BLOCK_CENTER_TOLERANCE: f32 = 260.0;

lazy_static! {
    static ref EQUIPMENT_CODE_PATTERN: Regex = Regex::new(r"^[A-Z]\d{1,2}$").unwrap();
    static ref EQUIPMENT_LABEL_PATTERN: Regex =
        Regex::new(r"^(?P<code>[A-Z]\d{1,2})(?:\((?P<suffix>[^()]+)\))?$").unwrap();
    static ref SINGLE_LETTER_PATTERN: Regex = Regex::new(r"^[A-Z]$").unwrap();
    static ref DIGITS_PATTERN: Regex = Regex::new(r"^\d{1,2}$").unwrap();
    static ref WATTAGE_ONLY_PATTERN: Regex = Regex::new(r"(?i)^\d+(?:\.\d+)?W$").unwrap();
    static ref LED_WATTAGE_PATTERN: Regex = Regex::new(r"(?i)^LED\d+(?:\.\d+)?W$").unwrap();
    static ref WIRING_PREFIX_PATTERN: Regex = Regex::new(r"^(?:PF|VVF|SCV)[0-9A-Z.-]*$").unwrap();
    static ref DIGIT_ANYWHERE: Regex = Regex::new(r"\d").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DASH_SPACING: Regex = Regex::new(r"\s*-\s*").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s{2,}").unwrap();
    // Model tokens: dash-joined alphanumeric runs, or a long uppercase run.
    static ref EQ_COLON_MAKER_MODEL: Regex = Regex::new(concat!(
        r"\b(?P<eq>[A-Z]\d{1,2})\s*(?P<eq_suffix>\([^)]+\))?\s*[:：]\s*",
        r"(?P<maker>[A-Za-z][A-Za-z0-9&._-]{1,30})\s+",
        r"(?P<model>(?:[A-Z0-9]+(?:\s*-\s*[A-Z0-9]+)+|[A-Z]{2,}[A-Z0-9]{3,}))"
    ))
    .unwrap();
    static ref MAKER_COLON_MODEL: Regex = Regex::new(concat!(
        r"\b(?P<maker>[A-Za-z][A-Za-z0-9&._-]{1,30})\s*[:：]\s*",
        r"(?P<model>(?:[A-Z0-9]+(?:\s*-\s*[A-Z0-9]+)+|[A-Z]{2,}[A-Z0-9]{3,}))"
    ))
    .unwrap();
    static ref MAKER_SPACE_MODEL: Regex = Regex::new(concat!(
        r"\b(?P<maker>[A-Za-z][A-Za-z0-9&._-]{1,30})\s+",
        r"(?P<model>(?:[A-Z0-9]+(?:\s*-\s*[A-Z0-9]+)+|[A-Z]{2,}[A-Z0-9]{3,}))"
    ))
    .unwrap();
}

/// An equipment-code anchor from the strip below the section title.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentAnchor {
    /// Left x of the anchor token
    pub x: f32,
    /// Raw recombined token text
    pub raw: String,
    /// Validated equipment code; empty for a lone block letter, which must
    /// never be treated as a standalone symbol
    pub equipment: String,
}

/// One parsed maker/model pair, possibly still unattributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellingCandidate {
    /// 1-based source page
    pub page: u32,
    /// Inferred column block
    pub block_index: usize,
    /// Row-cluster center y
    pub row_y: f32,
    /// Left x of the pair's first token
    pub row_x: f32,
    /// Equipment label, e.g. `L1(L1500)`; `None` until anchor assignment
    pub symbol: Option<String>,
    /// Manufacturer
    pub maker: String,
    /// Model text
    pub model: String,
}

/// Run summary returned by [`DwellingExtractor::extract`].
#[derive(Debug, Clone, Serialize)]
pub struct DwellingSummary {
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

fn normalize_token(value: &str) -> String {
    let token = normalize_dash(value).to_uppercase();
    token
        .trim_matches(|c| "[](){}<>|,.;:'\"".contains(c))
        .to_string()
}

fn is_equipment_code(value: &str) -> bool {
    EQUIPMENT_CODE_PATTERN.is_match(&normalize_token(value))
}

/// Validate and canonicalize an equipment label like `L1` or `L1(L1500)`.
///
/// Returns an empty string for anything that is not a code with an
/// optional parenthesized suffix.
pub fn normalize_equipment_label(value: &str) -> String {
    let text = WHITESPACE
        .replace_all(&normalize_dash(value).to_uppercase(), "")
        .into_owned();
    let Some(captures) = EQUIPMENT_LABEL_PATTERN.captures(&text) else {
        return String::new();
    };
    let code = captures.name("code").map(|m| m.as_str()).unwrap_or("");
    let suffix = captures
        .name("suffix")
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    if suffix.is_empty() {
        code.to_string()
    } else {
        format!("{code}({suffix})")
    }
}

fn is_symbol_like(value: &str) -> bool {
    SINGLE_LETTER_PATTERN.is_match(&normalize_token(value))
}

fn cleanup_model(value: &str) -> String {
    let text = normalize_dash(value);
    let text = DASH_SPACING.replace_all(&text, "-");
    let text = text.trim_matches(|c| " |[](){}<>,.;".contains(c));
    MULTI_SPACE.replace_all(text, " ").trim().to_string()
}

fn is_likely_maker(value: &str) -> bool {
    let maker = normalize_text(value).trim().to_string();
    if maker.is_empty() || is_equipment_code(&maker) {
        return false;
    }
    maker.chars().count() >= 3
}

/// Reject tokens that look like models but are wiring specs (`VVF...`),
/// bare wattages, or LED wattage labels.
fn is_likely_model(value: &str) -> bool {
    let model = cleanup_model(value).to_uppercase();
    if model.chars().count() < 4 {
        return false;
    }
    if !DIGIT_ANYWHERE.is_match(&model) {
        return false;
    }
    if WIRING_PREFIX_PATTERN.is_match(&model) {
        return false;
    }
    if WATTAGE_ONLY_PATTERN.is_match(&model) {
        return false;
    }
    if LED_WATTAGE_PATTERN.is_match(&model) {
        return false;
    }
    true
}

/// Whether a row is the section title.
pub fn is_section_title(value: &str) -> bool {
    let compact = compact_text(value);
    compact.contains("住戸内") && compact.contains("照明器具姿図")
}

/// Words belonging to the pictorial section, plus the title row's y.
///
/// Returns an empty list when no title row is found on the page.
pub fn extract_section_words(words: &[WordBox], y_cluster: f32) -> (Vec<WordBox>, f32) {
    let clusters = cluster_by_y(words, y_cluster);
    let Some(title) = clusters
        .iter()
        .find(|cluster| is_section_title(&cluster.row_text()))
    else {
        return (vec![], 0.0);
    };

    let x_min = title
        .words
        .iter()
        .map(|w| w.bbox.x0)
        .fold(f32::MAX, f32::min)
        - 20.0;
    let y_min = title.row_y - 20.0;
    let y_max = title.row_y + 520.0;
    let section: Vec<WordBox> = words
        .iter()
        .filter(|w| w.bbox.x0 >= x_min && (y_min..=y_max).contains(&w.cy))
        .cloned()
        .collect();
    (section, title.row_y)
}

/// Detect equipment-code anchors in the strip below the title.
///
/// OCR may split a code like `D1` into two tokens `D` and `1`; adjacent
/// letter+digit tokens are recombined when the gap between them is small.
/// A lone block letter is recorded as an anchor position but contributes no
/// symbol.
pub fn detect_anchors(clusters: &[RowCluster], title_y: f32) -> Vec<EquipmentAnchor> {
    let mut anchors: Vec<EquipmentAnchor> = vec![];
    let mut seen: Vec<(String, i64)> = vec![];

    for cluster in clusters {
        if cluster.row_y < title_y || cluster.row_y > title_y + ANCHOR_STRIP_HEIGHT {
            continue;
        }
        let words = cluster.words_by_x();
        let mut idx = 0usize;
        while idx < words.len() {
            let token = normalize_token(&words[idx].text);
            let mut raw = token.clone();
            let x = words[idx].bbox.x0;

            if SINGLE_LETTER_PATTERN.is_match(&token) && idx + 1 < words.len() {
                let next_token = normalize_token(&words[idx + 1].text);
                if DIGITS_PATTERN.is_match(&next_token) {
                    let gap = words[idx + 1].bbox.x0 - words[idx].bbox.x1;
                    if gap <= SPLIT_CODE_MAX_GAP {
                        raw = format!("{token}{next_token}");
                        idx += 1;
                    }
                }
            }

            let equipment = if is_equipment_code(&raw) {
                raw.clone()
            } else if is_symbol_like(&raw) {
                String::new()
            } else {
                idx += 1;
                continue;
            };

            let key = (raw.clone(), x.round() as i64);
            if !seen.contains(&key) {
                anchors.push(EquipmentAnchor {
                    x,
                    raw,
                    equipment,
                });
                seen.push(key);
            }
            idx += 1;
        }
    }

    anchors.sort_by(|a, b| a.x.total_cmp(&b.x));
    anchors
}

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

/// Parse maker/model candidates out of one row cluster.
///
/// Tried in order: code-prefixed colon pairs (`L1(L1500):DAIKO MODEL`),
/// then bare `MAKER:MODEL` and `MAKER MODEL` outside the spans already
/// consumed. Note rows (型番は相当品とする, 注記...) are excluded.
pub fn extract_candidates_from_cluster(cluster: &RowCluster) -> Vec<DwellingCandidate> {
    let words = cluster.words_by_x();
    if words.len() < 2 {
        return vec![];
    }

    let tokens: Vec<String> = words
        .iter()
        .map(|w| normalize_dash(w.text.trim()))
        .collect();
    let row_text = tokens.join(" ");
    let compact = compact_text(&row_text);
    if compact.contains("型番は相当品とする") || compact.starts_with("注記") {
        return vec![];
    }

    let mut candidates: Vec<DwellingCandidate> = vec![];
    let mut seen: Vec<(String, String, String, i64)> = vec![];
    let mut occupied: Vec<(usize, usize)> = vec![];

    for captures in EQ_COLON_MAKER_MODEL.captures_iter(&row_text) {
        let eq = captures.name("eq").map(|m| m.as_str().trim()).unwrap_or("");
        let eq_suffix = captures
            .name("eq_suffix")
            .map(|m| m.as_str())
            .unwrap_or("");
        let equipment = normalize_equipment_label(&format!("{eq}{eq_suffix}"));
        let maker = captures
            .name("maker")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let model = captures
            .name("model")
            .map(|m| cleanup_model(&m.as_str().to_uppercase()))
            .unwrap_or_default();
        if equipment.is_empty() || !is_likely_maker(&maker) || !is_likely_model(&model) {
            continue;
        }
        let full = captures.get(0).expect("match");
        let eq_start = captures.name("eq").expect("eq").start();
        let token_index = byte_pos_to_token_index(&tokens, eq_start);
        let row_x = round2(words[token_index].bbox.x0);
        let key = (equipment.clone(), maker.clone(), model.clone(), (row_x * 100.0) as i64);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        occupied.push((full.start(), full.end()));
        candidates.push(DwellingCandidate {
            page: 0,
            block_index: 0,
            row_y: round2(cluster.row_y),
            row_x,
            symbol: Some(equipment),
            maker,
            model,
        });
    }

    for pattern in [&*MAKER_COLON_MODEL, &*MAKER_SPACE_MODEL] {
        for captures in pattern.captures_iter(&row_text) {
            let full = captures.get(0).expect("match");
            if occupied
                .iter()
                .any(|&(start, end)| full.start() < end && full.end() > start)
            {
                continue;
            }
            let maker = captures
                .name("maker")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            let model = captures
                .name("model")
                .map(|m| cleanup_model(&m.as_str().to_uppercase()))
                .unwrap_or_default();
            if !is_likely_maker(&maker) || !is_likely_model(&model) {
                continue;
            }
            let maker_start = captures.name("maker").expect("maker").start();
            let token_index = byte_pos_to_token_index(&tokens, maker_start);
            let row_x = round2(words[token_index].bbox.x0);
            let key = (String::new(), maker.clone(), model.clone(), (row_x * 100.0) as i64);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            candidates.push(DwellingCandidate {
                page: 0,
                block_index: 0,
                row_y: round2(cluster.row_y),
                row_x,
                symbol: None,
                maker,
                model,
            });
        }
    }

    candidates
}

/// Attribute unsymboled candidates to the nearest anchor by x position.
///
/// Beyond [`ANCHOR_MAX_DISTANCE`] the candidate stays unresolved; a
/// placeholder anchor (lone block letter) also resolves to no symbol.
pub fn assign_equipment_from_anchors(
    candidates: &mut [DwellingCandidate],
    anchors: &[EquipmentAnchor],
) {
    if anchors.is_empty() {
        return;
    }
    for row in candidates.iter_mut() {
        if let Some(symbol) = &row.symbol {
            let normalized = normalize_equipment_label(symbol);
            row.symbol = if normalized.is_empty() {
                None
            } else {
                Some(normalized)
            };
            if row.symbol.is_some() {
                continue;
            }
        }
        let Some(nearest) = anchors
            .iter()
            .min_by(|a, b| (a.x - row.row_x).abs().total_cmp(&(b.x - row.row_x).abs()))
        else {
            continue;
        };
        if (nearest.x - row.row_x).abs() > ANCHOR_MAX_DISTANCE {
            row.symbol = None;
            continue;
        }
        row.symbol = if is_equipment_code(&nearest.equipment) {
            Some(nearest.equipment.clone())
        } else {
            None
        };
    }
}

/// Assign block indexes by clustering candidate x positions.
pub fn assign_block_indexes(candidates: &mut [DwellingCandidate]) {
    if candidates.is_empty() {
        return;
    }
    let x_values: Vec<f32> = candidates.iter().map(|row| row.row_x).collect();
    let centers = cluster_x_positions(&x_values, BLOCK_CENTER_TOLERANCE);
    for row in candidates.iter_mut() {
        row.block_index = nearest_center_index(row.row_x, &centers).unwrap_or(0);
    }
}

/// Project candidates into final output rows, sorted by
/// (page, block, row_y, row_x). Pairs with neither maker nor model are
/// dropped.
pub fn build_output_rows(candidates: &[DwellingCandidate]) -> Vec<[String; 3]> {
    let mut sorted: Vec<&DwellingCandidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.block_index.cmp(&b.block_index))
            .then(a.row_y.total_cmp(&b.row_y))
            .then(a.row_x.total_cmp(&b.row_x))
    });

    let mut rows: Vec<[String; 3]> = vec![];
    for candidate in sorted {
        let equipment = candidate
            .symbol
            .as_deref()
            .map(normalize_equipment_label)
            .unwrap_or_default();
        let maker = normalize_text(candidate.maker.trim());
        let model = cleanup_model(candidate.model.trim());
        if maker.is_empty() && model.is_empty() {
            continue;
        }
        rows.push([equipment, maker, model]);
    }
    rows
}

/// Parse one page's word boxes into stamped candidates.
pub fn extract_page_candidates(
    words: &[WordBox],
    page_number: u32,
    y_cluster: f32,
) -> Vec<DwellingCandidate> {
    let (section_words, title_y) = extract_section_words(words, y_cluster);
    if section_words.is_empty() {
        return vec![];
    }

    let clusters = cluster_by_y(&section_words, y_cluster);
    let anchors = detect_anchors(&clusters, title_y);

    let mut candidates: Vec<DwellingCandidate> = vec![];
    for cluster in &clusters {
        if cluster.row_y <= title_y + ANCHOR_STRIP_HEIGHT {
            continue;
        }
        for mut candidate in extract_candidates_from_cluster(cluster) {
            candidate.page = page_number;
            candidates.push(candidate);
        }
    }

    assign_equipment_from_anchors(&mut candidates, &anchors);
    assign_block_indexes(&mut candidates);
    candidates
}

/// In-dwelling luminaire extractor.
pub struct DwellingExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    options: PageOptions,
}

impl<'a> DwellingExtractor<'a> {
    /// Build an extractor from its OCR collaborator and page options.
    pub fn new(ocr: &'a dyn OcrEngine, options: PageOptions) -> Self {
        Self { ocr, options }
    }

    /// Extract the in-dwelling schedule from a PDF into a CSV.
    pub fn extract(&self, pdf_path: &Path, out_csv: &Path) -> Result<DwellingSummary> {
        if !pdf_path.exists() {
            return Err(Error::InputNotFound(pdf_path.to_path_buf()));
        }
        let total_pages = count_pdf_pages(pdf_path)?;
        let target_pages = resolve_target_pages(total_pages, self.options.page)?;

        let work_dir = tempfile::tempdir()?;
        let mut candidates: Vec<DwellingCandidate> = vec![];
        let mut rows_by_page: BTreeMap<u32, usize> = BTreeMap::new();
        let mut failed_pages: Vec<u32> = vec![];

        for &page in &target_pages {
            let png_path = run_pdftoppm(pdf_path, page, self.options.dpi, work_dir.path())?;
            let page_image = load_page_image(&png_path)?;
            match extract_words(self.ocr, &page_image) {
                Ok(words) => {
                    let page_candidates =
                        extract_page_candidates(&words, page, self.options.y_cluster);
                    rows_by_page.insert(page, page_candidates.len());
                    candidates.extend(page_candidates);
                }
                Err(err) => {
                    log::warn!("page {page}: extraction failed, skipping: {err}");
                    failed_pages.push(page);
                }
            }
        }

        let rows = build_output_rows(&candidates);
        write_delimited(
            out_csv,
            &OUTPUT_COLUMNS,
            rows.iter().map(|row| row.to_vec()),
            true,
        )?;

        Ok(DwellingSummary {
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

    #[test]
    fn test_equipment_label_normalization() {
        assert_eq!(normalize_equipment_label("L1"), "L1");
        assert_eq!(normalize_equipment_label("L1(L1500)"), "L1(L1500)");
        assert_eq!(normalize_equipment_label("l1 (L1500)"), "L1(L1500)");
        assert_eq!(normalize_equipment_label("LL12"), "");
        assert_eq!(normalize_equipment_label("D"), "");
    }

    #[test]
    fn test_colon_separated_code_maker_model_scenario() {
        let cluster = cluster_of(vec![
            word("L1", 10.0, 100.0, 40.0, 120.0),
            word("(L1500)", 44.0, 100.0, 110.0, 120.0),
            word(":", 114.0, 100.0, 118.0, 120.0),
            word("DAIKO", 122.0, 100.0, 180.0, 120.0),
            word("DSY-4394YWG", 186.0, 100.0, 320.0, 120.0),
        ]);
        let candidates = extract_candidates_from_cluster(&cluster);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.symbol.as_deref(), Some("L1(L1500)"));
        assert_eq!(c.maker, "DAIKO");
        assert_eq!(c.model, "DSY-4394YWG");
    }

    #[test]
    fn test_split_digit_code_recovery() {
        // "D" + "1" with a 4px gap recombine into D1.
        let near = vec![
            word("D", 100.0, 50.0, 114.0, 70.0),
            word("1", 118.0, 50.0, 126.0, 70.0),
        ];
        let clusters = vec![cluster_of(near)];
        let anchors = detect_anchors(&clusters, 40.0);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].equipment, "D1");

        // The same tokens with a 60px gap must NOT recombine.
        let far = vec![
            word("D", 100.0, 50.0, 114.0, 70.0),
            word("1", 174.0, 50.0, 182.0, 70.0),
        ];
        let clusters = vec![cluster_of(far)];
        let anchors = detect_anchors(&clusters, 40.0);
        // The lone letter is a placeholder anchor with no symbol; the digit
        // is not an anchor at all.
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].equipment, "");
    }

    #[test]
    fn test_anchor_assignment_respects_max_distance() {
        let anchors = vec![EquipmentAnchor {
            x: 100.0,
            raw: "D1".to_string(),
            equipment: "D1".to_string(),
        }];
        let mut candidates = vec![
            DwellingCandidate {
                page: 1,
                block_index: 0,
                row_y: 200.0,
                row_x: 150.0,
                symbol: None,
                maker: "DAIKO".to_string(),
                model: "DSY-1".to_string(),
            },
            DwellingCandidate {
                page: 1,
                block_index: 0,
                row_y: 200.0,
                row_x: 900.0,
                symbol: None,
                maker: "DAIKO".to_string(),
                model: "DSY-2".to_string(),
            },
        ];
        assign_equipment_from_anchors(&mut candidates, &anchors);
        assert_eq!(candidates[0].symbol.as_deref(), Some("D1"));
        assert!(candidates[1].symbol.is_none());
    }

    #[test]
    fn test_note_rows_excluded() {
        let cluster = cluster_of(vec![
            word("注記", 0.0, 0.0, 40.0, 20.0),
            word("型番は相当品とする", 50.0, 0.0, 200.0, 20.0),
        ]);
        assert!(extract_candidates_from_cluster(&cluster).is_empty());
    }

    #[test]
    fn test_model_validators() {
        assert!(is_likely_model("DSY-4394YWG"));
        assert!(!is_likely_model("9.5W"));
        assert!(!is_likely_model("VVF2.0-3C"));
        assert!(!is_likely_model("LED17.6W"));
        assert!(!is_likely_model("AB1")); // too short
    }

    #[test]
    fn test_maker_space_model_fallback() {
        let cluster = cluster_of(vec![
            word("DAIKO", 10.0, 0.0, 70.0, 20.0),
            word("DSY-4394YWG", 80.0, 0.0, 220.0, 20.0),
        ]);
        let candidates = extract_candidates_from_cluster(&cluster);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].symbol.is_none());
        assert_eq!(candidates[0].maker, "DAIKO");
    }

    #[test]
    fn test_section_title_detection() {
        assert!(is_section_title("住戸内 照明器具姿図"));
        assert!(!is_section_title("照明器具姿図"));
    }

    #[test]
    fn test_block_assignment_covers_all() {
        let mut candidates = vec![
            DwellingCandidate {
                page: 1,
                block_index: 99,
                row_y: 10.0,
                row_x: 50.0,
                symbol: None,
                maker: "A".to_string(),
                model: "M-1".to_string(),
            },
            DwellingCandidate {
                page: 1,
                block_index: 99,
                row_y: 10.0,
                row_x: 900.0,
                symbol: None,
                maker: "B".to_string(),
                model: "M-2".to_string(),
            },
        ];
        assign_block_indexes(&mut candidates);
        assert_eq!(candidates[0].block_index, 0);
        assert_eq!(candidates[1].block_index, 1);
    }
}
