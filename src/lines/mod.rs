//! Line-assist: vector/raster vertical line detection with a confidence
//! gate.
//!
//! Unsupervised x-position clustering is the baseline way this crate infers
//! column blocks. When a section looks suspicious — too many unresolved
//! continuation rows, implausibly dense centers, models sitting far from
//! their row starts — the line-assist pass collects vertical line evidence
//! from two independent sources (the PDF's own vector strokes and an
//! optional image detector), scores its confidence in the detected block
//! structure, and hands refined block boundaries back to the extractor.
//!
//! Detection is cheap and often available, but blindly trusting detected
//! lines over the unsupervised heuristic can make results worse when
//! detection itself is noisy. The gate is therefore two-sided: low
//! confidence rejects outright, and even a confident detection is adopted
//! only if it measurably improves row resolution versus the baseline. A
//! rejection is an ordinary logged outcome with a reason code, not an
//! error.

pub mod image;
pub mod vector;

pub use self::image::{default_image_detector, ImageLineDetector, NoopLineDetector};
pub use self::vector::{NoVectorLines, PdfVectorLines, VectorLineSource};

use crate::config::LineAssistTuning;
use crate::layout::RowCluster;
use serde::Serialize;

/// Pixel-space bounds of one table section on a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionBounds {
    /// Left edge
    pub x_min: f32,
    /// Right edge
    pub x_max: f32,
    /// Top edge
    pub y_min: f32,
    /// Bottom edge
    pub y_max: f32,
}

impl SectionBounds {
    /// Width of the section.
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(1.0)
    }
}

/// Bounds of a section's word clusters, padded and clamped to the page.
///
/// Falls back to the whole page when the section has no words.
pub fn section_bounds_from_clusters(
    clusters: &[RowCluster],
    page_width: u32,
    page_height: u32,
) -> SectionBounds {
    let (page_w, page_h) = (page_width as f32, page_height as f32);
    let mut bbox: Option<crate::geometry::Rect> = None;
    for cluster in clusters {
        if let Some(cluster_bbox) = cluster.bbox() {
            bbox = Some(match bbox {
                Some(acc) => acc.union(&cluster_bbox),
                None => cluster_bbox,
            });
        }
    }
    let Some(bbox) = bbox else {
        return SectionBounds {
            x_min: 0.0,
            x_max: page_w,
            y_min: 0.0,
            y_max: page_h,
        };
    };

    let mut x_min = (bbox.x0 - 20.0).max(0.0);
    let mut x_max = (bbox.x1 + 20.0).min(page_w);
    let mut y_min = (bbox.y0 - 14.0).max(0.0);
    let mut y_max = (bbox.y1 + 14.0).min(page_h);
    if x_max <= x_min {
        x_min = 0.0;
        x_max = page_w;
    }
    if y_max <= y_min {
        y_min = 0.0;
        y_max = page_h;
    }
    SectionBounds {
        x_min,
        x_max,
        y_min,
        y_max,
    }
}

/// Result of one detection source: clustered x positions plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct LineScan {
    /// Clustered vertical line x positions (pixel space)
    pub positions: Vec<f32>,
    /// Raw line count before clustering
    pub raw_count: usize,
    /// Wall-clock time spent, in milliseconds
    pub elapsed_ms: f64,
    /// Whether the source aborted on budget exhaustion
    pub timed_out: bool,
    /// Degradation note (capability absent, page unreadable, ...)
    pub note: Option<String>,
}

impl LineScan {
    /// Scan representing a degraded/unavailable source.
    pub fn unavailable(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }
}

/// Minimal per-row projection the gate needs from an extractor's
/// candidates.
#[derive(Debug, Clone, Copy)]
pub struct GateRow {
    /// Leftmost x of the row's equipment segment
    pub row_x: f32,
    /// X of the model-bearing token
    pub model_x: f32,
    /// Whether the row currently carries an equipment symbol
    pub has_symbol: bool,
    /// Whether the row carries model text
    pub has_model: bool,
}

/// Why the gate declined to adopt line-derived blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Section produced no candidates to refine
    NoSectionCandidates,
    /// Mode is off or no trigger heuristic fired
    ModeOffOrNotTriggered,
    /// Confidence score below the configured minimum
    ConfidenceBelowThreshold,
    /// No usable blocks were formed from the detected lines
    NoLineBlocks,
    /// Line-derived assignment did not improve resolution quality
    NoQualityGain,
}

/// Logged outcome of one line-assist pass over one section.
#[derive(Debug, Clone, Serialize)]
pub struct LineAssistOutcome {
    /// Whether detection ran at all
    pub invoked: bool,
    /// Whether line-derived blocks were adopted
    pub adopted: bool,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Rejection reason when not adopted
    pub rejected_reason: Option<RejectReason>,
    /// Names of the trigger heuristics that fired
    pub trigger_reasons: Vec<&'static str>,
    /// Clustered vector line count
    pub vector_line_count: usize,
    /// Clustered image line count
    pub image_line_count: usize,
    /// Usable block count after merging
    pub line_block_count: usize,
    /// Total wall-clock time of the pass, in milliseconds
    pub elapsed_ms: f64,
}

impl LineAssistOutcome {
    /// Outcome for a pass that never ran.
    pub fn not_invoked(reason: RejectReason) -> Self {
        Self {
            invoked: false,
            adopted: false,
            confidence: 0.0,
            rejected_reason: Some(reason),
            trigger_reasons: vec![],
            vector_line_count: 0,
            image_line_count: 0,
            line_block_count: 0,
            elapsed_ms: 0.0,
        }
    }
}

/// Trigger heuristics for `mode = auto`.
///
/// Returns whether to run and the names of the signals that fired. All
/// signals indicate that the unsupervised block assignment may be wrong:
/// (a) many rows have a model but no symbol, (b) block centers sit
/// implausibly close, (c) models sit far from their row starts, (d) a wide
/// section produced almost no rows.
pub fn should_run_line_assist(
    rows: &[GateRow],
    x_centers: &[f32],
    bounds: &SectionBounds,
    tuning: &LineAssistTuning,
) -> (bool, Vec<&'static str>) {
    let mut reasons: Vec<&'static str> = vec![];
    let total = rows.len();
    if total == 0 {
        return (false, reasons);
    }

    let continuation_rows = rows.iter().filter(|r| r.has_model && !r.has_symbol).count();
    let continuation_ratio = continuation_rows as f32 / total.max(1) as f32;
    if continuation_rows >= tuning.continuation_min_rows && continuation_ratio >= tuning.continuation_ratio
    {
        reasons.push("high_continuation_ratio");
    }

    let mut sorted_centers: Vec<f32> = x_centers.to_vec();
    sorted_centers.sort_by(f32::total_cmp);
    if sorted_centers.len() >= 2 {
        let min_gap = sorted_centers
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .fold(f32::MAX, f32::min);
        if min_gap < tuning.dense_center_gap {
            reasons.push("dense_x_centers");
        }
    }

    let cross_model = rows
        .iter()
        .filter(|r| (r.model_x - r.row_x).abs() > tuning.cross_model_offset)
        .count();
    if cross_model >= 2 {
        reasons.push("cross_model_x");
    }

    if total <= 2 && bounds.width() > tuning.sparse_section_width {
        reasons.push("sparse_candidates_in_wide_section");
    }

    (!reasons.is_empty(), reasons)
}

/// Merge vector- and image-derived line positions into one sorted set,
/// clustering positions within `tolerance` of each other.
pub fn merge_vertical_lines(vector: &[f32], image: &[f32], tolerance: f32) -> Vec<f32> {
    let mut merged: Vec<f32> = vector.iter().chain(image.iter()).copied().collect();
    if merged.is_empty() {
        return vec![];
    }
    merged.sort_by(f32::total_cmp);

    let mut clusters: Vec<Vec<f32>> = vec![vec![merged[0]]];
    for &value in &merged[1..] {
        let last = clusters.last_mut().expect("seeded");
        if (value - *last.last().expect("non-empty")).abs() <= tolerance {
            last.push(value);
        } else {
            clusters.push(vec![value]);
        }
    }
    clusters
        .iter()
        .map(|cluster| cluster.iter().sum::<f32>() / cluster.len() as f32)
        .collect()
}

/// Form blocks from the gaps between consecutive merged line positions
/// inside the section's x-range, dropping degenerate blocks narrower than
/// the configured minimum.
pub fn build_line_blocks(
    vertical_xs: &[f32],
    section_x_range: (f32, f32),
    tuning: &LineAssistTuning,
) -> Vec<(f32, f32)> {
    let (x_min, x_max) = section_x_range;
    let mut bounds: Vec<f32> = vec![x_min];
    bounds.extend(vertical_xs.iter().copied().filter(|&x| x >= x_min && x <= x_max));
    bounds.push(x_max);
    bounds.sort_by(f32::total_cmp);

    let mut compact: Vec<f32> = vec![];
    for value in bounds {
        if compact.last().map_or(true, |&last| (value - last).abs() > tuning.merge_tolerance) {
            compact.push(value);
        }
    }

    compact
        .windows(2)
        .filter(|pair| pair[1] - pair[0] >= tuning.min_block_width)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

/// Confidence score for a detected block structure, clamped to `[0, 1]`.
///
/// Weighted sum of: coverage of candidate rows by some block, normalized
/// detected-line count, a bonus for a plausible block count (1–8), and a
/// bonus when the block count roughly agrees with the unsupervised
/// baseline.
pub fn line_assist_confidence(
    rows: &[GateRow],
    line_blocks: &[(f32, f32)],
    vector_line_count: usize,
    image_line_count: usize,
    baseline_center_count: usize,
    tuning: &LineAssistTuning,
) -> f32 {
    if rows.is_empty() || line_blocks.is_empty() {
        return 0.0;
    }

    let coverage_hits = rows
        .iter()
        .filter(|row| {
            line_blocks
                .iter()
                .any(|&(left, right)| (left - 8.0) <= row.row_x && row.row_x <= (right + 8.0))
        })
        .count();
    let coverage = coverage_hits as f32 / rows.len().max(1) as f32;

    let line_strength = (((vector_line_count + image_line_count) as f32) / 8.0).min(1.0);
    let block_count_score = if (1..=8).contains(&line_blocks.len()) {
        1.0
    } else {
        0.3
    };
    let baseline_alignment =
        if (line_blocks.len() as i64 - baseline_center_count.max(1) as i64).abs() <= 2 {
            1.0
        } else {
            0.5
        };

    let confidence = tuning.weight_coverage * coverage
        + tuning.weight_line_strength * line_strength
        + tuning.weight_block_count * block_count_score
        + tuning.weight_baseline_alignment * baseline_alignment;
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineAssistTuning;

    fn row(row_x: f32, model_x: f32, has_symbol: bool) -> GateRow {
        GateRow {
            row_x,
            model_x,
            has_symbol,
            has_model: true,
        }
    }

    fn bounds(width: f32) -> SectionBounds {
        SectionBounds {
            x_min: 0.0,
            x_max: width,
            y_min: 0.0,
            y_max: 500.0,
        }
    }

    #[test]
    fn test_trigger_high_continuation_ratio() {
        let rows = vec![
            row(10.0, 10.0, true),
            row(10.0, 10.0, false),
            row(400.0, 400.0, false),
        ];
        let (run, reasons) =
            should_run_line_assist(&rows, &[10.0, 400.0], &bounds(1200.0), &LineAssistTuning::default());
        assert!(run);
        assert!(reasons.contains(&"high_continuation_ratio"));
    }

    #[test]
    fn test_trigger_dense_centers() {
        let rows = vec![row(10.0, 10.0, true); 6];
        let (run, reasons) = should_run_line_assist(
            &rows,
            &[100.0, 180.0],
            &bounds(1200.0),
            &LineAssistTuning::default(),
        );
        assert!(run);
        assert!(reasons.contains(&"dense_x_centers"));
    }

    #[test]
    fn test_trigger_none_on_clean_section() {
        let rows = vec![
            row(10.0, 20.0, true),
            row(10.0, 20.0, true),
            row(500.0, 510.0, true),
        ];
        let (run, reasons) = should_run_line_assist(
            &rows,
            &[10.0, 500.0],
            &bounds(800.0),
            &LineAssistTuning::default(),
        );
        assert!(!run);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_trigger_empty_section_never_runs() {
        let (run, _) =
            should_run_line_assist(&[], &[], &bounds(2000.0), &LineAssistTuning::default());
        assert!(!run);
    }

    #[test]
    fn test_merge_vertical_lines_clusters_close_positions() {
        let merged = merge_vertical_lines(&[100.0, 400.0], &[110.0, 800.0], 18.0);
        assert_eq!(merged.len(), 3);
        assert!((merged[0] - 105.0).abs() < 0.01);
    }

    #[test]
    fn test_build_line_blocks_drops_narrow() {
        let tuning = LineAssistTuning::default();
        let blocks = build_line_blocks(&[100.0, 150.0, 600.0], (0.0, 1000.0), &tuning);
        // 100..150 is 50px wide, below min_block_width; the rest survive.
        assert!(blocks.iter().all(|&(l, r)| r - l >= tuning.min_block_width));
        assert!(blocks.contains(&(150.0, 600.0)));
    }

    #[test]
    fn test_confidence_zero_without_blocks() {
        let rows = vec![row(10.0, 10.0, true)];
        let c = line_assist_confidence(&rows, &[], 4, 0, 2, &LineAssistTuning::default());
        assert_eq!(c, 0.0);
    }

    #[test]
    fn test_confidence_full_coverage_in_range() {
        let rows = vec![row(50.0, 50.0, true), row(350.0, 350.0, true)];
        let blocks = vec![(0.0, 300.0), (300.0, 600.0)];
        let c = line_assist_confidence(&rows, &blocks, 8, 0, 2, &LineAssistTuning::default());
        assert!(c > 0.9, "confidence={}", c);
        assert!(c <= 1.0);
    }

    #[test]
    fn test_section_bounds_empty_falls_back_to_page() {
        let bounds = section_bounds_from_clusters(&[], 1000, 700);
        assert_eq!(bounds.x_max, 1000.0);
        assert_eq!(bounds.y_max, 700.0);
    }
}
