//! Integration tests for the line-assist confidence gate.

use image::RgbImage;
use zumen_ocr::config::{LineAssistConfig, LineAssistTuning};
use zumen_ocr::extract::luminaire::{
    apply_line_assist_if_confident, count_unresolved_symbols, CandidateOrigin, RowCandidate,
};
use zumen_ocr::lines::{
    LineScan, NoopLineDetector, RejectReason, SectionBounds, VectorLineSource,
};

/// Vector source returning a fixed set of line positions.
struct FixedLines(Vec<f32>);

impl VectorLineSource for FixedLines {
    fn vertical_lines(&self, _page: u32, _section: &SectionBounds, _page_px: (u32, u32)) -> LineScan {
        LineScan {
            positions: self.0.clone(),
            raw_count: self.0.len(),
            elapsed_ms: 0.0,
            timed_out: false,
            note: None,
        }
    }
}

fn candidate(
    symbol: Option<&str>,
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
        equivalent_model: "DAIKO:LZD-1".to_string(),
        origin: CandidateOrigin::CodedSegment,
    }
}

fn section() -> SectionBounds {
    SectionBounds {
        x_min: 0.0,
        x_max: 900.0,
        y_min: 50.0,
        y_max: 400.0,
    }
}

fn config() -> LineAssistConfig {
    LineAssistConfig {
        tuning: LineAssistTuning::default(),
        ..LineAssistConfig::default()
    }
}

#[test]
fn test_adopts_when_alignment_improves() {
    // Two visual columns mistakenly assigned to one block; a detected line
    // at x=450 splits them correctly.
    let mut candidates = vec![
        candidate(Some("CT1"), 100.0, 100.0, 100.0, 0),
        candidate(Some("TP2"), 100.0, 800.0, 800.0, 0),
        candidate(Some("CT3"), 140.0, 105.0, 105.0, 0),
        candidate(Some("TP4"), 140.0, 805.0, 805.0, 0),
    ];
    let vector = FixedLines(vec![450.0]);
    let outcome = apply_line_assist_if_confident(
        &mut candidates,
        &section(),
        &[450.0],
        &RgbImage::new(1000, 500),
        1,
        &vector,
        &NoopLineDetector,
        &config(),
    );
    assert!(outcome.invoked);
    assert!(outcome.adopted, "outcome: {outcome:?}");
    assert!(outcome.confidence >= 0.70);
    // Left rows split from right rows.
    assert_eq!(candidates[0].block_index, candidates[2].block_index);
    assert_ne!(candidates[0].block_index, candidates[1].block_index);
}

#[test]
fn test_rejects_when_no_quality_gain() {
    // Already correctly assigned: the same detected line changes nothing.
    let mut candidates = vec![
        candidate(Some("CT1"), 100.0, 100.0, 100.0, 0),
        candidate(Some("TP2"), 100.0, 800.0, 800.0, 1),
        candidate(Some("CT3"), 140.0, 105.0, 105.0, 0),
        candidate(Some("TP4"), 140.0, 805.0, 805.0, 1),
    ];
    let before: Vec<usize> = candidates.iter().map(|c| c.block_index).collect();
    let vector = FixedLines(vec![450.0]);
    let outcome = apply_line_assist_if_confident(
        &mut candidates,
        &section(),
        &[100.0, 800.0],
        &RgbImage::new(1000, 500),
        1,
        &vector,
        &NoopLineDetector,
        &config(),
    );
    assert!(!outcome.adopted);
    assert_eq!(outcome.rejected_reason, Some(RejectReason::NoQualityGain));
    let after: Vec<usize> = candidates.iter().map(|c| c.block_index).collect();
    assert_eq!(before, after);
}

#[test]
fn test_never_adopts_an_assignment_that_loses_resolved_rows() {
    // Baseline: both rows share block 0, so forward fill resolves the
    // continuation row. The detected line would isolate the continuation
    // row in its own block, unresolving it — alignment improves, but the
    // gate must still reject.
    let mut candidates = vec![
        candidate(Some("CT1"), 100.0, 100.0, 100.0, 0),
        candidate(None, 300.0, 800.0, 800.0, 0),
    ];
    let vector = FixedLines(vec![450.0]);
    let outcome = apply_line_assist_if_confident(
        &mut candidates,
        &section(),
        &[450.0],
        &RgbImage::new(1000, 500),
        1,
        &vector,
        &NoopLineDetector,
        &config(),
    );
    assert!(!outcome.adopted);
    assert_eq!(outcome.rejected_reason, Some(RejectReason::NoQualityGain));
    // Block assignment untouched; the row still resolves via forward fill.
    assert!(candidates.iter().all(|c| c.block_index == 0));
    let resolved = zumen_ocr::extract::luminaire::propagate_symbols(&candidates);
    assert_eq!(count_unresolved_symbols(&resolved), 0);
}

#[test]
fn test_rejects_below_min_confidence() {
    let mut candidates = vec![candidate(Some("CT1"), 100.0, 100.0, 100.0, 0)];
    let vector = FixedLines(vec![]);
    let strict = LineAssistConfig {
        min_confidence: 0.95,
        ..config()
    };
    let outcome = apply_line_assist_if_confident(
        &mut candidates,
        &section(),
        &[100.0],
        &RgbImage::new(1000, 500),
        1,
        &vector,
        &NoopLineDetector,
        &strict,
    );
    assert!(!outcome.adopted);
    assert_eq!(
        outcome.rejected_reason,
        Some(RejectReason::ConfidenceBelowThreshold)
    );
}

#[test]
fn test_empty_section_not_invoked() {
    let mut candidates: Vec<RowCandidate> = vec![];
    let vector = FixedLines(vec![450.0]);
    let outcome = apply_line_assist_if_confident(
        &mut candidates,
        &section(),
        &[],
        &RgbImage::new(1000, 500),
        1,
        &vector,
        &NoopLineDetector,
        &config(),
    );
    assert!(!outcome.invoked);
    assert_eq!(
        outcome.rejected_reason,
        Some(RejectReason::NoSectionCandidates)
    );
}
