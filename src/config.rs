//! Run configuration.
//!
//! Configuration is constructed once at the top of a run — from explicit
//! values or from `ZUMEN_*` environment variables — and threaded as a
//! parameter through the call chain. Deep helpers never read ambient
//! process state, so tests can supply arbitrary configurations without
//! env mutation.

use serde::Serialize;
use std::env;

/// Whether the line-assist refinement runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineAssistMode {
    /// Run only when a trigger heuristic flags the section as suspicious
    #[default]
    Auto,
    /// Never run
    Off,
    /// Always run, regardless of triggers
    Force,
}

impl LineAssistMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "off" => Some(Self::Off),
            "force" => Some(Self::Force),
            _ => None,
        }
    }
}

/// Configuration for the line-assist confidence gate.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct LineAssistConfig {
    /// Run mode
    pub mode: LineAssistMode,
    /// Wall-clock budget for the image-detection path, in milliseconds
    pub latency_budget_ms: u64,
    /// Minimum confidence below which the gate rejects outright
    pub min_confidence: f32,
    /// Emit per-section gate diagnostics at debug level
    pub debug: bool,
    /// Empirically tuned thresholds and weights
    pub tuning: LineAssistTuning,
}

impl Default for LineAssistConfig {
    fn default() -> Self {
        Self {
            mode: LineAssistMode::Auto,
            latency_budget_ms: 300,
            min_confidence: 0.70,
            debug: false,
            tuning: LineAssistTuning::default(),
        }
    }
}

impl LineAssistConfig {
    /// Build from `ZUMEN_LINE_ASSIST_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    ///
    /// Call this once at the top of a run; everything below receives the
    /// struct by reference.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = env::var("ZUMEN_LINE_ASSIST_MODE")
            .ok()
            .and_then(|raw| LineAssistMode::parse(&raw))
            .unwrap_or(defaults.mode);
        let latency_budget_ms = env::var("ZUMEN_LINE_ASSIST_LATENCY_BUDGET_MS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(defaults.latency_budget_ms)
            .max(1);
        let min_confidence = env::var("ZUMEN_LINE_ASSIST_MIN_CONFIDENCE")
            .ok()
            .and_then(|raw| raw.trim().parse::<f32>().ok())
            .unwrap_or(defaults.min_confidence)
            .clamp(0.0, 1.0);
        let debug = env::var("ZUMEN_LINE_ASSIST_DEBUG")
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        Self {
            mode,
            latency_budget_ms,
            min_confidence,
            debug,
            tuning: LineAssistTuning::default(),
        }
    }
}

/// Tuned thresholds and confidence weights for the gate.
///
/// These values were calibrated against real sample drawings, not derived;
/// treat them as starting points.
#[derive(Debug, Clone, Serialize)]
pub struct LineAssistTuning {
    /// Trigger: minimum continuation-row fraction
    pub continuation_ratio: f32,
    /// Trigger: minimum number of continuation rows
    pub continuation_min_rows: usize,
    /// Trigger: adjacent block centers closer than this are suspicious (px)
    pub dense_center_gap: f32,
    /// Trigger: |model_x - row_x| beyond this suggests a mis-assigned block (px)
    pub cross_model_offset: f32,
    /// Trigger: a section wider than this with ≤ 2 candidates is suspicious (px)
    pub sparse_section_width: f32,
    /// Merge tolerance between vector- and image-derived line x positions (px)
    pub merge_tolerance: f32,
    /// Minimum width of a usable block between consecutive lines (px)
    pub min_block_width: f32,
    /// Confidence weight: fraction of rows covered by some block
    pub weight_coverage: f32,
    /// Confidence weight: normalized detected-line count
    pub weight_line_strength: f32,
    /// Confidence weight: plausible block-count bonus
    pub weight_block_count: f32,
    /// Confidence weight: agreement with the unsupervised center count
    pub weight_baseline_alignment: f32,
    /// Required improvement of mean model-to-centroid distance (px)
    pub alignment_gain_margin: f32,
}

impl Default for LineAssistTuning {
    fn default() -> Self {
        Self {
            continuation_ratio: 0.35,
            continuation_min_rows: 2,
            dense_center_gap: 130.0,
            cross_model_offset: 420.0,
            sparse_section_width: 900.0,
            merge_tolerance: 18.0,
            min_block_width: 70.0,
            weight_coverage: 0.45,
            weight_line_strength: 0.25,
            weight_block_count: 0.20,
            weight_baseline_alignment: 0.10,
            alignment_gain_margin: 1.0,
        }
    }
}

/// Shared page-processing options for the extractors.
#[derive(Debug, Clone)]
pub struct PageOptions {
    /// 1-based page to process; 0 means every page
    pub page: u32,
    /// Rasterization DPI for pdftoppm
    pub dpi: u32,
    /// Row-clustering vertical threshold (px)
    pub y_cluster: f32,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page: 0,
            dpi: 300,
            y_cluster: 18.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LineAssistConfig::default();
        assert_eq!(config.mode, LineAssistMode::Auto);
        assert_eq!(config.latency_budget_ms, 300);
        assert!((config.min_confidence - 0.70).abs() < f32::EPSILON);
        assert!(!config.debug);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(LineAssistMode::parse("force"), Some(LineAssistMode::Force));
        assert_eq!(LineAssistMode::parse(" OFF "), Some(LineAssistMode::Off));
        assert_eq!(LineAssistMode::parse("bogus"), None);
    }

    #[test]
    fn test_tuning_weights_sum_to_one() {
        let t = LineAssistTuning::default();
        let sum =
            t.weight_coverage + t.weight_line_strength + t.weight_block_count + t.weight_baseline_alignment;
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
