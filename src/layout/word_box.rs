//! Word boxes and row clusters — the atomic units of layout analysis.

use crate::geometry::{Point, Rect};
use crate::text::normalize_text;

/// A single OCR-recognized token with its position.
///
/// Produced once per OCR call by the [`crate::ocr::OcrEngine`] collaborator
/// and consumed read-only by all downstream clustering. Coordinates are in
/// rendered raster pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    /// Recognized text, exactly as the OCR reported it
    pub text: String,
    /// Center x
    pub cx: f32,
    /// Center y
    pub cy: f32,
    /// Bounding box
    pub bbox: Rect,
}

impl WordBox {
    /// Create a word box from its text and bounding box, deriving the center.
    pub fn new(text: impl Into<String>, bbox: Rect) -> Self {
        let center = bbox.center();
        Self {
            text: text.into(),
            cx: center.x,
            cy: center.y,
            bbox,
        }
    }

    /// Center point.
    pub fn center(&self) -> Point {
        Point::new(self.cx, self.cy)
    }

    /// Rescale all coordinates by `1/scale` (used after OCRing an upscaled
    /// crop to map boxes back into the crop's own pixel space).
    pub fn rescaled(&self, scale: f32) -> WordBox {
        if scale <= 1.0 {
            return self.clone();
        }
        WordBox {
            text: self.text.clone(),
            cx: self.cx / scale,
            cy: self.cy / scale,
            bbox: Rect::new(
                self.bbox.x0 / scale,
                self.bbox.y0 / scale,
                self.bbox.x1 / scale,
                self.bbox.y1 / scale,
            ),
        }
    }
}

/// A group of word boxes believed to lie on one visual table row.
///
/// `row_y` is the running center-of-mass of member `cy` values, updated
/// incrementally as words join during the clustering sweep. Clusters are
/// never re-clustered after creation.
#[derive(Debug, Clone)]
pub struct RowCluster {
    /// Center-of-mass y of the member words
    pub row_y: f32,
    /// Member words, in insertion (y-sweep) order
    pub words: Vec<WordBox>,
}

impl RowCluster {
    /// Start a cluster from its first word.
    pub fn seed(word: WordBox) -> Self {
        Self {
            row_y: word.cy,
            words: vec![word],
        }
    }

    /// Add a word, updating `row_y` as an incremental running mean.
    ///
    /// Not a midpoint: the reference y drifts toward the centroid of all
    /// members, which is what lets a fourth or fifth word whose y differs
    /// slightly from the early members still join the row.
    pub fn push(&mut self, word: WordBox) {
        let cy = word.cy;
        self.words.push(word);
        let n = self.words.len() as f32;
        self.row_y = (self.row_y * (n - 1.0) + cy) / n;
    }

    /// Member words sorted left to right.
    pub fn words_by_x(&self) -> Vec<&WordBox> {
        let mut sorted: Vec<&WordBox> = self.words.iter().collect();
        sorted.sort_by(|a, b| a.cx.total_cmp(&b.cx));
        sorted
    }

    /// Row text: normalized member texts joined with single spaces, left to
    /// right.
    pub fn row_text(&self) -> String {
        self.words_by_x()
            .iter()
            .map(|w| normalize_text(&w.text).trim().to_string())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    /// Row text with no separators at all (header keyword matching).
    pub fn joined_text(&self) -> String {
        self.words_by_x().iter().map(|w| w.text.as_str()).collect()
    }

    /// Bounding box of all member words.
    ///
    /// Returns `None` for an empty cluster (which clustering never
    /// produces).
    pub fn bbox(&self) -> Option<Rect> {
        let first = self.words.first()?;
        let mut bbox = first.bbox;
        for word in &self.words[1..] {
            bbox = bbox.union(&word.bbox);
        }
        Some(bbox)
    }
}
