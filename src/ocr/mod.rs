//! OCR collaborator contract.
//!
//! The vision backend is a black box to this crate: given a rendered page
//! image it returns recognized words with quadrilateral bounding boxes. The
//! core performs no correction of the recognition itself — only post-hoc
//! normalization and reinterpretation of token boundaries.

use crate::error::Result;
use crate::geometry::Rect;
use crate::layout::WordBox;
use image::RgbImage;

/// A recognized word as reported by the OCR backend: raw text plus the four
/// corner points of its bounding quadrilateral.
#[derive(Debug, Clone)]
pub struct RawWord {
    /// Recognized text
    pub text: String,
    /// Corner points `(x, y)` in page pixel space; order is not guaranteed
    pub vertices: Vec<(f32, f32)>,
}

impl RawWord {
    /// Collapse the quadrilateral to an axis-aligned [`WordBox`].
    ///
    /// Returns `None` for empty text or a degenerate vertex list.
    pub fn into_word_box(self) -> Option<WordBox> {
        let text = self.text.trim();
        if text.is_empty() || self.vertices.is_empty() {
            return None;
        }
        let mut x0 = f32::MAX;
        let mut y0 = f32::MAX;
        let mut x1 = f32::MIN;
        let mut y1 = f32::MIN;
        for &(x, y) in &self.vertices {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Some(WordBox::new(text, Rect::new(x0, y0, x1, y1)))
    }
}

/// OCR engine collaborator.
///
/// Implementations wrap whatever vision service the deployment uses. The
/// crate treats the returned boxes as ground truth.
pub trait OcrEngine {
    /// Recognize all words on a page image.
    fn recognize(&self, image: &RgbImage) -> Result<Vec<RawWord>>;
}

/// Run OCR on an image and collapse the result to word boxes, dropping
/// empty tokens.
pub fn extract_words(engine: &dyn OcrEngine, image: &RgbImage) -> Result<Vec<WordBox>> {
    let raw = engine.recognize(image)?;
    Ok(raw.into_iter().filter_map(RawWord::into_word_box).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_word_bbox_from_quad() {
        let raw = RawWord {
            text: "TP1".to_string(),
            vertices: vec![(10.0, 5.0), (50.0, 6.0), (49.0, 20.0), (11.0, 19.0)],
        };
        let word = raw.into_word_box().unwrap();
        assert_eq!(word.bbox, Rect::new(10.0, 5.0, 50.0, 20.0));
        assert_eq!(word.text, "TP1");
    }

    #[test]
    fn test_empty_text_dropped() {
        let raw = RawWord {
            text: "   ".to_string(),
            vertices: vec![(0.0, 0.0), (1.0, 1.0)],
        };
        assert!(raw.into_word_box().is_none());
    }
}
