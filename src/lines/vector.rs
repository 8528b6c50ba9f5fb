//! Native vector line collection from PDF content streams.
//!
//! The PDF's own page-description line primitives are an independent,
//! OCR-free signal for column boundaries. Segments are read from `m`/`l`
//! path operators, filtered to near-vertical strokes inside the section's
//! y-range, and scaled from PDF point space into the rendered raster's
//! pixel space.

use crate::layout::cluster_x_positions;
use crate::lines::{LineScan, SectionBounds};
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::path::Path;
use std::time::Instant;

const US_LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Source of native vector vertical lines for a page.
///
/// Injected at startup; the line-assist gate consumes it read-only. A
/// degraded implementation may always return an empty scan.
pub trait VectorLineSource {
    /// Collect clustered vertical line x positions (raster pixel space)
    /// within `section` on the given 1-based page. `page_px` is the
    /// rendered raster's `(width, height)`.
    fn vertical_lines(&self, page: u32, section: &SectionBounds, page_px: (u32, u32)) -> LineScan;
}

/// A vector source that never finds lines.
///
/// Used when no PDF document is available (e.g. pure word-box tests).
#[derive(Debug, Default)]
pub struct NoVectorLines;

impl VectorLineSource for NoVectorLines {
    fn vertical_lines(&self, _page: u32, _section: &SectionBounds, _page_px: (u32, u32)) -> LineScan {
        LineScan::unavailable("vector source disabled")
    }
}

/// Vector line source backed by a loaded `lopdf` document.
pub struct PdfVectorLines {
    document: Document,
}

impl PdfVectorLines {
    /// Load the PDF once for the run.
    pub fn open(pdf_path: &Path) -> crate::error::Result<Self> {
        let document = Document::load(pdf_path)?;
        Ok(Self { document })
    }

    /// Wrap an already-loaded document.
    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    fn media_box(&self, page_id: lopdf::ObjectId) -> [f32; 4] {
        let Ok(page_obj) = self.document.get_object(page_id) else {
            return US_LETTER;
        };
        let Ok(dict) = page_obj.as_dict() else {
            return US_LETTER;
        };
        let Ok(raw) = dict.get(b"MediaBox") else {
            return US_LETTER;
        };
        let arr = match raw {
            Object::Reference(id) => match self.document.get_object(*id) {
                Ok(Object::Array(a)) => a.clone(),
                _ => return US_LETTER,
            },
            Object::Array(a) => a.clone(),
            _ => return US_LETTER,
        };
        let mut bounds = [0.0f32; 4];
        if arr.len() < 4 {
            return US_LETTER;
        }
        for (slot, obj) in bounds.iter_mut().zip(arr.iter()) {
            *slot = object_to_float(obj);
        }
        bounds
    }

    /// Collect straight `m`→`l` segments from the page's content streams.
    fn page_segments(&self, page: u32) -> Result<Vec<Segment>, String> {
        let pages = self.document.get_pages();
        let page_id = *pages
            .get(&page)
            .ok_or_else(|| format!("page {page} not found"))?;
        let data = self
            .document
            .get_page_content(page_id)
            .map_err(|err| err.to_string())?;
        let content = Content::decode(&data).map_err(|err| err.to_string())?;

        let mut segments = Vec::new();
        let mut current: Option<(f32, f32)> = None;
        for op in &content.operations {
            match op.operator.as_str() {
                "m" => {
                    if op.operands.len() >= 2 {
                        current = Some((
                            object_to_float(&op.operands[0]),
                            object_to_float(&op.operands[1]),
                        ));
                    }
                }
                "l" => {
                    if op.operands.len() >= 2 {
                        let to = (
                            object_to_float(&op.operands[0]),
                            object_to_float(&op.operands[1]),
                        );
                        if let Some(from) = current {
                            segments.push(Segment {
                                x0: from.0,
                                y0: from.1,
                                x1: to.0,
                                y1: to.1,
                            });
                        }
                        current = Some(to);
                    }
                }
                // Path painting / path start operators reset the current point.
                "h" | "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => {
                    current = None;
                }
                _ => {}
            }
        }
        Ok(segments)
    }
}

/// One straight segment in PDF point space (y grows upward).
#[derive(Debug, Clone, Copy)]
struct Segment {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl VectorLineSource for PdfVectorLines {
    fn vertical_lines(&self, page: u32, section: &SectionBounds, page_px: (u32, u32)) -> LineScan {
        let started = Instant::now();
        let segments = match self.page_segments(page) {
            Ok(segments) => segments,
            Err(note) => {
                log::debug!("vector line collection degraded: {note}");
                return LineScan::unavailable(note);
            }
        };

        let pages = self.document.get_pages();
        let Some(page_id) = pages.get(&page).copied() else {
            return LineScan::unavailable("page not found");
        };
        let media = self.media_box(page_id);
        let page_w_pt = (media[2] - media[0]).max(1.0);
        let page_h_pt = (media[3] - media[1]).max(1.0);
        let scale_x = page_px.0 as f32 / page_w_pt;
        let scale_y = page_px.1 as f32 / page_h_pt;

        let section_height = (section.y_max - section.y_min).max(1.0);
        let mut x_positions: Vec<f32> = Vec::new();
        for seg in &segments {
            // Near-vertical strokes only (1pt slack for hand-drawn CAD export).
            if (seg.x0 - seg.x1).abs() > 1.0 {
                continue;
            }
            let x_px = (seg.x0 - media[0]) * scale_x;
            // PDF y is bottom-up; flip into raster space.
            let top_px = (page_h_pt - (seg.y0.max(seg.y1) - media[1])) * scale_y;
            let bottom_px = (page_h_pt - (seg.y0.min(seg.y1) - media[1])) * scale_y;
            if bottom_px < section.y_min - 8.0 || top_px > section.y_max + 8.0 {
                continue;
            }
            if x_px < section.x_min - 40.0 || x_px > section.x_max + 40.0 {
                continue;
            }
            let length = (bottom_px - top_px).max(0.0);
            if length < section_height * 0.35 {
                continue;
            }
            x_positions.push((x_px * 100.0).round() / 100.0);
        }

        let raw_count = x_positions.len();
        LineScan {
            positions: cluster_x_positions(&x_positions, 8.0),
            raw_count,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            timed_out: false,
            note: None,
        }
    }
}

fn object_to_float(obj: &Object) -> f32 {
    match obj {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_vector_lines_is_empty() {
        let source = NoVectorLines;
        let section = SectionBounds {
            x_min: 0.0,
            x_max: 100.0,
            y_min: 0.0,
            y_max: 100.0,
        };
        let scan = source.vertical_lines(1, &section, (1000, 1000));
        assert!(scan.positions.is_empty());
        assert!(scan.note.is_some());
    }

    #[test]
    fn test_object_to_float() {
        assert_eq!(object_to_float(&Object::Integer(12)), 12.0);
        assert_eq!(object_to_float(&Object::Real(3.5)), 3.5);
        assert_eq!(object_to_float(&Object::Null), 0.0);
    }
}
