//! Geometric primitives for layout analysis.
//!
//! All coordinates are in rendered raster pixel space (top-left origin,
//! y growing downward), matching what the OCR collaborator reports.

/// A 2D point in page pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in page pixel space.
///
/// Stored as the two corner coordinates rather than position + size because
/// every consumer in this crate works with edges (`x0 <= x1`, `y0 <= y1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle from corner coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use zumen_ocr::geometry::Rect;
    ///
    /// let rect = Rect::new(10.0, 20.0, 110.0, 70.0);
    /// assert_eq!(rect.width(), 100.0);
    /// assert_eq!(rect.height(), 50.0);
    /// ```
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Width of the rectangle.
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    /// Height of the rectangle.
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    /// Center point.
    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Area (zero for degenerate rectangles).
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    /// Intersection area with another rectangle.
    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        w * h
    }

    /// Intersection-over-union with another rectangle.
    ///
    /// Returns 0.0 when either rectangle is degenerate or they do not
    /// overlap.
    ///
    /// # Examples
    ///
    /// ```
    /// use zumen_ocr::geometry::Rect;
    ///
    /// let a = Rect::new(0.0, 0.0, 100.0, 100.0);
    /// let b = Rect::new(0.0, 0.0, 100.0, 100.0);
    /// assert_eq!(a.iou(&b), 1.0);
    /// ```
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Horizontal overlap as a fraction of the narrower rectangle's width.
    ///
    /// Used to decide whether two vertically stacked regions plausibly share
    /// one column space.
    pub fn x_overlap_ratio(&self, other: &Rect) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let base = self.width().min(other.width()).max(1.0);
        w / base
    }
}

/// Horizontal overlap ratio between two `[x0, x1]` spans, relative to the
/// narrower span.
pub fn span_overlap_ratio(a: (f32, f32), b: (f32, f32)) -> f32 {
    let left = a.0.max(b.0);
    let right = a.1.min(b.1);
    let overlap = (right - left).max(0.0);
    let width_a = (a.1 - a.0).max(1.0);
    let width_b = (b.1 - b.0).max(1.0);
    overlap / width_a.min(width_b)
}
