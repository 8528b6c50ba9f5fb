//! Schedule extractors.
//!
//! Each extractor targets one known drawing layout:
//! - [`luminaire`]: fixture schedules (器具記号/メーカー/相当型番) with
//!   continuation rows and line-assisted block inference
//! - [`dwelling`]: in-dwelling pictorial fixture sections with anchor codes
//! - [`frame`]: intercom/security spec frames with label/value pairs
//! - [`grid`]: ruled control schedules located by header-keyword anchors

pub mod dwelling;
pub mod frame;
pub mod grid;
pub mod luminaire;

pub use dwelling::{DwellingCandidate, DwellingExtractor, DwellingSummary};
pub use frame::{FrameExtractor, FrameRow, FrameSummary};
pub use grid::{ColumnBounds, GridExtractor, GridRow, GridSummary, TableCandidate};
pub use luminaire::{LuminaireExtractor, LuminaireRow, LuminaireSummary, RowCandidate};
