// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::needless_range_loop)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # zumen_ocr
//!
//! Reconstructs structured equipment tables from OCR word boxes over
//! scanned architectural/electrical PDF drawings, and cross-validates two
//! independently extracted tables against each other.
//!
//! Scanned schedules have no reliable underlying grid, so every layer here
//! is a spatial/text heuristic: greedy row clustering over word centers,
//! header detection by keyword-category scoring, column/block inference
//! from keyword positions or unsupervised x clustering, domain-specific
//! equipment-code and model parsing, continuation propagation for
//! multi-line cells, and an optional line-assist pass that detects vector
//! and raster vertical lines but adopts them only behind a measured
//! confidence gate.
//!
//! ## Layout
//!
//! - [`layout`]: word boxes, row clustering, gap splitting
//! - [`ocr`], [`render`]: collaborator contracts (vision backend, pdftoppm)
//! - [`lines`]: line-assist sources and the confidence gate
//! - [`extract`]: the four schedule extractors
//! - [`output`]: delimited output contracts
//! - [`reconcile`]: equipment-vs-panel cross-validation
//!
//! ## Quick start
//!
//! ```ignore
//! use zumen_ocr::config::{LineAssistConfig, PageOptions};
//! use zumen_ocr::extract::LuminaireExtractor;
//! use zumen_ocr::lines::default_image_detector;
//!
//! # fn main() -> zumen_ocr::error::Result<()> {
//! let ocr = my_vision_client(); // implements zumen_ocr::ocr::OcrEngine
//! let detector = default_image_detector();
//! let extractor = LuminaireExtractor::new(
//!     &ocr,
//!     detector.as_ref(),
//!     LineAssistConfig::from_env(),
//!     PageOptions::default(),
//! );
//! let summary = extractor.extract("drawing.pdf".as_ref(), "out.csv".as_ref())?;
//! println!("{} rows", summary.rows);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Geometry and text primitives
pub mod geometry;
pub mod text;

// Configuration
pub mod config;

// Layout analysis
pub mod layout;

// Collaborator contracts
pub mod ocr;
pub mod render;

// Line-assist subsystem
pub mod lines;

// Schedule extractors
pub mod extract;

// Output and reconciliation
pub mod output;
pub mod reconcile;

pub use error::{Error, Result};
pub use layout::{RowCluster, WordBox};
