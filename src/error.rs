//! Error types for the extraction library.
//!
//! Only fatal, per-file conditions are errors: a missing input PDF, a page
//! number outside the document, a failed rasterization subprocess, or a
//! failed OCR call. Per-row parse failures and unresolved continuation rows
//! are ordinary non-error outcomes (they simply produce no record or an
//! empty field), and a rejected line-assist pass is a logged outcome, not an
//! error.

use std::path::PathBuf;

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during schedule extraction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input PDF does not exist on disk
    #[error("input PDF not found: {0}")]
    InputNotFound(PathBuf),

    /// Document has no pages at all
    #[error("PDF has no pages: {0}")]
    EmptyDocument(PathBuf),

    /// Requested page is outside the document's page range
    #[error("page {page} out of range (document has {total_pages} pages)")]
    PageOutOfRange {
        /// 1-based page that was requested
        page: u32,
        /// Total pages in the document
        total_pages: u32,
    },

    /// pdftoppm subprocess failed or produced no image
    #[error("rasterization failed: {0}")]
    Rasterize(String),

    /// The OCR collaborator reported an error for a page image
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Loading or decoding a rendered page image failed
    #[error("image error: {0}")]
    Image(String),

    /// PDF structure could not be read (page tree, content streams)
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Writing delimited output failed
    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    /// Serializing a diagnostics report failed
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_out_of_range_message() {
        let err = Error::PageOutOfRange {
            page: 9,
            total_pages: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains('9'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_input_not_found_message() {
        let err = Error::InputNotFound(PathBuf::from("/data/missing.pdf"));
        assert!(format!("{}", err).contains("missing.pdf"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
