//! PDF page rasterization and page-range resolution.
//!
//! Rasterization is delegated to the `pdftoppm` subprocess; page counting
//! uses `lopdf`. Failures here are fatal for the file (never silently
//! skipped), per the error taxonomy.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Render one page of a PDF to a PNG at the given DPI.
///
/// Returns the path of the generated image inside `work_dir`. The caller
/// owns `work_dir` (typically a [`tempfile::TempDir`]) so images are
/// removed when the run ends, success or not.
pub fn run_pdftoppm(pdf_path: &Path, page: u32, dpi: u32, work_dir: &Path) -> Result<PathBuf> {
    if page < 1 {
        return Err(Error::Rasterize("page must be 1 or greater".to_string()));
    }
    let png_base = work_dir.join(format!("page_{page}"));
    let output = Command::new("pdftoppm")
        .arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg("-singlefile")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-png")
        .arg(pdf_path)
        .arg(&png_base)
        .output()
        .map_err(|err| Error::Rasterize(format!("failed to launch pdftoppm: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        return Err(Error::Rasterize(if detail.is_empty() {
            "pdftoppm failed with unknown error".to_string()
        } else {
            format!("pdftoppm failed: {detail}")
        }));
    }

    let png_path = png_base.with_extension("png");
    if !png_path.exists() {
        return Err(Error::Rasterize(format!(
            "pdftoppm produced no image at {}",
            png_path.display()
        )));
    }
    Ok(png_path)
}

/// Count the pages of a PDF.
pub fn count_pdf_pages(pdf_path: &Path) -> Result<u32> {
    let document = lopdf::Document::load(pdf_path)?;
    Ok(document.get_pages().len() as u32)
}

/// Resolve the 1-based pages a run should process.
///
/// `page == 0` selects every page; an explicit page must be within range.
pub fn resolve_target_pages(total_pages: u32, page: u32) -> Result<Vec<u32>> {
    if total_pages < 1 {
        return Err(Error::EmptyDocument(PathBuf::new()));
    }
    if page == 0 {
        return Ok((1..=total_pages).collect());
    }
    if page > total_pages {
        return Err(Error::PageOutOfRange { page, total_pages });
    }
    Ok(vec![page])
}

/// Load a rendered page image as RGB.
pub fn load_page_image(png_path: &Path) -> Result<image::RgbImage> {
    Ok(image::open(png_path)?.to_rgb8())
}
