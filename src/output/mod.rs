//! Delimited output writing.
//!
//! Column names and ordering are part of the contract consumed by the
//! downstream reconciliation step; changing them is a breaking change.
//! Duplicate rows are preserved — physically duplicate equipment is a valid
//! real-world case.

use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// UTF-8 byte order mark, written for consumers that open the CSV in
/// spreadsheet software expecting `utf-8-sig`.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Write a header row plus data rows as CSV.
///
/// Creates parent directories as needed. When `with_bom` is set the file
/// starts with a UTF-8 BOM.
pub fn write_delimited<I>(path: &Path, header: &[&str], rows: I, with_bom: bool) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = fs::File::create(path)?;
    if with_bom {
        file.write_all(UTF8_BOM)?;
    }
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write rows without a fixed header (ragged output, e.g. spec-frame rows
/// whose column count varies per row).
pub fn write_ragged<I>(path: &Path, rows: I, with_bom: bool) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = fs::File::create(path)?;
    if with_bom {
        file.write_all(UTF8_BOM)?;
    }
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
