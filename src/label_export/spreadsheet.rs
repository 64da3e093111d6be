//! Parcel spreadsheet output: the 17-column enriched workbook, written both
//! as a full export and as a partial-progress snapshot every 10 parcels
//! (a supplemented feature not in the original distillation).
//!
//! Grounded on `beacon_scraper.py`'s Excel column layout (Parcel ID,
//! Alternate ID, Owner Name, Owner Address, Owner City/State/Zip, Parcel
//! Address, Parcel City/State/Zip, Legal Description, Deed Date, Doc#, Deed
//! Type, Report Card Path, Status). Write-only: `rust_xlsxwriter` cannot
//! read `.xlsx`, so unlike the original's two-process file handoff, the
//! join in `join.rs` operates directly on the in-memory `ScrapedRecord`s.
//! This module is purely an output sink.

use crate::job::model::ScrapedRecord;
use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use std::path::Path;

const HEADERS: &[&str] = &[
    "Parcel ID",
    "Alternate ID",
    "Owner Name",
    "Owner Address",
    "Owner City",
    "Owner State",
    "Owner Zip",
    "Parcel Address",
    "Parcel City",
    "Parcel State",
    "Parcel Zip",
    "Legal Description",
    "Deed Date",
    "Document/Instrument",
    "Deed Type",
    "Report Card Path",
    "Status",
];

/// Write the full set of scraped records to `path`, one row per record in
/// scrape order.
pub fn write_records(records: &[ScrapedRecord], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).context("writing header row")?;
    }

    for (row_idx, record) in records.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        write_row(sheet, row, record)?;
    }

    workbook.save(path).with_context(|| format!("saving spreadsheet to {}", path.display()))
}

fn write_row(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    record: &ScrapedRecord,
) -> Result<()> {
    let status = if record.download_error.is_some() {
        "error"
    } else if record.document_local_path.is_some() {
        "downloaded"
    } else {
        "not_found"
    };

    let cells = [
        record.parcel_id.as_str(),
        record.alternate_id.as_deref().unwrap_or_default(),
        record.owner_name.as_deref().unwrap_or_default(),
        record.owner_address.street.as_str(),
        record.owner_address.city.as_str(),
        record.owner_address.state.as_str(),
        record.owner_address.zip.as_str(),
        record.situs_address.street.as_str(),
        record.situs_address.city.as_str(),
        record.situs_address.state.as_str(),
        record.situs_address.zip.as_str(),
        record.legal_description.as_deref().unwrap_or_default(),
        record.latest_transfer.as_ref().and_then(|t| t.date.as_deref()).unwrap_or_default(),
        record
            .latest_transfer
            .as_ref()
            .and_then(|t| t.instrument_or_book_page.as_deref())
            .unwrap_or_default(),
        record.latest_transfer.as_ref().and_then(|t| t.deed_code.as_deref()).unwrap_or_default(),
        record
            .document_local_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        status.to_string(),
    ];

    for (col, value) in cells.iter().enumerate() {
        sheet.write_string(row, col as u16, *value).context("writing cell")?;
    }
    Ok(())
}
