//! Parcel File Reader: parses identifier lists from plain text,
//! delimited text, or spreadsheet files.
//!
//! Grounded on `examples/original_source/apps/api/utils/file_parser.py`
//! (`parse_txt`/`parse_csv`/`parse_xlsx`/`validate_parcel_ids`), reworked
//! around `csv` and `calamine` rather than transliterated.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use std::path::Path;

/// Read parcel identifiers from `path`, dispatching on extension. Trims
/// whitespace, drops empties, de-duplicates preserving first occurrence,
/// and rejects lists over `max_count` with `TooManyIdentifiers`.
pub fn read_parcel_ids(path: &Path, max_count: usize) -> Result<Vec<String>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let raw = match ext.as_str() {
        "txt" => parse_txt(path)?,
        "csv" | "tsv" => parse_delimited(path, if ext == "tsv" { b'\t' } else { b',' })?,
        "xlsx" | "xls" => parse_spreadsheet(path)?,
        other => anyhow::bail!("unsupported parcel identifier file extension: {other}"),
    };

    validate(raw, max_count)
}

/// One identifier per line; `#`-prefixed lines are comments and ignored.
fn parse_txt(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// First column, or a column whose header case-insensitively contains both
/// "parcel" and "id". The first row is only treated as a header (and
/// dropped) when it resolves a parcel-id-like column by name, or when its
/// first cell doesn't itself look like a parcel id; otherwise it's data.
fn parse_delimited(path: &Path, delimiter: u8) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut records = reader.records();
    let Some(first) = records.next() else { return Ok(Vec::new()) };
    let first = first.context("reading first row")?;

    let header_col = parcel_id_column(first.iter());
    let first_row_is_header = header_col.is_some() || !looks_like_parcel_id(first.get(0).unwrap_or(""));
    let col = header_col.unwrap_or(0);

    let mut ids = Vec::new();
    if !first_row_is_header {
        push_delimited_cell(&mut ids, &first, col);
    }
    for record in records {
        let record = record.context("reading data row")?;
        push_delimited_cell(&mut ids, &record, col);
    }
    Ok(ids)
}

fn push_delimited_cell(ids: &mut Vec<String>, record: &csv::StringRecord, col: usize) {
    if let Some(value) = record.get(col) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            ids.push(trimmed.to_string());
        }
    }
}

/// True if `value` contains a digit and isn't itself a header keyword
/// ("parcel", "id", "number", "pin"), the same heuristic
/// `parse_spreadsheet` leans on via `parcel_id_column`, applied here to the
/// first cell alone since delimited text carries no column names to check
/// when the first row is actually data.
fn looks_like_parcel_id(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    let is_keyword = ["parcel", "id", "number", "pin"].iter().any(|k| lower.contains(k));
    has_digit && !is_keyword
}

/// Same column rule as delimited text; cell values are coerced to strings.
fn parse_spreadsheet(path: &Path) -> Result<Vec<String>> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("opening workbook {}", path.display()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("workbook has no sheets")?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading sheet {sheet_name}"))?;

    let mut rows = range.rows();
    let header_row = rows.next();
    let col = header_row
        .and_then(|row| parcel_id_column(row.iter().map(|c| c.to_string())))
        .unwrap_or(0);

    let mut ids = Vec::new();
    // If no header matched, the first row is data, not a header: re-include it.
    let header_is_data = header_row.is_some_and(|row| parcel_id_column(row.iter().map(|c| c.to_string())).is_none());
    if header_is_data {
        if let Some(row) = header_row {
            push_cell(&mut ids, row, col);
        }
    }
    for row in rows {
        push_cell(&mut ids, row, col);
    }
    Ok(ids)
}

fn push_cell(ids: &mut Vec<String>, row: &[calamine::Data], col: usize) {
    if let Some(cell) = row.get(col) {
        let value = cell.to_string();
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed != "None" {
            ids.push(trimmed.to_string());
        }
    }
}

/// Locate a header whose name case-insensitively contains both "parcel" and
/// "id".
fn parcel_id_column(headers: impl Iterator<Item = impl AsRef<str>>) -> Option<usize> {
    headers
        .enumerate()
        .find(|(_, h)| {
            let lower = h.as_ref().to_lowercase();
            lower.contains("parcel") && lower.contains("id")
        })
        .map(|(i, _)| i)
}

fn validate(raw: Vec<String>, max_count: usize) -> Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for id in raw {
        let trimmed = id.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.clone()) {
            unique.push(trimmed);
        }
    }

    if unique.len() > max_count {
        return Err(PipelineError::TooManyIdentifiers { found: unique.len(), max: max_count }.into());
    }

    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn txt_ignores_comments_and_blanks_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  001-01 ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "002-02").unwrap();
        drop(file);

        let ids = read_parcel_ids(&path, 100).unwrap();
        assert_eq!(ids, vec!["001-01", "002-02"]);
    }

    #[test]
    fn csv_uses_parcel_id_header_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        std::fs::write(&path, "Name,Parcel ID\nAlice,001-01\nBob,002-02\n").unwrap();

        let ids = read_parcel_ids(&path, 100).unwrap();
        assert_eq!(ids, vec!["001-01", "002-02"]);
    }

    #[test]
    fn csv_falls_back_to_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        std::fs::write(&path, "001-01,Alice\n002-02,Bob\n").unwrap();

        let ids = read_parcel_ids(&path, 100).unwrap();
        assert_eq!(ids, vec!["001-01", "002-02"]);
    }

    #[test]
    fn dedupes_preserving_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "a\nb\na\nc\n").unwrap();

        let ids = read_parcel_ids(&path, 100).unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn too_many_identifiers_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "a\nb\nc\n").unwrap();

        let err = read_parcel_ids(&path, 2).unwrap_err();
        let pipeline_err = err.downcast_ref::<PipelineError>().expect("PipelineError");
        assert_eq!(pipeline_err.kind(), "too_many_identifiers");
    }
}
