//! Key normalization, join, and label composition.
//!
//! Grounded on `label_exporter.py`'s `extract_parcel_id` (canonical key
//! regex), the Excel/shapefile column-detection loops, and `build_label`.

use crate::error::PipelineError;
use crate::job::model::ScrapedRecord;
use crate::label_export::shapefile_input::{ShapefileData, ShapefileFeature};
use geo_types::MultiPolygon;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static CANONICAL_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}-\d{2}-\d{2}-").expect("valid regex"));

/// Locate the first substring matching `\d{2}-\d{2}-\d{2}-` and keep
/// everything from that position onward; unchanged if no match.
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match CANONICAL_KEY_RE.find(trimmed) {
        Some(m) => trimmed[m.start()..].to_string(),
        None => trimmed.to_string(),
    }
}

/// First column whose name case-insensitively contains "parcel" or equals
/// "idparcel".
fn parcel_id_shapefile_column<'a>(attributes: &'a HashMap<String, String>) -> Option<&'a str> {
    attributes
        .keys()
        .find(|k| {
            let lower = k.to_lowercase();
            lower.contains("parcel") || lower == "idparcel"
        })
        .map(String::as_str)
}

pub struct JoinedRow {
    pub canonical_key: String,
    pub record: ScrapedRecord,
    pub boundary: MultiPolygon<f64>,
}

/// Inner join on the canonical key. Duplicate keys on the geometry side
/// produce one labeled feature per duplicate. Tries the parcel-id column
/// first; if that produces zero overlap and an alternate id is present on
/// the scraped side, retries keyed on the alternate id. Zero overlap after
/// both attempts is `join_empty` (fatal).
pub fn join(records: Vec<ScrapedRecord>, shapefile: &ShapefileData) -> Result<Vec<JoinedRow>, PipelineError> {
    let parcel_col = shapefile
        .features
        .first()
        .and_then(|f: &ShapefileFeature| parcel_id_shapefile_column(&f.attributes))
        .map(str::to_string)
        .ok_or_else(|| PipelineError::ShapefileMissing {
            reason: "no parcel-id-like column found in shapefile attributes".into(),
        })?;

    let mut by_key: HashMap<String, Vec<&ShapefileFeature>> = HashMap::new();
    for feature in &shapefile.features {
        if let Some(raw) = feature.attributes.get(&parcel_col) {
            by_key.entry(canonical_key(raw)).or_default().push(feature);
        }
    }

    let mut rows = join_on(&records, &by_key, |r| r.parcel_id.as_str());
    if rows.is_empty() {
        rows = join_on(&records, &by_key, |r| r.alternate_id.as_deref().unwrap_or(""));
    }
    if rows.is_empty() {
        return Err(PipelineError::JoinEmpty);
    }
    Ok(rows)
}

fn join_on(
    records: &[ScrapedRecord],
    by_key: &HashMap<String, Vec<&ShapefileFeature>>,
    key_of: impl Fn(&ScrapedRecord) -> &str,
) -> Vec<JoinedRow> {
    let mut rows = Vec::new();
    for record in records {
        let raw = key_of(record);
        if raw.is_empty() {
            continue;
        }
        let key = canonical_key(raw);
        if let Some(features) = by_key.get(&key) {
            for feature in features {
                rows.push(JoinedRow { canonical_key: key.clone(), record: record.clone(), boundary: feature.geometry.clone() });
            }
        }
    }
    rows
}

/// Three lines, newline-joined: `PARCEL# <key>`, upper-cased owner name
/// (omitted if missing), and either `INST# <value>` or, when the
/// instrument field contains `/`, `BK. <book>, PG. <page>` (omitted if
/// missing or literal "nan"). Pure function of the joined record.
#[must_use]
pub fn compose_label(row: &JoinedRow) -> String {
    let mut lines = vec![format!("PARCEL# {}", row.canonical_key)];

    if let Some(owner) = row.record.owner_name.as_deref() {
        let trimmed = owner.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_uppercase());
        }
    }

    if let Some(inst) = row
        .record
        .latest_transfer
        .as_ref()
        .and_then(|t| t.instrument_or_book_page.as_deref())
    {
        let inst = inst.trim();
        if !inst.is_empty() && !inst.eq_ignore_ascii_case("nan") {
            if let Some((book, page)) = inst.split_once('/') {
                lines.push(format!("BK. {}, PG. {}", book.trim(), page.trim()));
            } else {
                lines.push(format!("INST# {inst}"));
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::TransferRow;

    #[test]
    fn canonical_key_extracts_suffix_after_first_match() {
        assert_eq!(canonical_key("1400816928-08-22-442-023.000-025"), "28-08-22-442-023.000-025");
    }

    #[test]
    fn canonical_key_is_identity_when_already_canonical() {
        assert_eq!(canonical_key("28-08-22-442-023.000-025"), "28-08-22-442-023.000-025");
    }

    #[test]
    fn canonical_key_is_identity_when_unmatched() {
        assert_eq!(canonical_key("NOTAPARCEL"), "NOTAPARCEL");
    }

    fn row(owner: Option<&str>, instrument: Option<&str>) -> JoinedRow {
        JoinedRow {
            canonical_key: "28-08-22-442-023.000-025".to_string(),
            record: ScrapedRecord {
                owner_name: owner.map(str::to_string),
                latest_transfer: instrument.map(|i| TransferRow {
                    date: None,
                    deed_code: None,
                    instrument_or_book_page: Some(i.to_string()),
                }),
                ..Default::default()
            },
            boundary: MultiPolygon::new(vec![]),
        }
    }

    #[test]
    fn label_with_book_page_instrument() {
        let r = row(Some("doe, john"), Some("2018/3706"));
        assert_eq!(
            compose_label(&r),
            "PARCEL# 28-08-22-442-023.000-025\nDOE, JOHN\nBK. 2018, PG. 3706"
        );
    }

    #[test]
    fn label_with_plain_instrument_number() {
        let r = row(Some("doe, john"), Some("1234567"));
        assert_eq!(
            compose_label(&r),
            "PARCEL# 28-08-22-442-023.000-025\nDOE, JOHN\nINST# 1234567"
        );
    }

    #[test]
    fn label_omits_literal_nan_instrument() {
        let r = row(Some("doe, john"), Some("nan"));
        assert_eq!(compose_label(&r), "PARCEL# 28-08-22-442-023.000-025\nDOE, JOHN");
    }

    proptest::proptest! {
        /// Re-running `canonical_key` on its own output is a no-op: once the
        /// `\d{2}-\d{2}-\d{2}-` anchor is found and the prefix dropped, the
        /// remainder never contains an earlier occurrence of the same anchor.
        #[test]
        fn canonical_key_is_idempotent(raw in ".*") {
            let once = canonical_key(&raw);
            let twice = canonical_key(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn canonical_key_never_panics_on_arbitrary_text(raw in ".*") {
            let _ = canonical_key(&raw);
        }
    }
}
