//! Label Export Pipeline: extract the shapefile bundle, join it
//! against the scraped records, and emit the enriched spreadsheet and the
//! labeled CAD drawing.

pub mod dxf_output;
pub mod geometry;
pub mod join;
pub mod shapefile_input;
pub mod spreadsheet;

use crate::job::model::ScrapedRecord;
use anyhow::{Context, Result};
use std::path::Path;

pub struct LabelExportOutputs {
    pub spreadsheet_path: std::path::PathBuf,
    pub dxf_path: std::path::PathBuf,
}

/// Run the full pipeline: extract `shapefile_zip` under `work_dir`, join
/// against `records`, reproject from the bundle's detected (or assumed)
/// source CRS to `target_epsg`, and write both output files under
/// `work_dir`.
pub fn run(
    shapefile_zip: &Path,
    records: Vec<ScrapedRecord>,
    target_epsg: u32,
    work_dir: &Path,
) -> Result<LabelExportOutputs> {
    let extracted_dir = work_dir.join("shapefile");
    shapefile_input::extract_bundle(shapefile_zip, &extracted_dir).context("extracting shapefile bundle")?;

    let shp_path = shapefile_input::find_shapefile(&extracted_dir)?;
    let shapefile_data = shapefile_input::load_geometries(&shp_path).context("loading shapefile geometries")?;
    let source_epsg = shapefile_data.source_epsg.unwrap_or(target_epsg);

    let spreadsheet_path = work_dir.join("parcels_enriched.xlsx");
    spreadsheet::write_records(&records, &spreadsheet_path).context("writing enriched spreadsheet")?;

    let rows = join::join(records, &shapefile_data)?;

    let dxf_path = work_dir.join("labels.dxf");
    dxf_output::write_drawing(&rows, source_epsg, target_epsg, &dxf_path).context("writing DXF drawing")?;

    Ok(LabelExportOutputs { spreadsheet_path, dxf_path })
}
