//! Shapefile bundle ingestion: extract the archive,
//! locate `Parcels.shp`/`Parcel.shp`, and load geometries with attributes
//! and source CRS.
//!
//! Grounded on `examples/original_source/apps/api/utils/label_exporter.py`
//! (`zipfile.extractall`, the recursive `os.walk` search for the shapefile,
//! `gpd.read_file` carrying both attributes and `gdf.crs`).

use crate::error::PipelineError;
use anyhow::{Context, Result};
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub struct ShapefileFeature {
    pub attributes: HashMap<String, String>,
    pub geometry: MultiPolygon<f64>,
}

pub struct ShapefileData {
    pub features: Vec<ShapefileFeature>,
    /// EPSG code read from the sidecar `.prj`, when it carries one.
    pub source_epsg: Option<u32>,
}

/// Unpack `zip_path` into `dest_dir`.
pub fn extract_bundle(zip_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating shapefile extraction directory {}", dest_dir.display()))?;
    let file = std::fs::File::open(zip_path).with_context(|| format!("opening {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).with_context(|| format!("reading zip {}", zip_path.display()))?;
    archive.extract(dest_dir).with_context(|| format!("extracting {} into {}", zip_path.display(), dest_dir.display()))?;
    Ok(())
}

/// Recursively find a file case-insensitively named `Parcels.shp` or
/// `Parcel.shp`. Fails with `shapefile_missing` if none is present.
pub fn find_shapefile(dir: &Path) -> Result<PathBuf, PipelineError> {
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else { continue };
        let lower = name.to_lowercase();
        if lower == "parcels.shp" || lower == "parcel.shp" {
            return Ok(entry.path().to_path_buf());
        }
    }
    Err(PipelineError::ShapefileMissing {
        reason: format!("no Parcels.shp or Parcel.shp found under {}", dir.display()),
    })
}

/// Load every feature's geometry and attribute table, plus the source CRS
/// read from the sidecar `.prj` when present.
pub fn load_geometries(shp_path: &Path) -> Result<ShapefileData> {
    let mut reader = shapefile::Reader::from_path(shp_path)
        .with_context(|| format!("opening shapefile {}", shp_path.display()))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("reading shapefile feature")?;
        let geometry = to_multipolygon(shape)?;
        let attributes = record.into_iter().map(|(name, value)| (name, field_value_to_string(&value))).collect();
        features.push(ShapefileFeature { attributes, geometry });
    }

    Ok(ShapefileData { features, source_epsg: read_prj_epsg(shp_path) })
}

fn to_multipolygon(shape: shapefile::Shape) -> Result<MultiPolygon<f64>> {
    let shapefile::Shape::Polygon(polygon) = shape else {
        anyhow::bail!("expected a Polygon shape in parcel shapefile, found {shape:?}");
    };

    let mut polygons = Vec::new();
    let mut current_exterior: Option<Vec<Coord<f64>>> = None;
    let mut current_holes: Vec<LineString<f64>> = Vec::new();

    for ring in polygon.rings() {
        let (is_outer, points) = match ring {
            shapefile::PolygonRing::Outer(pts) => (true, pts),
            shapefile::PolygonRing::Inner(pts) => (false, pts),
        };
        let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();

        if is_outer {
            if let Some(exterior) = current_exterior.take() {
                polygons.push(Polygon::new(LineString::from(exterior), std::mem::take(&mut current_holes)));
            }
            current_exterior = Some(coords);
        } else {
            current_holes.push(LineString::from(coords));
        }
    }
    if let Some(exterior) = current_exterior {
        polygons.push(Polygon::new(LineString::from(exterior), current_holes));
    }

    Ok(MultiPolygon::new(polygons))
}

fn field_value_to_string(value: &shapefile::dbase::FieldValue) -> String {
    use shapefile::dbase::FieldValue;
    match value {
        FieldValue::Character(Some(s)) => s.trim().to_string(),
        FieldValue::Character(None) => String::new(),
        FieldValue::Numeric(Some(n)) => n.to_string(),
        FieldValue::Numeric(None) => String::new(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Float(Some(n)) => n.to_string(),
        FieldValue::Float(None) => String::new(),
        FieldValue::Logical(Some(b)) => b.to_string(),
        FieldValue::Logical(None) => String::new(),
        other => format!("{other:?}"),
    }
}

/// Extract the overall EPSG authority code from a WKT1 `.prj` sidecar, when
/// present. ESRI shapefiles commonly carry `AUTHORITY["EPSG","NNNN"]]` as
/// the outermost authority clause; `.prj` files without one (common for
/// custom/local state-plane exports) leave `source_epsg` unset, in which
/// case the join step treats the job's target `crs_code` as already
/// matching (no reprojection needed), an implementation decision recorded
/// in DESIGN.md since the exact `.prj` parsing fallback is left open.
fn read_prj_epsg(shp_path: &Path) -> Option<u32> {
    static EPSG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"AUTHORITY\["EPSG","(\d+)"\]"#).expect("valid regex"));

    let prj_path = shp_path.with_extension("prj");
    let wkt = std::fs::read_to_string(prj_path).ok()?;
    EPSG_RE.captures_iter(&wkt).last()?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_shapefile_case_insensitively_in_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("PARCELS.SHP"), b"").unwrap();

        let found = find_shapefile(dir.path()).unwrap();
        assert_eq!(found, sub.join("PARCELS.SHP"));
    }

    #[test]
    fn missing_shapefile_fails_with_shapefile_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_shapefile(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "shapefile_missing");
    }

    #[test]
    fn reads_epsg_from_prj_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("Parcels.shp");
        std::fs::write(&shp, b"").unwrap();
        std::fs::write(
            dir.path().join("Parcels.prj"),
            br#"PROJCS["NAD83",GEOGCS["GCS_NAD83"],AUTHORITY["EPSG","2965"]]"#,
        )
        .unwrap();

        assert_eq!(read_prj_epsg(&shp), Some(2965));
    }
}
