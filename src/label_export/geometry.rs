//! Representative point and CRS reprojection.
//!
//! Grounded on `label_exporter.py`'s `geometry.representative_point()` plus
//! `pyproj.Transformer`-based reprojection of both the label point and the
//! boundary geometry. `proj4rs` has no WKT parser, so it is driven directly
//! by EPSG code via its `crs-definitions` feature rather than by the shapefile's
//! `.prj` text.

use anyhow::{Context, Result};
use geo::InteriorPoint;
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use proj4rs::Proj;

/// The boundary's representative point (guaranteed to lie inside the
/// polygon, unlike a centroid), matching `geometry.representative_point()`.
pub fn representative_point(boundary: &MultiPolygon<f64>) -> Result<Point<f64>> {
    boundary.interior_point().context("polygon has no interior point")
}

/// Reproject a single point from `source_epsg` to `target_epsg`.
pub fn reproject_point(point: Point<f64>, source_epsg: u32, target_epsg: u32) -> Result<Point<f64>> {
    if source_epsg == target_epsg {
        return Ok(point);
    }
    let from = epsg_proj(source_epsg)?;
    let to = epsg_proj(target_epsg)?;

    let (mut x, mut y) = (point.x(), point.y());
    if from.is_latlong() {
        x = x.to_radians();
        y = y.to_radians();
    }
    proj4rs::transform::transform(&from, &to, &mut (x, y))
        .map_err(|err| anyhow::anyhow!("reprojecting point {source_epsg}->{target_epsg}: {err}"))?;
    if to.is_latlong() {
        x = x.to_degrees();
        y = y.to_degrees();
    }
    Ok(Point::new(x, y))
}

/// Reproject every ring of a boundary geometry, preserving holes.
pub fn reproject_multipolygon(
    boundary: &MultiPolygon<f64>,
    source_epsg: u32,
    target_epsg: u32,
) -> Result<MultiPolygon<f64>> {
    if source_epsg == target_epsg {
        return Ok(boundary.clone());
    }
    let from = epsg_proj(source_epsg)?;
    let to = epsg_proj(target_epsg)?;

    let polygons = boundary
        .0
        .iter()
        .map(|polygon| reproject_polygon(polygon, &from, &to))
        .collect::<Result<Vec<_>>>()?;
    Ok(MultiPolygon::new(polygons))
}

fn reproject_polygon(polygon: &Polygon<f64>, from: &Proj, to: &Proj) -> Result<Polygon<f64>> {
    let exterior = reproject_ring(polygon.exterior(), from, to)?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| reproject_ring(ring, from, to))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn reproject_ring(ring: &LineString<f64>, from: &Proj, to: &Proj) -> Result<LineString<f64>> {
    let coords = ring
        .coords()
        .map(|c| {
            let (mut x, mut y) = (c.x, c.y);
            if from.is_latlong() {
                x = x.to_radians();
                y = y.to_radians();
            }
            proj4rs::transform::transform(from, to, &mut (x, y))
                .map_err(|err| anyhow::anyhow!("reprojecting ring vertex: {err}"))?;
            if to.is_latlong() {
                x = x.to_degrees();
                y = y.to_degrees();
            }
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::from(coords))
}

fn epsg_proj(code: u32) -> Result<Proj> {
    Proj::from_epsg_code(code).with_context(|| format!("resolving EPSG:{code} via proj4rs crs-definitions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};

    #[test]
    fn representative_point_lies_inside_square() {
        let square: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ];
        let mp = MultiPolygon::new(vec![square]);
        let point = representative_point(&mp).unwrap();
        assert!((0.0..=10.0).contains(&point.x()));
        assert!((0.0..=10.0).contains(&point.y()));
    }

    #[test]
    fn reprojection_is_identity_when_codes_match() {
        let point = Point::new(-86.5, 39.2);
        let reprojected = reproject_point(point, 4326, 4326).unwrap();
        assert!((reprojected.x() - point.x()).abs() < 1e-9);
        assert!((reprojected.y() - point.y()).abs() < 1e-9);
    }
}
