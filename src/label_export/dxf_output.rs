//! CAD emission: one `LwPolyline` per boundary's exterior
//! ring on a boundary layer, one `MText` label per parcel on a label layer.
//!
//! Grounded on `label_exporter.py`'s `ezdxf` usage: unitless drawing,
//! `PARCEL_BOUNDARIES_NOTES` / `PARCEL_LABELS` layer names, `TEXT_HEIGHT = 5`,
//! middle-center `MTEXT` attachment. Only exterior rings are drawn; the
//! original does not draw interior holes either.

use super::join::JoinedRow;
use crate::label_export::geometry;
use anyhow::{Context, Result};
use dxf::entities::{Entity, EntityType, LwPolyline, LwPolylineVertex, MText};
use dxf::enums::AttachmentPoint;
use dxf::tables::Layer;
use dxf::{Drawing, Point};
use std::path::Path;

pub const BOUNDARY_LAYER: &str = "PARCEL_BOUNDARIES_NOTES";
pub const LABEL_LAYER: &str = "PARCEL_LABELS";
const TEXT_HEIGHT: f64 = 5.0;

/// Build and save a DXF drawing for every joined row, reprojecting each
/// row's boundary and label point from `source_epsg` to `target_epsg`
/// (a no-op when they're equal).
pub fn write_drawing(
    rows: &[JoinedRow],
    source_epsg: u32,
    target_epsg: u32,
    out_path: &Path,
) -> Result<()> {
    let mut drawing = Drawing::new();
    drawing.layers.push(Layer { name: BOUNDARY_LAYER.to_string(), ..Default::default() });
    drawing.layers.push(Layer { name: LABEL_LAYER.to_string(), ..Default::default() });

    for row in rows {
        let boundary = geometry::reproject_multipolygon(&row.boundary, source_epsg, target_epsg)
            .with_context(|| format!("reprojecting boundary for {}", row.canonical_key))?;
        let label_point_src = geometry::representative_point(&row.boundary)
            .with_context(|| format!("computing representative point for {}", row.canonical_key))?;
        let label_point = geometry::reproject_point(label_point_src, source_epsg, target_epsg)
            .with_context(|| format!("reprojecting label point for {}", row.canonical_key))?;

        for polygon in &boundary.0 {
            let vertices = polygon
                .exterior()
                .coords()
                .map(|c| LwPolylineVertex { x: c.x, y: c.y, ..Default::default() })
                .collect();
            let mut entity = Entity::new(EntityType::LwPolyline(LwPolyline { vertices, ..Default::default() }));
            entity.common.layer = BOUNDARY_LAYER.to_string();
            drawing.entities.push(entity);
        }

        let label_text = super::join::compose_label(row);
        let mut mtext = MText::default();
        mtext.insertion_point = Point::new(label_point.x(), label_point.y(), 0.0);
        mtext.text_height = TEXT_HEIGHT;
        mtext.attachment_point = AttachmentPoint::MiddleCenter;
        mtext.insert_text(&label_text);

        let mut entity = Entity::new(EntityType::MText(mtext));
        entity.common.layer = LABEL_LAYER.to_string();
        drawing.entities.push(entity);
    }

    drawing.save_file(out_path).with_context(|| format!("saving DXF to {}", out_path.display()))
}
