use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

/// Swap the two leading components of every position in a nested
/// coordinate array. An array whose first element is a number is treated
/// as a position; anything that is not an array is returned as is.
pub fn swap_axes(coords: &Value) -> Value {
    match coords {
        Value::Array(items) if items.first().is_some_and(Value::is_number) => {
            let mut pair = items.clone();
            if pair.len() >= 2 {
                pair.swap(0, 1);
            }
            Value::Array(pair)
        }
        Value::Array(items) => Value::Array(items.iter().map(swap_axes).collect()),
        other => other.clone(),
    }
}

/// Axis-swapped copy of a geometry object. Only Polygon and MultiPolygon
/// are touched; other geometry types come back unchanged.
pub fn normalize_geometry(geometry: &Value) -> Value {
    let mut out = geometry.clone();
    let polygonal = matches!(
        geometry.get("type").and_then(Value::as_str),
        Some("Polygon") | Some("MultiPolygon")
    );
    if polygonal {
        if let Some(coords) = geometry.get("coordinates") {
            out["coordinates"] = swap_axes(coords);
        }
    }
    out
}

/// Normalize a FeatureCollection, a single Feature or a bare geometry.
pub fn normalize_boundary(geojson: &Value) -> Value {
    match geojson.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let mut out = geojson.clone();
            if let Some(Value::Array(features)) = geojson.get("features") {
                out["features"] = Value::Array(features.iter().map(normalize_feature).collect());
            }
            out
        }
        Some("Feature") => normalize_feature(geojson),
        _ => normalize_geometry(geojson),
    }
}

fn normalize_feature(feature: &Value) -> Value {
    let mut out = feature.clone();
    if let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) {
        out["geometry"] = normalize_geometry(geometry);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLngBounds {
    pub south_west: [f64; 2],
    pub north_east: [f64; 2],
}

impl LatLngBounds {
    fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            south_west: [rect.min().y, rect.min().x],
            north_east: [rect.max().y, rect.max().x],
        }
    }

    /// Bounds of a `[lat, lon]` polyline.
    pub fn of_points(points: &[[f64; 2]]) -> Option<Self> {
        let line: LineString<f64> = points.iter().map(|&p| lat_lon_coord(p)).collect();
        line.bounding_rect().map(Self::from_rect)
    }
}

fn lat_lon_coord([lat, lon]: [f64; 2]) -> Coord<f64> {
    Coord { x: lon, y: lat }
}

/// Region outline, already in `[lat, lon]` order.
#[derive(Debug, Clone)]
pub struct Boundary {
    geojson: Value,
    outline: MultiPolygon<f64>,
}

impl Boundary {
    /// Takes raw `[lon, lat]` GeoJSON.
    pub fn from_geojson(raw: &Value) -> Self {
        let geojson = normalize_boundary(raw);
        let mut polygons = Vec::new();
        collect_polygons(&geojson, &mut polygons);
        Self {
            geojson,
            outline: MultiPolygon::new(polygons),
        }
    }

    pub fn geojson(&self) -> &Value {
        &self.geojson
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.outline.bounding_rect().map(LatLngBounds::from_rect)
    }
}

fn collect_polygons(node: &Value, out: &mut Vec<Polygon<f64>>) {
    match node.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            for feature in node.get("features").and_then(Value::as_array).into_iter().flatten() {
                collect_polygons(feature, out);
            }
        }
        Some("Feature") => {
            if let Some(geometry) = node.get("geometry") {
                collect_polygons(geometry, out);
            }
        }
        Some("Polygon") => {
            if let Some(polygon) = node.get("coordinates").and_then(parse_polygon) {
                out.push(polygon);
            }
        }
        Some("MultiPolygon") => {
            let polygons = node.get("coordinates").and_then(Value::as_array);
            out.extend(polygons.into_iter().flatten().filter_map(parse_polygon));
        }
        _ => {}
    }
}

fn parse_polygon(rings: &Value) -> Option<Polygon<f64>> {
    let mut rings = rings.as_array()?.iter().map(parse_ring);
    let exterior = rings.next()??;
    let interiors = rings.flatten().collect();
    Some(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &Value) -> Option<LineString<f64>> {
    ring.as_array()?
        .iter()
        .map(|pos| {
            let pos = pos.as_array()?;
            Some(lat_lon_coord([pos.first()?.as_f64()?, pos.get(1)?.as_f64()?]))
        })
        .collect()
}

/// Loads the boundary file at most once; later calls share the first result.
#[derive(Default)]
pub struct BoundaryCache {
    cell: OnceCell<Arc<Boundary>>,
}

impl BoundaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load(&self, path: &Path) -> anyhow::Result<Arc<Boundary>> {
        let boundary = self
            .cell
            .get_or_try_init(|| async {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading boundary {}", path.display()))?;
                let raw: Value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing boundary {}", path.display()))?;
                let boundary = Boundary::from_geojson(&raw);
                info!(path = %path.display(), polygons = boundary.outline.0.len(), "boundary loaded");
                Ok::<_, anyhow::Error>(Arc::new(boundary))
            })
            .await?;
        Ok(boundary.clone())
    }
}
