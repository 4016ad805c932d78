//! Baseline noise ingest from a GeoJSON feature collection.
//!
//! Each feature carries `row`, `col` and `noise_level` properties and a polygon
//! whose centroid gives the cell position. Coordinates are reprojected into
//! the simulator plane on the way in.

use crate::error::Result;
use crate::models::Coordinate;
use crate::spatial::{polygon_centroid, Projection};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One baseline cell: grid address, ambient level and projected centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineCell {
    pub row: u32,
    pub col: u32,
    /// Ambient level in dB
    pub noise_level: f64,
    #[serde(default)]
    pub centroid: Option<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    row: u32,
    col: u32,
    noise_level: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
    Point { coordinates: [f64; 2] },
}

impl Geometry {
    /// Centroid in source coordinates, `(x, y)`.
    fn centroid(&self) -> Option<(f64, f64)> {
        match self {
            Geometry::Polygon { coordinates } => outer_ring_centroid(coordinates.first()?),
            Geometry::MultiPolygon { coordinates } => {
                outer_ring_centroid(coordinates.first()?.first()?)
            }
            Geometry::Point { coordinates } => Some((coordinates[0], coordinates[1])),
        }
    }
}

fn outer_ring_centroid(ring: &[[f64; 2]]) -> Option<(f64, f64)> {
    let points: Vec<(f64, f64)> = ring.iter().map(|p| (p[0], p[1])).collect();
    polygon_centroid(&points)
}

/// Parse a baseline feature collection from a JSON string.
pub fn parse_baseline(json: &str, projection: &dyn Projection) -> Result<Vec<BaselineCell>> {
    let collection: FeatureCollection = serde_json::from_str(json)?;
    Ok(collect_cells(collection, projection))
}

/// Read a baseline feature collection from disk.
pub fn load_baseline(path: &Path, projection: &dyn Projection) -> Result<Vec<BaselineCell>> {
    let reader = BufReader::new(File::open(path)?);
    let collection: FeatureCollection = serde_json::from_reader(reader)?;
    let cells = collect_cells(collection, projection);
    tracing::info!(path = %path.display(), cells = cells.len(), "loaded baseline noise");
    Ok(cells)
}

fn collect_cells(collection: FeatureCollection, projection: &dyn Projection) -> Vec<BaselineCell> {
    collection
        .features
        .into_iter()
        .map(|feature| {
            let centroid = feature
                .geometry
                .as_ref()
                .and_then(Geometry::centroid)
                .map(|(x, y)| projection.project(x, y));
            BaselineCell {
                row: feature.properties.row,
                col: feature.properties.col,
                noise_level: feature.properties.noise_level,
                centroid,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::IdentityProjection;

    #[test]
    fn test_parse_polygon_features() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"row": 0, "col": 1, "noise_level": 55.5},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[100.0, 0.0], [200.0, 0.0], [200.0, 100.0], [100.0, 100.0], [100.0, 0.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"row": 2, "col": 3, "noise_level": 48.0},
                    "geometry": null
                }
            ]
        }"#;
        let cells = parse_baseline(json, &IdentityProjection).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].row, 0);
        assert_eq!(cells[0].col, 1);
        assert_eq!(cells[0].centroid, Some(Coordinate::new(50.0, 150.0)));
        assert_eq!(cells[1].centroid, None);
        assert_eq!(cells[1].noise_level, 48.0);
    }

    #[test]
    fn test_parse_rejects_missing_properties() {
        let json = r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "properties": {"row": 0}}]}"#;
        assert!(parse_baseline(json, &IdentityProjection).is_err());
    }
}
