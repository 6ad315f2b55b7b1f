use std::path::{Path, PathBuf};

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;
use geo::Geometry;
use serde_json::Value;

use crate::error::{Error, Result};

pub const WGS84: &str = "EPSG:4326";

/// Coordinate reference system identifier, normally an `EPSG:xxxx` authority
/// string, falling back to a proj4 string when the source carries no
/// authority code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs(pub String);

impl Crs {
    pub fn wgs84() -> Self {
        Crs(WGS84.to_string())
    }

    pub fn is_wgs84(&self) -> bool {
        self.0 == WGS84
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One row of a vector dataset: a geometry plus the source attributes in
/// their original column order. Curated fields are looked up by name; the
/// order is what passthrough serialization preserves.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub geometry: Geometry<f64>,
    pub attributes: Vec<(String, Value)>,
}

impl VectorRecord {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

#[derive(Debug)]
pub struct VectorDataset {
    pub records: Vec<VectorRecord>,
    pub crs: Option<Crs>,
}

/// A single-band raster held fully in memory: cell values, grid dimensions
/// and the GDAL-style affine geo-transform.
#[derive(Debug)]
pub struct RasterGrid {
    pub values: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: [f64; 6],
    pub crs: Option<Crs>,
    pub source: PathBuf,
}

impl RasterGrid {
    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.width + col]
    }

    /// Geographic coordinate of the cell center, in the grid's own CRS.
    pub fn cell_coordinate(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.transform;
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        let x = gt[0] + c * gt[1] + r * gt[2];
        let y = gt[3] + c * gt[4] + r * gt[5];
        (x, y)
    }
}

fn crs_of(srs: &SpatialRef) -> Option<Crs> {
    match (srs.auth_name(), srs.auth_code()) {
        (Ok(name), Ok(code)) => Some(Crs(format!("{name}:{code}"))),
        _ => srs.to_proj4().ok().map(Crs),
    }
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::IntegerValue(v) => Value::from(v),
        FieldValue::Integer64Value(v) => Value::from(v),
        FieldValue::RealValue(v) => Value::from(v),
        FieldValue::StringValue(v) => Value::from(v),
        FieldValue::DateValue(v) => Value::from(v.format("%Y-%m-%d").to_string()),
        FieldValue::DateTimeValue(v) => Value::from(v.format("%Y-%m-%dT%H:%M:%S").to_string()),
        FieldValue::IntegerListValue(v) => Value::from(v),
        FieldValue::Integer64ListValue(v) => Value::from(v),
        FieldValue::RealListValue(v) => Value::from(v),
        FieldValue::StringListValue(v) => Value::from(v),
    }
}

/// Read every feature of the first layer of a vector file (shapefile or any
/// other OGR-readable format) into memory.
pub fn read_vector_file(path: &Path) -> Result<VectorDataset> {
    let dataset = Dataset::open(path)?;
    if dataset.layer_count() == 0 {
        return Err(Error::EmptyDataset {
            path: path.to_path_buf(),
        });
    }
    let mut layer = dataset.layer(0)?;
    let crs = layer.spatial_ref().as_ref().and_then(crs_of);

    let mut records = Vec::new();
    for feature in layer.features() {
        let geometry = match feature.geometry() {
            Some(g) => g.to_geo()?,
            None => continue,
        };
        let attributes = feature
            .fields()
            .map(|(name, value)| {
                let json = value.map(field_to_json).unwrap_or(Value::Null);
                (name, json)
            })
            .collect();
        records.push(VectorRecord {
            geometry,
            attributes,
        });
    }

    Ok(VectorDataset { records, crs })
}

/// Read band 1 of a raster file as f32, together with its geo-transform and
/// declared CRS. The whole band is materialized; inputs are processed one
/// file at a time so peak memory is a single grid.
pub fn read_raster_file(path: &Path) -> Result<RasterGrid> {
    let dataset = Dataset::open(path)?;
    let transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();
    let crs = dataset.spatial_ref().ok().as_ref().and_then(crs_of);

    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

    Ok(RasterGrid {
        values: buffer.data,
        width,
        height,
        transform,
        crs,
        source: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize, transform: [f64; 6]) -> RasterGrid {
        RasterGrid {
            values: vec![0.0; width * height],
            width,
            height,
            transform,
            crs: None,
            source: PathBuf::from("test.tif"),
        }
    }

    #[test]
    fn cell_coordinate_uses_pixel_center() {
        // 1-degree pixels anchored at (10, 60), north-up.
        let g = grid(4, 4, [10.0, 1.0, 0.0, 60.0, 0.0, -1.0]);
        assert_eq!(g.cell_coordinate(0, 0), (10.5, 59.5));
        assert_eq!(g.cell_coordinate(2, 3), (13.5, 57.5));
    }

    #[test]
    fn value_indexes_row_major() {
        let mut g = grid(3, 2, [0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        g.values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(g.value(0, 2), 3.0);
        assert_eq!(g.value(1, 0), 4.0);
    }

    #[test]
    fn record_attribute_lookup() {
        let record = VectorRecord {
            geometry: Geometry::Point(geo::Point::new(0.0, 0.0)),
            attributes: vec![
                ("MMSI".to_string(), Value::from("123456789")),
                ("SOG".to_string(), Value::from(12.5)),
            ],
        };
        assert_eq!(record.attribute("SOG"), Some(&Value::from(12.5)));
        assert!(!record.has_attribute("COG"));
    }
}
