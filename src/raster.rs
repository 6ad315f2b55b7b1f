use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use geo::{Geometry, Point};
use geojson::{Feature, Geometry as GeoJsonGeometry};
use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::crs;
use crate::dataset::{self, RasterGrid};
use crate::error::{Error, Result};
use crate::gate::ArtifactGate;
use crate::partition;
use crate::vector::{write_collection, DatasetKind, WriteOutcome};

pub const DEFAULT_STRIDE: usize = 10;

/// Convert one raster file into a point feature collection.
///
/// The partition key comes from the filename's year token, defaulting to the
/// current processing year since rasters carry no temporal attribute. If the
/// primary sampling path fails for any reason the fallback conversion is
/// tried once; only a double failure propagates.
pub fn process_raster(
    path: &Path,
    kind: DatasetKind,
    stride: usize,
    output_dir: &Path,
    gate: &dyn ArtifactGate,
    force: bool,
) -> Result<WriteOutcome> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    let key = partition::year_from_stem(stem)
        .unwrap_or_else(|| Utc::now().format("%Y").to_string());
    let output = output_dir.join(format!("{}_{}_{}.geojson", kind.file_prefix(), key, stem));

    if gate.reuse_file(&output, force) {
        info!(
            "Skipping {} - output already exists: {}",
            path.display(),
            output.display()
        );
        return Ok(WriteOutcome { written: 0, skipped: 1 });
    }

    match sample_to_file(path, stride, &key, &output) {
        Ok(()) => Ok(WriteOutcome { written: 1, skipped: 0 }),
        Err(primary) => {
            warn!(
                "Error processing GeoTIFF {}: {primary}. Trying fallback conversion.",
                path.display()
            );
            match fallback_convert(path, &output, &key) {
                Ok(()) => Ok(WriteOutcome { written: 1, skipped: 0 }),
                Err(fallback) => {
                    error!("Fallback conversion also failed for {}: {fallback}", path.display());
                    Err(Error::RasterSample {
                        path: path.to_path_buf(),
                        primary: Box::new(primary),
                        fallback: Box::new(fallback),
                    })
                }
            }
        }
    }
}

fn sample_to_file(path: &Path, stride: usize, key: &str, output: &Path) -> Result<()> {
    let grid = dataset::read_raster_file(path)?;
    write_sampled(&grid, stride, key, output)
}

/// Sample a grid at the given stride and write the resulting points, in
/// WGS84, to the output artifact. An all-non-positive grid still writes an
/// empty feature collection.
pub(crate) fn write_sampled(
    grid: &RasterGrid,
    stride: usize,
    key: &str,
    output: &Path,
) -> Result<()> {
    let (geometries, values) = sample_grid(grid, stride);
    let geometries = crs::normalize_to_wgs84(
        geometries,
        grid.crs.as_ref(),
        &grid.source.display().to_string(),
    )?;

    let source_name = grid
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let features = geometries
        .iter()
        .zip(&values)
        .map(|(geometry, &value)| {
            let mut properties = Map::new();
            properties.insert("value".to_string(), Value::from(value));
            properties.insert("date".to_string(), Value::from(key));
            properties.insert("source_file".to_string(), Value::from(source_name.clone()));
            Feature {
                bbox: None,
                geometry: Some(GeoJsonGeometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    write_collection(output, features)
}

/// Walk the grid at a fixed row/column stride, keeping only strictly
/// positive cells. Coordinates are still in the grid's own CRS here.
pub(crate) fn sample_grid(grid: &RasterGrid, stride: usize) -> (Vec<Geometry<f64>>, Vec<f64>) {
    let stride = stride.max(1);
    let mut geometries = Vec::new();
    let mut values = Vec::new();
    for row in (0..grid.height).step_by(stride) {
        for col in (0..grid.width).step_by(stride) {
            let value = grid.value(row, col);
            if value > 0.0 {
                let (x, y) = grid.cell_coordinate(row, col);
                geometries.push(Geometry::Point(Point::new(x, y)));
                values.push(f64::from(value));
            }
        }
    }
    (geometries, values)
}

/// Removes the temporary export file on every exit path.
struct TempCsv(PathBuf);

impl Drop for TempCsv {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

/// Independent raster-to-point path used when sampling fails: export the
/// raster to tabular form with gdal_translate and build points from its
/// literal X/Y columns.
///
/// The exported coordinates are taken to already be WGS84 and no
/// reprojection is applied, unlike the primary path. That asymmetry is part
/// of this function's contract.
fn fallback_convert(path: &Path, output: &Path, key: &str) -> Result<()> {
    let temp = std::env::temp_dir().join(format!(
        "ais_processor_{}_{}.csv",
        std::process::id(),
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("raster")
    ));
    let _cleanup = TempCsv(temp.clone());

    let result = Command::new("gdal_translate")
        .args(["-of", "CSV"])
        .arg(path)
        .arg(&temp)
        .output()?;
    if !result.status.success() {
        return Err(Error::ExternalTool {
            tool: "gdal_translate",
            message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let features = features_from_csv(&temp, key, &source_name)?;
    write_collection(output, features)
}

/// Parse a tabular export into point features. The export must carry literal
/// `X` and `Y` columns; remaining columns pass through as properties.
pub(crate) fn features_from_csv(
    csv_path: &Path,
    key: &str,
    source_name: &str,
) -> Result<Vec<Feature>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let x_idx = headers.iter().position(|h| h == "X");
    let y_idx = headers.iter().position(|h| h == "Y");
    let (x_idx, y_idx) = match (x_idx, y_idx) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(Error::ExternalTool {
                tool: "gdal_translate",
                message: "CSV export does not contain X and Y columns".to_string(),
            })
        }
    };

    let mut features = Vec::new();
    for row in reader.records() {
        let row = row?;
        let x: f64 = row
            .get(x_idx)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0);
        let y: f64 = row
            .get(y_idx)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0);

        let mut properties = Map::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == x_idx || idx == y_idx {
                continue;
            }
            let raw = row.get(idx).unwrap_or("");
            let value = raw
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(raw));
            properties.insert(header.to_string(), value);
        }
        properties.insert("date".to_string(), Value::from(key));
        properties.insert("source_file".to_string(), Value::from(source_name));

        features.push(Feature {
            bbox: None,
            geometry: Some(GeoJsonGeometry::new(geojson::Value::Point(vec![x, y]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Crs;
    use crate::gate::FsGate;
    use geojson::FeatureCollection;
    use std::io::Write;

    fn grid(values: Vec<f32>, width: usize, height: usize) -> RasterGrid {
        RasterGrid {
            values,
            width,
            height,
            transform: [10.0, 1.0, 0.0, 60.0, 0.0, -1.0],
            crs: Some(Crs::wgs84()),
            source: PathBuf::from("AISVTC2023.tif"),
        }
    }

    fn read_features(path: &Path) -> Vec<Feature> {
        let text = std::fs::read_to_string(path).unwrap();
        let geojson: geojson::GeoJson = text.parse().unwrap();
        FeatureCollection::try_from(geojson).unwrap().features
    }

    #[test]
    fn stride_skips_cells_and_drops_non_positive_values() {
        // 4x4 grid: positives on the diagonal, zero and negative elsewhere.
        let mut values = vec![0.0_f32; 16];
        values[0] = 5.0; // (0, 0) sampled at stride 2
        values[5] = 3.0; // (1, 1) not on the stride lattice
        values[10] = 7.0; // (2, 2) sampled
        values[15] = -1.0; // non-positive, dropped even if sampled
        let g = grid(values, 4, 4);

        let (geometries, sampled) = sample_grid(&g, 2);
        assert_eq!(sampled, vec![5.0, 7.0]);
        assert_eq!(geometries.len(), 2);
    }

    #[test]
    fn zero_stride_is_clamped_to_one() {
        let g = grid(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let (_, values) = sample_grid(&g, 0);
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn all_non_positive_grid_writes_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("transit_counts_2023_AISVTC2023.geojson");
        let g = grid(vec![0.0, -2.0, 0.0, -0.5], 2, 2);

        write_sampled(&g, 1, "2023", &output).unwrap();

        let features = read_features(&output);
        assert!(features.is_empty());
    }

    #[test]
    fn sampled_points_carry_value_date_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.geojson");
        let g = grid(vec![4.5, 0.0, 0.0, 0.0], 2, 2);

        write_sampled(&g, 1, "2023", &output).unwrap();

        let features = read_features(&output);
        assert_eq!(features.len(), 1);
        let props = features[0].properties.as_ref().unwrap();
        assert_eq!(props["value"], Value::from(4.5));
        assert_eq!(props["date"], Value::from("2023"));
        assert_eq!(props["source_file"], Value::from("AISVTC2023.tif"));
    }

    #[test]
    fn csv_export_with_xy_builds_unprojected_points() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("export.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "X,Y,VALUE").unwrap();
        writeln!(file, "-70.25,42.5,12").unwrap();
        drop(file);

        let features = features_from_csv(&csv_path, "2023", "grid.tif").unwrap();
        assert_eq!(features.len(), 1);
        // Coordinates are used verbatim: this path never reprojects.
        let geometry = features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.value, geojson::Value::Point(vec![-70.25, 42.5]));
        let props = features[0].properties.as_ref().unwrap();
        assert_eq!(props["VALUE"], Value::from(12.0));
        assert_eq!(props["date"], Value::from("2023"));
    }

    #[test]
    fn csv_export_without_xy_is_an_external_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("export.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "lon,lat,value").unwrap();
        writeln!(file, "1.0,2.0,3").unwrap();
        drop(file);

        let err = features_from_csv(&csv_path, "2023", "grid.tif").unwrap_err();
        assert!(matches!(err, Error::ExternalTool { tool: "gdal_translate", .. }));
    }

    #[test]
    fn unreadable_raster_fails_through_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_grid_2023.tif");

        let err = process_raster(
            &missing,
            DatasetKind::TransitCounts,
            DEFAULT_STRIDE,
            dir.path(),
            &FsGate,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RasterSample { .. }));
    }
}
