use std::fs::File;
use std::path::Path;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use geojson::{Feature, FeatureCollection, Geometry as GeoJsonGeometry};
use log::info;
use serde_json::{Map, Value};

use crate::dataset::{VectorDataset, VectorRecord};
use crate::error::Result;
use crate::gate::ArtifactGate;
use crate::partition;

/// The two vessel-traffic dataset kinds, each with its own curated property
/// set and default temporal field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    VesselTracks,
    TransitCounts,
}

impl DatasetKind {
    pub fn file_prefix(self) -> &'static str {
        match self {
            DatasetKind::VesselTracks => "vessel_tracks",
            DatasetKind::TransitCounts => "transit_counts",
        }
    }

    pub fn default_time_field(self) -> &'static str {
        match self {
            DatasetKind::VesselTracks => "TIMESTAMP",
            DatasetKind::TransitCounts => "BaseDateTime",
        }
    }

    /// Source attribute names consumed by the curated properties; these are
    /// not repeated as passthrough.
    fn curated_sources(self) -> &'static [&'static str] {
        match self {
            DatasetKind::VesselTracks => &[
                "MMSI",
                "VesselType",
                "VesselName",
                "Length",
                "Width",
                "Draft",
                "SOG",
                "COG",
            ],
            DatasetKind::TransitCounts => &["VesselCount", "TransitCount"],
        }
    }
}

/// Per-file artifact bookkeeping reported back to the driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: usize,
    pub skipped: usize,
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn integer(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f as i64).unwrap_or(0)
        }),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Serialize one record into a GeoJSON feature. Curated fields are written
/// first and win over passthrough attributes on name collision; passthrough
/// keeps the source column order.
fn build_feature(
    record: &VectorRecord,
    kind: DatasetKind,
    date: &str,
    timestamp: Option<&NaiveDateTime>,
    time_field: &str,
) -> Feature {
    let mut properties = Map::new();
    properties.insert("date".to_string(), Value::from(date));

    match kind {
        DatasetKind::VesselTracks => {
            if let Some(ts) = timestamp {
                properties.insert(
                    "timestamp".to_string(),
                    Value::from(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
                );
            }
            properties.insert("mmsi".to_string(), Value::from(text(record.attribute("MMSI"))));
            properties.insert(
                "vessel_type".to_string(),
                Value::from(text(record.attribute("VesselType"))),
            );
            properties.insert(
                "vessel_name".to_string(),
                Value::from(text(record.attribute("VesselName"))),
            );
            properties.insert("length".to_string(), Value::from(number(record.attribute("Length"))));
            properties.insert("width".to_string(), Value::from(number(record.attribute("Width"))));
            properties.insert("draft".to_string(), Value::from(number(record.attribute("Draft"))));
            properties.insert("speed".to_string(), Value::from(number(record.attribute("SOG"))));
            properties.insert("course".to_string(), Value::from(number(record.attribute("COG"))));
        }
        DatasetKind::TransitCounts => {
            properties.insert(
                "vessel_count".to_string(),
                Value::from(integer(record.attribute("VesselCount"))),
            );
            properties.insert(
                "transit_count".to_string(),
                Value::from(integer(record.attribute("TransitCount"))),
            );
        }
    }

    let consumed = kind.curated_sources();
    for (name, value) in &record.attributes {
        if name == time_field || consumed.contains(&name.as_str()) {
            continue;
        }
        if !properties.contains_key(name) {
            properties.insert(name.clone(), value.clone());
        }
    }

    Feature {
        bbox: None,
        geometry: Some(GeoJsonGeometry::new(geojson::Value::from(&record.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub(crate) fn write_collection(path: &Path, features: Vec<Feature>) -> Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &collection)?;
    Ok(())
}

/// Group a normalized (WGS84) vector record set by partition key and write
/// one feature collection per key.
///
/// When the temporal field is missing from the data entirely, the whole file
/// collapses into a single artifact keyed by the filename's year token;
/// without that token the file is rejected.
pub fn partition_vector(
    dataset: &VectorDataset,
    kind: DatasetKind,
    time_field: &str,
    stem: &str,
    output_dir: &Path,
    gate: &dyn ArtifactGate,
    force: bool,
) -> Result<WriteOutcome> {
    let mut outcome = WriteOutcome::default();
    let has_time_field = dataset
        .records
        .iter()
        .any(|record| record.has_attribute(time_field));

    if !has_time_field {
        let key = partition::require_year_from_stem(stem)?;
        let output = output_dir.join(format!("{}_{}.geojson", kind.file_prefix(), key));
        if gate.reuse_file(&output, force) {
            info!("Skipping {stem} - output already exists: {}", output.display());
            outcome.skipped += 1;
            return Ok(outcome);
        }
        let features = dataset
            .records
            .iter()
            .map(|record| build_feature(record, kind, &key, None, time_field))
            .collect();
        write_collection(&output, features)?;
        outcome.written += 1;
        return Ok(outcome);
    }

    // BTreeMap keeps artifact order deterministic across runs.
    let mut groups: BTreeMap<String, Vec<(&VectorRecord, NaiveDateTime)>> = BTreeMap::new();
    for record in &dataset.records {
        let value = record.attribute(time_field).cloned().unwrap_or(Value::Null);
        let ts = partition::parse_time_value(time_field, &value)?;
        groups
            .entry(partition::key_from_timestamp(&ts))
            .or_default()
            .push((record, ts));
    }

    for (key, records) in groups {
        let output = output_dir.join(format!("{}_{}.geojson", kind.file_prefix(), key));
        if gate.reuse_file(&output, force) {
            info!(
                "Skipping {key} from {stem} - output already exists: {}",
                output.display()
            );
            outcome.skipped += 1;
            continue;
        }
        let features = records
            .iter()
            .map(|(record, ts)| build_feature(record, kind, &key, Some(ts), time_field))
            .collect();
        write_collection(&output, features)?;
        outcome.written += 1;
    }

    Ok(outcome)
}
