use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::crs;
use crate::dataset;
use crate::error::Result;
use crate::gate::ArtifactGate;
use crate::raster::{self, DEFAULT_STRIDE};
use crate::vector::{self, DatasetKind, WriteOutcome};

/// What to do when a single input file fails. `Continue` is the historical
/// best-effort behavior: log, count, move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorPolicy {
    Continue,
    Abort,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub kind: DatasetKind,
    /// Temporal attribute name; `None` means the kind's default.
    pub time_field: Option<String>,
    pub force: bool,
    pub stride: usize,
    pub on_file_error: FileErrorPolicy,
}

impl PipelineConfig {
    pub fn new(kind: DatasetKind) -> Self {
        PipelineConfig {
            kind,
            time_field: None,
            force: false,
            stride: DEFAULT_STRIDE,
            on_file_error: FileErrorPolicy::Continue,
        }
    }

    pub fn time_field(&self) -> &str {
        self.time_field
            .as_deref()
            .unwrap_or_else(|| self.kind.default_time_field())
    }
}

/// Per-run bookkeeping reported to the caller. Individual file failures end
/// up in `errored`, never in a propagated error (under `Continue`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
}

enum FileClass {
    Vector,
    Raster,
    Unsupported,
}

fn classify(path: &Path, kind: DatasetKind) -> FileClass {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("shp") => FileClass::Vector,
        // Rasters only occur in the transit-count datasets.
        Some("tif") | Some("tiff") if kind == DatasetKind::TransitCounts => FileClass::Raster,
        _ => FileClass::Unsupported,
    }
}

/// A single file is taken as-is; a directory is scanned for recognized
/// extensions. Sorted so runs are deterministic regardless of filesystem
/// enumeration order.
pub(crate) fn candidate_files(input: &Path, kind: DatasetKind) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && !matches!(classify(path, kind), FileClass::Unsupported)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn process_vector_file(
    path: &Path,
    config: &PipelineConfig,
    output_dir: &Path,
    gate: &dyn ArtifactGate,
) -> Result<WriteOutcome> {
    let dataset = dataset::read_vector_file(path)?;
    let dataset = crs::normalize_dataset(dataset, &path.display().to_string())?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    vector::partition_vector(
        &dataset,
        config.kind,
        config.time_field(),
        stem,
        output_dir,
        gate,
        config.force,
    )
}

/// Process every candidate file under `input` into date-partitioned GeoJSON
/// artifacts in `output_dir`.
///
/// Per-file errors are isolated: they are logged and counted, and the run
/// carries on with the next file unless the policy is `Abort`. Only failures
/// to set up the output directory propagate unconditionally.
pub fn run(
    input: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    gate: &dyn ArtifactGate,
) -> Result<RunSummary> {
    fs::create_dir_all(output_dir)?;
    let files = candidate_files(input, config.kind)?;

    let mut summary = RunSummary::default();
    for file in &files {
        let outcome = match classify(file, config.kind) {
            FileClass::Unsupported => {
                info!("Unsupported file format: {}", file.display());
                continue;
            }
            FileClass::Vector => process_vector_file(file, config, output_dir, gate),
            FileClass::Raster => raster::process_raster(
                file,
                config.kind,
                config.stride,
                output_dir,
                gate,
                config.force,
            ),
        };
        match outcome {
            Ok(WriteOutcome { written: 0, skipped }) if skipped > 0 => summary.skipped += 1,
            Ok(_) => summary.processed += 1,
            Err(e) => {
                error!("Error processing file {}: {e}", file.display());
                summary.errored += 1;
                if config.on_file_error == FileErrorPolicy::Abort {
                    return Err(e);
                }
            }
        }
    }

    info!(
        "Processing complete. Processed {} files, skipped {} files, {} errors. Output saved to {}",
        summary.processed,
        summary.skipped,
        summary.errored,
        output_dir.display()
    );
    Ok(summary)
}
