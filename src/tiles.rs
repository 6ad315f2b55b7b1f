use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::gate::ArtifactGate;
use crate::pipeline::RunSummary;

/// Zoom bounds and force flag for the tiling stage.
#[derive(Debug, Clone, Copy)]
pub struct TileConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub force: bool,
}

impl Default for TileConfig {
    fn default() -> Self {
        TileConfig {
            min_zoom: 0,
            max_zoom: 14,
            force: false,
        }
    }
}

fn run_tool(tool: &'static str, command: &mut Command) -> Result<()> {
    let output = command.output().map_err(|e| Error::ExternalTool {
        tool,
        message: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::ExternalTool {
            tool,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn probe_tool(tool: &'static str) -> Result<()> {
    run_tool(tool, Command::new(tool).arg("--version"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TileInput {
    GeoJson,
    Raster,
}

fn classify(path: &Path) -> Option<TileInput> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("geojson") => Some(TileInput::GeoJson),
        Some("tif") | Some("tiff") => Some(TileInput::Raster),
        _ => None,
    }
}

pub(crate) fn tile_candidates(input: &Path) -> Result<Vec<(PathBuf, TileInput)>> {
    if input.is_file() {
        return Ok(classify(input).map(|kind| (input.to_path_buf(), kind)).into_iter().collect());
    }
    let mut files: Vec<(PathBuf, TileInput)> = fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| classify(&path).map(|kind| (path, kind)))
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn stem_of(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown")
}

fn tile_geojson(path: &Path, output_dir: &Path, config: &TileConfig) -> Result<()> {
    let stem = stem_of(path);
    let mbtiles = output_dir.join(format!("{stem}.mbtiles"));
    let extract_dir = output_dir.join(stem);

    run_tool(
        "tippecanoe",
        Command::new("tippecanoe")
            .arg("-o")
            .arg(&mbtiles)
            .args(["-zg", "--drop-densest-as-needed", "--extend-zooms-if-still-dropping", "--force"])
            .args(["-Z", &config.min_zoom.to_string()])
            .args(["-z", &config.max_zoom.to_string()])
            .arg(path),
    )?;

    fs::create_dir_all(&extract_dir)?;
    let extracted = run_tool(
        "mb-util",
        Command::new("mb-util")
            .arg("--image_format=pbf")
            .arg(&mbtiles)
            .arg(&extract_dir),
    );
    if let Err(e) = extracted {
        // The mbtiles artifact alone is still usable.
        warn!("mb-util extraction skipped for {}: {e}", path.display());
    }
    Ok(())
}

fn tile_raster(path: &Path, output_dir: &Path, config: &TileConfig) -> Result<()> {
    let out = output_dir.join(stem_of(path));
    fs::create_dir_all(&out)?;
    run_tool(
        "gdal2tiles.py",
        Command::new("gdal2tiles.py")
            .args([
                "--zoom",
                &format!("{}-{}", config.min_zoom, config.max_zoom),
                "--webviewer=none",
                "--processes=4",
            ])
            .arg(path)
            .arg(&out),
    )
}

fn reuse(path: &Path, kind: TileInput, output_dir: &Path, config: &TileConfig, gate: &dyn ArtifactGate) -> bool {
    let stem = stem_of(path);
    match kind {
        TileInput::GeoJson => {
            gate.reuse_file(&output_dir.join(format!("{stem}.mbtiles")), config.force)
                && gate.reuse_dir(&output_dir.join(stem), config.force)
        }
        TileInput::Raster => gate.reuse_dir(&output_dir.join(stem), config.force),
    }
}

/// Generate map tiles from the pipeline's GeoJSON artifacts (tippecanoe) or
/// directly from GeoTIFFs (gdal2tiles), mirroring the pipeline driver's
/// skip/count/failure-isolation policy.
///
/// A missing external tool is a stage setup failure and propagates; it is
/// only checked when at least one input actually needs processing.
pub fn generate_tiles(
    input: &Path,
    output_dir: &Path,
    config: &TileConfig,
    gate: &dyn ArtifactGate,
) -> Result<RunSummary> {
    fs::create_dir_all(output_dir)?;

    let mut summary = RunSummary::default();
    let mut pending = Vec::new();
    for (path, kind) in tile_candidates(input)? {
        if reuse(&path, kind, output_dir, config, gate) {
            info!("Skipping {} - tile output already exists", path.display());
            summary.skipped += 1;
        } else {
            pending.push((path, kind));
        }
    }

    if pending.iter().any(|(_, kind)| *kind == TileInput::GeoJson) {
        probe_tool("tippecanoe")?;
    }
    if pending.iter().any(|(_, kind)| *kind == TileInput::Raster) {
        probe_tool("gdalinfo")?;
    }

    for (path, kind) in pending {
        let result = match kind {
            TileInput::GeoJson => tile_geojson(&path, output_dir, config),
            TileInput::Raster => tile_raster(&path, output_dir, config),
        };
        match result {
            Ok(()) => {
                info!("Generated tiles for {}", path.display());
                summary.processed += 1;
            }
            Err(e) => {
                error!("Error generating tiles for {}: {e}", path.display());
                summary.errored += 1;
            }
        }
    }

    info!(
        "Tile generation complete. Processed {} files, skipped {} files, {} errors.",
        summary.processed, summary.skipped, summary.errored
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    struct AlwaysMaterialized;

    impl ArtifactGate for AlwaysMaterialized {
        fn file_is_materialized(&self, _: &Path) -> bool {
            true
        }
        fn dir_is_materialized(&self, _: &Path) -> bool {
            true
        }
    }

    #[test]
    fn candidates_are_classified_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.geojson", "a.tif", "c.txt", "d.TIFF"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let files = tile_candidates(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.tif", "b.geojson", "d.TIFF"]);
        assert_eq!(files[0].1, TileInput::Raster);
        assert_eq!(files[1].1, TileInput::GeoJson);
    }

    #[test]
    fn fully_materialized_inputs_skip_without_needing_tools() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        File::create(input.path().join("vessel_tracks_2023-05-01.geojson")).unwrap();
        File::create(input.path().join("grid2023.tif")).unwrap();

        let summary = generate_tiles(
            input.path(),
            output.path(),
            &TileConfig::default(),
            &AlwaysMaterialized,
        )
        .unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.errored, 0);
    }

    #[test]
    fn forced_regeneration_ignores_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let geojson = dir.path().join("x.geojson");
        File::create(&geojson).unwrap();

        let config = TileConfig {
            force: true,
            ..TileConfig::default()
        };
        assert!(!reuse(&geojson, TileInput::GeoJson, dir.path(), &config, &AlwaysMaterialized));
    }
}
