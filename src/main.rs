use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};

use ais_processor::{
    pipeline, tiles, DatasetKind, FileErrorPolicy, FsGate, PipelineConfig, TileConfig,
};

fn io_args() -> [Arg; 2] {
    [
        Arg::new("input")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Input file or directory"),
        Arg::new("output")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Output directory"),
    ]
}

fn force_arg() -> Arg {
    Arg::new("force")
        .long("force")
        .action(ArgAction::SetTrue)
        .help("Force reprocessing of existing outputs")
}

fn pipeline_args() -> [Arg; 3] {
    [
        Arg::new("time-field")
            .long("time-field")
            .help("Field containing timestamp information"),
        Arg::new("stride")
            .long("stride")
            .value_parser(value_parser!(usize))
            .help("Raster sampling stride (every Nth row/column, default 10)"),
        Arg::new("abort-on-error")
            .long("abort-on-error")
            .action(ArgAction::SetTrue)
            .help("Stop at the first file error instead of continuing"),
    ]
}

fn zoom_args() -> [Arg; 2] {
    [
        Arg::new("min-zoom")
            .long("min-zoom")
            .value_parser(value_parser!(u8))
            .default_value("0")
            .help("Minimum zoom level"),
        Arg::new("max-zoom")
            .long("max-zoom")
            .value_parser(value_parser!(u8))
            .default_value("14")
            .help("Maximum zoom level"),
    ]
}

fn cli() -> Command {
    Command::new("ais-processor")
        .about("Processes Marine Cadastre AIS data into Mapbox-compatible GeoJSON and map tiles")
        .subcommand_required(true)
        .subcommand(
            Command::new("process-tracks")
                .about("Process AISVesselTracks data into time-series GeoJSON")
                .args(io_args())
                .args(pipeline_args())
                .arg(force_arg()),
        )
        .subcommand(
            Command::new("process-counts")
                .about("Process AISVesselTransitCounts data into time-series GeoJSON")
                .args(io_args())
                .args(pipeline_args())
                .arg(force_arg()),
        )
        .subcommand(
            Command::new("generate-tiles")
                .about("Generate map tiles from GeoJSON or GeoTIFF data")
                .args(io_args())
                .args(zoom_args())
                .arg(force_arg()),
        )
        .subcommand(
            Command::new("process-all")
                .about("Process data and generate tiles in one step")
                .args(io_args())
                .args(pipeline_args())
                .args(zoom_args())
                .arg(force_arg())
                .arg(
                    Arg::new("data-type")
                        .long("data-type")
                        .value_parser(["auto", "counts", "tracks", "both"])
                        .default_value("auto")
                        .help("Type of data to process, or auto-detect"),
                ),
        )
}

fn pipeline_config(kind: DatasetKind, matches: &ArgMatches) -> PipelineConfig {
    let mut config = PipelineConfig::new(kind);
    config.time_field = matches.get_one::<String>("time-field").cloned();
    config.force = matches.get_flag("force");
    if let Some(stride) = matches.get_one::<usize>("stride") {
        config.stride = *stride;
    }
    if matches.get_flag("abort-on-error") {
        config.on_file_error = FileErrorPolicy::Abort;
    }
    config
}

fn tile_config(matches: &ArgMatches) -> TileConfig {
    TileConfig {
        min_zoom: *matches.get_one::<u8>("min-zoom").unwrap(),
        max_zoom: *matches.get_one::<u8>("max-zoom").unwrap(),
        force: matches.get_flag("force"),
    }
}

fn run_pipeline(kind: DatasetKind, matches: &ArgMatches) -> anyhow::Result<()> {
    let input = matches.get_one::<PathBuf>("input").unwrap();
    let output = matches.get_one::<PathBuf>("output").unwrap();
    let config = pipeline_config(kind, matches);
    info!("Processing {} from {} to {}", config.kind.file_prefix(), input.display(), output.display());
    pipeline::run(input, output, &config, &FsGate)
        .with_context(|| format!("processing {}", input.display()))?;
    Ok(())
}

/// Directory scan used by `process-all` auto-detection: transit counts ship
/// as rasters, vessel tracks as shapefiles.
fn detect_content(input: &Path) -> anyhow::Result<(bool, bool)> {
    let mut has_rasters = false;
    let mut has_shapefiles = false;
    for entry in std::fs::read_dir(input).with_context(|| format!("reading {}", input.display()))? {
        let path = entry?.path();
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("tif") | Some("tiff") => has_rasters = true,
            Some("shp") => has_shapefiles = true,
            _ => {}
        }
    }
    Ok((has_rasters, has_shapefiles))
}

fn run_process_all(matches: &ArgMatches) -> anyhow::Result<()> {
    let input = matches.get_one::<PathBuf>("input").unwrap();
    let output = matches.get_one::<PathBuf>("output").unwrap();
    let data_type = matches.get_one::<String>("data-type").unwrap().as_str();

    let geojson_dir = output.join("geojson");
    let tiles_dir = output.join("tiles");
    std::fs::create_dir_all(&geojson_dir)?;
    std::fs::create_dir_all(&tiles_dir)?;

    let (has_rasters, has_shapefiles) = if input.is_dir() {
        detect_content(input)?
    } else {
        (false, false)
    };
    let want_counts = has_rasters && matches!(data_type, "auto" | "counts" | "both");
    let want_tracks = has_shapefiles && matches!(data_type, "auto" | "tracks" | "both");

    if matches!(data_type, "counts" | "tracks") && !want_counts && !want_tracks {
        error!("Specified data type '{data_type}' not found in {}", input.display());
    }

    if want_counts {
        info!("Processing transit counts data...");
        let config = pipeline_config(DatasetKind::TransitCounts, matches);
        pipeline::run(input, &geojson_dir, &config, &FsGate)?;
    }
    if want_tracks {
        info!("Processing vessel tracks data...");
        let config = pipeline_config(DatasetKind::VesselTracks, matches);
        pipeline::run(input, &geojson_dir, &config, &FsGate)?;
    }

    info!("Generating tiles from processed GeoJSON...");
    tiles::generate_tiles(&geojson_dir, &tiles_dir, &tile_config(matches), &FsGate)?;
    info!("Processing complete. Output saved to {}", output.display());
    Ok(())
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("process-tracks", sub)) => run_pipeline(DatasetKind::VesselTracks, sub),
        Some(("process-counts", sub)) => run_pipeline(DatasetKind::TransitCounts, sub),
        Some(("generate-tiles", sub)) => {
            let input = sub.get_one::<PathBuf>("input").unwrap();
            let output = sub.get_one::<PathBuf>("output").unwrap();
            tiles::generate_tiles(input, output, &tile_config(sub), &FsGate)
                .with_context(|| format!("generating tiles from {}", input.display()))?;
            Ok(())
        }
        Some(("process-all", sub)) => run_process_all(sub),
        _ => unreachable!("subcommand required"),
    }
}

fn main() {
    env_logger::init();

    let matches = cli().get_matches();
    if let Err(e) = run(&matches) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
