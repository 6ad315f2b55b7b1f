pub mod crs;
pub mod dataset;
pub mod error;
pub mod gate;
pub mod partition;
pub mod pipeline;
pub mod raster;
pub mod tiles;
pub mod vector;

pub use error::{Error, Result};
pub use gate::{ArtifactGate, FsGate};
pub use pipeline::{FileErrorPolicy, PipelineConfig, RunSummary};
pub use tiles::TileConfig;
pub use vector::DatasetKind;
