use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No temporal field in the data and no year token in the filename.
    #[error("no time field and no 4-digit year token in filename '{stem}'")]
    UnresolvedPartitionKey { stem: String },

    #[error("time field '{field}' has unparsable value '{value}'")]
    InvalidTimestamp { field: String, value: String },

    #[error("unsupported file type: {}", path.display())]
    UnsupportedFileType { path: PathBuf },

    /// Primary raster sampling failed and so did the fallback conversion.
    /// Both causes are kept; a primary failure alone never surfaces here.
    #[error(
        "raster conversion failed for {}: primary: {primary}; fallback: {fallback}",
        path.display()
    )]
    RasterSample {
        path: PathBuf,
        primary: Box<Error>,
        fallback: Box<Error>,
    },

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: &'static str, message: String },

    #[error("dataset has no layers: {}", path.display())]
    EmptyDataset { path: PathBuf },

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("projection setup failed: {0}")]
    ProjCreate(#[from] proj::ProjCreateError),

    #[error("reprojection failed: {0}")]
    Proj(#[from] proj::ProjError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
