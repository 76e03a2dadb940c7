use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// Define error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot open or process input file: {}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{driver} driver rejected the file: {reason}")]
    StructuredFormatRejected { driver: &'static str, reason: String },
    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("Raster data in {} ends at row {row}", path.display())]
    RasterTruncated { path: PathBuf, row: usize },
    #[error("Cannot allocate a raster row of {columns} cells")]
    RowAllocation {
        columns: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("No valid points found.")]
    NoPointsFound,
    #[error("Cannot open output file: {}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Second pass accepted {written} points, first pass found {expected}")]
    PassMismatch { expected: u64, written: u64 },
    #[error("Invalid scale factor: {0}")]
    InvalidScale(f64),
    #[error("Error writing point cloud: {0}")]
    Las(#[from] las::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
