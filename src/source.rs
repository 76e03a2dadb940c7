pub mod ascii_grid;
pub mod geotiff;
pub mod spatial_ref;
pub mod text;
pub mod vector;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::processing::flatten::flatten_shape;
use crate::processing::raster_walk::walk_raster;
use crate::processing::sink::PointSink;
use crate::processing::tokenizer::{Line, parse_line};
use crate::utils::error::{Error, Result};
use crate::utils::geometry::GeoTransform;

use ascii_grid::AsciiGridDataset;
use geotiff::GeoTiffDataset;
use spatial_ref::SpatialRef;
use vector::GeoJsonLayer;

/// Bytes read from the start of a file to pick a driver.
const PROBE_LEN: usize = 4096;

/// Shape of the data a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    StructuredRaster,
    StructuredVectorFeatures,
    PlainTextLines,
}

/// Decoder chosen for a file. Resolved once and reused by both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Driver {
    GTiff,
    AAIGrid,
    GeoJson,
    Text,
}

impl Driver {
    pub fn name(&self) -> &'static str {
        match self {
            Driver::GTiff => "GTiff",
            Driver::AAIGrid => "AAIGrid",
            Driver::GeoJson => "GeoJSON",
            Driver::Text => "XYZ text",
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Driver::GTiff | Driver::AAIGrid => SourceKind::StructuredRaster,
            Driver::GeoJson => SourceKind::StructuredVectorFeatures,
            Driver::Text => SourceKind::PlainTextLines,
        }
    }
}

/// A structured dataset opened by one of the drivers.
pub enum Dataset {
    GeoTiff(GeoTiffDataset),
    AsciiGrid(AsciiGridDataset),
    GeoJson(GeoJsonLayer),
}

/// Counters for one file read into a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub points: u64,
    pub skipped_records: u64,
}

impl Dataset {
    /// Open `path` with a structured `driver`.
    pub fn open(driver: Driver, path: &Path) -> Result<Self> {
        match driver {
            Driver::GTiff => GeoTiffDataset::open(path).map(Dataset::GeoTiff),
            Driver::AAIGrid => AsciiGridDataset::open(path).map(Dataset::AsciiGrid),
            Driver::GeoJson => GeoJsonLayer::open(path).map(Dataset::GeoJson),
            Driver::Text => Err(Error::StructuredFormatRejected {
                driver: driver.name(),
                reason: "not a structured driver".to_string(),
            }),
        }
    }

    pub fn driver(&self) -> Driver {
        match self {
            Dataset::GeoTiff(_) => Driver::GTiff,
            Dataset::AsciiGrid(_) => Driver::AAIGrid,
            Dataset::GeoJson(_) => Driver::GeoJson,
        }
    }

    pub fn raster_count(&self) -> usize {
        match self {
            Dataset::GeoTiff(ds) => ds.raster_count(),
            Dataset::AsciiGrid(ds) => ds.raster_count(),
            Dataset::GeoJson(_) => 0,
        }
    }

    pub fn layer_count(&self) -> usize {
        match self {
            Dataset::GeoJson(layer) => layer.layer_count(),
            _ => 0,
        }
    }

    pub fn geo_transform(&self) -> Option<GeoTransform> {
        match self {
            Dataset::GeoTiff(ds) => ds.transform(),
            Dataset::AsciiGrid(ds) => ds.transform(),
            Dataset::GeoJson(_) => None,
        }
    }

    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        match self {
            Dataset::GeoTiff(ds) => ds.spatial_ref(),
            Dataset::AsciiGrid(ds) => ds.spatial_ref(),
            Dataset::GeoJson(layer) => layer.spatial_ref(),
        }
    }

    /// Push every point of the dataset into `sink`.
    pub fn feed(self, sink: &mut PointSink<'_>) -> Result<FeedStats> {
        let transform = self.geo_transform();
        match self {
            Dataset::GeoTiff(mut ds) => {
                let stats = walk_raster(ds.band_mut(), transform.as_ref(), |p| sink.accept(p))?;
                Ok(FeedStats {
                    points: stats.points,
                    skipped_records: stats.unreadable_rows,
                })
            }
            Dataset::AsciiGrid(mut ds) => {
                let stats = walk_raster(ds.band_mut(), transform.as_ref(), |p| sink.accept(p))?;
                Ok(FeedStats {
                    points: stats.points,
                    skipped_records: stats.unreadable_rows,
                })
            }
            Dataset::GeoJson(layer) => {
                let mut points = 0;
                let stats = layer.for_each_shape(|shape| {
                    flatten_shape(&shape, |p| {
                        points += 1;
                        sink.accept(p)
                    })
                })?;
                Ok(FeedStats {
                    points,
                    skipped_records: stats.unreadable,
                })
            }
        }
    }
}

/// Outcome of trying the structured drivers on a file.
pub enum Probe {
    Opened(Dataset),
    /// A driver claimed the file but cannot serve it as a point cloud.
    Rejected(Error),
    Unrecognized,
}

fn read_head(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(PROBE_LEN);
    file.take(PROBE_LEN as u64).read_to_end(&mut head).ok()?;
    Some(head)
}

/// True when the first data line of `head` is a numeric triple, which is
/// what the grid-only XYZ driver would claim.
fn looks_like_xyz(head: &[u8]) -> bool {
    head.split(|b| *b == b'\n')
        .map(parse_line)
        .find(|line| !matches!(line, Line::Blank | Line::Comment))
        .is_some_and(|line| matches!(line, Line::Point(_)))
}

/// Try the structured drivers on `path`, most specific first.
pub fn probe(path: &Path) -> Probe {
    let Some(head) = read_head(path) else {
        return Probe::Unrecognized;
    };
    let driver = if geotiff::is_tiff(&head) {
        Driver::GTiff
    } else if vector::is_geojson(&head) {
        Driver::GeoJson
    } else if ascii_grid::is_ascii_grid(&head) {
        Driver::AAIGrid
    } else if looks_like_xyz(&head) {
        return Probe::Rejected(Error::StructuredFormatRejected {
            driver: "XYZ",
            reason: "grid-only driver cannot represent irregular points".to_string(),
        });
    } else {
        return Probe::Unrecognized;
    };
    match Dataset::open(driver, path) {
        Ok(dataset) => Probe::Opened(dataset),
        Err(e) => Probe::Rejected(e),
    }
}

/// A file with its decoder fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSource {
    pub path: PathBuf,
    pub driver: Driver,
    pub spatial_ref: Option<SpatialRef>,
}

impl ResolvedSource {
    pub fn kind(&self) -> SourceKind {
        self.driver.kind()
    }
}

/// Pick the decoder for `path`: structured first, plain text otherwise.
///
/// Fails only when the file cannot be read at all.
pub fn resolve(path: &Path) -> Result<ResolvedSource> {
    match probe(path) {
        Probe::Opened(dataset) => {
            let driver = dataset.driver();
            debug!(
                "{}: opened by {} ({} band(s), {} layer(s))",
                path.display(),
                driver.name(),
                dataset.raster_count(),
                dataset.layer_count()
            );
            return Ok(ResolvedSource {
                path: path.to_path_buf(),
                driver,
                spatial_ref: dataset.spatial_ref(),
            });
        }
        Probe::Rejected(reason) => {
            debug!("{}: {reason}, falling back to text", path.display());
        }
        Probe::Unrecognized => {
            debug!("{}: no structured driver, reading as text", path.display());
        }
    }
    text::check_readable(path)?;
    Ok(ResolvedSource {
        path: path.to_path_buf(),
        driver: Driver::Text,
        spatial_ref: None,
    })
}

/// Read every point of `source` into `sink` with its resolved driver.
pub fn feed(source: &ResolvedSource, sink: &mut PointSink<'_>) -> Result<FeedStats> {
    match source.driver {
        Driver::Text => {
            let stats = text::scan_text_file(&source.path, |p| sink.accept(p))?;
            Ok(FeedStats {
                points: stats.points,
                skipped_records: stats.malformed,
            })
        }
        driver => Dataset::open(driver, &source.path)?.feed(sink),
    }
}
