use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use geojson::{FeatureReader, GeoJson};
use log::{debug, warn};

use crate::source::spatial_ref::{SpatialRef, WGS84_WKT};
use crate::utils::error::{Error, Result};
use crate::utils::geometry::Shape;

/// True when `head` starts a JSON object. Whether it is GeoJSON is decided
/// by [`GeoJsonLayer::open`].
pub fn is_geojson(head: &[u8]) -> bool {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    head.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{')
}

/// True when the first array opened in `head` is the value of a `features`
/// member, which is the only layout `FeatureReader` can stream.
fn features_array_first(head: &[u8]) -> bool {
    let Some(open) = head.iter().position(|b| *b == b'[') else {
        return false;
    };
    head[..open]
        .trim_ascii_end()
        .strip_suffix(b":")
        .is_some_and(|key| key.trim_ascii_end().ends_with(b"\"features\""))
}

/// Counters for one layer read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub features: u64,
    pub empty: u64,
    pub unreadable: u64,
}

/// A GeoJSON document exposed as a single feature layer.
pub struct GeoJsonLayer {
    path: PathBuf,
    streamed: bool,
}

impl GeoJsonLayer {
    /// Open `path` as a GeoJSON layer.
    ///
    /// Documents that cannot be streamed are parsed once here so that an
    /// object which is not GeoJSON fails at open time with `Error::Decode`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|source| Error::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut head = [0u8; 4096];
        let read = file.read(&mut head)?;
        let layer = Self {
            path: path.to_path_buf(),
            streamed: features_array_first(&head[..read]),
        };
        if !layer.streamed {
            layer.read_document()?;
        }
        Ok(layer)
    }

    pub fn layer_count(&self) -> usize {
        1
    }

    /// RFC 7946 fixes WGS 84 for every GeoJSON document.
    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        Some(SpatialRef::Wkt(WGS84_WKT.to_string()))
    }

    fn reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path).map_err(|source| Error::SourceUnreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn read_document(&self) -> Result<GeoJson> {
        GeoJson::from_reader(self.reader()?).map_err(|e| Error::decode(&self.path, e))
    }

    fn visit_document<F>(&self, visit: &mut F) -> Result<LayerStats>
    where
        F: FnMut(Shape) -> Result<()>,
    {
        let geometries = match self.read_document()? {
            GeoJson::Geometry(geometry) => vec![Some(geometry)],
            GeoJson::Feature(feature) => vec![feature.geometry],
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .map(|feature| feature.geometry)
                .collect(),
        };
        let mut stats = LayerStats::default();
        for geometry in geometries {
            stats.features += 1;
            match geometry {
                Some(geometry) => visit(Shape::from(geometry))?,
                None => stats.empty += 1,
            }
        }
        Ok(stats)
    }

    /// Visit the geometry of every feature in file order.
    ///
    /// Features without geometry are counted and skipped. A feature that fails
    /// to decode ends the layer with a warning, unless it is the first one, in
    /// which case the whole document is parsed instead.
    pub fn for_each_shape<F>(&self, mut visit: F) -> Result<LayerStats>
    where
        F: FnMut(Shape) -> Result<()>,
    {
        if !self.streamed {
            return self.visit_document(&mut visit);
        }

        let mut stats = LayerStats::default();
        for feature in FeatureReader::from_reader(self.reader()?).features() {
            let feature = match feature {
                Ok(feature) => feature,
                Err(e) if stats.features == 0 => {
                    debug!(
                        "{}: cannot stream features ({e}), parsing whole document",
                        self.path.display()
                    );
                    return self.visit_document(&mut visit);
                }
                Err(e) => {
                    warn!(
                        "Stopping at unreadable feature {} in {}: {e}",
                        stats.features + 1,
                        self.path.display()
                    );
                    stats.unreadable += 1;
                    break;
                }
            };
            stats.features += 1;
            match feature.geometry {
                Some(geometry) => visit(Shape::from(geometry))?,
                None => stats.empty += 1,
            }
        }
        debug!(
            "GeoJSON {}: {} features, {} without geometry",
            self.path.display(),
            stats.features,
            stats.empty
        );
        Ok(stats)
    }
}
