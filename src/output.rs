use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use las::point::Format;
use las::{Builder, Color, Point, Transform, Vector, Vlr, Write};
use log::debug;

use crate::processing::sink::{PointRecord, PointWriter};
use crate::source::spatial_ref::SpatialRef;
use crate::utils::error::{Error, Result};
use crate::utils::geometry::BoundingBox;

const PROJECTION_USER_ID: &str = "LASF_Projection";
const RECORD_GEO_KEY_DIRECTORY: u16 = 34735;
const RECORD_GEO_DOUBLE_PARAMS: u16 = 34736;
const RECORD_GEO_ASCII_PARAMS: u16 = 34737;
const RECORD_OGC_WKT: u16 = 2112;

/// Header metadata fixed by the first pass, before any point is written.
///
/// Point count and bounds are not carried here: the LAS writer derives both
/// from the records it is given, and the second pass is checked against the
/// first pass count before the file is finished.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputHeader {
    pub offset: [f64; 3],
    pub scale: f64,
    pub colorized: bool,
    pub spatial_ref: Option<SpatialRef>,
}

impl OutputHeader {
    pub fn new(
        bounds: &BoundingBox,
        scale: f64,
        colorized: bool,
        spatial_ref: Option<SpatialRef>,
    ) -> Self {
        Self {
            offset: bounds.floor_offset(),
            scale,
            colorized,
            spatial_ref,
        }
    }

    /// LAS point format: 2 carries RGB, 0 does not.
    pub fn point_format(&self) -> u8 {
        if self.colorized { 2 } else { 0 }
    }
}

fn vlr(record_id: u16, description: &str, data: Vec<u8>) -> Vlr {
    Vlr {
        user_id: PROJECTION_USER_ID.to_string(),
        record_id,
        description: description.to_string(),
        data,
    }
}

/// LASF_Projection records for a spatial reference.
pub fn projection_vlrs(spatial_ref: &SpatialRef) -> Vec<Vlr> {
    match spatial_ref {
        SpatialRef::Wkt(wkt) => {
            let mut data = wkt.as_bytes().to_vec();
            data.push(0);
            vec![vlr(RECORD_OGC_WKT, "OGC WKT", data)]
        }
        SpatialRef::GeoKeys {
            directory,
            doubles,
            ascii,
        } => {
            let mut vlrs = vec![vlr(
                RECORD_GEO_KEY_DIRECTORY,
                "GeoTIFF GeoKeyDirectoryTag",
                directory.iter().flat_map(|v| v.to_le_bytes()).collect(),
            )];
            if !doubles.is_empty() {
                vlrs.push(vlr(
                    RECORD_GEO_DOUBLE_PARAMS,
                    "GeoTIFF GeoDoubleParamsTag",
                    doubles.iter().flat_map(|v| v.to_le_bytes()).collect(),
                ));
            }
            if !ascii.is_empty() {
                let mut data = ascii.as_bytes().to_vec();
                data.push(0);
                vlrs.push(vlr(RECORD_GEO_ASCII_PARAMS, "GeoTIFF GeoAsciiParamsTag", data));
            }
            vlrs
        }
    }
}

/// True when `path` names a LASzip-compressed file.
pub fn is_laz(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("laz"))
}

/// LAS/LAZ destination. Compression follows the file extension.
pub struct LasWriter {
    path: PathBuf,
    writer: las::Writer<BufWriter<File>>,
}

impl LasWriter {
    pub fn create(path: &Path, header: &OutputHeader) -> Result<Self> {
        // Surface an unwritable destination with its own error before encoding starts
        File::create(path).map_err(|source| Error::OutputUnwritable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(header.point_format())?;
        builder.point_format.is_compressed = is_laz(path);
        builder.generating_software = concat!("xyz2las ", env!("CARGO_PKG_VERSION")).to_string();
        let transform = |offset: f64| Transform {
            scale: header.scale,
            offset,
        };
        builder.transforms = Vector {
            x: transform(header.offset[0]),
            y: transform(header.offset[1]),
            z: transform(header.offset[2]),
        };
        if let Some(spatial_ref) = &header.spatial_ref {
            builder.vlrs.extend(projection_vlrs(spatial_ref));
        }
        let las_header = builder.into_header()?;

        debug!(
            "Writing {} (format {}, compressed {}, scale {}, offset {:?})",
            path.display(),
            header.point_format(),
            is_laz(path),
            header.scale,
            header.offset
        );
        let writer = las::Writer::from_path(path, las_header)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the point data and finalize the header.
    pub fn finish(mut self) -> Result<()> {
        self.writer.close()?;
        Ok(())
    }
}

impl PointWriter for LasWriter {
    fn write_point(&mut self, record: &PointRecord) -> Result<()> {
        let point = Point {
            x: record.x,
            y: record.y,
            z: record.z,
            color: record
                .color
                .map(|rgb| Color::new(rgb.red, rgb.green, rgb.blue)),
            ..Default::default()
        };
        self.writer.write(point)?;
        Ok(())
    }
}
