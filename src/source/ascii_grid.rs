use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::processing::raster_walk::RasterBand;
use crate::source::spatial_ref::SpatialRef;
use crate::utils::error::{Error, Result};
use crate::utils::geometry::GeoTransform;

/// True when the first token of `head` is the `ncols` keyword.
pub fn is_ascii_grid(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    text.split_whitespace()
        .next()
        .is_some_and(|token| token.eq_ignore_ascii_case("ncols"))
}

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x_corner: Option<f64>,
    x_center: Option<f64>,
    y_corner: Option<f64>,
    y_center: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    no_data: Option<f64>,
}

const HEADER_KEYS: [&str; 10] = [
    "ncols",
    "nrows",
    "xllcorner",
    "xllcenter",
    "yllcorner",
    "yllcenter",
    "cellsize",
    "dx",
    "dy",
    "nodata_value",
];

fn is_header_key(token: &str) -> bool {
    HEADER_KEYS.iter().any(|key| token.eq_ignore_ascii_case(key))
}

fn parse_value(token: &str) -> Option<f64> {
    fast_float2::parse::<f64, _>(token).ok()
}

/// Grid dimensions must be whole, positive and small enough to address.
fn parse_dimension(path: &Path, key: &str, value: f64) -> Result<usize> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(Error::decode(path, format!("invalid {key} {value}")));
    }
    Ok(value as usize)
}

/// Append the values of one data line. Tokens that are not numbers keep
/// their cell position as NaN.
fn push_values(path: &Path, line: &str, pending: &mut VecDeque<f64>) {
    for token in line.split_whitespace() {
        pending.push_back(parse_value(token).unwrap_or_else(|| {
            warn!("{}: invalid grid value {token:?}", path.display());
            f64::NAN
        }));
    }
}

/// ESRI ASCII grid, streamed one row at a time.
pub struct AsciiGridBand {
    path: PathBuf,
    reader: BufReader<File>,
    line: String,
    pending: VecDeque<f64>,
    columns: usize,
    rows: usize,
    no_data: Option<f64>,
    next_row: usize,
    exhausted: bool,
}

impl AsciiGridBand {
    fn truncated(&self, row: usize) -> Error {
        Error::RasterTruncated {
            path: self.path.clone(),
            row,
        }
    }

    /// Buffer at least `wanted` values. Returns false when the file ends first.
    fn fill_pending(&mut self, wanted: usize) -> Result<bool> {
        while self.pending.len() < wanted {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            push_values(&self.path, &self.line, &mut self.pending);
        }
        Ok(true)
    }
}

impl RasterBand for AsciiGridBand {
    fn size(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    fn read_row(&mut self, row: usize, row_buffer: &mut [f64]) -> Result<()> {
        if row != self.next_row {
            return Err(Error::decode(
                &self.path,
                format!("rows must be read in order, expected {}", self.next_row),
            ));
        }
        if self.exhausted {
            return Err(self.truncated(row));
        }
        let complete = self.fill_pending(self.columns)?;
        if !complete {
            self.exhausted = true;
            if self.pending.is_empty() {
                return Err(self.truncated(row));
            }
        }
        self.next_row += 1;
        // A short final row keeps what it has; the rest reads as missing
        for cell in row_buffer.iter_mut() {
            *cell = self.pending.pop_front().unwrap_or(f64::NAN);
        }
        Ok(())
    }
}

pub struct AsciiGridDataset {
    band: AsciiGridBand,
    transform: GeoTransform,
    spatial_ref: Option<SpatialRef>,
}

impl AsciiGridDataset {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let mut header = Header::default();
        let mut pending = VecDeque::new();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            if !is_header_key(key) {
                // First data line
                push_values(path, &line, &mut pending);
                break;
            }
            let value = tokens
                .next()
                .and_then(parse_value)
                .ok_or_else(|| Error::decode(path, format!("header {key} has no numeric value")))?;
            match key.to_ascii_lowercase().as_str() {
                "ncols" => header.ncols = Some(parse_dimension(path, "ncols", value)?),
                "nrows" => header.nrows = Some(parse_dimension(path, "nrows", value)?),
                "xllcorner" => header.x_corner = Some(value),
                "xllcenter" => header.x_center = Some(value),
                "yllcorner" => header.y_corner = Some(value),
                "yllcenter" => header.y_center = Some(value),
                "cellsize" => {
                    header.dx = Some(value);
                    header.dy = Some(value);
                }
                "dx" => header.dx = Some(value),
                "dy" => header.dy = Some(value),
                _ => header.no_data = Some(value),
            }
        }

        let missing = |name: &str| Error::decode(path, format!("grid header lacks {name}"));
        let columns = header.ncols.ok_or_else(|| missing("ncols"))?;
        let rows = header.nrows.ok_or_else(|| missing("nrows"))?;
        if columns.checked_mul(rows).is_none() {
            return Err(Error::decode(path, format!("{columns}x{rows} grid is too large")));
        }
        let dx = header.dx.ok_or_else(|| missing("cellsize"))?;
        let dy = header.dy.unwrap_or(dx);
        let x_corner = header
            .x_corner
            .or(header.x_center.map(|x| x - dx / 2.0))
            .ok_or_else(|| missing("xllcorner"))?;
        let y_corner = header
            .y_corner
            .or(header.y_center.map(|y| y - dy / 2.0))
            .ok_or_else(|| missing("yllcorner"))?;
        let transform = GeoTransform::north_up(x_corner, y_corner + rows as f64 * dy, dx, dy);

        let spatial_ref = fs::read_to_string(path.with_extension("prj"))
            .ok()
            .map(|wkt| wkt.trim().to_string())
            .filter(|wkt| !wkt.is_empty())
            .map(SpatialRef::Wkt);

        debug!(
            "AAIGrid {}: {columns}x{rows}, cell {dx}x{dy}, nodata {:?}",
            path.display(),
            header.no_data
        );

        Ok(Self {
            band: AsciiGridBand {
                path: path.to_path_buf(),
                reader,
                line,
                pending,
                columns,
                rows,
                no_data: header.no_data,
                next_row: 0,
                exhausted: false,
            },
            transform,
            spatial_ref,
        })
    }

    pub fn raster_count(&self) -> usize {
        1
    }

    pub fn transform(&self) -> Option<GeoTransform> {
        Some(self.transform)
    }

    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        self.spatial_ref.clone()
    }

    pub fn band_mut(&mut self) -> &mut AsciiGridBand {
        &mut self.band
    }
}
