use geo::Coord;
use log::warn;

use crate::utils::error::{Error, Result};
use crate::utils::geometry::{GeoTransform, Point3};

/// One band of a raster, readable a row at a time.
pub trait RasterBand {
    /// `(columns, rows)`.
    fn size(&self) -> (usize, usize);

    /// Raw cell value meaning "no sample here".
    fn no_data(&self) -> Option<f64>;

    /// Multiplier applied to raw values.
    fn scale(&self) -> f64 {
        1.0
    }

    /// Added to raw values after scaling.
    fn offset(&self) -> f64 {
        0.0
    }

    /// Fill `row_buffer` (length = columns) with the raw values of `row`.
    fn read_row(&mut self, row: usize, row_buffer: &mut [f64]) -> Result<()>;
}

/// Counters for one raster walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub cells: u64,
    pub points: u64,
    pub excluded: u64,
    pub unreadable_rows: u64,
}

/// Walk `band` in row-major order, emitting one point per valid cell.
///
/// Cells equal to the no-data value or NaN are excluded. With a `transform`
/// each point sits at its cell centre; without one the raw `(col, row)`
/// indices are used. A row that fails to read is skipped with a warning, and
/// a band that runs out of data ends the walk.
///
/// # Arguments
///
/// * `band` - The raster band to read, one row at a time.
/// * `transform` - Optional georeferencing applied to cell centres.
/// * `emit` - Called with every accepted point in walk order.
///
/// # Returns
///
/// Cell, point and exclusion counters, or the first error raised by `emit`.
pub fn walk_raster<B, F>(band: &mut B, transform: Option<&GeoTransform>, mut emit: F) -> Result<WalkStats>
where
    B: RasterBand + ?Sized,
    F: FnMut(Point3) -> Result<()>,
{
    let (columns, rows) = band.size();
    let no_data = band.no_data();
    let scale = band.scale();
    let offset = band.offset();
    let affine = transform.map(GeoTransform::to_affine);

    let mut stats = WalkStats::default();
    let mut row_buffer = Vec::new();
    row_buffer
        .try_reserve_exact(columns)
        .map_err(|source| Error::RowAllocation { columns, source })?;
    row_buffer.resize(columns, 0.0f64);
    for row in 0..rows {
        match band.read_row(row, &mut row_buffer) {
            Ok(()) => {}
            Err(e @ Error::RasterTruncated { .. }) => {
                warn!("{e}, {} rows missing", rows - row);
                stats.unreadable_rows += (rows - row) as u64;
                break;
            }
            Err(e) => {
                warn!("Skipping unreadable raster row {row}: {e}");
                stats.unreadable_rows += 1;
                continue;
            }
        }
        for (col, raw) in row_buffer.iter().copied().enumerate() {
            stats.cells += 1;
            if raw.is_nan() || no_data.is_some_and(|nd| raw == nd) {
                stats.excluded += 1;
                continue;
            }
            let cell = Coord {
                x: col as f64,
                y: row as f64,
            };
            let world = match &affine {
                Some(affine) => affine.apply(cell + Coord { x: 0.5, y: 0.5 }),
                None => cell,
            };
            stats.points += 1;
            emit(Point3::new(world.x, world.y, raw * scale + offset))?;
        }
    }
    Ok(stats)
}

/// Raster held in memory, mostly for tests and small grids.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBand {
    pub columns: usize,
    pub rows: usize,
    pub values: Vec<f64>,
    pub no_data: Option<f64>,
    pub scale: f64,
    pub offset: f64,
}

impl GridBand {
    pub fn new(columns: usize, rows: usize, values: Vec<f64>) -> Self {
        Self {
            columns,
            rows,
            values,
            no_data: None,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl RasterBand for GridBand {
    fn size(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn offset(&self) -> f64 {
        self.offset
    }

    fn read_row(&mut self, row: usize, row_buffer: &mut [f64]) -> Result<()> {
        let start = row * self.columns;
        let Some(values) = self.values.get(start..start + self.columns) else {
            return Err(Error::decode(
                "<memory>",
                format!("row {row} out of range"),
            ));
        };
        row_buffer.copy_from_slice(values);
        Ok(())
    }
}
