use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::output::{LasWriter, OutputHeader};
use crate::processing::color::{ColorTransform, derive_color_transform};
use crate::processing::sink::{PointSink, PointWriter, ProgressObserver};
use crate::source::spatial_ref::SpatialRef;
use crate::source::{self, ResolvedSource};
use crate::utils::error::{Error, Result};
use crate::utils::geometry::BoundingBox;

pub use crate::source::resolve;

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    /// Coordinate quantum stored in the output header, per axis.
    pub scale: f64,
    pub colorize: bool,
}

impl ConvertOptions {
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            inputs,
            output,
            scale: 0.01,
            colorize: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidScale(self.scale));
        }
        Ok(())
    }
}

/// What the first pass hands to the second. Nothing else crosses the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub count: u64,
    pub bounds: BoundingBox,
    pub color: Option<ColorTransform>,
    pub spatial_ref: Option<SpatialRef>,
    pub skipped_records: u64,
}

/// Resolve every input once. The resulting drivers are reused by both passes.
pub fn resolve_all(paths: &[PathBuf]) -> Result<Vec<ResolvedSource>> {
    paths.iter().map(|path| resolve(path)).collect()
}

/// Pass 1: bounds, count and optional color range over all sources.
pub fn scan(
    sources: &[ResolvedSource],
    colorize: bool,
    observer: &mut dyn ProgressObserver,
) -> Result<ScanSummary> {
    let mut sink = PointSink::scanning(colorize, observer);
    let mut skipped_records = 0;
    for source in sources {
        info!(
            "Processing {} ({})",
            source.path.display(),
            source.driver.name()
        );
        let before = sink.count();
        let stats = source::feed(source, &mut sink)?;
        skipped_records += stats.skipped_records;
        debug!(
            "{}: {} points, {} skipped records",
            source.path.display(),
            sink.count() - before,
            stats.skipped_records
        );
    }

    let summary = sink.finish();
    if summary.count == 0 {
        return Err(Error::NoPointsFound);
    }
    info!("Found {} points.", summary.count);

    let color = colorize.then(|| derive_color_transform(summary.z_samples, &summary.bounds));
    if let Some(color) = &color {
        info!("Color range: {} - {}", color.min_z, color.max_z);
    }

    Ok(ScanSummary {
        count: summary.count,
        bounds: summary.bounds,
        color,
        spatial_ref: sources.iter().find_map(|s| s.spatial_ref.clone()),
        skipped_records,
    })
}

/// Pass 2: stream every point into `writer`. Returns the number written.
pub fn write(
    sources: &[ResolvedSource],
    summary: &ScanSummary,
    writer: &mut dyn PointWriter,
    observer: &mut dyn ProgressObserver,
) -> Result<u64> {
    let mut sink = PointSink::writing(writer, summary.color, summary.count, observer);
    for source in sources {
        debug!("Writing points from {}", source.path.display());
        source::feed(source, &mut sink)?;
    }
    let written = sink.count();
    if written != summary.count {
        return Err(Error::PassMismatch {
            expected: summary.count,
            written,
        });
    }
    Ok(written)
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertReport {
    pub sources: Vec<ResolvedSource>,
    pub output: PathBuf,
    pub points_written: u64,
    pub bounds: BoundingBox,
    pub color_range: Option<(f64, f64)>,
    pub skipped_records: u64,
    pub spatial_reference: Option<String>,
}

/// Run both passes over `options.inputs` and write `options.output`.
///
/// # Arguments
///
/// * `options` - Inputs, destination, coordinate scale and colorization.
/// * `observer` - Receives progress from both passes.
///
/// # Returns
///
/// The run report, or the first file-level error. `Error::NoPointsFound`
/// is returned before the destination is created.
pub fn convert(
    options: &ConvertOptions,
    observer: &mut dyn ProgressObserver,
) -> Result<ConvertReport> {
    options.validate()?;
    let sources = resolve_all(&options.inputs)?;
    let summary = scan(&sources, options.colorize, observer)?;

    let header = OutputHeader::new(
        &summary.bounds,
        options.scale,
        summary.color.is_some(),
        summary.spatial_ref.clone(),
    );
    let mut writer = LasWriter::create(&options.output, &header)?;
    let points_written = write(&sources, &summary, &mut writer, observer)?;
    writer.finish()?;
    info!(
        "Successfully wrote {points_written} points to {}",
        options.output.display()
    );

    Ok(ConvertReport {
        sources,
        output: options.output.clone(),
        points_written,
        bounds: summary.bounds,
        color_range: summary.color.map(|c| (c.min_z, c.max_z)),
        skipped_records: summary.skipped_records,
        spatial_reference: summary.spatial_ref.as_ref().map(ToString::to_string),
    })
}

/// Convenience wrapper for a single input file.
pub fn convert_file(
    input: &Path,
    output: &Path,
    observer: &mut dyn ProgressObserver,
) -> Result<ConvertReport> {
    convert(
        &ConvertOptions::new(vec![input.to_path_buf()], output.to_path_buf()),
        observer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::raster_walk::{GridBand, walk_raster};
    use crate::processing::sink::{NoProgress, PointRecord};
    use crate::source::Driver;
    use las::{Read, Reader};
    use std::fs::File;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path)
            .unwrap()
            .write_all(text.as_bytes())
            .unwrap();
        path
    }

    fn scenario_a(dir: &Path) -> PathBuf {
        write_file(
            dir,
            "a.xyz",
            "1.0 2.0 3.0\n4.0\t5.0\t6.0\n  7.0  8.0  9.0  \n# comment\n10.0 11.0 12.0 # inline\n",
        )
    }

    #[test]
    fn test_scan_text_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let sources = resolve_all(&[scenario_a(dir.path())]).unwrap();
        let summary = scan(&sources, false, &mut NoProgress).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.bounds.min(), [1.0, 2.0, 3.0]);
        assert_eq!(summary.bounds.max(), [10.0, 11.0, 12.0]);
        assert_eq!(summary.color, None);
        assert_eq!(summary.spatial_ref, None);
    }

    #[test]
    fn test_scan_without_points_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "b.xyz", "\n\n\ninvalid data here\n1.0 2.0\n");
        let sources = resolve_all(&[path]).unwrap();
        assert_eq!(sources[0].driver, Driver::Text);
        assert!(matches!(
            scan(&sources, true, &mut NoProgress),
            Err(Error::NoPointsFound)
        ));
    }

    #[test]
    fn test_no_points_never_creates_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "empty.xyz", "# nothing\n");
        let output = dir.path().join("out.las");
        let result = convert_file(&input, &output, &mut NoProgress);
        assert!(matches!(result, Err(Error::NoPointsFound)));
        assert!(!output.exists());
    }

    #[test]
    fn test_scan_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sources = resolve_all(&[scenario_a(dir.path())]).unwrap();
        let first = scan(&sources, true, &mut NoProgress).unwrap();
        let second = scan(&sources, true, &mut NoProgress).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiple_inputs_share_one_accumulator() {
        let dir = tempfile::tempdir().unwrap();
        let a = scenario_a(dir.path());
        let grid = write_file(
            dir.path(),
            "c.asc",
            "ncols 2\nnrows 2\nxllcorner 10\nyllcorner 16\ncellsize 2\nNODATA_value -9999\n1 -9999\n3 4\n",
        );
        let sources = resolve_all(&[a, grid]).unwrap();
        assert_eq!(sources[1].driver, Driver::AAIGrid);
        let summary = scan(&sources, false, &mut NoProgress).unwrap();
        assert_eq!(summary.count, 7);
        assert_eq!(summary.bounds.min(), [1.0, 2.0, 1.0]);
        assert_eq!(summary.bounds.max(), [13.0, 19.0, 12.0]);
    }

    #[test]
    fn test_write_reproduces_first_pass() {
        let dir = tempfile::tempdir().unwrap();
        let sources = resolve_all(&[scenario_a(dir.path())]).unwrap();
        let summary = scan(&sources, true, &mut NoProgress).unwrap();
        let mut records: Vec<PointRecord> = Vec::new();
        let written = write(&sources, &summary, &mut records, &mut NoProgress).unwrap();
        assert_eq!(written, 4);
        assert_eq!(records[3].x, 10.0);
        assert!(records.iter().all(|r| r.color.is_some()));
    }

    #[test]
    fn test_write_detects_changed_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = scenario_a(dir.path());
        let sources = resolve_all(&[path]).unwrap();
        let summary = scan(&sources, false, &mut NoProgress).unwrap();
        write_file(dir.path(), "a.xyz", "1 2 3\n");
        let mut records: Vec<PointRecord> = Vec::new();
        let result = write(&sources, &summary, &mut records, &mut NoProgress);
        assert!(matches!(
            result,
            Err(Error::PassMismatch {
                expected: 4,
                written: 1
            })
        ));
    }

    #[test]
    fn test_raster_scale_offset_scenario() {
        let mut band = GridBand {
            scale: 2.0,
            offset: 10.0,
            ..GridBand::new(2, 1, vec![5.0, f64::NAN])
        };
        let mut observer = NoProgress;
        let mut sink = PointSink::scanning(true, &mut observer);
        walk_raster(&mut band, None, |p| sink.accept(p)).unwrap();
        let summary = sink.finish();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.bounds.min_z, 20.0);
    }

    #[test]
    fn test_convert_writes_las() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.las");
        let mut options = ConvertOptions::new(vec![scenario_a(dir.path())], output.clone());
        options.colorize = true;
        let report = convert(&options, &mut NoProgress).unwrap();
        assert_eq!(report.points_written, 4);
        assert_eq!(report.color_range, Some((3.0, 12.0)));
        assert_eq!(report.skipped_records, 0);

        let mut reader = Reader::from_path(&output).unwrap();
        assert_eq!(reader.header().number_of_points(), 4);
        let bounds = reader.header().bounds();
        assert!((bounds.min.x - 1.0).abs() < 1e-9);
        assert!((bounds.max.z - 12.0).abs() < 1e-9);
        let points: Vec<las::Point> = reader.points().map(|p| p.unwrap()).collect();
        assert_eq!(points[0].color, Some(las::Color::new(0, 0, 0)));
        assert_eq!(points[3].color, Some(las::Color::new(65535, 65535, 65535)));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["points_written"], 4);
        assert_eq!(json["sources"][0]["driver"], "Text");
    }

    #[test]
    fn test_invalid_scale_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = ConvertOptions::new(
            vec![dir.path().join("missing.xyz")],
            dir.path().join("out.las"),
        );
        options.scale = 0.0;
        assert!(matches!(
            convert(&options, &mut NoProgress),
            Err(Error::InvalidScale(_))
        ));
    }
}
