use crate::processing::color::ColorTransform;
use crate::utils::error::Result;
use crate::utils::geometry::{BoundingBox, Point3};

/// Accepted points between two progress notifications.
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// 16-bit-per-channel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb16 {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl Rgb16 {
    pub fn grey(intensity: u16) -> Self {
        Self {
            red: intensity,
            green: intensity,
            blue: intensity,
        }
    }
}

/// One output record. The sink owns a single instance and rewrites it for every point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Option<Rgb16>,
}

/// Downstream consumer of finished point records.
pub trait PointWriter {
    fn write_point(&mut self, record: &PointRecord) -> Result<()>;
}

impl PointWriter for Vec<PointRecord> {
    fn write_point(&mut self, record: &PointRecord) -> Result<()> {
        self.push(*record);
        Ok(())
    }
}

/// Notified every [`PROGRESS_INTERVAL`] accepted points.
pub trait ProgressObserver {
    /// `expected` is the first pass total while writing, `None` while scanning.
    fn progress(&mut self, accepted: u64, expected: Option<u64>);
}

/// Observer that ignores every notification.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn progress(&mut self, _accepted: u64, _expected: Option<u64>) {}
}

impl<F: FnMut(u64, Option<u64>)> ProgressObserver for F {
    fn progress(&mut self, accepted: u64, expected: Option<u64>) {
        (self)(accepted, expected)
    }
}

struct Output<'a> {
    writer: &'a mut dyn PointWriter,
    color: Option<ColorTransform>,
    record: PointRecord,
}

/// Statistics gathered by one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSummary {
    pub count: u64,
    pub bounds: BoundingBox,
    /// Z values in insertion order, only when sampling was enabled.
    pub z_samples: Option<Vec<f64>>,
}

/// Per-pass accumulator. Every accepted point widens the bounds and bumps the
/// count; in writing mode it is also forwarded with its color.
pub struct PointSink<'a> {
    count: u64,
    bounds: BoundingBox,
    z_samples: Option<Vec<f64>>,
    output: Option<Output<'a>>,
    expected: Option<u64>,
    observer: &'a mut dyn ProgressObserver,
}

impl<'a> PointSink<'a> {
    /// First pass: statistics only, optionally keeping every Z for percentiles.
    pub fn scanning(sample_z: bool, observer: &'a mut dyn ProgressObserver) -> Self {
        Self {
            count: 0,
            bounds: BoundingBox::new(),
            z_samples: sample_z.then(Vec::new),
            output: None,
            expected: None,
            observer,
        }
    }

    /// Second pass: forward every point to `writer`, colored when `color` is set.
    pub fn writing(
        writer: &'a mut dyn PointWriter,
        color: Option<ColorTransform>,
        expected: u64,
        observer: &'a mut dyn ProgressObserver,
    ) -> Self {
        Self {
            count: 0,
            bounds: BoundingBox::new(),
            z_samples: None,
            output: Some(Output {
                writer,
                color,
                record: PointRecord::default(),
            }),
            expected: Some(expected),
            observer,
        }
    }

    pub fn accept(&mut self, point: Point3) -> Result<()> {
        self.bounds.extend(&point);
        self.count += 1;

        if let Some(samples) = self.z_samples.as_mut() {
            samples.push(point.z);
        }

        if let Some(output) = self.output.as_mut() {
            output.record.x = point.x;
            output.record.y = point.y;
            output.record.z = point.z;
            output.record.color = output
                .color
                .as_ref()
                .map(|color| Rgb16::grey(color.intensity(point.z)));
            output.writer.write_point(&output.record)?;
        }

        if self.count % PROGRESS_INTERVAL == 0 {
            self.observer.progress(self.count, self.expected);
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn finish(self) -> SinkSummary {
        SinkSummary {
            count: self.count,
            bounds: self.bounds,
            z_samples: self.z_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanning_collects_bounds_and_samples() {
        let mut observer = NoProgress;
        let mut sink = PointSink::scanning(true, &mut observer);
        sink.accept(Point3::new(1.0, 2.0, 3.0)).unwrap();
        sink.accept(Point3::new(-1.0, 4.0, 0.5)).unwrap();

        let summary = sink.finish();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.bounds.min(), [-1.0, 2.0, 0.5]);
        assert_eq!(summary.bounds.max(), [1.0, 4.0, 3.0]);
        assert_eq!(summary.z_samples, Some(vec![3.0, 0.5]));
    }

    #[test]
    fn test_scanning_without_samples() {
        let mut observer = NoProgress;
        let mut sink = PointSink::scanning(false, &mut observer);
        sink.accept(Point3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(sink.finish().z_samples, None);
    }

    #[test]
    fn test_writing_forwards_grey_color() {
        let mut records: Vec<PointRecord> = Vec::new();
        let mut observer = NoProgress;
        let color = ColorTransform::from_range(0.0, 10.0);
        {
            let mut sink = PointSink::writing(&mut records, Some(color), 3, &mut observer);
            sink.accept(Point3::new(0.0, 0.0, 0.0)).unwrap();
            sink.accept(Point3::new(0.0, 0.0, 5.0)).unwrap();
            sink.accept(Point3::new(0.0, 0.0, 20.0)).unwrap();
            assert_eq!(sink.count(), 3);
        }
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].color, Some(Rgb16::grey(0)));
        assert_eq!(records[1].color, Some(Rgb16::grey(32768)));
        // Clamped above the range
        assert_eq!(records[2].color, Some(Rgb16::grey(65535)));
    }

    #[test]
    fn test_writing_without_color() {
        let mut records: Vec<PointRecord> = Vec::new();
        let mut observer = NoProgress;
        {
            let mut sink = PointSink::writing(&mut records, None, 1, &mut observer);
            sink.accept(Point3::new(1.5, 2.5, 3.5)).unwrap();
        }
        assert_eq!(
            records,
            vec![PointRecord {
                x: 1.5,
                y: 2.5,
                z: 3.5,
                color: None
            }]
        );
    }

    #[test]
    fn test_progress_is_rate_limited() {
        let mut calls = Vec::new();
        let mut observer = |accepted: u64, expected: Option<u64>| calls.push((accepted, expected));
        {
            let mut sink = PointSink::scanning(false, &mut observer);
            for i in 0..(2 * PROGRESS_INTERVAL + 10) {
                sink.accept(Point3::new(i as f64, 0.0, 0.0)).unwrap();
            }
        }
        assert_eq!(
            calls,
            vec![(PROGRESS_INTERVAL, None), (2 * PROGRESS_INTERVAL, None)]
        );
    }
}
