use log::debug;
use ordered_float::OrderedFloat;
use rayon::slice::ParallelSliceMut;

use crate::utils::geometry::BoundingBox;

/// Smallest Z span used for normalisation, so a flat cloud never divides by zero.
pub const MIN_Z_RANGE: f64 = f64::EPSILON;

pub const LOW_PERCENTILE: f64 = 0.02;
pub const HIGH_PERCENTILE: f64 = 0.98;

/// Linear height-to-intensity mapping derived once after the first pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTransform {
    pub min_z: f64,
    pub max_z: f64,
    pub z_factor: f64,
}

impl ColorTransform {
    pub fn from_range(min_z: f64, max_z: f64) -> Self {
        Self {
            min_z,
            max_z,
            z_factor: 1.0 / (max_z - min_z).max(MIN_Z_RANGE),
        }
    }

    /// Height mapped into `[0, 1]`.
    pub fn normalize(&self, z: f64) -> f64 {
        ((z - self.min_z) * self.z_factor).clamp(0.0, 1.0)
    }

    pub fn intensity(&self, z: f64) -> u16 {
        (self.normalize(z) * f64::from(u16::MAX)).round() as u16
    }
}

/// Index of the 2nd and 98th percentile in a sorted sample of `n` values.
/// Returns `None` for an empty sample.
pub fn percentile_ranks(n: usize) -> Option<(usize, usize)> {
    if n == 0 {
        return None;
    }
    let low = (n as f64 * LOW_PERCENTILE) as usize;
    let high = ((n as f64 * HIGH_PERCENTILE) as usize).min(n - 1);
    Some((low, high))
}

/// Sort `samples` in place and pick the 2nd/98th percentile values.
pub fn percentile_range(samples: &mut [f64]) -> Option<(f64, f64)> {
    let (low, high) = percentile_ranks(samples.len())?;
    samples.par_sort_unstable_by_key(|&z| OrderedFloat(z));
    Some((samples[low], samples[high]))
}

/// Derive the color transform from the first pass.
///
/// # Arguments
///
/// * `z_samples` - Every accepted Z value, consumed and freed here.
/// * `bounds` - First pass bounds, used when there are no samples.
///
/// # Returns
///
/// A transform spanning the 2nd to 98th percentile of the samples, or the
/// raw Z extrema of `bounds`.
pub fn derive_color_transform(z_samples: Option<Vec<f64>>, bounds: &BoundingBox) -> ColorTransform {
    let range = z_samples.and_then(|mut samples| {
        debug!("Calculating Z percentiles over {} samples", samples.len());
        percentile_range(&mut samples)
    });
    match range {
        Some((min_z, max_z)) => ColorTransform::from_range(min_z, max_z),
        None => ColorTransform::from_range(bounds.min_z, bounds.max_z),
    }
}
