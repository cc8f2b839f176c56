//! Series sampling and screening
//!
//! Contains:
//! - Stride downsampling for chart display (no averaging or interpolation)
//! - Per-minute drop screening for sensor-artifact detection

use crate::{MathError, Result};

/// Keep every `stride`-th element, starting with the first one.
///
/// The output holds `ceil(len / stride)` elements and each one is an exact copy
/// of the element at the selected position.
pub fn stride_downsample<T: Clone>(series: &[T], stride: usize) -> Result<Vec<T>> {
    if stride == 0 {
        return Err(MathError::InvalidInput(
            "Stride must be greater than zero".to_string(),
        ));
    }

    Ok(series.iter().step_by(stride).cloned().collect())
}

/// Number of points `stride_downsample` yields for a series of `len` points.
pub fn downsampled_len(len: usize, stride: usize) -> Result<usize> {
    if stride == 0 {
        return Err(MathError::InvalidInput(
            "Stride must be greater than zero".to_string(),
        ));
    }

    Ok(len.div_ceil(stride))
}

/// Indices where the value fell by more than `max_drop` since the previous point.
///
/// Each returned index points at the sample after the drop. A series with fewer
/// than two points has no drops.
pub fn sudden_drops(values: &[f64], max_drop: f64) -> Result<Vec<usize>> {
    if !max_drop.is_finite() || max_drop <= 0.0 {
        return Err(MathError::InvalidInput(format!(
            "Drop threshold must be a positive number, got {}",
            max_drop
        )));
    }

    Ok(values
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] - pair[1] > max_drop)
        .map(|(i, _)| i + 1)
        .collect())
}
