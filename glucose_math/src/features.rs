//! Trend features over a trailing glucose series
//!
//! The series is assumed to be evenly spaced one minute apart and ordered
//! oldest first, so the last element is "now". Features that need more history
//! than is available fall back to 0.0.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::f64::consts::PI;

/// Lags reported by [`TrendSummary`], in samples before the latest value.
pub const LAGS: [usize; 7] = [1, 2, 3, 5, 10, 15, 30];

/// How much history backs a feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    /// At least 30 points
    Full,
    /// Between 10 and 29 points
    Fallback,
    /// Fewer than 10 points
    Min,
}

impl FeatureMode {
    /// Pick the mode for a series of `n` points
    pub fn for_len(n: usize) -> Self {
        match n {
            n if n >= 30 => FeatureMode::Full,
            n if n >= 10 => FeatureMode::Fallback,
            _ => FeatureMode::Min,
        }
    }
}

/// Value `i` samples before the latest one, or 0.0 when the series is too short.
pub fn lag(values: &[f64], i: usize) -> f64 {
    if values.len() > i {
        values[values.len() - 1 - i]
    } else {
        0.0
    }
}

fn tail(values: &[f64], k: usize) -> Option<&[f64]> {
    if k > 0 && values.len() >= k {
        Some(&values[values.len() - k..])
    } else {
        None
    }
}

/// Mean of the last `k` values
pub fn rolling_mean(values: &[f64], k: usize) -> f64 {
    tail(values, k).map(|t| t.iter().mean()).unwrap_or(0.0)
}

/// Population standard deviation of the last `k` values
pub fn rolling_std(values: &[f64], k: usize) -> f64 {
    tail(values, k)
        .map(|t| t.iter().population_std_dev())
        .unwrap_or(0.0)
}

/// Least-squares slope of the last `k` values against their index.
pub fn slope_last(values: &[f64], k: usize) -> f64 {
    match tail(values, k) {
        Some(t) if k >= 2 => least_squares_slope(t),
        _ => 0.0,
    }
}

// x = 0, 1, 2, ...
fn least_squares_slope(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = y.iter().mean();

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, v) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (v - y_mean);
        var += dx * dx;
    }

    if var == 0.0 {
        0.0
    } else {
        cov / var
    }
}

/// Position within the day as a point on the unit circle.
///
/// Returns `(sin, cos)` of `2π * seconds / 86400`.
pub fn time_of_day(seconds_of_day: u32) -> (f64, f64) {
    let angle = 2.0 * PI * (f64::from(seconds_of_day % 86_400) / 86_400.0);
    (angle.sin(), angle.cos())
}

/// Snapshot of the trend features for the latest point of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    /// History depth classification
    pub mode: FeatureMode,
    /// Number of points summarised
    pub n: usize,
    /// `(lag, value)` pairs for each entry of [`LAGS`]
    pub lags: Vec<(usize, f64)>,
    pub slope_5: f64,
    pub slope_15: f64,
    pub mean_5: f64,
    pub std_5: f64,
    pub mean_15: f64,
    pub std_15: f64,
    pub mean_30: f64,
    pub std_30: f64,
    pub tod_sin: f64,
    pub tod_cos: f64,
}

impl TrendSummary {
    /// Summarise `values`, where the latest value was observed `seconds_of_day`
    /// seconds after local midnight (if known).
    pub fn from_values(values: &[f64], seconds_of_day: Option<u32>) -> Self {
        let n = values.len();
        let (tod_sin, tod_cos) = seconds_of_day.map(time_of_day).unwrap_or((0.0, 0.0));

        Self {
            mode: FeatureMode::for_len(n),
            n,
            lags: LAGS.iter().map(|&i| (i, lag(values, i))).collect(),
            slope_5: slope_last(values, 5),
            slope_15: slope_last(values, 15),
            mean_5: rolling_mean(values, 5),
            std_5: rolling_std(values, 5),
            mean_15: rolling_mean(values, 15),
            std_15: rolling_std(values, 15),
            mean_30: rolling_mean(values, 30),
            std_30: rolling_std(values, 30),
            tod_sin,
            tod_cos,
        }
    }
}

/// Glucose level and drift leading up to a meal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PremealBaseline {
    /// Mean glucose over the baseline window
    pub baseline: f64,
    /// Linear trend over the baseline window, mg/dL per minute
    pub slope_per_min: f64,
}

/// Baseline over the `minutes` samples preceding the latest one.
///
/// With fewer than three samples in that window the baseline is the mean of
/// the trailing values that exist and the slope is 0.0.
pub fn premeal_baseline(values: &[f64], minutes: usize) -> Result<PremealBaseline> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Pre-meal baseline needs at least one glucose value".to_string(),
        ));
    }
    if minutes == 0 {
        return Err(MathError::InvalidInput(
            "Baseline window must be at least one minute".to_string(),
        ));
    }

    let history = &values[..values.len() - 1];
    let start = history.len().saturating_sub(minutes);
    let window = &history[start..];

    if window.len() >= 3 {
        return Ok(PremealBaseline {
            baseline: window.iter().mean(),
            slope_per_min: least_squares_slope(window),
        });
    }

    let k = values.len().min(4);
    Ok(PremealBaseline {
        baseline: values[values.len() - k..].iter().mean(),
        slope_per_min: 0.0,
    })
}
