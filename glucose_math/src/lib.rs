//! # Glucose Math
//!
//! Numeric helpers for minute-resolution glucose series.
//! This crate provides stride downsampling for chart display, screening for
//! sensor-artifact drops, and the trend features a forecaster consumes.

use thiserror::Error;

pub mod features;
pub mod sampling;

/// Errors that can occur in glucose series calculations
#[derive(Error, Debug, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for glucose math operations
pub type Result<T> = std::result::Result<T, MathError>;
