//! Error types for the glucose_forecast crate

use crate::prediction::Leg;
use glucose_math::MathError;
use glucose_template::TemplateError;
use thiserror::Error;

/// Custom error types for the glucose_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Template could not be parsed or loaded
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The template slice did not yield the requested number of points
    #[error("Window size mismatch: expected {expected} points, got {actual}")]
    WindowSizeMismatch { expected: usize, actual: usize },

    /// Input is insufficient to run a prediction
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The forecasting service answered with a non-success status
    #[error("Prediction service error (status {status}): {body}")]
    PredictionService { status: u16, body: String },

    /// The forecasting service answered with an unusable body
    #[error("Malformed prediction response: {0}")]
    MalformedResponse(String),

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// One call of the multi-horizon fan-out failed, aborting the whole decomposition
    #[error("Forecast fan-out aborted at {horizon_min} min ({leg} call): {source}")]
    AggregateFanOut {
        horizon_min: u32,
        leg: Leg,
        #[source]
        source: Box<ForecastError>,
    },

    /// Error from numeric helpers
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        ForecastError::Transport(err.to_string())
    }
}

impl ForecastError {
    /// The innermost error of a fan-out failure, or `self` otherwise
    pub fn root_cause(&self) -> &ForecastError {
        match self {
            ForecastError::AggregateFanOut { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
