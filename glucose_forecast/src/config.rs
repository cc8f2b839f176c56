//! Deployment configuration for windowing and the forecasting service

use crate::error::{ForecastError, Result};
use crate::prediction::DEFAULT_HORIZONS;
use crate::window::WindowConfig;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Settings shared by the window builder, the HTTP forecaster and the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Base URL of the forecasting service
    pub base_url: String,
    /// Path of the single-horizon delta endpoint
    pub predict_path: String,
    /// Path of the meal-response endpoint
    pub meal_response_path: String,
    /// Horizons (minutes) covered by the decomposition
    pub horizons: Vec<u32>,
    /// Trailing window length for prediction calls
    pub window_size: usize,
    /// Stride for the downsampled 24h chart
    pub chart_stride: usize,
    /// Fixed UTC offset used when stamping template rows, e.g. `+03:00`
    pub utc_offset: String,
    /// Fall back to the template's baked-in meal when nothing was logged
    pub use_template_meals: bool,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            predict_path: "/predict".to_string(),
            meal_response_path: "/predict_meal_response".to_string(),
            horizons: DEFAULT_HORIZONS.to_vec(),
            window_size: 720,
            chart_stride: 5,
            utc_offset: "+03:00".to_string(),
            use_template_meals: false,
            request_timeout_secs: 30,
        }
    }
}

impl ForecastConfig {
    /// Parse the configured UTC offset
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.utc_offset)
    }

    /// Window settings for prediction calls
    pub fn window_config(&self) -> Result<WindowConfig> {
        Ok(WindowConfig::new(self.window_size, self.offset()?)
            .with_template_meals(self.use_template_meals))
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve an endpoint path against the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            ForecastError::InvalidParameter(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;
        base.join(path).map_err(|e| {
            ForecastError::InvalidParameter(format!("Invalid endpoint path '{}': {}", path, e))
        })
    }

    /// Check the settings without touching the network
    pub fn validate(&self) -> Result<()> {
        self.offset()?;
        self.endpoint(&self.predict_path)?;
        self.endpoint(&self.meal_response_path)?;

        if self.horizons.is_empty() || self.horizons.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Horizons must be a non-empty list of positive minutes".to_string(),
            ));
        }
        if self.window_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "Window size must be positive".to_string(),
            ));
        }
        if self.chart_stride == 0 {
            return Err(ForecastError::InvalidParameter(
                "Chart stride must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a `+HH:MM` / `-HH:MM` offset
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    raw.trim().parse::<FixedOffset>().map_err(|e| {
        ForecastError::InvalidParameter(format!("Invalid UTC offset '{}': {}", raw, e))
    })
}
