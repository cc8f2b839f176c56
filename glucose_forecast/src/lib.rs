//! # Glucose Forecast
//!
//! Builds feature windows from a two-day glucose template and asks a
//! forecasting service for multi-horizon predictions with the meal effect
//! separated from the background trend.
//!
//! ## Features
//!
//! - Meal ledger with same-minute merging
//! - Trailing windows anchored on the template's second day, spanning midnight
//! - Full and stride-downsampled 24h chart series
//! - Total vs. baseline decomposition over 30/60/120 minute horizons
//! - Meal-response (post-meal curve) forecasts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glucose_forecast::{ForecastConfig, HttpForecaster, PredictionOrchestrator, WindowBuilder};
//! use glucose_template::TemplateStore;
//!
//! # async fn run() -> glucose_forecast::Result<()> {
//! let config = ForecastConfig::default();
//! let template = TemplateStore::from_path("template.csv")?;
//! let now = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
//!     .and_then(|d| d.and_hms_opt(12, 30, 0))
//!     .expect("valid date");
//!
//! let window = WindowBuilder::new(&template, config.window_config()?).build(now, &[])?;
//! let orchestrator = PredictionOrchestrator::new(HttpForecaster::new(&config)?);
//! for result in orchestrator.predict_decomposed(&window).await? {
//!     println!("{} min: meal effect {:+.1}", result.horizon_min, result.delta_meal);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod meals;
pub mod prediction;
pub mod window;

// Re-export commonly used types
pub use crate::client::{
    fetch_template, ForecastRequest, ForecastResponse, Forecaster, HttpForecaster, MealResponse,
    MealResponseRequest,
};
pub use crate::config::ForecastConfig;
pub use crate::error::{ForecastError, Result};
pub use crate::meals::{MealEvent, MealFeature, MealLedger, MealSource, MealType};
pub use crate::prediction::{Leg, PredictionOrchestrator, PredictionResult, DEFAULT_HORIZONS};
pub use crate::window::{GlucosePoint, Window, WindowBuilder, WindowConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
