//! # Dia-Log
//!
//! Umbrella crate re-exporting the Dia-Log workspace members:
//!
//! - [`math`]: downsampling, artifact screening and trend features
//! - [`template`]: the two-day glucose template and its CSV format
//! - [`forecast`]: meals, windows, chart series and meal-isolated forecasts
//! - [`app`]: settings loading used by the `dia-log` binary
//!
//! ## Example
//!
//! ```
//! use dia_log_workspace::forecast::{WindowBuilder, WindowConfig};
//! use dia_log_workspace::template::utils::{generate_template, GeneratorConfig};
//!
//! let template = generate_template(&GeneratorConfig::default()).unwrap();
//! let offset = chrono::FixedOffset::east_opt(3 * 3600).unwrap();
//! let builder = WindowBuilder::new(&template, WindowConfig::new(30, offset));
//!
//! let today = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! let window = builder.build_at_minute(today, 0, &[]).unwrap();
//! assert_eq!(window.len(), 30);
//! assert_eq!(window.anchor.anchor_index, 1440);
//! ```

pub use dia_log as app;
pub use glucose_forecast as forecast;
pub use glucose_math as math;
pub use glucose_template as template;
