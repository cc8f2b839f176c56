//! # Glucose Template
//!
//! `glucose_template` holds the precomputed two-day synthetic timeline that
//! stands in for a live sensor feed. The timeline has one row per minute:
//! 1440 rows for day 1 ("yesterday") followed by 1440 rows for day 2 ("today").
//!
//! Each row carries a glucose value, optional activity vitals, and an optional
//! meal snapshot baked into the template.
//!
//! ## Usage Example
//!
//! ```no_run
//! use glucose_template::TemplateStore;
//!
//! let store = TemplateStore::from_path("template.csv")?;
//! assert_eq!(store.len(), glucose_template::TEMPLATE_ROWS);
//!
//! // First row of the second day
//! let midnight = store.row(glucose_template::MINUTES_PER_DAY).unwrap();
//! println!("glucose at today's midnight: {}", midnight.glucose);
//! # Ok::<(), glucose_template::TemplateError>(())
//! ```

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod store;
pub mod utils;

pub use store::TemplateStore;

/// Minutes in one synthetic day
pub const MINUTES_PER_DAY: usize = 1440;

/// Days covered by a template
pub const TEMPLATE_DAYS: usize = 2;

/// Rows in a complete template
pub const TEMPLATE_ROWS: usize = MINUTES_PER_DAY * TEMPLATE_DAYS;

/// Errors that can occur while loading a template
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The resource was read but its content is malformed or incomplete
    #[error("Template parse error: {0}")]
    Parse(String),

    /// The resource could not be read or fetched
    #[error("Template load error: {0}")]
    Load(String),
}

/// Result type for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Activity vitals recorded for a template minute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Heart rate (bpm)
    pub hr: Option<f64>,
    /// Metabolic equivalents
    pub mets: Option<f64>,
    /// Calories burned through activity
    pub calories_activity: Option<f64>,
}

/// Meal snapshot baked into a template minute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeal {
    pub meal_type: Option<String>,
    pub calories: Option<f64>,
    pub carbs: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub amount_consumed: Option<f64>,
    pub image_path: Option<String>,
}

impl TemplateMeal {
    /// True when no meal column carried a value
    pub fn is_empty(&self) -> bool {
        self.meal_type.is_none()
            && self.calories.is_none()
            && self.carbs.is_none()
            && self.protein.is_none()
            && self.fat.is_none()
            && self.amount_consumed.is_none()
            && self.image_path.is_none()
    }
}

/// One minute of the template timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRow {
    /// Synthetic day, 1 or 2
    pub day: u8,
    /// Wall-clock time of the row
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// Position in the two-day timeline, `0..2880`
    pub minute_index: usize,
    /// Position within the day, `0..1440`
    pub minute_of_day: usize,
    /// Glucose (mg/dL)
    pub glucose: f64,
    pub vitals: Vitals,
    /// Present when any meal column had a value
    pub meal: Option<TemplateMeal>,
}

impl TemplateRow {
    /// Build a row for `minute_index` with the given glucose and no vitals or meal.
    pub fn at_index(minute_index: usize, glucose: f64) -> Self {
        let minute_of_day = minute_index % MINUTES_PER_DAY;
        Self {
            day: (minute_index / MINUTES_PER_DAY + 1) as u8,
            time: utils::minute_to_time(minute_of_day),
            minute_index,
            minute_of_day,
            glucose,
            vitals: Vitals::default(),
            meal: None,
        }
    }

    /// True for rows of the first synthetic day
    pub fn is_first_day(&self) -> bool {
        self.minute_index < MINUTES_PER_DAY
    }

    /// Minute of day implied by the `time` column
    pub fn time_minute_of_day(&self) -> usize {
        (self.time.hour() * 60 + self.time.minute()) as usize
    }
}

/// Serialize a `NaiveTime` as `HH:MM`
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::utils::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}
