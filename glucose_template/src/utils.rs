//! Utility functions for glucose templates
//!
//! This module provides time-of-day helpers, CSV export, and synthetic
//! template generation for demos and tests.

use crate::store::columns;
use crate::{
    Result, TemplateError, TemplateMeal, TemplateRow, TemplateStore, Vitals, MINUTES_PER_DAY,
    TEMPLATE_ROWS,
};
use chrono::NaiveTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;

/// Parse an `HH:MM` (or `HH:MM:SS`) cell into a time of day
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| TemplateError::Parse(format!("Invalid time '{}': {}", raw, e)))
}

/// Time of day for a minute offset from midnight (wraps past 1440)
pub fn minute_to_time(minute_of_day: usize) -> NaiveTime {
    let minute_of_day = minute_of_day % MINUTES_PER_DAY;
    NaiveTime::from_hms_opt((minute_of_day / 60) as u32, (minute_of_day % 60) as u32, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Build a template whose glucose at each minute index is `glucose(minute_index)`.
///
/// Vitals and meals are left empty.
pub fn template_from_fn<F>(glucose: F) -> Result<TemplateStore>
where
    F: Fn(usize) -> f64,
{
    let rows = (0..TEMPLATE_ROWS)
        .map(|i| TemplateRow::at_index(i, glucose(i)))
        .collect();
    TemplateStore::from_rows(rows)
}

/// Parameters for [`generate_template`]
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Fasting glucose level (mg/dL)
    pub base_glucose: f64,
    /// Peak rise above base after a full meal (mg/dL)
    pub meal_peak: f64,
    /// Amplitude of per-minute sensor noise (mg/dL)
    pub noise: f64,
    /// Seed for the noise generator
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_glucose: 95.0,
            meal_peak: 55.0,
            noise: 1.5,
            seed: 42,
        }
    }
}

// (minute_of_day, meal type, calories, carbs, protein, fat)
const MEAL_PLAN: [(usize, &str, f64, f64, f64, f64); 3] = [
    (8 * 60, "Breakfast", 420.0, 55.0, 18.0, 14.0),
    (13 * 60, "Lunch", 650.0, 75.0, 32.0, 22.0),
    (19 * 60 + 30, "Dinner", 720.0, 70.0, 40.0, 28.0),
];

/// Generate a complete synthetic two-day template
///
/// Glucose follows a gentle circadian wave with a rise-and-decay response
/// after each planned meal. Each meal minute carries a baked-in meal snapshot,
/// and vitals follow a simple daytime activity pattern.
pub fn generate_template(config: &GeneratorConfig) -> Result<TemplateStore> {
    let mut random = StdRng::seed_from_u64(config.seed);
    let mut rows = Vec::with_capacity(TEMPLATE_ROWS);

    for minute_index in 0..TEMPLATE_ROWS {
        let minute_of_day = minute_index % MINUTES_PER_DAY;
        let hours = minute_of_day as f64 / 60.0;

        // Dawn phenomenon: slight morning rise
        let circadian = 6.0 * ((hours - 5.0) / 24.0 * std::f64::consts::TAU).sin();

        let meal_effect: f64 = MEAL_PLAN
            .iter()
            .map(|&(meal_minute, _, _, carbs, _, _)| {
                meal_response(minute_of_day, meal_minute) * config.meal_peak * (carbs / 70.0)
            })
            .sum();

        let noise = config.noise * (random.gen::<f64>() - 0.5) * 2.0;
        let glucose = (config.base_glucose + circadian + meal_effect + noise).max(40.0);

        let mut row = TemplateRow::at_index(minute_index, (glucose * 10.0).round() / 10.0);

        let awake = (7 * 60..23 * 60).contains(&minute_of_day);
        let walking = (17 * 60 + 30..18 * 60 + 15).contains(&minute_of_day);
        row.vitals = Vitals {
            hr: Some(if walking {
                112.0
            } else if awake {
                74.0
            } else {
                58.0
            }),
            mets: Some(if walking { 4.0 } else if awake { 1.3 } else { 0.9 }),
            calories_activity: Some(if walking { 6.5 } else { 1.2 }),
        };

        if let Some(&(_, meal_type, calories, carbs, protein, fat)) = MEAL_PLAN
            .iter()
            .find(|(meal_minute, ..)| *meal_minute == minute_of_day)
        {
            row.meal = Some(TemplateMeal {
                meal_type: Some(meal_type.to_string()),
                calories: Some(calories),
                carbs: Some(carbs),
                protein: Some(protein),
                fat: Some(fat),
                amount_consumed: Some(1.0),
                image_path: None,
            });
        }

        rows.push(row);
    }

    TemplateStore::from_rows(rows)
}

// Normalised post-meal curve: peaks ~45 minutes after eating, gone by ~3 hours.
fn meal_response(minute_of_day: usize, meal_minute: usize) -> f64 {
    if minute_of_day < meal_minute {
        return 0.0;
    }
    let t = (minute_of_day - meal_minute) as f64;
    if t > 180.0 {
        return 0.0;
    }
    let peak = 45.0;
    (t / peak) * (1.0 - t / peak).exp()
}

/// Write a template as CSV using the same column names the parser reads.
pub fn write_csv<W: Write>(store: &TemplateStore, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(columns::ALL)
        .map_err(|e| TemplateError::Load(format!("Failed to write header: {}", e)))?;

    for row in store.rows() {
        let meal = row.meal.clone().unwrap_or_default();
        let record = [
            row.day.to_string(),
            row.time.format("%H:%M").to_string(),
            row.minute_index.to_string(),
            row.minute_of_day.to_string(),
            row.glucose.to_string(),
            optional_number(row.vitals.hr),
            optional_number(row.vitals.mets),
            optional_number(row.vitals.calories_activity),
            meal.meal_type.unwrap_or_default(),
            optional_number(meal.calories),
            optional_number(meal.carbs),
            optional_number(meal.protein),
            optional_number(meal.fat),
            optional_number(meal.amount_consumed),
            meal.image_path.unwrap_or_default(),
        ];
        csv_writer.write_record(&record).map_err(|e| {
            TemplateError::Load(format!(
                "Failed to write row {}: {}",
                row.minute_index, e
            ))
        })?;
    }

    csv_writer
        .flush()
        .map_err(|e| TemplateError::Load(format!("Failed to flush template: {}", e)))
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
