//! Trailing windows anchored on the template's second day
//!
//! "Now" is always passed in explicitly as a local wall-clock time. Its minute
//! of day is mapped onto the second synthetic day (`anchor_index = 1440 +
//! minute_of_day`), and the window is the `window_size` rows ending at that
//! anchor, crossing into the first day ("yesterday") when needed.

use crate::error::{ForecastError, Result};
use crate::meals::{merge_at_minute, MealEvent, MealFeature};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use glucose_math::features::TrendSummary;
use glucose_math::sampling::{stride_downsample, sudden_drops};
use glucose_template::{TemplateRow, TemplateStore, MINUTES_PER_DAY};
use log::debug;
use serde::{Deserialize, Serialize};

/// One glucose reading with its synthesized timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucosePoint {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
}

/// Activity vitals at the anchor row, passed through as recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityFeature {
    pub hr: Option<f64>,
    pub mets: Option<f64>,
    pub calories_activity: Option<f64>,
    pub steps: Option<f64>,
}

/// Where the window's meal feature came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealOrigin {
    /// Merged from the user's logged events
    Logged,
    /// The template's baked-in snapshot
    Template,
    /// Nothing at the anchor minute
    None,
}

/// Alignment of "now" with the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub minute_of_day: usize,
    pub anchor_index: usize,
}

impl Anchor {
    /// Anchor for a minute of the day
    pub fn at_minute(minute_of_day: usize) -> Result<Self> {
        if minute_of_day >= MINUTES_PER_DAY {
            return Err(ForecastError::InvalidParameter(format!(
                "minute_of_day {} must be below {}",
                minute_of_day, MINUTES_PER_DAY
            )));
        }
        Ok(Self {
            minute_of_day,
            anchor_index: MINUTES_PER_DAY + minute_of_day,
        })
    }

    /// Anchor for a wall-clock time
    pub fn at_time(now: NaiveTime) -> Self {
        let minute_of_day = (now.hour() * 60 + now.minute()) as usize;
        Self {
            minute_of_day,
            anchor_index: MINUTES_PER_DAY + minute_of_day,
        }
    }
}

/// Trailing feature window ending at "now"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub glucose: Vec<GlucosePoint>,
    pub meal: MealFeature,
    pub meal_origin: MealOrigin,
    pub activity: ActivityFeature,
    pub anchor: Anchor,
}

impl Window {
    /// Number of glucose points
    pub fn len(&self) -> usize {
        self.glucose.len()
    }

    /// Check if the window holds no glucose points
    pub fn is_empty(&self) -> bool {
        self.glucose.is_empty()
    }

    /// Glucose values, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.glucose.iter().map(|p| p.value).collect()
    }

    /// Most recent glucose value
    pub fn last_value(&self) -> Option<f64> {
        self.glucose.last().map(|p| p.value)
    }

    /// Timestamp of the most recent point
    pub fn latest_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.glucose.last().map(|p| p.timestamp)
    }

    /// Local trend features at the anchor
    pub fn trend_summary(&self) -> TrendSummary {
        let seconds = self
            .latest_timestamp()
            .map(|ts| ts.time().num_seconds_from_midnight());
        TrendSummary::from_values(&self.values(), seconds)
    }
}

/// Window length, timestamp offset and meal fallback policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub window_size: usize,
    /// Fixed offset used for every synthesized timestamp
    pub utc_offset: FixedOffset,
    pub use_template_meals: bool,
}

impl WindowConfig {
    /// Config without template meal fallback
    pub fn new(window_size: usize, utc_offset: FixedOffset) -> Self {
        Self {
            window_size,
            utc_offset,
            use_template_meals: false,
        }
    }

    /// Enable or disable the template meal fallback
    pub fn with_template_meals(mut self, enabled: bool) -> Self {
        self.use_template_meals = enabled;
        self
    }
}

/// Builds windows and day series from an immutable template
#[derive(Debug, Clone)]
pub struct WindowBuilder<'a> {
    template: &'a TemplateStore,
    config: WindowConfig,
}

impl<'a> WindowBuilder<'a> {
    pub fn new(template: &'a TemplateStore, config: WindowConfig) -> Self {
        Self { template, config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Window ending at the local wall-clock time `now`
    pub fn build(&self, now: NaiveDateTime, events: &[MealEvent]) -> Result<Window> {
        self.build_at(now.date(), Anchor::at_time(now.time()), events)
    }

    /// Window ending at `minute_of_day` of `today`
    pub fn build_at_minute(
        &self,
        today: NaiveDate,
        minute_of_day: usize,
        events: &[MealEvent],
    ) -> Result<Window> {
        self.build_at(today, Anchor::at_minute(minute_of_day)?, events)
    }

    fn build_at(&self, today: NaiveDate, anchor: Anchor, events: &[MealEvent]) -> Result<Window> {
        let rows = self.trailing_rows(anchor)?;
        let glucose = self.stamp_rows(rows, today)?;

        let anchor_row = &rows[rows.len() - 1];
        let (meal, meal_origin) = self.resolve_meal(anchor, anchor_row, events);
        let activity = ActivityFeature {
            hr: anchor_row.vitals.hr,
            mets: anchor_row.vitals.mets,
            calories_activity: anchor_row.vitals.calories_activity,
            steps: None,
        };

        debug!(
            "window anchored at minute {} (row {}), {} points, meal from {:?}",
            anchor.minute_of_day,
            anchor.anchor_index,
            glucose.len(),
            meal_origin
        );

        Ok(Window {
            glucose,
            meal,
            meal_origin,
            activity,
            anchor,
        })
    }

    // Rows [anchor - (size - 1) ..= anchor], exactly `window_size` of them
    fn trailing_rows(&self, anchor: Anchor) -> Result<&'a [TemplateRow]> {
        let size = self.config.window_size;
        if size == 0 {
            return Err(ForecastError::InvalidParameter(
                "Window size must be positive".to_string(),
            ));
        }

        let end = anchor.anchor_index;
        let start = (end + 1).checked_sub(size).ok_or(ForecastError::WindowSizeMismatch {
            expected: size,
            actual: end + 1,
        })?;

        let rows = self.template.slice(start..=end).ok_or_else(|| {
            ForecastError::WindowSizeMismatch {
                expected: size,
                actual: self.template.len().saturating_sub(start),
            }
        })?;

        if rows.len() != size {
            return Err(ForecastError::WindowSizeMismatch {
                expected: size,
                actual: rows.len(),
            });
        }
        Ok(rows)
    }

    fn resolve_meal(
        &self,
        anchor: Anchor,
        anchor_row: &TemplateRow,
        events: &[MealEvent],
    ) -> (MealFeature, MealOrigin) {
        if let Some(merged) = merge_at_minute(events, anchor.minute_of_day) {
            return (MealFeature::from(&merged), MealOrigin::Logged);
        }
        if self.config.use_template_meals {
            if let Some(snapshot) = &anchor_row.meal {
                return (MealFeature::from_template(snapshot), MealOrigin::Template);
            }
        }
        (MealFeature::zeroed(), MealOrigin::None)
    }

    // First-day rows belong to the day before `today`
    fn stamp_rows(&self, rows: &[TemplateRow], today: NaiveDate) -> Result<Vec<GlucosePoint>> {
        let yesterday = today.pred_opt().ok_or_else(|| {
            ForecastError::InvalidParameter(format!("No calendar day before {}", today))
        })?;

        rows.iter()
            .map(|row| -> Result<GlucosePoint> {
                let date = if row.is_first_day() { yesterday } else { today };
                Ok(GlucosePoint {
                    timestamp: stamp(date, row.time, self.config.utc_offset)?,
                    value: row.glucose,
                })
            })
            .collect()
    }

    /// All 1440 second-day points stamped with `today`
    pub fn full_day(&self, today: NaiveDate) -> Result<Vec<GlucosePoint>> {
        let rows = self
            .template
            .day_rows(2)
            .ok_or(ForecastError::WindowSizeMismatch {
                expected: MINUTES_PER_DAY,
                actual: self.template.len().saturating_sub(MINUTES_PER_DAY),
            })?;
        self.stamp_rows(rows, today)
    }

    /// Every `stride`-th second-day point, starting at midnight
    pub fn full_day_downsampled(&self, today: NaiveDate, stride: usize) -> Result<Vec<GlucosePoint>> {
        let full = self.full_day(today)?;
        Ok(stride_downsample(&full, stride)?)
    }
}

/// Points whose value fell by more than `max_drop` mg/dL since the previous minute.
///
/// Run this on the full (not downsampled) day series.
pub fn screen_sudden_drops(series: &[GlucosePoint], max_drop: f64) -> Result<Vec<GlucosePoint>> {
    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    Ok(sudden_drops(&values, max_drop)?
        .into_iter()
        .map(|i| series[i].clone())
        .collect())
}

fn stamp(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!(
                "Cannot stamp {} {} at offset {}",
                date, time, offset
            ))
        })
}
