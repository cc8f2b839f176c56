//! Logged meal events and same-minute merging

use crate::error::{ForecastError, Result};
use glucose_template::{TemplateMeal, MINUTES_PER_DAY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Meal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    /// Several events logged at the same minute
    Mixed,
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealType::Breakfast => write!(f, "Breakfast"),
            MealType::Lunch => write!(f, "Lunch"),
            MealType::Dinner => write!(f, "Dinner"),
            MealType::Snack => write!(f, "Snack"),
            MealType::Mixed => write!(f, "Mixed"),
        }
    }
}

impl FromStr for MealType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "snack" => Ok(MealType::Snack),
            "mixed" => Ok(MealType::Mixed),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown meal type '{}'",
                other
            ))),
        }
    }
}

/// How a meal was logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSource {
    Photo,
    Manual,
}

/// A meal logged by the user at a minute of the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEvent {
    pub id: String,
    pub minute_of_day: usize,
    #[serde(rename = "mealType", alias = "meal_type")]
    pub meal_type: MealType,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    /// Fraction of the portion eaten, `0.0..=1.0`
    pub amount_consumed: f64,
    pub source: MealSource,
    #[serde(
        rename = "imageRef",
        alias = "image_ref",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_ref: Option<String>,
}

impl MealEvent {
    /// Create a validated meal event with no fiber and no image.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        minute_of_day: usize,
        meal_type: MealType,
        calories: f64,
        carbs: f64,
        protein: f64,
        fat: f64,
        amount_consumed: f64,
        source: MealSource,
    ) -> Result<Self> {
        let event = Self {
            id: id.into(),
            minute_of_day,
            meal_type,
            calories,
            carbs,
            protein,
            fat,
            fiber: 0.0,
            amount_consumed,
            source,
            image_ref: None,
        };
        event.validate()?;
        Ok(event)
    }

    /// Set the fiber content
    pub fn with_fiber(mut self, fiber: f64) -> Result<Self> {
        self.fiber = fiber;
        self.validate()?;
        Ok(self)
    }

    /// Attach a reference to the analysed photo
    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Check minute range, portion fraction and macros
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Meal event id must not be empty".to_string(),
            ));
        }
        if self.minute_of_day >= MINUTES_PER_DAY {
            return Err(ForecastError::InvalidParameter(format!(
                "Meal {}: minute_of_day {} must be below {}",
                self.id, self.minute_of_day, MINUTES_PER_DAY
            )));
        }
        if !(0.0..=1.0).contains(&self.amount_consumed) {
            return Err(ForecastError::InvalidParameter(format!(
                "Meal {}: amount_consumed {} must be within 0..=1",
                self.id, self.amount_consumed
            )));
        }
        let macros = [
            ("calories", self.calories),
            ("carbs", self.carbs),
            ("protein", self.protein),
            ("fat", self.fat),
            ("fiber", self.fiber),
        ];
        for (name, value) in macros {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "Meal {}: {} must be a non-negative number, got {}",
                    self.id, name, value
                )));
            }
        }
        Ok(())
    }
}

/// Merge every event logged at exactly `minute`.
///
/// No match yields `None`, a single match is returned unchanged, and several
/// matches collapse into one `Mixed` manual event with summed macros and the
/// consumed fraction capped at 1.
pub fn merge_at_minute(events: &[MealEvent], minute: usize) -> Option<MealEvent> {
    let matching: Vec<&MealEvent> = events
        .iter()
        .filter(|event| event.minute_of_day == minute)
        .collect();

    match matching.as_slice() {
        [] => None,
        [single] => Some((*single).clone()),
        many => Some(MealEvent {
            id: format!("merged-{}", minute),
            minute_of_day: minute,
            meal_type: MealType::Mixed,
            calories: many.iter().map(|e| e.calories).sum(),
            carbs: many.iter().map(|e| e.carbs).sum(),
            protein: many.iter().map(|e| e.protein).sum(),
            fat: many.iter().map(|e| e.fat).sum(),
            fiber: many.iter().map(|e| e.fiber).sum(),
            amount_consumed: many.iter().map(|e| e.amount_consumed).sum::<f64>().min(1.0),
            source: MealSource::Manual,
            image_ref: None,
        }),
    }
}

/// Meal events logged by the user
///
/// Events are immutable once logged; removal is the only other change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealLedger {
    events: Vec<MealEvent>,
}

impl MealLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from existing events, validating each one
    pub fn from_events(events: Vec<MealEvent>) -> Result<Self> {
        let mut ledger = Self::new();
        for event in events {
            ledger.log(event)?;
        }
        Ok(ledger)
    }

    /// Parse a JSON array of events
    pub fn from_json(text: &str) -> Result<Self> {
        let events: Vec<MealEvent> = serde_json::from_str(text)?;
        Self::from_events(events)
    }

    /// Serialize the events as a JSON array
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }

    /// Add an event; ids must be unique
    pub fn log(&mut self, event: MealEvent) -> Result<()> {
        event.validate()?;
        if self.events.iter().any(|e| e.id == event.id) {
            return Err(ForecastError::InvalidParameter(format!(
                "Meal event {} is already logged",
                event.id
            )));
        }
        self.events.push(event);
        Ok(())
    }

    /// Delete an event by id, returning it if it existed
    pub fn remove(&mut self, id: &str) -> Option<MealEvent> {
        let position = self.events.iter().position(|e| e.id == id)?;
        Some(self.events.remove(position))
    }

    /// All logged events in logging order
    pub fn events(&self) -> &[MealEvent] {
        &self.events
    }

    /// Number of logged events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merged meal at a minute of the day
    pub fn merge_at_minute(&self, minute: usize) -> Option<MealEvent> {
        merge_at_minute(&self.events, minute)
    }
}

/// Meal inputs sent to the forecaster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealFeature {
    pub meal_type: Option<String>,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub amount_consumed: f64,
}

impl MealFeature {
    /// The "no meal" feature used for baseline calls
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// True when the feature carries no meal at all
    pub fn is_zeroed(&self) -> bool {
        *self == Self::zeroed()
    }

    /// Feature from a template's baked-in meal snapshot; missing values become 0
    pub fn from_template(meal: &TemplateMeal) -> Self {
        Self {
            meal_type: meal.meal_type.clone(),
            calories: meal.calories.unwrap_or(0.0),
            carbs: meal.carbs.unwrap_or(0.0),
            protein: meal.protein.unwrap_or(0.0),
            fat: meal.fat.unwrap_or(0.0),
            fiber: 0.0,
            amount_consumed: meal.amount_consumed.unwrap_or(0.0),
        }
    }
}

impl From<&MealEvent> for MealFeature {
    fn from(event: &MealEvent) -> Self {
        Self {
            meal_type: Some(event.meal_type.to_string()),
            calories: event.calories,
            carbs: event.carbs,
            protein: event.protein,
            fat: event.fat,
            fiber: event.fiber,
            amount_consumed: event.amount_consumed,
        }
    }
}
