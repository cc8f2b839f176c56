//! Multi-horizon forecasts with the meal effect isolated
//!
//! Every horizon is forecast twice from the same window: once with the logged
//! meal ("total") and once with the meal zeroed ("baseline"). The difference of
//! the two deltas is the meal's own contribution.

use crate::client::{ForecastRequest, ForecastResponse, Forecaster, MealResponse, MealResponseRequest};
use crate::error::{ForecastError, Result};
use crate::meals::{MealEvent, MealFeature};
use crate::window::{Window, WindowBuilder, WindowConfig};
use chrono::NaiveDateTime;
use futures::future::try_join_all;
use glucose_math::features::{premeal_baseline, PremealBaseline};
use glucose_template::TemplateStore;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast horizons in minutes
pub const DEFAULT_HORIZONS: [u32; 3] = [30, 60, 120];

/// Minutes of history used for the pre-meal baseline
pub const PREMEAL_MINUTES: usize = 15;

/// Which of the two per-horizon calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// Window with the actual meal
    Total,
    /// Same window with the meal zeroed
    Baseline,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Total => write!(f, "total"),
            Leg::Baseline => write!(f, "baseline"),
        }
    }
}

/// Decomposed forecast for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub horizon_min: u32,
    /// Glucose the deltas are applied to
    #[serde(rename = "last")]
    pub last_glucose: f64,
    pub delta_total: f64,
    pub delta_base: f64,
    pub delta_meal: f64,
    pub predicted_total: f64,
    pub predicted_base: f64,
    pub predicted_meal: f64,
    pub mode: String,
    pub confidence: String,
    pub n: usize,
}

/// Combine the total and baseline responses of one horizon.
///
/// `last` comes from the total response, then the baseline response, then
/// `fallback_last`.
pub fn decompose(
    horizon_min: u32,
    total: &ForecastResponse,
    baseline: &ForecastResponse,
    fallback_last: Option<f64>,
) -> Result<PredictionResult> {
    let last = match total.last_glucose.or(baseline.last_glucose) {
        Some(last) => last,
        None => {
            warn!(
                "No last_glucose in {} min responses, using the window's last value",
                horizon_min
            );
            fallback_last.ok_or_else(|| {
                ForecastError::MalformedResponse(format!(
                    "no last_glucose for the {} min horizon",
                    horizon_min
                ))
            })?
        }
    };

    let delta_total = total.delta;
    let delta_base = baseline.delta;
    let delta_meal = delta_total - delta_base;

    Ok(PredictionResult {
        horizon_min,
        last_glucose: last,
        delta_total,
        delta_base,
        delta_meal,
        predicted_total: last + delta_total,
        predicted_base: last + delta_base,
        predicted_meal: last + delta_meal,
        mode: total.mode.clone(),
        confidence: total.confidence.clone(),
        n: total.n,
    })
}

/// Service-predicted post-meal curve plus the locally computed pre-meal baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealResponseForecast {
    pub response: MealResponse,
    pub local_baseline: PremealBaseline,
}

/// Runs forecasts against a [`Forecaster`]
#[derive(Debug, Clone)]
pub struct PredictionOrchestrator<F> {
    forecaster: F,
    horizons: Vec<u32>,
}

impl<F: Forecaster> PredictionOrchestrator<F> {
    /// Orchestrator over the 30/60/120 minute horizons
    pub fn new(forecaster: F) -> Self {
        Self {
            forecaster,
            horizons: DEFAULT_HORIZONS.to_vec(),
        }
    }

    /// Replace the horizons; they must be non-empty and positive
    pub fn with_horizons(mut self, horizons: Vec<u32>) -> Result<Self> {
        if horizons.is_empty() || horizons.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Horizons must be a non-empty list of positive minutes".to_string(),
            ));
        }
        self.horizons = horizons;
        Ok(self)
    }

    pub fn horizons(&self) -> &[u32] {
        &self.horizons
    }

    pub fn forecaster(&self) -> &F {
        &self.forecaster
    }

    /// One forecast with the window's own meal
    pub async fn predict_single(&self, window: &Window, horizon_min: u32) -> Result<ForecastResponse> {
        let request = ForecastRequest::from_window(window, &window.meal);
        request.validate()?;
        self.forecaster.forecast(&request, horizon_min).await
    }

    /// Total and baseline forecasts for every horizon, all in flight at once.
    ///
    /// The first failing call aborts the whole decomposition.
    pub async fn predict_decomposed(&self, window: &Window) -> Result<Vec<PredictionResult>> {
        let total = ForecastRequest::from_window(window, &window.meal);
        let baseline = ForecastRequest::from_window(window, &MealFeature::zeroed());
        total.validate()?;

        let calls = self
            .horizons
            .iter()
            .flat_map(|&h| [(h, Leg::Total, &total), (h, Leg::Baseline, &baseline)])
            .map(|(horizon_min, leg, request)| async move {
                self.forecaster
                    .forecast(request, horizon_min)
                    .await
                    .map_err(|e| ForecastError::AggregateFanOut {
                        horizon_min,
                        leg,
                        source: Box::new(e),
                    })
            });
        let responses = try_join_all(calls).await?;

        let fallback_last = window.last_value();
        let results = self
            .horizons
            .iter()
            .zip(responses.chunks_exact(2))
            .map(|(&h, pair)| decompose(h, &pair[0], &pair[1], fallback_last))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Decomposed {} horizons at minute {} ({} calls)",
            results.len(),
            window.anchor.minute_of_day,
            responses.len()
        );
        Ok(results)
    }

    /// Build the window for `now` and decompose it.
    ///
    /// A missing or empty template fails before any call is made.
    pub async fn predict_now(
        &self,
        template: Option<&TemplateStore>,
        events: &[MealEvent],
        now: NaiveDateTime,
        config: &WindowConfig,
    ) -> Result<Vec<PredictionResult>> {
        let template = template
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ForecastError::ValidationError("Template is not loaded".to_string()))?;

        let window = WindowBuilder::new(template, *config).build(now, events)?;
        self.predict_decomposed(&window).await
    }

    /// Post-meal curve for eating `meal` at the window's anchor
    pub async fn meal_response(&self, window: &Window, meal: &MealFeature) -> Result<MealResponseForecast> {
        if window.is_empty() {
            return Err(ForecastError::ValidationError(
                "Glucose window is empty".to_string(),
            ));
        }
        let local_baseline = premeal_baseline(&window.values(), PREMEAL_MINUTES)?;

        let request = MealResponseRequest::from_window(window, meal);
        let response = self.forecaster.meal_response(&request).await?;
        Ok(MealResponseForecast {
            response,
            local_baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(delta: f64, last: Option<f64>) -> ForecastResponse {
        ForecastResponse {
            mode: "full".to_string(),
            confidence: "high".to_string(),
            n: 720,
            delta,
            predicted_glucose: None,
            last_glucose: last,
            horizon_min: 30,
        }
    }

    #[test]
    fn test_decompose_example() {
        let result = decompose(30, &response(12.0, Some(130.0)), &response(4.0, Some(130.0)), None).unwrap();
        assert_eq!(result.delta_meal, 8.0);
        assert_eq!(result.predicted_total, 142.0);
        assert_eq!(result.predicted_base, 134.0);
        assert_eq!(result.predicted_meal, 138.0);
        assert_eq!(
            result.predicted_total - result.predicted_base,
            result.delta_total - result.delta_base
        );
    }

    #[test]
    fn test_decompose_last_fallbacks() {
        let result = decompose(60, &response(2.0, None), &response(1.0, Some(100.0)), Some(90.0)).unwrap();
        assert_eq!(result.last_glucose, 100.0);

        let result = decompose(60, &response(2.0, None), &response(1.0, None), Some(90.0)).unwrap();
        assert_eq!(result.last_glucose, 90.0);
        assert_eq!(result.predicted_meal, 91.0);

        assert!(decompose(60, &response(2.0, None), &response(1.0, None), None).is_err());
    }

    #[test]
    fn test_result_serializes_last() {
        let result = decompose(120, &response(-6.0, Some(150.0)), &response(-2.0, None), None).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["last"], 150.0);
        assert!(json.get("last_glucose").is_none());
        assert_eq!(json["horizon_min"], 120);
        assert_eq!(json["predicted_meal"], 146.0);
    }

    #[test]
    fn test_leg_display() {
        assert_eq!(Leg::Total.to_string(), "total");
        assert_eq!(Leg::Baseline.to_string(), "baseline");
    }
}
