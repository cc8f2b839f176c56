//! Forecasting service boundary
//!
//! Request bodies, the response normalization adapter, the [`Forecaster`] trait
//! the orchestrator is written against, and its reqwest-backed implementation.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::meals::MealFeature;
use crate::window::{GlucosePoint, Window};
use async_trait::async_trait;
use glucose_template::{TemplateError, TemplateStore};
use log::{debug, info};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

const DEFAULT_MODE: &str = "full";
const DEFAULT_CONFIDENCE: &str = "low";
const DEFAULT_N: usize = 720;

/// Body of a single-horizon forecast call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRequest {
    pub glucose: Vec<GlucosePoint>,
    pub meal_type: Option<String>,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub amount_consumed: f64,
    pub hr: f64,
    pub mets: f64,
    pub calories_activity: f64,
    pub steps: f64,
}

impl ForecastRequest {
    /// Request for `window` with `meal` substituted for the window's own meal.
    ///
    /// Missing activity values are sent as 0.
    pub fn from_window(window: &Window, meal: &MealFeature) -> Self {
        Self {
            glucose: window.glucose.clone(),
            meal_type: meal.meal_type.clone(),
            calories: meal.calories,
            carbs: meal.carbs,
            protein: meal.protein,
            fat: meal.fat,
            fiber: meal.fiber,
            amount_consumed: meal.amount_consumed,
            hr: window.activity.hr.unwrap_or(0.0),
            mets: window.activity.mets.unwrap_or(0.0),
            calories_activity: window.activity.calories_activity.unwrap_or(0.0),
            steps: window.activity.steps.unwrap_or(0.0),
        }
    }

    /// Fails when there is nothing to forecast from
    pub fn validate(&self) -> Result<()> {
        if self.glucose.is_empty() {
            return Err(ForecastError::ValidationError(
                "Glucose window is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// True for baseline requests
    pub fn is_meal_free(&self) -> bool {
        self.meal_type.is_none()
            && self.calories == 0.0
            && self.carbs == 0.0
            && self.protein == 0.0
            && self.fat == 0.0
            && self.fiber == 0.0
            && self.amount_consumed == 0.0
    }
}

/// Forecast response as the service sends it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawForecastResponse {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default)]
    pub delta: Option<f64>,
    /// Older services report the delta under this name
    #[serde(default)]
    pub prediction: Option<f64>,
    #[serde(default)]
    pub predicted_glucose: Option<f64>,
    #[serde(default)]
    pub last_glucose: Option<f64>,
    #[serde(default)]
    pub horizon_min: Option<u32>,
}

/// Forecast response with aliases resolved and defaults applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub mode: String,
    pub confidence: String,
    pub n: usize,
    /// Predicted change from the last observed glucose, mg/dL
    pub delta: f64,
    pub predicted_glucose: Option<f64>,
    pub last_glucose: Option<f64>,
    pub horizon_min: u32,
}

impl RawForecastResponse {
    /// Resolve `delta ?? prediction` and fill the optional fields.
    pub fn normalize(self, requested_horizon: u32) -> Result<ForecastResponse> {
        let delta = self.delta.or(self.prediction).ok_or_else(|| {
            ForecastError::MalformedResponse(
                "response has neither 'delta' nor 'prediction'".to_string(),
            )
        })?;
        if !delta.is_finite() {
            return Err(ForecastError::MalformedResponse(format!(
                "non-finite delta {}",
                delta
            )));
        }

        Ok(ForecastResponse {
            mode: self.mode.unwrap_or_else(|| DEFAULT_MODE.to_string()),
            confidence: self
                .confidence
                .unwrap_or_else(|| DEFAULT_CONFIDENCE.to_string()),
            n: self.n.unwrap_or(DEFAULT_N),
            delta,
            predicted_glucose: self.predicted_glucose,
            last_glucose: self.last_glucose,
            horizon_min: self.horizon_min.unwrap_or(requested_horizon),
        })
    }
}

/// Body of a meal-response call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealResponseRequest {
    pub glucose_values: Vec<f64>,
    pub timestamps: Vec<String>,
    pub latest_ts: Option<String>,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub calories: f64,
    pub amount_consumed: f64,
    pub meal_type: String,
}

impl MealResponseRequest {
    pub fn from_window(window: &Window, meal: &MealFeature) -> Self {
        let timestamps: Vec<String> = window
            .glucose
            .iter()
            .map(|p| p.timestamp.to_rfc3339())
            .collect();
        Self {
            glucose_values: window.values(),
            latest_ts: timestamps.last().cloned(),
            timestamps,
            carbs: meal.carbs,
            protein: meal.protein,
            fat: meal.fat,
            fiber: meal.fiber,
            calories: meal.calories,
            amount_consumed: meal.amount_consumed,
            meal_type: meal
                .meal_type
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Post-meal curve shape predicted by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealResponse {
    pub mode: String,
    pub baseline_glucose: f64,
    pub premeal_slope: f64,
    /// Peak rise above baseline, mg/dL
    pub d_peak: f64,
    /// Minutes from the meal to the peak
    pub t_peak: f64,
    pub auc_0_120: f64,
    pub decay_slope: f64,
    pub predicted_peak_glucose: f64,
    pub confidence: String,
}

/// A forecasting backend
#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Predict the glucose change `horizon_min` minutes ahead
    async fn forecast(&self, request: &ForecastRequest, horizon_min: u32)
        -> Result<ForecastResponse>;

    /// Predict the shape of the post-meal glucose curve
    async fn meal_response(&self, request: &MealResponseRequest) -> Result<MealResponse>;
}

/// [`Forecaster`] talking to the forecasting HTTP service
#[derive(Debug, Clone)]
pub struct HttpForecaster {
    client: Client,
    predict_url: Url,
    meal_response_url: Url,
}

impl HttpForecaster {
    pub fn new(config: &ForecastConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, config)
    }

    /// Use an existing client; its own timeout settings apply
    pub fn with_client(client: Client, config: &ForecastConfig) -> Result<Self> {
        Ok(Self {
            client,
            predict_url: config.endpoint(&config.predict_path)?,
            meal_response_url: config.endpoint(&config.meal_response_path)?,
        })
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<String> {
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ForecastError::PredictionService {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Forecaster for HttpForecaster {
    async fn forecast(
        &self,
        request: &ForecastRequest,
        horizon_min: u32,
    ) -> Result<ForecastResponse> {
        let mut url = self.predict_url.clone();
        url.query_pairs_mut()
            .append_pair("horizon_min", &horizon_min.to_string());
        debug!(
            "POST {} ({} points, meal_free={})",
            url,
            request.glucose.len(),
            request.is_meal_free()
        );

        let text = self.post_json(url, request).await?;
        let raw: RawForecastResponse = serde_json::from_str(&text)
            .map_err(|e| ForecastError::MalformedResponse(e.to_string()))?;
        raw.normalize(horizon_min)
    }

    async fn meal_response(&self, request: &MealResponseRequest) -> Result<MealResponse> {
        debug!(
            "POST {} ({} points)",
            self.meal_response_url,
            request.glucose_values.len()
        );
        let text = self
            .post_json(self.meal_response_url.clone(), request)
            .await?;
        serde_json::from_str(&text).map_err(|e| ForecastError::MalformedResponse(e.to_string()))
    }
}

/// Download and parse a template CSV.
///
/// Transport failures and non-success statuses are load errors.
pub async fn fetch_template(client: &Client, url: Url) -> Result<TemplateStore> {
    let load_err = |msg: String| ForecastError::Template(TemplateError::Load(msg));

    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| load_err(format!("{}: {}", url, e)))?;
    if !resp.status().is_success() {
        return Err(load_err(format!("{}: status {}", url, resp.status())));
    }
    let text = resp
        .text()
        .await
        .map_err(|e| load_err(format!("{}: {}", url, e)))?;

    let store = TemplateStore::from_csv_str(&text)?;
    info!("Fetched template from {} ({} rows)", url, store.len());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{ActivityFeature, Anchor, MealOrigin};
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;

    fn window() -> Window {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        Window {
            glucose: vec![GlucosePoint {
                timestamp: offset.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
                value: 120.0,
            }],
            meal: MealFeature::zeroed(),
            meal_origin: MealOrigin::None,
            activity: ActivityFeature {
                hr: Some(72.0),
                ..Default::default()
            },
            anchor: Anchor::at_minute(480).unwrap(),
        }
    }

    #[test]
    fn test_normalize_prefers_delta() {
        let raw = RawForecastResponse {
            delta: Some(5.0),
            prediction: Some(9.0),
            ..Default::default()
        };
        let resp = raw.normalize(60).unwrap();
        assert_eq!(resp.delta, 5.0);
        assert_eq!(resp.horizon_min, 60);
        assert_eq!(resp.mode, "full");
        assert_eq!(resp.confidence, "low");
        assert_eq!(resp.n, 720);
    }

    #[test]
    fn test_normalize_prediction_alias() {
        let raw: RawForecastResponse = serde_json::from_str(
            r#"{"mode":"fallback","confidence":"medium","n":15,"prediction":-3.5,"last_glucose":110.0,"horizon_min":30}"#,
        )
        .unwrap();
        let resp = raw.normalize(120).unwrap();
        assert_eq!(resp.delta, -3.5);
        assert_eq!(resp.horizon_min, 30);
        assert_eq!(resp.mode, "fallback");
        assert_eq!(resp.n, 15);
        assert_eq!(resp.last_glucose, Some(110.0));
    }

    #[test]
    fn test_normalize_missing_delta() {
        let raw: RawForecastResponse = serde_json::from_str(r#"{"mode":"full"}"#).unwrap();
        assert!(matches!(
            raw.normalize(30),
            Err(ForecastError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_defaults_missing_activity() {
        let req = ForecastRequest::from_window(&window(), &MealFeature::zeroed());
        assert_eq!(req.hr, 72.0);
        assert_eq!(req.mets, 0.0);
        assert_eq!(req.steps, 0.0);
        assert!(req.is_meal_free());

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["glucose"][0]["ts"], "2024-05-01T08:00:00+03:00");
        assert!(json["meal_type"].is_null());
    }

    #[test]
    fn test_empty_request_fails_validation() {
        let mut w = window();
        w.glucose.clear();
        let req = ForecastRequest::from_window(&w, &MealFeature::zeroed());
        assert!(matches!(
            req.validate(),
            Err(ForecastError::ValidationError(_))
        ));
    }

    #[test]
    fn test_meal_response_request() {
        let meal = MealFeature {
            carbs: 40.0,
            ..Default::default()
        };
        let req = MealResponseRequest::from_window(&window(), &meal);
        assert_eq!(req.glucose_values, vec![120.0]);
        assert_eq!(req.latest_ts.as_deref(), Some("2024-05-01T08:00:00+03:00"));
        assert_eq!(req.meal_type, "Unknown");
    }
}
