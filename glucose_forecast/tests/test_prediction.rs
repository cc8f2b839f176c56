use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use glucose_forecast::client::{
    ForecastRequest, ForecastResponse, Forecaster, MealResponse, MealResponseRequest,
};
use glucose_forecast::meals::{MealEvent, MealFeature, MealSource, MealType};
use glucose_forecast::prediction::{Leg, PredictionOrchestrator};
use glucose_forecast::window::{Window, WindowBuilder, WindowConfig};
use glucose_forecast::{ForecastError, Result};
use glucose_template::utils::template_from_fn;
use glucose_template::TemplateStore;
use pretty_assertions::assert_eq;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Barrier;

/// In-memory forecaster: fixed deltas per leg, optional failure, call log
struct StubForecaster {
    total_delta: f64,
    baseline_delta: f64,
    last_glucose: Option<f64>,
    fail_on: Option<(u32, Leg)>,
    calls: Mutex<Vec<(u32, Leg)>>,
}

impl StubForecaster {
    fn new(total_delta: f64, baseline_delta: f64, last_glucose: Option<f64>) -> Self {
        Self {
            total_delta,
            baseline_delta,
            last_glucose,
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, horizon_min: u32, leg: Leg) -> Self {
        self.fail_on = Some((horizon_min, leg));
        self
    }

    fn calls(&self) -> Vec<(u32, Leg)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forecaster for StubForecaster {
    async fn forecast(
        &self,
        request: &ForecastRequest,
        horizon_min: u32,
    ) -> Result<ForecastResponse> {
        let leg = if request.is_meal_free() {
            Leg::Baseline
        } else {
            Leg::Total
        };
        self.calls.lock().unwrap().push((horizon_min, leg));

        if self.fail_on == Some((horizon_min, leg)) {
            return Err(ForecastError::PredictionService {
                status: 500,
                body: "model crashed".to_string(),
            });
        }

        Ok(ForecastResponse {
            mode: "full".to_string(),
            confidence: if leg == Leg::Total { "high" } else { "medium" }.to_string(),
            n: request.glucose.len(),
            delta: match leg {
                Leg::Total => self.total_delta,
                Leg::Baseline => self.baseline_delta,
            },
            predicted_glucose: None,
            last_glucose: self.last_glucose,
            horizon_min,
        })
    }

    async fn meal_response(&self, request: &MealResponseRequest) -> Result<MealResponse> {
        Ok(MealResponse {
            mode: "meal_response".to_string(),
            baseline_glucose: request.glucose_values[0],
            premeal_slope: 0.0,
            d_peak: request.carbs,
            t_peak: 45.0,
            auc_0_120: 0.0,
            decay_slope: 0.0,
            predicted_peak_glucose: request.glucose_values[0] + request.carbs,
            confidence: "high".to_string(),
        })
    }
}

/// Holds every forecast call until `barrier` is full
struct GatedForecaster {
    barrier: Barrier,
}

#[async_trait]
impl Forecaster for GatedForecaster {
    async fn forecast(
        &self,
        request: &ForecastRequest,
        horizon_min: u32,
    ) -> Result<ForecastResponse> {
        self.barrier.wait().await;
        Ok(ForecastResponse {
            mode: "full".to_string(),
            confidence: "high".to_string(),
            n: request.glucose.len(),
            delta: if request.is_meal_free() { 1.0 } else { 3.0 },
            predicted_glucose: None,
            last_glucose: Some(130.0),
            horizon_min,
        })
    }

    async fn meal_response(&self, _request: &MealResponseRequest) -> Result<MealResponse> {
        Err(ForecastError::ValidationError("not used".to_string()))
    }
}

fn offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

fn template() -> TemplateStore {
    template_from_fn(|_| 130.0).unwrap()
}

fn lunch_events() -> Vec<MealEvent> {
    vec![MealEvent::new(
        "lunch",
        780,
        MealType::Lunch,
        640.0,
        72.0,
        30.0,
        20.0,
        1.0,
        MealSource::Photo,
    )
    .unwrap()]
}

fn lunch_window(template: &TemplateStore) -> Window {
    let builder = WindowBuilder::new(template, WindowConfig::new(720, offset()));
    let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    builder.build_at_minute(today, 780, &lunch_events()).unwrap()
}

#[tokio::test]
async fn test_decomposition_example() {
    let template = template();
    let window = lunch_window(&template);
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(12.0, 4.0, Some(130.0)));

    let results = orchestrator.predict_decomposed(&window).await.unwrap();

    let horizons: Vec<u32> = results.iter().map(|r| r.horizon_min).collect();
    assert_eq!(horizons, vec![30, 60, 120]);
    for result in &results {
        assert_eq!(result.delta_meal, 8.0);
        assert_eq!(result.predicted_total, 142.0);
        assert_eq!(result.predicted_base, 134.0);
        assert_eq!(result.predicted_meal, 138.0);
        assert_eq!(
            result.predicted_total - result.predicted_base,
            result.delta_meal
        );
        assert_eq!(result.confidence, "high");
        assert_eq!(result.n, 720);
    }
}

#[tokio::test]
async fn test_six_calls_per_decomposition() {
    let template = template();
    let window = lunch_window(&template);
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(1.0, 1.0, Some(130.0)));

    orchestrator.predict_decomposed(&window).await.unwrap();

    let mut calls = orchestrator.forecaster().calls();
    calls.sort_by_key(|&(h, leg)| (h, leg == Leg::Baseline));
    assert_eq!(
        calls,
        vec![
            (30, Leg::Total),
            (30, Leg::Baseline),
            (60, Leg::Total),
            (60, Leg::Baseline),
            (120, Leg::Total),
            (120, Leg::Baseline),
        ]
    );
}

#[tokio::test]
async fn test_single_failure_aborts_everything() {
    let template = template();
    let window = lunch_window(&template);
    let stub = StubForecaster::new(12.0, 4.0, Some(130.0)).failing_on(60, Leg::Baseline);
    let orchestrator = PredictionOrchestrator::new(stub);

    let err = orchestrator.predict_decomposed(&window).await.unwrap_err();
    match &err {
        ForecastError::AggregateFanOut {
            horizon_min, leg, ..
        } => {
            assert_eq!(*horizon_min, 60);
            assert_eq!(*leg, Leg::Baseline);
        }
        other => panic!("expected a fan-out error, got {:?}", other),
    }
    assert!(matches!(
        err.root_cause(),
        ForecastError::PredictionService { status: 500, .. }
    ));
}

#[tokio::test]
async fn test_missing_template_short_circuits() {
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(1.0, 1.0, None));
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(13, 0, 0)
        .unwrap();

    let err = orchestrator
        .predict_now(None, &[], now, &WindowConfig::new(720, offset()))
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::ValidationError(_)));
    assert!(orchestrator.forecaster().calls().is_empty());
}

#[tokio::test]
async fn test_empty_window_short_circuits() {
    let template = template();
    let mut window = lunch_window(&template);
    window.glucose.clear();
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(1.0, 1.0, None));

    let err = orchestrator.predict_decomposed(&window).await.unwrap_err();
    assert!(matches!(err, ForecastError::ValidationError(_)));
    assert!(orchestrator.forecaster().calls().is_empty());
}

#[tokio::test]
async fn test_predict_now_uses_window_last_value() {
    let template = template();
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(10.0, 2.0, None))
        .with_horizons(vec![45])
        .unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(13, 0, 0)
        .unwrap();

    let results = orchestrator
        .predict_now(
            Some(&template),
            &lunch_events(),
            now,
            &WindowConfig::new(60, offset()),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].horizon_min, 45);
    assert_eq!(results[0].last_glucose, 130.0);
    assert_eq!(results[0].predicted_total, 140.0);
    assert_eq!(results[0].predicted_meal, 138.0);
}

#[tokio::test]
async fn test_meal_free_window_has_no_meal_effect() {
    let template = template();
    let builder = WindowBuilder::new(&template, WindowConfig::new(720, offset()));
    let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let window = builder.build_at_minute(today, 600, &lunch_events()).unwrap();

    // Both legs carry a zeroed meal, so the stub sees baseline calls only
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(9.0, 3.0, Some(130.0)));
    let results = orchestrator.predict_decomposed(&window).await.unwrap();

    assert!(results.iter().all(|r| r.delta_meal == 0.0));
    assert!(orchestrator
        .forecaster()
        .calls()
        .iter()
        .all(|&(_, leg)| leg == Leg::Baseline));
}

#[tokio::test]
async fn test_meal_response_includes_local_baseline() {
    let template = template();
    let window = lunch_window(&template);
    let orchestrator = PredictionOrchestrator::new(StubForecaster::new(0.0, 0.0, None));
    let meal = MealFeature {
        meal_type: Some("Lunch".to_string()),
        carbs: 60.0,
        ..Default::default()
    };

    let forecast = orchestrator.meal_response(&window, &meal).await.unwrap();
    assert_eq!(forecast.response.predicted_peak_glucose, 190.0);
    assert_eq!(forecast.local_baseline.baseline, 130.0);
    assert_eq!(forecast.local_baseline.slope_per_min, 0.0);
}

#[test]
fn test_invalid_horizons_rejected() {
    let stub = StubForecaster::new(0.0, 0.0, None);
    assert!(PredictionOrchestrator::new(stub).with_horizons(vec![]).is_err());
    let stub = StubForecaster::new(0.0, 0.0, None);
    assert!(PredictionOrchestrator::new(stub)
        .with_horizons(vec![30, 0])
        .is_err());
}

#[tokio::test]
async fn test_all_calls_in_flight_together() {
    let template = template();
    let window = lunch_window(&template);
    // Six parties: every call has to be pending before any can finish
    let orchestrator = PredictionOrchestrator::new(GatedForecaster {
        barrier: Barrier::new(6),
    });

    let results = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.predict_decomposed(&window),
    )
    .await
    .expect("decomposition calls ran one after another")
    .unwrap();

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.delta_meal, 2.0);
        assert_eq!(result.predicted_total, 133.0);
    }
}
