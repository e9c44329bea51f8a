//! Price forecasting engine.
//!
//! Per (route set, trip type), lazily trains a gradient-boosted regression
//! on historical economy rows and serves single-date predictions, a 30-day
//! trend and a mixed actual+predicted daily curve. Models are cached behind
//! an `RwLock`; a separate training mutex keeps one training in flight per
//! engine instance — re-entry while a model exists is a no-op returning the
//! cached model.
//!
//! Single-date predictions require a cross-validated model (≥ 5 training
//! rows). The graph degrades further: with a weak or absent model it falls
//! back to historical average × holiday multiplier × weekend factor ×
//! deterministic jitter, so the curve always exists.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::calendar::seeded_unit;
use crate::db::models::{CabinClass, TripType};
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::dec_to_f64;
use crate::services::gbm::{self, TrainedModel};

/// Training window: [today − 180d, today + 60d].
const TRAINING_LOOKBACK_DAYS: i64 = 180;
const TRAINING_LOOKAHEAD_DAYS: i64 = 60;

/// Rows needed for cross-validated training (and thus for predictions).
const MIN_PREDICTION_ROWS: usize = 5;

/// Default forward curve length (days).
pub const DEFAULT_GRAPH_DAYS: usize = 350;

/// Actual points cover [today − 30, today + 30].
const ACTUAL_WINDOW_DAYS: i64 = 30;

/// Trend compares the last 30 days of actuals with the next 30 predictions.
const TREND_WINDOW_DAYS: i64 = 30;

/// |change| below this is a stable trend (percent).
const TREND_STABLE_THRESHOLD_PCT: f64 = 5.0;

/// Saturday/Sunday departures trend a little higher in the fallback curve.
const WEEKEND_FACTOR: f64 = 1.05;

/// Actual graph points carry a fixed [−15%, +30%] band around the price.
const ACTUAL_BAND_LOW: f64 = 0.85;
const ACTUAL_BAND_HIGH: f64 = 1.30;

// ---------------------------------------------------------------------------
// Holiday multiplier
// ---------------------------------------------------------------------------

/// Fixed-date Thai public holidays as (month, day).
const LISTED_HOLIDAYS: &[(u32, u32)] = &[
    (1, 1),   // New Year's Day
    (4, 6),   // Chakri Memorial Day
    (4, 13),  // Songkran
    (4, 14),  // Songkran
    (4, 15),  // Songkran
    (5, 1),   // National Labour Day
    (5, 4),   // Coronation Day
    (6, 3),   // Queen's Birthday
    (7, 28),  // King's Birthday
    (8, 12),  // Mother's Day
    (10, 13), // King Rama IX Memorial Day
    (10, 23), // Chulalongkorn Day
    (12, 5),  // Father's Day
    (12, 10), // Constitution Day
    (12, 31), // New Year's Eve
];

/// Whether a date is one of the listed public holidays.
pub fn is_listed_holiday(date: NaiveDate) -> bool {
    LISTED_HOLIDAYS.contains(&(date.month(), date.day()))
}

/// Whether any listed holiday falls within ±3 days.
fn near_listed_holiday(date: NaiveDate) -> bool {
    (-3..=3).any(|d| is_listed_holiday(date + Duration::days(d)))
}

/// Seasonal surge multiplier for a departure date, always ≥ 1.0.
///
/// First matching window wins: Songkran (Apr 11–17) and Christmas–New Year
/// (Dec 20–31) at 1.5, the New Year window (Jan 1–7) at 1.4, Chinese New
/// Year (Jan 21 – Feb 4) at 1.3, the May and October school-break months at
/// 1.2, ±3 days around any listed holiday at 1.2, otherwise 1.0.
pub fn holiday_multiplier(date: NaiveDate) -> f64 {
    let (m, d) = (date.month(), date.day());
    if (m == 4 && (11..=17).contains(&d)) || (m == 12 && d >= 20) {
        return 1.5;
    }
    if m == 1 && d <= 7 {
        return 1.4;
    }
    if (m == 1 && d >= 21) || (m == 2 && d <= 4) {
        return 1.3;
    }
    if m == 5 || m == 10 {
        return 1.2;
    }
    if near_listed_holiday(date) {
        return 1.2;
    }
    1.0
}

// ---------------------------------------------------------------------------
// Feature engineering
// ---------------------------------------------------------------------------

/// Feature vector for one departure date:
/// `[dayOfWeek 0–6 (Sunday = 0), month 0–11, daysUntilDeparture, isWeekend,
/// isHolidaySeason (month ∈ {12, 1, 4}), isHoliday, holidayMultiplier]`.
pub fn feature_vector(departure: NaiveDate, today: NaiveDate) -> Vec<f64> {
    let days_until = (departure - today).num_days().max(0) as f64;
    let weekday = departure.weekday();
    let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
    let is_holiday_season = matches!(departure.month(), 12 | 1 | 4);
    vec![
        f64::from(weekday.num_days_from_sunday()),
        f64::from(departure.month0()),
        days_until,
        f64::from(u8::from(is_weekend)),
        f64::from(u8::from(is_holiday_season)),
        f64::from(u8::from(is_listed_holiday(departure))),
        holiday_multiplier(departure),
    ]
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Confidence tier by forecast horizon.
    fn for_days_out(days: i64) -> Self {
        if days <= 30 {
            Confidence::High
        } else if days <= 60 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Band half-width for min/max prices.
    fn band_fraction(self) -> f64 {
        match self {
            Confidence::High => 0.15,
            Confidence::Medium => 0.20,
            Confidence::Low => 0.25,
        }
    }
}

/// A single-date price prediction. Prices are raw model output; pricing
/// rules are applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub price: f64,
    pub confidence: Confidence,
    pub r_squared: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// 30-day price trend.
#[derive(Debug, Clone)]
pub struct TrendAnalysis {
    pub trend: Trend,
    pub change_percent: f64,
    pub current_avg_price: f64,
    pub future_avg_price: f64,
}

/// One day of the forward curve.
#[derive(Debug, Clone)]
pub struct GraphPoint {
    pub date: NaiveDate,
    pub low: f64,
    pub typical: f64,
    pub high: f64,
    pub is_actual: bool,
}

/// The per-route trained state held in the engine cache.
#[derive(Debug)]
pub struct RouteModel {
    trained: Option<TrainedModel>,
    /// Whether the model went through cross-validation (≥ 5 rows); only
    /// then are single-date predictions served.
    cv_validated: bool,
    /// Mean training price, the fallback curve's base.
    historical_avg: f64,
}

impl RouteModel {
    fn unavailable() -> Self {
        Self { trained: None, cv_validated: false, historical_avg: 0.0 }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

type ModelKey = (String, TripType);

/// Forecasting engine with a per-(route, trip-type) model cache.
#[derive(Debug, Default)]
pub struct ForecastEngine {
    cache: RwLock<HashMap<ModelKey, Arc<RouteModel>>>,
    /// One training in flight per engine instance.
    train_lock: Mutex<()>,
}

impl ForecastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached model for (route set, trip type), training it first if
    /// absent. Training data is economy rows in [today − 180d, today + 60d];
    /// duplicate trainings are coalesced by the training mutex (the second
    /// caller finds the cache filled and returns immediately).
    pub async fn get_or_train(
        &self,
        pool: &PgPool,
        route_ids: &[Uuid],
        route_key: &str,
        trip_type: TripType,
        today: NaiveDate,
    ) -> Result<Arc<RouteModel>, AppError> {
        let key: ModelKey = (route_key.to_string(), trip_type);
        if let Some(model) = self.cache.read().await.get(&key) {
            return Ok(model.clone());
        }

        let _training = self.train_lock.lock().await;
        // Re-check: another caller may have trained while we waited.
        if let Some(model) = self.cache.read().await.get(&key) {
            return Ok(model.clone());
        }

        let start = today - Duration::days(TRAINING_LOOKBACK_DAYS);
        let end = today + Duration::days(TRAINING_LOOKAHEAD_DAYS);
        let rows = queries::flight_prices_in_window(
            pool,
            route_ids,
            start,
            end,
            trip_type,
            CabinClass::Economy,
            None,
        )
        .await?;

        let model = Arc::new(train_route_model(
            &rows.iter().map(|r| (r.departure_date, dec_to_f64(r.price))).collect::<Vec<_>>(),
            today,
        ));
        if model.trained.is_none() {
            tracing::info!("No training data for {} {:?}; model unavailable", route_key, trip_type);
        }
        self.cache.write().await.insert(key, model.clone());
        Ok(model)
    }

    /// Single-date prediction. `None` without a cross-validated model.
    pub fn predict(&self, model: &RouteModel, date: NaiveDate, today: NaiveDate) -> Option<Prediction> {
        if !model.cv_validated {
            return None;
        }
        let trained = model.trained.as_ref()?;
        let raw = trained.model.predict(&feature_vector(date, today));
        let base = raw.round().max(0.0);
        let price = base * holiday_multiplier(date);

        let days_out = (date - today).num_days().max(0);
        let confidence = Confidence::for_days_out(days_out);
        let band = confidence.band_fraction();
        Some(Prediction {
            price,
            confidence,
            r_squared: trained.diagnostics.r_squared,
            min_price: price * (1.0 - band),
            max_price: price * (1.0 + band),
        })
    }

    /// 30-day trend: mean stored price over the last 30 days vs the mean
    /// prediction over the next 30. `None` when either side is missing.
    pub async fn trend(
        &self,
        pool: &PgPool,
        model: &RouteModel,
        route_ids: &[Uuid],
        trip_type: TripType,
        today: NaiveDate,
    ) -> Result<Option<TrendAnalysis>, AppError> {
        if !model.cv_validated {
            return Ok(None);
        }
        let recent = queries::flight_prices_in_window(
            pool,
            route_ids,
            today - Duration::days(TREND_WINDOW_DAYS),
            today,
            trip_type,
            CabinClass::Economy,
            None,
        )
        .await?;
        if recent.is_empty() {
            return Ok(None);
        }
        let current_avg =
            recent.iter().map(|r| dec_to_f64(r.price)).sum::<f64>() / recent.len() as f64;

        let predictions: Vec<f64> = (1..=TREND_WINDOW_DAYS)
            .filter_map(|d| self.predict(model, today + Duration::days(d), today))
            .map(|p| p.price)
            .collect();
        if predictions.is_empty() || current_avg <= 0.0 {
            return Ok(None);
        }
        let future_avg = predictions.iter().sum::<f64>() / predictions.len() as f64;

        let change_percent = 100.0 * (future_avg - current_avg) / current_avg;
        let trend = if change_percent.abs() < TREND_STABLE_THRESHOLD_PCT {
            Trend::Stable
        } else if change_percent > 0.0 {
            Trend::Increasing
        } else {
            Trend::Decreasing
        };
        Ok(Some(TrendAnalysis {
            trend,
            change_percent,
            current_avg_price: current_avg,
            future_avg_price: future_avg,
        }))
    }

    /// Mixed actual + predicted daily curve.
    ///
    /// Actual points are the cheapest stored price per day over
    /// [today − 30, today + 30] with fixed ·[0.85, 1.30] bands. Predicted
    /// points run from tomorrow for `days`, skipping dates already present
    /// as actuals; per-day model fallback is historical average × holiday
    /// multiplier × weekend factor × deterministic jitter.
    pub async fn price_graph(
        &self,
        pool: &PgPool,
        model: &RouteModel,
        route_ids: &[Uuid],
        route_key: &str,
        trip_type: TripType,
        today: NaiveDate,
        days: usize,
    ) -> Result<Vec<GraphPoint>, AppError> {
        let actual_rows = queries::flight_prices_in_window(
            pool,
            route_ids,
            today - Duration::days(ACTUAL_WINDOW_DAYS),
            today + Duration::days(ACTUAL_WINDOW_DAYS),
            trip_type,
            CabinClass::Economy,
            None,
        )
        .await?;

        // Cheapest stored price per day
        let mut daily_min: HashMap<NaiveDate, f64> = HashMap::new();
        for row in &actual_rows {
            let price = dec_to_f64(row.price);
            daily_min
                .entry(row.departure_date)
                .and_modify(|p| *p = p.min(price))
                .or_insert(price);
        }

        let mut points: Vec<GraphPoint> = daily_min
            .iter()
            .map(|(&date, &price)| GraphPoint {
                date,
                low: price * ACTUAL_BAND_LOW,
                typical: price,
                high: price * ACTUAL_BAND_HIGH,
                is_actual: true,
            })
            .collect();

        for d in 1..=days as i64 {
            let date = today + Duration::days(d);
            if daily_min.contains_key(&date) {
                continue;
            }
            points.push(self.predicted_point(model, route_key, date, today));
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    /// One predicted graph point, via the model when possible, else the
    /// deterministic fallback curve.
    fn predicted_point(
        &self,
        model: &RouteModel,
        route_key: &str,
        date: NaiveDate,
        today: NaiveDate,
    ) -> GraphPoint {
        if let Some(trained) = &model.trained {
            let raw = trained.model.predict(&feature_vector(date, today));
            let typical = (raw.round().max(0.0)) * holiday_multiplier(date);
            if typical.is_finite() {
                let band = Confidence::for_days_out((date - today).num_days()).band_fraction();
                return GraphPoint {
                    date,
                    low: typical * (1.0 - band),
                    typical,
                    high: typical * (1.0 + band),
                    is_actual: false,
                };
            }
        }

        // Fallback: historical average shaped by calendar factors and a
        // seeded jitter in [0.92, 1.08]
        let weekend = if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            WEEKEND_FACTOR
        } else {
            1.0
        };
        let jitter = 0.92 + seeded_unit(&format!("{}:{}", route_key, date)) * 0.16;
        let typical = model.historical_avg * holiday_multiplier(date) * weekend * jitter;
        let band = Confidence::for_days_out((date - today).num_days()).band_fraction();
        GraphPoint {
            date,
            low: typical * (1.0 - band),
            typical,
            high: typical * (1.0 + band),
            is_actual: false,
        }
    }
}

/// Train a route model from (departure date, price) pairs.
fn train_route_model(rows: &[(NaiveDate, f64)], today: NaiveDate) -> RouteModel {
    if rows.is_empty() {
        return RouteModel::unavailable();
    }
    let features: Vec<Vec<f64>> = rows.iter().map(|(d, _)| feature_vector(*d, today)).collect();
    let targets: Vec<f64> = rows.iter().map(|(_, p)| *p).collect();
    let historical_avg = targets.iter().sum::<f64>() / targets.len() as f64;

    let cv_validated = rows.len() >= MIN_PREDICTION_ROWS;
    let trained = gbm::train_with_cv(&features, &targets);
    if let Some(t) = &trained {
        tracing::debug!(
            "Trained price model on {} rows: avg RMSE {:.1}, avg MAE {:.1}, r² {:.3}",
            rows.len(),
            t.diagnostics.avg_rmse,
            t.diagnostics.avg_mae,
            t.diagnostics.r_squared,
        );
    }
    RouteModel { trained, cv_validated, historical_avg }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_holiday_multiplier_never_below_one() {
        let mut date = d("2026-01-01");
        let end = d("2026-12-31");
        while date <= end {
            assert!(
                holiday_multiplier(date) >= 1.0,
                "multiplier below 1.0 on {}",
                date
            );
            date += Duration::days(1);
        }
    }

    #[test]
    fn test_holiday_multiplier_windows() {
        assert_eq!(holiday_multiplier(d("2026-04-13")), 1.5, "Songkran");
        assert_eq!(holiday_multiplier(d("2026-12-25")), 1.5, "Christmas–NY");
        assert_eq!(holiday_multiplier(d("2026-01-03")), 1.4, "New Year window");
        assert_eq!(holiday_multiplier(d("2026-01-28")), 1.3, "Chinese New Year window");
        assert_eq!(holiday_multiplier(d("2026-05-15")), 1.2, "May school window");
        assert_eq!(holiday_multiplier(d("2026-10-02")), 1.2, "October school window");
        assert_eq!(holiday_multiplier(d("2026-08-10")), 1.2, "±3 days of Mother's Day");
        assert_eq!(holiday_multiplier(d("2026-09-16")), 1.0, "ordinary day");
    }

    #[test]
    fn test_is_listed_holiday() {
        assert!(is_listed_holiday(d("2026-04-13")));
        assert!(is_listed_holiday(d("2026-12-05")));
        assert!(!is_listed_holiday(d("2026-09-16")));
    }

    #[test]
    fn test_feature_vector_shape_and_values() {
        // 2026-04-13 is a Monday in April (month0 = 3), a listed holiday
        let f = feature_vector(d("2026-04-13"), d("2026-04-01"));
        assert_eq!(f.len(), 7);
        assert_eq!(f[0], 1.0, "Monday with Sunday = 0");
        assert_eq!(f[1], 3.0, "zero-based month");
        assert_eq!(f[2], 12.0, "days until departure");
        assert_eq!(f[3], 0.0, "not a weekend");
        assert_eq!(f[4], 1.0, "April is holiday season");
        assert_eq!(f[5], 1.0, "Songkran is listed");
        assert_eq!(f[6], 1.5);
    }

    #[test]
    fn test_feature_vector_past_departure_clamps_days() {
        let f = feature_vector(d("2026-04-01"), d("2026-04-13"));
        assert_eq!(f[2], 0.0, "daysUntilDeparture never negative");
    }

    #[test]
    fn test_confidence_tiers_and_bands() {
        assert_eq!(Confidence::for_days_out(10), Confidence::High);
        assert_eq!(Confidence::for_days_out(30), Confidence::High);
        assert_eq!(Confidence::for_days_out(45), Confidence::Medium);
        assert_eq!(Confidence::for_days_out(61), Confidence::Low);
        assert_eq!(Confidence::High.band_fraction(), 0.15);
        assert_eq!(Confidence::Low.band_fraction(), 0.25);
    }

    #[test]
    fn test_prediction_requires_cv_model() {
        let engine = ForecastEngine::new();
        // 3 rows: model trains but is not CV-validated
        let rows = vec![
            (d("2026-03-01"), 1000.0),
            (d("2026-03-02"), 1100.0),
            (d("2026-03-03"), 1200.0),
        ];
        let model = train_route_model(&rows, d("2026-03-10"));
        assert!(model.trained.is_some());
        assert!(!model.cv_validated);
        assert!(
            engine.predict(&model, d("2026-03-20"), d("2026-03-10")).is_none(),
            "fewer than 5 rows must not yield a pricePrediction"
        );
    }

    #[test]
    fn test_prediction_bands_ordered_and_nonnegative() {
        let engine = ForecastEngine::new();
        let rows: Vec<(NaiveDate, f64)> = (0..40)
            .map(|i| (d("2026-02-01") + Duration::days(i), 1000.0 + 10.0 * (i % 7) as f64))
            .collect();
        let model = train_route_model(&rows, d("2026-03-01"));
        assert!(model.cv_validated);
        let p = engine
            .predict(&model, d("2026-03-15"), d("2026-03-01"))
            .expect("CV-validated model predicts");
        assert!(p.price >= 0.0);
        assert!(p.min_price <= p.price && p.price <= p.max_price);
        assert_eq!(p.confidence, Confidence::High, "14 days out");
        assert!((0.0..=1.0).contains(&p.r_squared));
    }

    #[test]
    fn test_fallback_point_deterministic() {
        let engine = ForecastEngine::new();
        let model = RouteModel { trained: None, cv_validated: false, historical_avg: 2000.0 };
        let a = engine.predicted_point(&model, "BKK-HKT", d("2026-04-13"), d("2026-04-01"));
        let b = engine.predicted_point(&model, "BKK-HKT", d("2026-04-13"), d("2026-04-01"));
        assert_eq!(a.typical, b.typical, "jitter is seeded, not random");
        assert!(a.low <= a.typical && a.typical <= a.high);
        // Songkran multiplier and jitter band around 2000 × 1.5
        assert!(a.typical >= 2000.0 * 1.5 * 0.92 && a.typical <= 2000.0 * 1.5 * 1.08);
    }

    #[test]
    fn test_fallback_point_unavailable_model_is_zero() {
        let engine = ForecastEngine::new();
        let model = RouteModel::unavailable();
        let p = engine.predicted_point(&model, "BKK-HKT", d("2026-04-13"), d("2026-04-01"));
        assert_eq!(p.typical, 0.0);
        assert!(p.low <= p.typical && p.typical <= p.high, "bands stay ordered at zero");
    }
}
