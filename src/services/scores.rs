//! Score aggregation: three per-period maps (price percentile, holiday
//! boost, weather factor), each 0–100, for the periods present in a query's
//! flight rows.
//!
//! Resolution order per signal: precomputed statistics → on-the-fly
//! derivation (fetch + upsert for holidays, daily-row aggregation for
//! weather) → deterministic fabrication from flight prices. The read path
//! never fails on a missing signal; only storage errors surface.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use sqlx::PgPool;
use uuid::Uuid;

use crate::calendar::{end_of_month, is_long_weekend, parse_period, period_start, seeded_unit};
use crate::db::models::{HolidayCategory, HolidayEntry};
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::{dec_to_f64, f64_to_decimal_2dp, opt_dec_to_f64};
use crate::services::geo::airport_province;
use crate::services::holiday_api::HolidayClient;
use crate::services::holiday_ingest;

/// Neutral score used when a signal cannot be resolved at all.
const NEUTRAL_SCORE: f64 = 50.0;

/// Fabricated holiday scores span [35, 95] before jitter.
const MOCK_HOLIDAY_BASE: f64 = 35.0;

/// Fabricated weather scores span [30, 90] before jitter.
const MOCK_WEATHER_BASE: f64 = 30.0;

/// Span of both fabricated ranges.
const MOCK_SPAN: f64 = 60.0;

/// Total width of the seeded jitter added to fabricated scores.
const MOCK_JITTER_AMPLITUDE: f64 = 20.0;

/// The three per-period score maps consumed by the season classifier.
#[derive(Debug, Clone, Default)]
pub struct ScoreBundle {
    pub price_pct: HashMap<String, f64>,
    pub holiday: HashMap<String, f64>,
    pub weather: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Scoring functions
// ---------------------------------------------------------------------------

/// Points a single holiday entry contributes, by name markers and category.
fn holiday_entry_points(entry: &HolidayEntry) -> f64 {
    let mut text = entry.name.clone();
    if let Some(en) = &entry.name_en {
        text.push(' ');
        text.push_str(en);
    }
    let lower = text.to_lowercase();

    // Major festivals
    const MAJOR: &[&str] = &["สงกรานต์", "songkran", "ตรุษจีน", "chinese new year", "ปีใหม่", "new year", "คริสต์มาส", "christmas"];
    if MAJOR.iter().any(|m| lower.contains(m)) {
        return 20.0;
    }
    // Important public holidays
    const IMPORTANT: &[&str] = &["มาฆ", "makha", "วิสาข", "visakha", "อาสาฬห", "asanha", "เฉลิมพระชนมพรรษา", "birthday", "วันแม่", "mother", "วันพ่อ", "father"];
    if IMPORTANT.iter().any(|m| lower.contains(m)) {
        return 10.0;
    }
    if entry.category == HolidayCategory::Special {
        return 5.0;
    }
    8.0
}

/// Holiday score for one month's entries.
///
/// Starts at 50; adds per-entry points, +5 per long-weekend entry, and +20
/// once if any entry falls in a peak month (December, January, April).
/// Clamped to [0, 100].
pub fn holiday_score(entries: &[HolidayEntry]) -> f64 {
    let mut score = NEUTRAL_SCORE;
    for e in entries {
        score += holiday_entry_points(e);
        if is_long_weekend(e.date) {
            score += 5.0;
        }
    }
    if entries.iter().any(|e| matches!(e.date.month(), 12 | 1 | 4)) {
        score += 20.0;
    }
    score.clamp(0.0, 100.0)
}

/// Weather score from monthly aggregates: average temperature (°C), total
/// rain (mm), average humidity (%). Clamped to [0, 100].
pub fn weather_score(avg_temp: f64, total_rain: f64, avg_humidity: Option<f64>) -> f64 {
    let mut score = NEUTRAL_SCORE;

    if (20.0..=28.0).contains(&avg_temp) {
        score += 20.0;
    } else if !(20.0..=32.0).contains(&avg_temp) {
        score -= 20.0;
    }

    if total_rain < 50.0 {
        score += 15.0;
    } else if total_rain > 200.0 {
        score -= 15.0;
    }

    if let Some(h) = avg_humidity {
        if (50.0..=70.0).contains(&h) {
            score += 15.0;
        } else if h > 80.0 {
            score -= 15.0;
        }
    }

    score.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Price percentiles
// ---------------------------------------------------------------------------

/// Cumulative percentile of each period's monthly average price.
///
/// The reference set is exactly the periods handed in — the months present
/// in the query window, not the full year — so percentiles shift with the
/// window. That is intentional upstream behavior, made explicit here.
pub fn price_percentiles(monthly_avg: &BTreeMap<String, f64>) -> HashMap<String, f64> {
    let n = monthly_avg.len();
    let mut out = HashMap::with_capacity(n);
    if n == 0 {
        return out;
    }
    for (period, avg) in monthly_avg {
        let at_or_below = monthly_avg.values().filter(|v| **v <= *avg).count();
        out.insert(period.clone(), 100.0 * at_or_below as f64 / n as f64);
    }
    out
}

// ---------------------------------------------------------------------------
// Deterministic fabrication
// ---------------------------------------------------------------------------

/// Min-max normalize a period's average into [0, 1]; 0.5 when all equal.
fn normalize(monthly_avg: &BTreeMap<String, f64>, value: f64) -> f64 {
    let min = monthly_avg.values().cloned().fold(f64::INFINITY, f64::min);
    let max = monthly_avg.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max > min {
        (value - min) / (max - min)
    } else {
        0.5
    }
}

/// Seeded jitter centered on zero with total amplitude
/// [`MOCK_JITTER_AMPLITUDE`].
fn jitter(seed: &str) -> f64 {
    (seeded_unit(seed) - 0.5) * MOCK_JITTER_AMPLITUDE
}

/// Fabricated holiday score for one period. Seeded by the period string
/// alone: holidays are national, so every route sees the same curve.
pub fn mock_holiday_score(monthly_avg: &BTreeMap<String, f64>, period: &str) -> f64 {
    let avg = monthly_avg.get(period).copied().unwrap_or(0.0);
    let base = MOCK_HOLIDAY_BASE + normalize(monthly_avg, avg) * MOCK_SPAN;
    (base + jitter(period)).clamp(0.0, 100.0)
}

/// Fabricated weather score for one period. Seeded by period + route
/// identifier so two routes yield different mock curves.
pub fn mock_weather_score(monthly_avg: &BTreeMap<String, f64>, period: &str, route_key: &str) -> f64 {
    let avg = monthly_avg.get(period).copied().unwrap_or(0.0);
    let base = MOCK_WEATHER_BASE + normalize(monthly_avg, avg) * MOCK_SPAN;
    (base + jitter(&format!("{}-{}", period, route_key))).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Materialize the three score maps for the given periods.
///
/// `monthly_avg` holds each period's average stored price from the query's
/// flight rows; `route_key` identifies the route (e.g. "BKK-HKT") for
/// fabrication seeds; `destination` picks the weather province.
pub async fn gather_scores(
    pool: &PgPool,
    holiday_client: &HolidayClient,
    route_ids: &[Uuid],
    route_key: &str,
    destination: &str,
    monthly_avg: &BTreeMap<String, f64>,
) -> Result<ScoreBundle, AppError> {
    let periods: Vec<String> = monthly_avg.keys().cloned().collect();

    let price_pct = gather_price_percentiles(pool, route_ids, monthly_avg, &periods).await?;
    let holiday = gather_holiday_scores(pool, holiday_client, monthly_avg, &periods).await?;
    let weather = gather_weather_scores(pool, destination, route_key, monthly_avg, &periods).await?;

    Ok(ScoreBundle { price_pct, holiday, weather })
}

/// Price percentile per period: precomputed stats where present, window
/// percentile for the rest.
async fn gather_price_percentiles(
    pool: &PgPool,
    route_ids: &[Uuid],
    monthly_avg: &BTreeMap<String, f64>,
    periods: &[String],
) -> Result<HashMap<String, f64>, AppError> {
    let stats = queries::route_price_stats_for_periods(pool, route_ids, periods).await?;
    let mut out: HashMap<String, f64> = HashMap::with_capacity(periods.len());
    for stat in stats {
        out.entry(stat.period.clone())
            .or_insert_with(|| dec_to_f64(stat.price_percentile));
    }
    if out.len() < periods.len() {
        let computed = price_percentiles(monthly_avg);
        for p in periods {
            if !out.contains_key(p) {
                if let Some(v) = computed.get(p) {
                    out.insert(p.clone(), *v);
                }
            }
        }
    }
    Ok(out)
}

/// Holiday score per period: stored stats → API fetch-and-upsert → fabricated.
async fn gather_holiday_scores(
    pool: &PgPool,
    holiday_client: &HolidayClient,
    monthly_avg: &BTreeMap<String, f64>,
    periods: &[String],
) -> Result<HashMap<String, f64>, AppError> {
    let mut out = read_holiday_stats(pool, periods).await?;

    let missing_years: Vec<i32> = periods
        .iter()
        .filter(|p| !out.contains_key(*p))
        .filter_map(|p| parse_period(p).map(|(y, _)| y))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    if !missing_years.is_empty() && holiday_client.is_configured() {
        // Fetch-and-upsert, then re-read; upstream failure just means the
        // fabricated path below fills the rest.
        match holiday_ingest::ingest_years(pool, holiday_client, &missing_years).await {
            Ok(_) => {
                out = read_holiday_stats(pool, periods).await?;
            }
            Err(e) => {
                tracing::warn!("Holiday fetch for scores failed, fabricating: {}", e);
            }
        }
    }

    for p in periods {
        if !out.contains_key(p) {
            out.insert(p.clone(), mock_holiday_score(monthly_avg, p));
        }
    }
    Ok(out)
}

async fn read_holiday_stats(
    pool: &PgPool,
    periods: &[String],
) -> Result<HashMap<String, f64>, AppError> {
    let stats = queries::holiday_stats_for_periods(pool, periods).await?;
    Ok(stats
        .into_iter()
        .map(|s| (s.period, dec_to_f64(s.holiday_score)))
        .collect())
}

/// Weather score per period: stored stats → on-the-fly aggregation (upserted
/// lazily) → fabricated. Destinations without a province mapping are neutral.
async fn gather_weather_scores(
    pool: &PgPool,
    destination: &str,
    route_key: &str,
    monthly_avg: &BTreeMap<String, f64>,
    periods: &[String],
) -> Result<HashMap<String, f64>, AppError> {
    let Some(province) = airport_province(destination) else {
        return Ok(periods.iter().map(|p| (p.clone(), NEUTRAL_SCORE)).collect());
    };

    let stats = queries::monthly_weather_stats_for_periods(pool, province, periods).await?;
    let mut out: HashMap<String, f64> = stats
        .into_iter()
        .map(|s| (s.period, dec_to_f64(s.weather_score)))
        .collect();

    for p in periods {
        if out.contains_key(p) {
            continue;
        }
        match aggregate_daily_rows(pool, province, p).await? {
            Some((avg_temp, total_rain, avg_humidity, count)) => {
                let score = weather_score(avg_temp, total_rain, avg_humidity);
                // Lazily materialize the stat so the next query hits it
                queries::upsert_monthly_weather_stat(
                    pool,
                    province,
                    p,
                    f64_to_decimal_2dp(avg_temp),
                    f64_to_decimal_2dp(total_rain),
                    avg_humidity.map(f64_to_decimal_2dp),
                    f64_to_decimal_2dp(score),
                    count as i32,
                )
                .await?;
                out.insert(p.clone(), score);
            }
            None => {
                out.insert(p.clone(), mock_weather_score(monthly_avg, p, route_key));
            }
        }
    }
    Ok(out)
}

/// On-the-fly aggregation of a period's daily rows: average temp_avg, total
/// precipitation, average humidity, day count. None when the period has no
/// daily rows.
async fn aggregate_daily_rows(
    pool: &PgPool,
    province: &str,
    period: &str,
) -> Result<Option<(f64, f64, Option<f64>, i64)>, AppError> {
    let Some(start) = period_start(period) else {
        return Ok(None);
    };
    let end = end_of_month(start);
    let rows = queries::daily_weather_range(pool, province, start, end).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let n = rows.len() as f64;
    let avg_temp = rows.iter().map(|r| dec_to_f64(r.temp_avg)).sum::<f64>() / n;
    let total_rain = rows.iter().map(|r| dec_to_f64(r.precipitation_mm)).sum::<f64>();
    let humidity_values: Vec<f64> = rows.iter().filter_map(|r| opt_dec_to_f64(r.humidity)).collect();
    let avg_humidity = if humidity_values.is_empty() {
        None
    } else {
        Some(humidity_values.iter().sum::<f64>() / humidity_values.len() as f64)
    };
    Ok(Some((avg_temp, total_rain, avg_humidity, rows.len() as i64)))
}
