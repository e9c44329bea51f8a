//! Weather ingestion flow.
//!
//! Two independent, idempotent passes write `daily_weather`:
//! - historical: one archive request per (province, calendar-month) chunk,
//!   authoritative up to the cutover date (inclusive);
//! - forecast: one short-range request per province, retaining only dates
//!   strictly after the cutover AND strictly after today.
//!
//! Failures on one (province, chunk) are logged and skipped; the run
//! continues. After daily rows land, the affected (province, period) pairs
//! get their monthly statistics recomputed.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::calendar::{end_of_month, period_of};
use crate::config::Province;
use crate::db::models::WeatherSource;
use crate::db::queries::{self, UpsertDailyWeatherParams};
use crate::errors::AppError;
use crate::helpers::{f64_to_decimal_2dp, opt_f64_to_decimal_2dp};
use crate::services::openmeteo::{ArchiveDay, OpenMeteoClient};
use crate::services::openweather::{ForecastDay, OpenWeatherClient};
use crate::services::scores::weather_score;

/// Pause between (province, month) archive chunks (milliseconds).
const CHUNK_PAUSE_MS: u64 = 200;

/// Pause between provinces under the forecast API (milliseconds).
const PROVINCE_PAUSE_MS: u64 = 1000;

/// What a weather ingestion run accomplished. Carries the written rows so
/// the fetch tool can dump them to CSV.
#[derive(Debug, Clone, Default)]
pub struct WeatherIngestOutcome {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub chunks_failed: usize,
    pub stats_recomputed: usize,
    pub rows: Vec<UpsertDailyWeatherParams>,
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// Daily average temperature: (max + min) / 2.
pub fn temp_avg(temp_max: f64, temp_min: f64) -> f64 {
    (temp_max + temp_min) / 2.0
}

/// Estimate relative humidity when the source doesn't report it:
/// base 70, minus 1.5 per °C above 28 (plus below), plus up to 15 for rain,
/// clamped to [50, 90].
pub fn humidity_estimate(temp_avg: f64, rain_mm: f64) -> f64 {
    let v = 70.0 - 1.5 * (temp_avg - 28.0) + (3.0 * rain_mm).min(15.0);
    v.clamp(50.0, 90.0)
}

/// Split [start, end] into calendar-month chunks (clamped to the window).
pub fn month_chunks(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let chunk_end = end_of_month(cursor).min(end);
        chunks.push((cursor, chunk_end));
        cursor = chunk_end + chrono::Duration::days(1);
    }
    chunks
}

// ---------------------------------------------------------------------------
// Historical pass
// ---------------------------------------------------------------------------

/// Ingest archival daily weather for each province over [start, end].
/// Dates after the cutover are not requested — the forecast pass owns them.
pub async fn ingest_historical(
    pool: &PgPool,
    client: &OpenMeteoClient,
    provinces: &[Province],
    start: NaiveDate,
    end: NaiveDate,
    cutover: NaiveDate,
) -> Result<WeatherIngestOutcome, AppError> {
    let mut outcome = WeatherIngestOutcome::default();
    let mut touched: BTreeSet<(String, String)> = BTreeSet::new();
    let capped_end = end.min(cutover);
    if capped_end < start {
        tracing::warn!("Historical window starts after the cutover date; nothing to do");
        return Ok(outcome);
    }

    let mut first_chunk = true;
    for province in provinces {
        for (chunk_start, chunk_end) in month_chunks(start, capped_end) {
            if !first_chunk {
                tokio::time::sleep(std::time::Duration::from_millis(CHUNK_PAUSE_MS)).await;
            }
            first_chunk = false;

            let days = match client
                .fetch_daily(province.latitude, province.longitude, chunk_start, chunk_end)
                .await
            {
                Ok(days) => days,
                Err(e) => {
                    outcome.chunks_failed += 1;
                    tracing::error!(
                        "Archive fetch for {} {}..{} failed, skipping chunk: {}",
                        province.name,
                        chunk_start,
                        chunk_end,
                        e,
                    );
                    continue;
                }
            };

            for day in &days {
                let params = historical_params(province.name, day);
                match queries::upsert_daily_weather(pool, &params).await {
                    Ok(true) => {
                        outcome.rows_written += 1;
                        touched.insert((province.name.to_string(), period_of(day.date)));
                        outcome.rows.push(params);
                    }
                    Ok(false) => outcome.rows_skipped += 1,
                    Err(e) => {
                        outcome.chunks_failed += 1;
                        tracing::error!(
                            "Upsert of daily weather {} {} failed: {}",
                            province.name,
                            day.date,
                            e,
                        );
                    }
                }
            }
        }
    }

    outcome.stats_recomputed = recompute_touched_stats(pool, &touched).await;
    log_outcome("historical", &outcome);
    Ok(outcome)
}

fn historical_params(province: &str, day: &ArchiveDay) -> UpsertDailyWeatherParams {
    let avg = temp_avg(day.temp_max, day.temp_min);
    UpsertDailyWeatherParams {
        province: province.to_string(),
        date: day.date,
        temp_max: f64_to_decimal_2dp(day.temp_max),
        temp_min: f64_to_decimal_2dp(day.temp_min),
        temp_avg: f64_to_decimal_2dp(avg),
        precipitation_mm: f64_to_decimal_2dp(day.precipitation_mm),
        // The archive API doesn't report humidity; always estimated.
        humidity: Some(f64_to_decimal_2dp(humidity_estimate(avg, day.precipitation_mm))),
        source: WeatherSource::Historical,
    }
}

// ---------------------------------------------------------------------------
// Forecast pass
// ---------------------------------------------------------------------------

/// Ingest short-range forecast days for each province. Only dates strictly
/// after the cutover and strictly after `today` are retained; existing rows
/// for a date are never downgraded from historical to forecast.
pub async fn ingest_forecast(
    pool: &PgPool,
    client: &OpenWeatherClient,
    provinces: &[Province],
    today: NaiveDate,
    cutover: NaiveDate,
) -> Result<WeatherIngestOutcome, AppError> {
    let mut outcome = WeatherIngestOutcome::default();
    let mut touched: BTreeSet<(String, String)> = BTreeSet::new();

    for (i, province) in provinces.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(PROVINCE_PAUSE_MS)).await;
        }

        let days = match client
            .fetch_forecast_days(province.latitude, province.longitude)
            .await
        {
            Ok(days) => days,
            Err(e) => {
                outcome.chunks_failed += 1;
                tracing::error!(
                    "Forecast fetch for {} failed, skipping province: {}",
                    province.name,
                    e,
                );
                continue;
            }
        };

        for day in days.iter().filter(|d| d.date > cutover && d.date > today) {
            // Dedup against the store; the conditional upsert would refuse
            // the downgrade anyway, this keeps the write count honest.
            match queries::daily_weather_exists(pool, province.name, day.date).await {
                Ok(true) => {
                    outcome.rows_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Existence check for {} {} failed, attempting upsert anyway: {}",
                        province.name,
                        day.date,
                        e,
                    );
                }
            }

            let params = forecast_params(province.name, day);
            match queries::upsert_daily_weather(pool, &params).await {
                Ok(true) => {
                    outcome.rows_written += 1;
                    touched.insert((province.name.to_string(), period_of(day.date)));
                    outcome.rows.push(params);
                }
                Ok(false) => outcome.rows_skipped += 1,
                Err(e) => {
                    outcome.chunks_failed += 1;
                    tracing::error!(
                        "Upsert of forecast weather {} {} failed: {}",
                        province.name,
                        day.date,
                        e,
                    );
                }
            }
        }
    }

    outcome.stats_recomputed = recompute_touched_stats(pool, &touched).await;
    log_outcome("forecast", &outcome);
    Ok(outcome)
}

fn forecast_params(province: &str, day: &ForecastDay) -> UpsertDailyWeatherParams {
    let avg = temp_avg(day.temp_max, day.temp_min);
    let humidity = day
        .humidity
        .unwrap_or_else(|| humidity_estimate(avg, day.precipitation_mm));
    UpsertDailyWeatherParams {
        province: province.to_string(),
        date: day.date,
        temp_max: f64_to_decimal_2dp(day.temp_max),
        temp_min: f64_to_decimal_2dp(day.temp_min),
        temp_avg: f64_to_decimal_2dp(avg),
        precipitation_mm: f64_to_decimal_2dp(day.precipitation_mm),
        humidity: opt_f64_to_decimal_2dp(Some(humidity)),
        source: WeatherSource::Forecast,
    }
}

// ---------------------------------------------------------------------------
// Monthly statistics
// ---------------------------------------------------------------------------

/// Recompute the monthly stat for one (province, period) from SQL
/// aggregates. Returns false when the period has no daily rows.
pub async fn recompute_monthly_stat(
    pool: &PgPool,
    province: &str,
    period: &str,
) -> Result<bool, AppError> {
    let Some((avg_temp, total_rain, avg_humidity, count)) =
        queries::monthly_weather_aggregate(pool, province, period).await?
    else {
        return Ok(false);
    };

    let score = weather_score(
        crate::helpers::dec_to_f64(avg_temp),
        crate::helpers::dec_to_f64(total_rain),
        crate::helpers::opt_dec_to_f64(avg_humidity),
    );
    queries::upsert_monthly_weather_stat(
        pool,
        province,
        period,
        avg_temp.round_dp(2),
        total_rain.round_dp(2),
        avg_humidity.map(|h| h.round_dp(2)),
        f64_to_decimal_2dp(score),
        count as i32,
    )
    .await?;
    Ok(true)
}

/// Recompute stats for every (province, period) pair that has daily rows.
pub async fn refresh_monthly_stats(pool: &PgPool) -> Result<usize, AppError> {
    let pairs = queries::distinct_weather_periods(pool).await?;
    let mut refreshed = 0;
    for (province, period) in &pairs {
        match recompute_monthly_stat(pool, province, period).await {
            Ok(true) => refreshed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Stat refresh for {} {} failed: {}", province, period, e);
            }
        }
    }
    tracing::info!("Refreshed {}/{} monthly weather stats", refreshed, pairs.len());
    Ok(refreshed)
}

async fn recompute_touched_stats(pool: &PgPool, touched: &BTreeSet<(String, String)>) -> usize {
    let mut recomputed = 0;
    for (province, period) in touched {
        match recompute_monthly_stat(pool, province, period).await {
            Ok(true) => recomputed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    "Monthly stat recompute for {} {} failed: {}",
                    province,
                    period,
                    e,
                );
            }
        }
    }
    recomputed
}

fn log_outcome(pass: &str, outcome: &WeatherIngestOutcome) {
    tracing::info!(
        "Weather ingestion ({}): {} rows written, {} skipped, {} chunk failures, {} stats recomputed",
        pass,
        outcome.rows_written,
        outcome.rows_skipped,
        outcome.chunks_failed,
        outcome.stats_recomputed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_temp_avg() {
        assert_eq!(temp_avg(34.0, 26.0), 30.0);
    }

    #[test]
    fn test_humidity_estimate_baseline() {
        // At 28°C with no rain: exactly the base of 70
        assert_eq!(humidity_estimate(28.0, 0.0), 70.0);
    }

    #[test]
    fn test_humidity_estimate_hot_and_wet() {
        // 32°C, 10mm rain: 70 − 1.5·4 + min(30, 15) = 79
        assert_eq!(humidity_estimate(32.0, 10.0), 79.0);
    }

    #[test]
    fn test_humidity_estimate_clamps() {
        assert_eq!(humidity_estimate(45.0, 0.0), 50.0, "scorching → lower clamp");
        assert_eq!(humidity_estimate(15.0, 20.0), 90.0, "cool and rainy → upper clamp");
    }

    #[test]
    fn test_month_chunks_splits_on_month_boundaries() {
        let chunks = month_chunks(d("2025-11-15"), d("2026-01-10"));
        assert_eq!(
            chunks,
            vec![
                (d("2025-11-15"), d("2025-11-30")),
                (d("2025-12-01"), d("2025-12-31")),
                (d("2026-01-01"), d("2026-01-10")),
            ]
        );
    }

    #[test]
    fn test_month_chunks_single_partial_month() {
        let chunks = month_chunks(d("2026-04-05"), d("2026-04-20"));
        assert_eq!(chunks, vec![(d("2026-04-05"), d("2026-04-20"))]);
    }

    #[test]
    fn test_month_chunks_empty_window() {
        assert!(month_chunks(d("2026-04-20"), d("2026-04-05")).is_empty());
    }

    #[test]
    fn test_historical_params_round_and_estimate() {
        let day = ArchiveDay {
            date: d("2025-04-01"),
            temp_max: 34.56,
            temp_min: 26.12,
            precipitation_mm: 2.0,
        };
        let p = historical_params("Phuket", &day);
        assert_eq!(p.temp_avg.to_string(), "30.34", "rounded to 2dp");
        assert_eq!(p.source, WeatherSource::Historical);
        // humidity estimated: 70 − 1.5·(30.34 − 28) + 6 ≈ 72.49
        let h = crate::helpers::dec_to_f64(p.humidity.unwrap());
        assert!((h - 72.49).abs() < 0.02, "estimated humidity ≈ 72.49, got {}", h);
    }

    #[test]
    fn test_forecast_params_prefers_reported_humidity() {
        let day = ForecastDay {
            date: d("2026-08-05"),
            temp_max: 33.0,
            temp_min: 26.0,
            precipitation_mm: 0.0,
            humidity: Some(81.5),
        };
        let p = forecast_params("Bangkok", &day);
        assert_eq!(p.humidity.unwrap().to_string(), "81.50");
        assert_eq!(p.source, WeatherSource::Forecast);
    }
}
