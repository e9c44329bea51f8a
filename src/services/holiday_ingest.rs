//! Holiday ingestion flow.
//!
//! Pulls the Thai holiday calendar from the upstream API, groups entries by
//! calendar month, derives per-month statistics (counts, long weekends,
//! holiday score) and upserts them. The date-range call is preferred; when
//! it fails the flow falls back to one call per year. Per-period failures
//! are isolated — the run continues and reports what it skipped.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::calendar::{is_long_weekend, period_of};
use crate::db::models::HolidayEntry;
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::f64_to_decimal_2dp;
use crate::services::holiday_api::HolidayClient;
use crate::services::scores::holiday_score;

/// Pause between per-year API calls (milliseconds).
const YEAR_PAUSE_MS: u64 = 200;

/// What an ingestion run accomplished. Carries the canonical entries so the
/// fetch tool can dump them to CSV.
#[derive(Debug, Clone, Default)]
pub struct HolidayIngestOutcome {
    pub holidays_seen: usize,
    pub periods_written: usize,
    pub periods_failed: usize,
    pub entries: Vec<HolidayEntry>,
}

/// Statistics derived for one calendar month.
#[derive(Debug, Clone)]
pub struct MonthHolidayStats {
    pub period: String,
    pub holidays_count: i32,
    pub long_weekends_count: i32,
    pub holiday_score: f64,
    pub entries: Vec<HolidayEntry>,
}

/// Group canonical entries by their YYYY-MM period.
pub fn group_by_period(entries: Vec<HolidayEntry>) -> BTreeMap<String, Vec<HolidayEntry>> {
    let mut grouped: BTreeMap<String, Vec<HolidayEntry>> = BTreeMap::new();
    for e in entries {
        grouped.entry(period_of(e.date)).or_default().push(e);
    }
    grouped
}

/// Derive per-month statistics from grouped entries.
pub fn build_month_stats(entries: Vec<HolidayEntry>) -> Vec<MonthHolidayStats> {
    group_by_period(entries)
        .into_iter()
        .map(|(period, entries)| {
            let long_weekends_count =
                entries.iter().filter(|e| is_long_weekend(e.date)).count() as i32;
            MonthHolidayStats {
                period,
                holidays_count: entries.len() as i32,
                long_weekends_count,
                holiday_score: holiday_score(&entries),
                entries,
            }
        })
        .collect()
}

/// Ingest the given calendar years: fetch, derive month stats, upsert.
///
/// One date-range call covers all years; if it fails, the flow retries
/// year-by-year with a ≥200 ms pause between calls, skipping years that
/// still fail.
pub async fn ingest_years(
    pool: &PgPool,
    client: &HolidayClient,
    years: &[i32],
) -> Result<HolidayIngestOutcome, AppError> {
    if years.is_empty() {
        return Ok(HolidayIngestOutcome::default());
    }

    let first = *years.iter().min().expect("non-empty");
    let last = *years.iter().max().expect("non-empty");
    let start = NaiveDate::from_ymd_opt(first, 1, 1).expect("valid Jan 1");
    let end = NaiveDate::from_ymd_opt(last, 12, 31).expect("valid Dec 31");

    let entries = match client.fetch_range(start, end).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                "Holiday date-range call failed ({}), falling back to year-by-year",
                e
            );
            fetch_year_by_year(client, years).await
        }
    };

    store_month_stats(pool, entries).await
}

/// Fallback path: one API call per year, isolating per-year failures.
async fn fetch_year_by_year(client: &HolidayClient, years: &[i32]) -> Vec<HolidayEntry> {
    let mut all = Vec::new();
    for (i, year) in years.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(YEAR_PAUSE_MS)).await;
        }
        match client.fetch_year(*year).await {
            Ok(mut entries) => all.append(&mut entries),
            Err(e) => {
                tracing::error!("Holiday fetch for year {} failed, skipping: {}", year, e);
            }
        }
    }
    all
}

/// Derive and upsert month stats, isolating per-period storage failures.
async fn store_month_stats(
    pool: &PgPool,
    entries: Vec<HolidayEntry>,
) -> Result<HolidayIngestOutcome, AppError> {
    let mut outcome = HolidayIngestOutcome {
        holidays_seen: entries.len(),
        entries: entries.clone(),
        ..Default::default()
    };

    for stats in build_month_stats(entries) {
        let detail = serde_json::to_value(&stats.entries)
            .map_err(|e| AppError::Internal(format!("holiday detail serialization: {}", e)))?;
        let result = queries::upsert_holiday_stat(
            pool,
            &stats.period,
            stats.holidays_count,
            stats.long_weekends_count,
            f64_to_decimal_2dp(stats.holiday_score),
            &detail,
        )
        .await;
        match result {
            Ok(()) => outcome.periods_written += 1,
            Err(e) => {
                outcome.periods_failed += 1;
                tracing::error!("Upsert of holiday stats for {} failed: {}", stats.period, e);
            }
        }
    }

    tracing::info!(
        "Holiday ingestion: {} holidays → {} periods written, {} failed",
        outcome.holidays_seen,
        outcome.periods_written,
        outcome.periods_failed,
    );
    Ok(outcome)
}
