//! OpenWeatherMap short-range forecast client.
//!
//! The 3-hourly forecast endpoint (`cnt=40`, metric units) yields at most
//! ~5 days. Entries are bucketed into Bangkok-local calendar days: max of
//! maxima, min of minima, summed rain, averaged humidity.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::http::get_json;

/// HTTP request timeout for forecast calls (seconds).
const FORECAST_HTTP_TIMEOUT_SECS: u64 = 30;

/// Number of 3-hourly entries to request (40 ≈ 5 days).
const FORECAST_ENTRY_COUNT: u32 = 40;

/// Bangkok is UTC+7 year-round.
const BANGKOK_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Client for the OpenWeatherMap forecast API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// One aggregated forecast day for a location.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precipitation_mm: f64,
    pub humidity: Option<f64>,
}

// --- OpenWeatherMap JSON response types ---

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    /// Unix timestamp (UTC).
    dt: i64,
    main: ForecastMain,
    rain: Option<ForecastRain>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp_min: f64,
    temp_max: f64,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastRain {
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FORECAST_HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fetch the 3-hourly forecast for a location, aggregated into days.
    pub async fn fetch_forecast_days(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<ForecastDay>, AppError> {
        let builder = self.client.get(&self.base_url).query(&[
            ("lat", format!("{:.4}", latitude)),
            ("lon", format!("{:.4}", longitude)),
            ("cnt", FORECAST_ENTRY_COUNT.to_string()),
            ("units", "metric".to_string()),
            ("appid", self.api_key.clone()),
        ]);

        let response: ForecastResponse = get_json(builder, "openweathermap forecast").await?;
        Ok(aggregate_to_days(response.list))
    }
}

/// Bucket 3-hourly entries into Bangkok-local calendar days, sorted by date.
fn aggregate_to_days(entries: Vec<ForecastEntry>) -> Vec<ForecastDay> {
    let offset = FixedOffset::east_opt(BANGKOK_UTC_OFFSET_SECS).expect("valid offset");
    let mut days: Vec<ForecastDay> = Vec::new();
    // Humidity sample counts, parallel to `days`
    let mut humidity_samples: Vec<(f64, u32)> = Vec::new();

    for entry in entries {
        let Some(ts) = DateTime::from_timestamp(entry.dt, 0) else {
            tracing::warn!("Skipping forecast entry with out-of-range timestamp {}", entry.dt);
            continue;
        };
        let date = ts.with_timezone(&offset).date_naive();
        let rain = entry.rain.and_then(|r| r.three_hours).unwrap_or(0.0);

        match days.iter_mut().position(|d| d.date == date) {
            Some(i) => {
                let day = &mut days[i];
                day.temp_max = day.temp_max.max(entry.main.temp_max);
                day.temp_min = day.temp_min.min(entry.main.temp_min);
                day.precipitation_mm += rain;
                if let Some(h) = entry.main.humidity {
                    let (sum, n) = &mut humidity_samples[i];
                    *sum += h;
                    *n += 1;
                }
            }
            None => {
                days.push(ForecastDay {
                    date,
                    temp_max: entry.main.temp_max,
                    temp_min: entry.main.temp_min,
                    precipitation_mm: rain,
                    humidity: None,
                });
                humidity_samples.push(match entry.main.humidity {
                    Some(h) => (h, 1),
                    None => (0.0, 0),
                });
            }
        }
    }

    for (day, (sum, n)) in days.iter_mut().zip(humidity_samples.iter().copied()) {
        if n > 0 {
            day.humidity = Some(sum / f64::from(n));
        }
    }

    days.sort_by_key(|d| d.date);
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries_from(v: serde_json::Value) -> Vec<ForecastEntry> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_aggregate_groups_by_bangkok_day() {
        // 2026-03-01T22:00:00Z is already 2026-03-02 in Bangkok (UTC+7)
        let entries = entries_from(serde_json::json!([
            { "dt": 1772402400i64, "main": { "temp_min": 24.0, "temp_max": 30.0, "humidity": 70.0 } },
            { "dt": 1772413200i64, "main": { "temp_min": 23.0, "temp_max": 32.0, "humidity": 80.0 },
              "rain": { "3h": 1.5 } }
        ]));
        let days = aggregate_to_days(entries);
        // Both timestamps land on the same Bangkok day here; key assertions
        // are the min/max/sum/avg semantics.
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].temp_min, 23.0, "min of minima");
        assert_eq!(days[0].temp_max, 32.0, "max of maxima");
        assert_eq!(days[0].precipitation_mm, 1.5, "rain summed");
        assert_eq!(days[0].humidity, Some(75.0), "humidity averaged");
    }

    #[test]
    fn test_aggregate_splits_across_utc_midnight() {
        // 16:59Z and 17:01Z straddle Bangkok midnight (17:00Z = 00:00+07)
        let entries = entries_from(serde_json::json!([
            { "dt": 1772384340i64, "main": { "temp_min": 24.0, "temp_max": 30.0 } },
            { "dt": 1772384460i64, "main": { "temp_min": 22.0, "temp_max": 28.0 } }
        ]));
        let days = aggregate_to_days(entries);
        assert_eq!(days.len(), 2, "entries on opposite sides of Bangkok midnight");
        assert!(days[0].date < days[1].date);
    }

    #[test]
    fn test_aggregate_without_humidity() {
        let entries = entries_from(serde_json::json!([
            { "dt": 1772402400i64, "main": { "temp_min": 24.0, "temp_max": 30.0 } }
        ]));
        let days = aggregate_to_days(entries);
        assert_eq!(days[0].humidity, None, "no samples, no average");
    }

    #[test]
    fn test_aggregate_empty_list() {
        assert!(aggregate_to_days(Vec::new()).is_empty());
    }
}
