//! Open-Meteo archive client (historical daily weather).
//!
//! One request covers one (province, calendar-month) chunk; the archive API
//! returns column-oriented daily arrays which are zipped back into rows
//! here. Historical data is authoritative up to the configured cutover date.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::http::get_json;

/// HTTP request timeout for archive calls (seconds).
const ARCHIVE_HTTP_TIMEOUT_SECS: u64 = 30;

/// Client for the Open-Meteo archive API.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

/// One day of archival weather for a location.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDay {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precipitation_mm: f64,
}

// --- Open-Meteo JSON response types (column-oriented) ---

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: ArchiveDaily,
}

#[derive(Debug, Deserialize)]
struct ArchiveDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
}

impl OpenMeteoClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(ARCHIVE_HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, base_url: base_url.to_string() }
    }

    /// Fetch daily archival weather for a location and date window.
    pub async fn fetch_daily(
        &self,
        latitude: f64,
        longitude: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ArchiveDay>, AppError> {
        let builder = self.client.get(&self.base_url).query(&[
            ("latitude", format!("{:.4}", latitude)),
            ("longitude", format!("{:.4}", longitude)),
            ("start_date", start.to_string()),
            ("end_date", end.to_string()),
            (
                "daily",
                "temperature_2m_max,temperature_2m_min,precipitation_sum".to_string(),
            ),
            ("timezone", "Asia/Bangkok".to_string()),
        ]);

        let response: ArchiveResponse = get_json(builder, "open-meteo archive").await?;
        Ok(extract_days(response))
    }
}

/// Zip the column-oriented daily arrays into rows. Days with a missing
/// temperature are skipped (logged); missing precipitation is treated as 0.
fn extract_days(response: ArchiveResponse) -> Vec<ArchiveDay> {
    let daily = response.daily;
    let mut days = Vec::with_capacity(daily.time.len());

    for (i, time) in daily.time.iter().enumerate() {
        let date: NaiveDate = match time.parse() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Skipping archive day with unparseable date '{}': {}", time, e);
                continue;
            }
        };
        let temp_max = daily.temperature_2m_max.get(i).copied().flatten();
        let temp_min = daily.temperature_2m_min.get(i).copied().flatten();
        let (Some(temp_max), Some(temp_min)) = (temp_max, temp_min) else {
            tracing::warn!("Skipping archive day {} with missing temperature", date);
            continue;
        };
        let precipitation_mm = daily
            .precipitation_sum
            .get(i)
            .copied()
            .flatten()
            .unwrap_or(0.0);

        days.push(ArchiveDay { date, temp_max, temp_min, precipitation_mm });
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_from(v: serde_json::Value) -> ArchiveResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_extract_days_zips_columns() {
        let resp = response_from(serde_json::json!({
            "daily": {
                "time": ["2025-04-01", "2025-04-02"],
                "temperature_2m_max": [34.2, 35.0],
                "temperature_2m_min": [26.1, 26.8],
                "precipitation_sum": [0.0, 12.4]
            }
        }));
        let days = extract_days(resp);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2025-04-01".parse::<NaiveDate>().unwrap());
        assert_eq!(days[0].temp_max, 34.2);
        assert_eq!(days[1].precipitation_mm, 12.4);
    }

    #[test]
    fn test_extract_days_skips_missing_temperature() {
        let resp = response_from(serde_json::json!({
            "daily": {
                "time": ["2025-04-01", "2025-04-02"],
                "temperature_2m_max": [null, 35.0],
                "temperature_2m_min": [26.1, 26.8],
                "precipitation_sum": [0.0, null]
            }
        }));
        let days = extract_days(resp);
        assert_eq!(days.len(), 1, "day with null temp_max dropped");
        assert_eq!(days[0].precipitation_mm, 0.0, "null precipitation defaults to 0");
    }

    #[test]
    fn test_extract_days_skips_bad_date() {
        let resp = response_from(serde_json::json!({
            "daily": {
                "time": ["not-a-date"],
                "temperature_2m_max": [34.2],
                "temperature_2m_min": [26.1],
                "precipitation_sum": [0.0]
            }
        }));
        assert!(extract_days(resp).is_empty());
    }
}
