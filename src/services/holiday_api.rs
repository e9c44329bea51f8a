//! Thai public-holiday API client (iApp).
//!
//! Supports the date-range form and the per-year form; ingestion prefers the
//! range call and falls back to year-by-year when it fails. Upstream holiday
//! types are mapped at this boundary: "public" → national, "financial" →
//! regional, anything else → special. Unparseable entries are dropped with a
//! warning rather than failing the whole call.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::models::{HolidayCategory, HolidayEntry};
use crate::errors::AppError;
use crate::services::http::get_json;

/// HTTP request timeout for holiday calls (seconds).
const HOLIDAY_HTTP_TIMEOUT_SECS: u64 = 30;

/// Client for the Thai holiday API.
#[derive(Debug, Clone)]
pub struct HolidayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// --- Holiday API JSON response types ---

#[derive(Debug, Deserialize)]
struct HolidayApiResponse {
    #[serde(default, alias = "holidays")]
    data: Vec<RawHoliday>,
}

#[derive(Debug, Deserialize)]
struct RawHoliday {
    date: String,
    #[serde(alias = "holiday_name_th", alias = "name_th")]
    name: Option<String>,
    #[serde(alias = "holiday_name_en")]
    name_en: Option<String>,
    #[serde(alias = "type")]
    holiday_type: Option<String>,
}

impl HolidayClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HOLIDAY_HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Whether a key is configured. Without one the read path fabricates
    /// holiday scores instead of calling out.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Fetch all holidays in [start, end] with one date-range call.
    pub async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HolidayEntry>, AppError> {
        let builder = self
            .client
            .get(&self.base_url)
            .header("apikey", &self.api_key)
            .query(&[
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
                ("holiday_type", "both".to_string()),
            ]);
        let response: HolidayApiResponse = get_json(builder, "holiday API").await?;
        Ok(canonicalize(response.data))
    }

    /// Fetch all holidays of one calendar year.
    pub async fn fetch_year(&self, year: i32) -> Result<Vec<HolidayEntry>, AppError> {
        let builder = self
            .client
            .get(&self.base_url)
            .header("apikey", &self.api_key)
            .query(&[
                ("year", year.to_string()),
                ("holiday_type", "both".to_string()),
            ]);
        let response: HolidayApiResponse = get_json(builder, "holiday API").await?;
        Ok(canonicalize(response.data))
    }
}

/// Map raw upstream rows into canonical entries, dropping unparseable ones.
fn canonicalize(raw: Vec<RawHoliday>) -> Vec<HolidayEntry> {
    let mut entries = Vec::with_capacity(raw.len());
    for r in raw {
        let date: NaiveDate = match r.date.parse() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Skipping holiday with unparseable date '{}': {}", r.date, e);
                continue;
            }
        };
        let category = match r.holiday_type.as_deref() {
            Some("public") => HolidayCategory::National,
            Some("financial") => HolidayCategory::Regional,
            _ => HolidayCategory::Special,
        };
        entries.push(HolidayEntry {
            date,
            name: r.name.unwrap_or_default(),
            name_en: r.name_en,
            category,
        });
    }
    entries.sort_by_key(|e| e.date);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_from(v: serde_json::Value) -> Vec<RawHoliday> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_canonicalize_maps_categories() {
        let entries = canonicalize(raw_from(serde_json::json!([
            { "date": "2026-04-13", "name": "วันสงกรานต์", "name_en": "Songkran Festival",
              "holiday_type": "public" },
            { "date": "2026-07-01", "name": "วันหยุดภาคครึ่งปีธนาคาร",
              "holiday_type": "financial" },
            { "date": "2026-02-14", "name": "วันวาเลนไทน์", "holiday_type": "observance" }
        ])));
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, HolidayCategory::Special, "sorted by date; Feb first");
        let songkran = entries.iter().find(|e| e.name_en.is_some()).unwrap();
        assert_eq!(songkran.category, HolidayCategory::National, "public → national");
        let financial = entries.iter().find(|e| e.name.contains("ธนาคาร")).unwrap();
        assert_eq!(financial.category, HolidayCategory::Regional, "financial → regional");
    }

    #[test]
    fn test_canonicalize_drops_bad_dates() {
        let entries = canonicalize(raw_from(serde_json::json!([
            { "date": "13/04/2026", "name": "bad", "holiday_type": "public" },
            { "date": "2026-01-01", "name": "วันขึ้นปีใหม่", "holiday_type": "public" }
        ])));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, "2026-01-01".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn test_response_accepts_holidays_alias() {
        let resp: HolidayApiResponse = serde_json::from_value(serde_json::json!({
            "holidays": [ { "date": "2026-01-01", "name": "วันขึ้นปีใหม่", "holiday_type": "public" } ]
        }))
        .unwrap();
        assert_eq!(resp.data.len(), 1);
    }

    #[test]
    fn test_response_tolerates_empty_body() {
        let resp: HolidayApiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(resp.data.is_empty());
    }
}
