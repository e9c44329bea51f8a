//! CSV import/export rows for holidays and daily weather.
//!
//! RFC-4180 quoting throughout (`""` escapes, comma separator, LF rows) via
//! the csv crate. These rows are the interchange format of the
//! `import-*-from-csv` binaries and the `--out` dump of the fetch tools;
//! `parse(format(rows)) == rows` is a tested property.

use std::io;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::models::{HolidayCategory, HolidayEntry, WeatherSource};
use crate::db::queries::UpsertDailyWeatherParams;
use crate::errors::AppError;
use crate::helpers::{dec_to_f64, f64_to_decimal_2dp, opt_dec_to_f64, opt_f64_to_decimal_2dp};
use crate::services::weather_ingest::{humidity_estimate, temp_avg};

/// One holiday row: `date,name,name_en,category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayCsvRow {
    pub date: NaiveDate,
    pub name: String,
    pub name_en: Option<String>,
    pub category: HolidayCategory,
}

impl From<HolidayEntry> for HolidayCsvRow {
    fn from(e: HolidayEntry) -> Self {
        Self { date: e.date, name: e.name, name_en: e.name_en, category: e.category }
    }
}

impl From<HolidayCsvRow> for HolidayEntry {
    fn from(r: HolidayCsvRow) -> Self {
        Self { date: r.date, name: r.name, name_en: r.name_en, category: r.category }
    }
}

/// One daily weather row:
/// `province,date,temp_max,temp_min,precipitation_mm,humidity,source`.
/// `temp_avg` is derived on import, and humidity is estimated when the
/// column is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeatherCsvRow {
    pub province: String,
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precipitation_mm: f64,
    pub humidity: Option<f64>,
    pub source: WeatherSource,
}

impl DailyWeatherCsvRow {
    /// Convert to upsert parameters: derives temp_avg, estimates missing
    /// humidity, rounds stored numerics to 2 decimals.
    pub fn to_upsert_params(&self) -> UpsertDailyWeatherParams {
        let avg = temp_avg(self.temp_max, self.temp_min);
        let humidity = self
            .humidity
            .unwrap_or_else(|| humidity_estimate(avg, self.precipitation_mm));
        UpsertDailyWeatherParams {
            province: self.province.clone(),
            date: self.date,
            temp_max: f64_to_decimal_2dp(self.temp_max),
            temp_min: f64_to_decimal_2dp(self.temp_min),
            temp_avg: f64_to_decimal_2dp(avg),
            precipitation_mm: f64_to_decimal_2dp(self.precipitation_mm),
            humidity: opt_f64_to_decimal_2dp(Some(humidity)),
            source: self.source,
        }
    }
}

impl From<&UpsertDailyWeatherParams> for DailyWeatherCsvRow {
    fn from(p: &UpsertDailyWeatherParams) -> Self {
        Self {
            province: p.province.clone(),
            date: p.date,
            temp_max: dec_to_f64(p.temp_max),
            temp_min: dec_to_f64(p.temp_min),
            precipitation_mm: dec_to_f64(p.precipitation_mm),
            humidity: opt_dec_to_f64(p.humidity),
            source: p.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Readers / writers
// ---------------------------------------------------------------------------

fn csv_error(what: &str, e: csv::Error) -> AppError {
    AppError::Input(format!("{} CSV: {}", what, e))
}

/// Read holiday rows from CSV (header row required).
pub fn read_holidays_csv<R: io::Read>(reader: R) -> Result<Vec<HolidayCsvRow>, AppError> {
    let mut rdr = csv::Reader::from_reader(reader);
    rdr.deserialize()
        .collect::<Result<Vec<HolidayCsvRow>, _>>()
        .map_err(|e| csv_error("holiday", e))
}

/// Write holiday rows as CSV with a header row.
pub fn write_holidays_csv<W: io::Write>(writer: W, rows: &[HolidayCsvRow]) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row).map_err(|e| csv_error("holiday", e))?;
    }
    wtr.flush()
        .map_err(|e| AppError::Input(format!("holiday CSV flush: {}", e)))
}

/// Read daily weather rows from CSV (header row required).
pub fn read_daily_weather_csv<R: io::Read>(reader: R) -> Result<Vec<DailyWeatherCsvRow>, AppError> {
    let mut rdr = csv::Reader::from_reader(reader);
    rdr.deserialize()
        .collect::<Result<Vec<DailyWeatherCsvRow>, _>>()
        .map_err(|e| csv_error("daily weather", e))
}

/// Write daily weather rows as CSV with a header row.
pub fn write_daily_weather_csv<W: io::Write>(
    writer: W,
    rows: &[DailyWeatherCsvRow],
) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row).map_err(|e| csv_error("daily weather", e))?;
    }
    wtr.flush()
        .map_err(|e| AppError::Input(format!("daily weather CSV flush: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_holiday_csv_round_trip() {
        let rows = vec![
            HolidayCsvRow {
                date: d("2026-04-13"),
                name: "วันสงกรานต์".to_string(),
                name_en: Some("Songkran Festival".to_string()),
                category: HolidayCategory::National,
            },
            HolidayCsvRow {
                date: d("2026-07-01"),
                name: "วันหยุดธนาคาร, ครึ่งปี".to_string(), // embedded comma
                name_en: None,
                category: HolidayCategory::Regional,
            },
        ];
        let mut buf = Vec::new();
        write_holidays_csv(&mut buf, &rows).unwrap();
        let parsed = read_holidays_csv(buf.as_slice()).unwrap();
        assert_eq!(parsed, rows, "parse(format(rows)) == rows");
    }

    #[test]
    fn test_holiday_csv_quote_escaping() {
        let rows = vec![HolidayCsvRow {
            date: d("2026-01-01"),
            name: "say \"hello\"".to_string(),
            name_en: None,
            category: HolidayCategory::Special,
        }];
        let mut buf = Vec::new();
        write_holidays_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("\"say \"\"hello\"\"\""), "RFC-4180 double-quote escape: {}", text);
        assert!(read_daily_weather_csv(buf.as_slice()).is_err(), "wrong schema rejected");
        assert_eq!(read_holidays_csv(buf.as_slice()).unwrap(), rows);
    }

    #[test]
    fn test_weather_csv_round_trip() {
        let rows = vec![
            DailyWeatherCsvRow {
                province: "Phuket".to_string(),
                date: d("2025-04-01"),
                temp_max: 34.5,
                temp_min: 26.0,
                precipitation_mm: 12.25,
                humidity: Some(78.5),
                source: WeatherSource::Historical,
            },
            DailyWeatherCsvRow {
                province: "Chiang Mai".to_string(),
                date: d("2026-08-05"),
                temp_max: 31.0,
                temp_min: 24.0,
                precipitation_mm: 0.0,
                humidity: None,
                source: WeatherSource::Forecast,
            },
        ];
        let mut buf = Vec::new();
        write_daily_weather_csv(&mut buf, &rows).unwrap();
        let parsed = read_daily_weather_csv(buf.as_slice()).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn test_weather_row_to_upsert_params() {
        let row = DailyWeatherCsvRow {
            province: "Phuket".to_string(),
            date: d("2025-04-01"),
            temp_max: 34.0,
            temp_min: 26.0,
            precipitation_mm: 0.0,
            humidity: None,
            source: WeatherSource::Historical,
        };
        let p = row.to_upsert_params();
        assert_eq!(p.temp_avg.to_string(), "30.00");
        // humidity estimated: 70 − 1.5·(30 − 28) = 67
        assert_eq!(p.humidity.unwrap().to_string(), "67.00");
    }

    #[test]
    fn test_upsert_params_back_to_csv_row() {
        let row = DailyWeatherCsvRow {
            province: "Krabi".to_string(),
            date: d("2025-05-10"),
            temp_max: 33.25,
            temp_min: 25.75,
            precipitation_mm: 4.5,
            humidity: Some(80.0),
            source: WeatherSource::Historical,
        };
        let back = DailyWeatherCsvRow::from(&row.to_upsert_params());
        assert_eq!(back.province, row.province);
        assert_eq!(back.temp_max, row.temp_max);
        assert_eq!(back.humidity, row.humidity);
    }

    #[test]
    fn test_malformed_csv_is_input_error() {
        let bad = "date,name,name_en,category\nnot-a-date,x,,national\n";
        let err = read_holidays_csv(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Input(_)));
    }
}
