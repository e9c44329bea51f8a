use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

// ---------------------------------------------------------------------------
// Tagged enumerations
//
// Stored as lowercase strings in VARCHAR columns; unknown values are rejected
// at ingress with AppError::Input rather than leaking through as strings.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "VARCHAR", rename_all = "kebab-case")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

impl TripType {
    pub fn as_str(self) -> &'static str {
        match self {
            TripType::OneWay => "one-way",
            TripType::RoundTrip => "round-trip",
        }
    }
}

impl std::str::FromStr for TripType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-way" => Ok(TripType::OneWay),
            "round-trip" => Ok(TripType::RoundTrip),
            other => Err(AppError::Input(format!("unsupported trip type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum CabinClass {
    Economy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }
}

impl std::str::FromStr for CabinClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(CabinClass::Economy),
            "business" => Ok(CabinClass::Business),
            "first" => Ok(CabinClass::First),
            other => Err(AppError::Input(format!("unsupported cabin class '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum SeasonKind {
    Low,
    Normal,
    High,
}

impl SeasonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SeasonKind::Low => "low",
            SeasonKind::Normal => "normal",
            SeasonKind::High => "high",
        }
    }
}

impl std::str::FromStr for SeasonKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(SeasonKind::Low),
            "normal" => Ok(SeasonKind::Normal),
            "high" => Ok(SeasonKind::High),
            other => Err(AppError::Input(format!("unknown season label '{}'", other))),
        }
    }
}

/// Which pipeline wrote a daily weather row. Historical rows own the past
/// through the cutover date; forecast rows own dates strictly after it and
/// never displace historical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum WeatherSource {
    Historical,
    Forecast,
}

impl WeatherSource {
    pub fn as_str(self) -> &'static str {
        match self {
            WeatherSource::Historical => "historical",
            WeatherSource::Forecast => "forecast",
        }
    }
}

impl std::str::FromStr for WeatherSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "historical" => Ok(WeatherSource::Historical),
            "forecast" => Ok(WeatherSource::Forecast),
            other => Err(AppError::Input(format!("unknown weather source '{}'", other))),
        }
    }
}

/// Canonical holiday category after mapping upstream types
/// ("public" → national, "financial" → regional).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayCategory {
    National,
    Regional,
    Special,
}

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

/// A directed origin→destination pair. Created lazily by the first query
/// that mentions it.
#[derive(Debug, Clone, FromRow)]
pub struct Route {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Airline {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub name_th: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored flight-price row joined with its airline for display.
///
/// The price already incorporates seasonal, holiday and variation
/// multipliers applied at ingestion time; analysis code must never re-apply
/// them.
#[derive(Debug, Clone, FromRow)]
pub struct FlightPrice {
    pub id: Uuid,
    pub route_id: Uuid,
    pub airline_id: Uuid,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub cabin_class: CabinClass,
    pub price: Decimal,
    pub base_price: Decimal,
    pub season_label: SeasonKind,
    pub flight_number: String,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration_minutes: Option<i32>,
    pub airplane: Option<String>,
    pub carbon_emissions_g: Option<i32>,
    pub legroom: Option<String>,
    pub often_delayed: bool,
    // Joined from airlines for display
    pub airline_code: String,
    pub airline_name: String,
    pub airline_name_th: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyWeather {
    pub id: Uuid,
    pub province: String,
    pub date: NaiveDate,
    pub temp_max: Decimal,
    pub temp_min: Decimal,
    pub temp_avg: Decimal,
    pub precipitation_mm: Decimal,
    pub humidity: Option<Decimal>,
    pub source: WeatherSource,
}

/// Monthly aggregate of daily weather rows for one province.
#[derive(Debug, Clone, FromRow)]
pub struct MonthlyWeatherStat {
    pub province: String,
    pub period: String,
    pub avg_temp: Decimal,
    pub avg_rain: Decimal,
    pub avg_humidity: Option<Decimal>,
    pub weather_score: Decimal,
    pub days_count: i32,
}

/// Per-month holiday statistics, one row per calendar month nationwide.
#[derive(Debug, Clone, FromRow)]
pub struct HolidayStat {
    pub period: String,
    pub holidays_count: i32,
    pub long_weekends_count: i32,
    pub holiday_score: Decimal,
    pub holidays_detail: serde_json::Value,
}

/// Precomputed monthly price percentile for a route.
#[derive(Debug, Clone, FromRow)]
pub struct RoutePriceStat {
    pub route_id: Uuid,
    pub period: String,
    pub price_percentile: Decimal,
}

/// A canonical holiday entry as stored in `holiday_stats.holidays_detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayEntry {
    pub date: NaiveDate,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    pub category: HolidayCategory,
}

/// Build a flight row with sensible defaults for unit tests.
#[cfg(test)]
pub(crate) fn test_flight(departure: &str, price: i64) -> FlightPrice {
    FlightPrice {
        id: Uuid::nil(),
        route_id: Uuid::nil(),
        airline_id: Uuid::nil(),
        departure_date: departure.parse().expect("valid test date"),
        return_date: None,
        trip_type: TripType::RoundTrip,
        cabin_class: CabinClass::Economy,
        price: Decimal::from(price),
        base_price: Decimal::from(price),
        season_label: SeasonKind::Normal,
        flight_number: "FD3029".to_string(),
        departure_time: Some("08:40".to_string()),
        arrival_time: Some("10:05".to_string()),
        duration_minutes: Some(85),
        airplane: Some("Airbus A320".to_string()),
        carbon_emissions_g: Some(96_250),
        legroom: Some("29 in".to_string()),
        often_delayed: false,
        airline_code: "FD".to_string(),
        airline_name: "Thai AirAsia".to_string(),
        airline_name_th: Some("ไทยแอร์เอเชีย".to_string()),
    }
}
