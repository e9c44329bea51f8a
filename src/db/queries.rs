use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    Airline, CabinClass, DailyWeather, FlightPrice, HolidayStat, MonthlyWeatherStat, Route,
    RoutePriceStat, TripType, WeatherSource,
};

/// Columns selected for flight-price rows. Kept in one place so the filtered
/// and exact-date queries stay in sync with the `FlightPrice` model.
const FLIGHT_PRICE_COLUMNS: &str =
    "fp.id, fp.route_id, fp.airline_id, fp.departure_date, fp.return_date,
     fp.trip_type, fp.cabin_class, fp.price, fp.base_price, fp.season_label,
     fp.flight_number, fp.departure_time, fp.arrival_time, fp.duration_minutes,
     fp.airplane, fp.carbon_emissions_g, fp.legroom, fp.often_delayed,
     a.code AS airline_code, a.name AS airline_name, a.name_th AS airline_name_th";

// ---------------------------------------------------------------------------
// Routes and airlines
// ---------------------------------------------------------------------------

/// Look up a route by (origin, destination), creating it if absent.
/// Routes are created lazily by the first query that mentions them.
pub async fn get_or_create_route(
    pool: &PgPool,
    origin: &str,
    destination: &str,
) -> Result<Route, sqlx::Error> {
    sqlx::query_as::<_, Route>(
        "INSERT INTO routes (origin, destination)
         VALUES ($1, $2)
         ON CONFLICT (origin, destination) DO UPDATE SET origin = EXCLUDED.origin
         RETURNING id, origin, destination, created_at",
    )
    .bind(origin)
    .bind(destination)
    .fetch_one(pool)
    .await
}

/// Airlines that actually operate on the given routes (distinct over
/// flight_prices), ordered by code for stable output.
pub async fn airlines_for_routes(
    pool: &PgPool,
    route_ids: &[Uuid],
) -> Result<Vec<Airline>, sqlx::Error> {
    sqlx::query_as::<_, Airline>(
        "SELECT DISTINCT a.id, a.code, a.name, a.name_th, a.created_at
         FROM airlines a
         INNER JOIN flight_prices fp ON fp.airline_id = a.id
         WHERE fp.route_id = ANY($1)
         ORDER BY a.code",
    )
    .bind(route_ids)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Flight prices (read-only: the price ingestion path owns writes)
// ---------------------------------------------------------------------------

/// Flight rows for a set of routes within a date window, filtered by trip
/// type and cabin class, optionally narrowed to specific airlines.
///
/// The airline filter is applied as `$6::uuid[] IS NULL OR ...` so one
/// prepared statement covers both cases.
pub async fn flight_prices_in_window(
    pool: &PgPool,
    route_ids: &[Uuid],
    start: NaiveDate,
    end: NaiveDate,
    trip_type: TripType,
    cabin: CabinClass,
    airline_ids: Option<&[Uuid]>,
) -> Result<Vec<FlightPrice>, sqlx::Error> {
    let query = format!(
        "SELECT {FLIGHT_PRICE_COLUMNS}
         FROM flight_prices fp
         INNER JOIN airlines a ON a.id = fp.airline_id
         WHERE fp.route_id = ANY($1)
           AND fp.departure_date BETWEEN $2 AND $3
           AND fp.trip_type = $4
           AND fp.cabin_class = $5
           AND ($6::uuid[] IS NULL OR fp.airline_id = ANY($6))
         ORDER BY fp.departure_date, fp.price",
    );
    sqlx::query_as::<_, FlightPrice>(&query)
        .bind(route_ids)
        .bind(start)
        .bind(end)
        .bind(trip_type)
        .bind(cabin)
        .bind(airline_ids)
        .fetch_all(pool)
        .await
}

/// The cheapest flight on one exact departure date, matching trip type.
/// Used by the before/after price comparison.
pub async fn cheapest_price_on_date(
    pool: &PgPool,
    route_ids: &[Uuid],
    date: NaiveDate,
    trip_type: TripType,
    cabin: CabinClass,
) -> Result<Option<FlightPrice>, sqlx::Error> {
    let query = format!(
        "SELECT {FLIGHT_PRICE_COLUMNS}
         FROM flight_prices fp
         INNER JOIN airlines a ON a.id = fp.airline_id
         WHERE fp.route_id = ANY($1)
           AND fp.departure_date = $2
           AND fp.trip_type = $3
           AND fp.cabin_class = $4
         ORDER BY fp.price
         LIMIT 1",
    );
    sqlx::query_as::<_, FlightPrice>(&query)
        .bind(route_ids)
        .bind(date)
        .bind(trip_type)
        .bind(cabin)
        .fetch_optional(pool)
        .await
}

// ---------------------------------------------------------------------------
// Daily weather
// ---------------------------------------------------------------------------

/// Parameters for upserting one daily weather row.
#[derive(Debug, Clone)]
pub struct UpsertDailyWeatherParams {
    pub province: String,
    pub date: NaiveDate,
    pub temp_max: Decimal,
    pub temp_min: Decimal,
    pub temp_avg: Decimal,
    pub precipitation_mm: Decimal,
    pub humidity: Option<Decimal>,
    pub source: WeatherSource,
}

/// Upsert a daily weather row keyed on (province, date).
///
/// Ownership rule: historical displaces forecast, forecast never displaces
/// historical. The conditional DO UPDATE enforces it — a forecast row hitting
/// an existing historical row is a no-op. Returns true if a row was written.
pub async fn upsert_daily_weather(
    pool: &PgPool,
    p: &UpsertDailyWeatherParams,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO daily_weather
             (province, date, temp_max, temp_min, temp_avg, precipitation_mm, humidity, source)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (province, date) DO UPDATE SET
             temp_max = EXCLUDED.temp_max,
             temp_min = EXCLUDED.temp_min,
             temp_avg = EXCLUDED.temp_avg,
             precipitation_mm = EXCLUDED.precipitation_mm,
             humidity = EXCLUDED.humidity,
             source = EXCLUDED.source
         WHERE daily_weather.source = 'forecast' OR EXCLUDED.source = 'historical'",
    )
    .bind(&p.province)
    .bind(p.date)
    .bind(p.temp_max)
    .bind(p.temp_min)
    .bind(p.temp_avg)
    .bind(p.precipitation_mm)
    .bind(p.humidity)
    .bind(p.source)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Existence check by (province, date), without transferring the row.
pub async fn daily_weather_exists(
    pool: &PgPool,
    province: &str,
    date: NaiveDate,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM daily_weather WHERE province = $1 AND date = $2 LIMIT 1",
    )
    .bind(province)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Daily rows for a province within [start, end], ordered by date.
pub async fn daily_weather_range(
    pool: &PgPool,
    province: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailyWeather>, sqlx::Error> {
    sqlx::query_as::<_, DailyWeather>(
        "SELECT id, province, date, temp_max, temp_min, temp_avg,
                precipitation_mm, humidity, source
         FROM daily_weather
         WHERE province = $1 AND date BETWEEN $2 AND $3
         ORDER BY date",
    )
    .bind(province)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}

/// SQL-side monthly aggregate of daily rows: average temp_avg, total
/// precipitation, average humidity, day count.
pub async fn monthly_weather_aggregate(
    pool: &PgPool,
    province: &str,
    period: &str,
) -> Result<Option<(Decimal, Decimal, Option<Decimal>, i64)>, sqlx::Error> {
    let row: Option<(Option<Decimal>, Option<Decimal>, Option<Decimal>, i64)> = sqlx::query_as(
        "SELECT AVG(temp_avg), SUM(precipitation_mm), AVG(humidity), COUNT(*)
         FROM daily_weather
         WHERE province = $1 AND to_char(date, 'YYYY-MM') = $2",
    )
    .bind(province)
    .bind(period)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(temp, rain, humidity, count)| {
        // AVG over zero rows is NULL; treat that as "no data"
        match (temp, rain) {
            (Some(t), Some(r)) if count > 0 => Some((t, r, humidity, count)),
            _ => None,
        }
    }))
}

/// Distinct (province, period) pairs that have daily rows. Drives the
/// monthly statistics refresh.
pub async fn distinct_weather_periods(pool: &PgPool) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT DISTINCT province, to_char(date, 'YYYY-MM') AS period
         FROM daily_weather
         ORDER BY province, period",
    )
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Monthly weather statistics
// ---------------------------------------------------------------------------

/// Upsert the monthly weather aggregate for (province, period).
#[allow(clippy::too_many_arguments)]
pub async fn upsert_monthly_weather_stat(
    pool: &PgPool,
    province: &str,
    period: &str,
    avg_temp: Decimal,
    avg_rain: Decimal,
    avg_humidity: Option<Decimal>,
    weather_score: Decimal,
    days_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO monthly_weather_stats
             (province, period, avg_temp, avg_rain, avg_humidity, weather_score, days_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (province, period) DO UPDATE SET
             avg_temp = EXCLUDED.avg_temp,
             avg_rain = EXCLUDED.avg_rain,
             avg_humidity = EXCLUDED.avg_humidity,
             weather_score = EXCLUDED.weather_score,
             days_count = EXCLUDED.days_count,
             updated_at = NOW()",
    )
    .bind(province)
    .bind(period)
    .bind(avg_temp)
    .bind(avg_rain)
    .bind(avg_humidity)
    .bind(weather_score)
    .bind(days_count)
    .execute(pool)
    .await?;
    Ok(())
}

/// Monthly weather stat for one (province, period).
pub async fn monthly_weather_stat(
    pool: &PgPool,
    province: &str,
    period: &str,
) -> Result<Option<MonthlyWeatherStat>, sqlx::Error> {
    sqlx::query_as::<_, MonthlyWeatherStat>(
        "SELECT province, period, avg_temp, avg_rain, avg_humidity, weather_score, days_count
         FROM monthly_weather_stats
         WHERE province = $1 AND period = $2",
    )
    .bind(province)
    .bind(period)
    .fetch_optional(pool)
    .await
}

/// Monthly weather stats for a province across a period set, one query.
pub async fn monthly_weather_stats_for_periods(
    pool: &PgPool,
    province: &str,
    periods: &[String],
) -> Result<Vec<MonthlyWeatherStat>, sqlx::Error> {
    sqlx::query_as::<_, MonthlyWeatherStat>(
        "SELECT province, period, avg_temp, avg_rain, avg_humidity, weather_score, days_count
         FROM monthly_weather_stats
         WHERE province = $1 AND period = ANY($2)",
    )
    .bind(province)
    .bind(periods)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Holiday statistics
// ---------------------------------------------------------------------------

/// Upsert holiday statistics for one calendar month.
pub async fn upsert_holiday_stat(
    pool: &PgPool,
    period: &str,
    holidays_count: i32,
    long_weekends_count: i32,
    holiday_score: Decimal,
    holidays_detail: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO holiday_stats
             (period, holidays_count, long_weekends_count, holiday_score, holidays_detail)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (period) DO UPDATE SET
             holidays_count = EXCLUDED.holidays_count,
             long_weekends_count = EXCLUDED.long_weekends_count,
             holiday_score = EXCLUDED.holiday_score,
             holidays_detail = EXCLUDED.holidays_detail,
             updated_at = NOW()",
    )
    .bind(period)
    .bind(holidays_count)
    .bind(long_weekends_count)
    .bind(holiday_score)
    .bind(holidays_detail)
    .execute(pool)
    .await?;
    Ok(())
}

/// Holiday stats for one period.
pub async fn holiday_stat(pool: &PgPool, period: &str) -> Result<Option<HolidayStat>, sqlx::Error> {
    sqlx::query_as::<_, HolidayStat>(
        "SELECT period, holidays_count, long_weekends_count, holiday_score, holidays_detail
         FROM holiday_stats
         WHERE period = $1",
    )
    .bind(period)
    .fetch_optional(pool)
    .await
}

/// Holiday stats for a period set, one query.
pub async fn holiday_stats_for_periods(
    pool: &PgPool,
    periods: &[String],
) -> Result<Vec<HolidayStat>, sqlx::Error> {
    sqlx::query_as::<_, HolidayStat>(
        "SELECT period, holidays_count, long_weekends_count, holiday_score, holidays_detail
         FROM holiday_stats
         WHERE period = ANY($1)",
    )
    .bind(periods)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Route price statistics
// ---------------------------------------------------------------------------

/// Precomputed price percentiles for a route set across a period set.
pub async fn route_price_stats_for_periods(
    pool: &PgPool,
    route_ids: &[Uuid],
    periods: &[String],
) -> Result<Vec<RoutePriceStat>, sqlx::Error> {
    sqlx::query_as::<_, RoutePriceStat>(
        "SELECT route_id, period, price_percentile
         FROM route_price_stats
         WHERE route_id = ANY($1) AND period = ANY($2)",
    )
    .bind(route_ids)
    .bind(periods)
    .fetch_all(pool)
    .await
}
