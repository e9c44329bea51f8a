//! Analysis orchestrator: the per-query entry point.
//!
//! `analyze_flight_prices` resolves locations, expands the date window,
//! loads flight rows, classifies seasons, picks the recommendation, builds
//! the before/after comparison, the daily chart and the savings figure, and
//! attaches the best-effort forecast. Anchor resolution and window expansion
//! are small pure functions with table-driven cases; all storage access
//! happens up front so the assembly steps stay synchronous and testable.
//!
//! Only `Input`, permanent `Storage` and `Timeout` errors surface; forecast
//! failures are swallowed (their fields are optional) and missing signals
//! degrade to fabricated scores inside the aggregator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::calendar::{add_months, days_in_month, end_of_month, format_thai_date, period_of};
use crate::db::models::{CabinClass, FlightPrice, SeasonKind, TripType};
use crate::db::queries;
use crate::errors::{with_storage_retries, AppError};
use crate::helpers::{dec_to_f64, grams_to_kg_1dp};
use crate::pricing::{display_price, PassengerMix};
use crate::services::forecasting::{Confidence, ForecastEngine, Trend, DEFAULT_GRAPH_DAYS};
use crate::services::holiday_api::HolidayClient;
use crate::services::scores::gather_scores;
use crate::services::seasons::{build_seasons, monthly_average_prices, SeasonAnalysis};

/// A user window shorter than this is expanded to a full 12 months.
const NARROW_WINDOW_DAYS: i64 = 180;

/// Wide windows keep the user's start, pulled back this many days.
const WIDE_START_BACKOFF_DAYS: i64 = 14;

/// Offset of the before/after comparison dates from the anchor.
const COMPARISON_OFFSET_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Request / dependencies
// ---------------------------------------------------------------------------

/// Trip duration preference in days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationRange {
    pub min: f64,
    pub max: f64,
}

impl DurationRange {
    /// Average trip duration, rounded to whole days.
    pub fn avg_days(self) -> i64 {
        ((self.min + self.max) / 2.0).round() as i64
    }
}

/// One analysis query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub origin: String,
    pub destination: String,
    pub trip_type: TripType,
    pub duration_range: DurationRange,
    #[serde(default)]
    pub selected_airlines: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub passengers: PassengerMix,
    pub cabin: CabinClass,
}

/// Dependency container handed to the orchestrator; constructed once at
/// process start and injected per request.
#[derive(Clone)]
pub struct AnalysisDeps {
    pub pool: PgPool,
    pub holiday_client: HolidayClient,
    pub forecast_engine: Arc<ForecastEngine>,
    pub request_timeout: std::time::Duration,
}

// ---------------------------------------------------------------------------
// Result shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub recommended_period: RecommendedPeriod,
    pub seasons: Vec<SeasonOut>,
    pub price_comparison: PriceComparison,
    pub price_chart_data: Vec<ChartEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_prediction: Option<PricePredictionOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_trend: Option<PriceTrendOut>,
    pub price_graph_data: Vec<GraphPointOut>,
    pub flight_prices: Vec<CatalogRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedPeriod {
    /// Thai-localized departure date.
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<String>,
    pub price: i64,
    pub airline: String,
    pub season: SeasonKind,
    pub savings: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonOut {
    #[serde(rename = "type")]
    pub kind: SeasonKind,
    pub months: Vec<String>,
    pub price_range: PriceRangeOut,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_deal: Option<BestDealOut>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceRangeOut {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestDealOut {
    pub dates: String,
    pub price: i64,
    pub airline: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceComparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_airline: Option<String>,
    pub if_go_before: ComparisonSide,
    pub if_go_after: ComparisonSide,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSide {
    /// ISO date (YYYY-MM-DD).
    pub date: String,
    pub price: i64,
    pub difference: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<String>,
    /// 0 means no stored price that day; `has_data` separates the cases.
    pub price: i64,
    pub season: SeasonKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePredictionOut {
    pub predicted_price: i64,
    pub confidence: Confidence,
    pub r_squared: f64,
    pub min_price: i64,
    pub max_price: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTrendOut {
    pub trend: Trend,
    pub change_percent: f64,
    pub current_avg_price: i64,
    pub future_avg_price: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPointOut {
    /// ISO date (YYYY-MM-DD).
    pub date: String,
    pub low: i64,
    pub typical: i64,
    pub high: i64,
    pub is_actual: bool,
}

/// Catalog row: storage-shaped, with pricing rules applied to `price` and
/// carbon emissions converted to kilograms at one decimal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRow {
    pub id: Uuid,
    pub airline_code: String,
    pub airline_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airline_name_th: Option<String>,
    pub flight_number: String,
    pub departure_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub cabin_class: CabinClass,
    pub price: i64,
    pub base_price: i64,
    pub season_label: SeasonKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airplane: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_emissions_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legroom: Option<String>,
    pub often_delayed: bool,
}

// ---------------------------------------------------------------------------
// Window expansion (pure, table-driven)
// ---------------------------------------------------------------------------

/// Shape of the user-supplied date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCase {
    Missing,
    SingleDate,
    UserNarrow,
    UserWide,
}

/// Classify the user's window.
pub fn classify_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> WindowCase {
    match (start, end) {
        (None, None) => WindowCase::Missing,
        (Some(_), None) | (None, Some(_)) => WindowCase::SingleDate,
        (Some(s), Some(e)) => {
            if (e - s).num_days() < NARROW_WINDOW_DAYS {
                WindowCase::UserNarrow
            } else {
                WindowCase::UserWide
            }
        }
    }
}

/// Expand the user's window into the analysis window.
///
/// Narrow windows (including single-date and missing) become 12 calendar
/// months centered roughly on the user's start, clamped to reach at most 12
/// months into the past. Wide windows keep the user's span, pulled back 14
/// days and extended to the later of end + 90 days or end-of-month + 6
/// months.
pub fn expand_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let effective_start = start.or(end).unwrap_or(today);
    let effective_end = end.unwrap_or(effective_start).max(effective_start);

    match classify_window(start, end) {
        WindowCase::Missing | WindowCase::SingleDate | WindowCase::UserNarrow => {
            let start_month = first_of_month(effective_start);
            let floor = add_months(first_of_month(today), -12);
            let expanded_start = add_months(start_month, -6).max(floor);
            let expanded_end = add_months(expanded_start, 12) - Duration::days(1);
            (expanded_start, expanded_end)
        }
        WindowCase::UserWide => {
            let expanded_start = effective_start - Duration::days(WIDE_START_BACKOFF_DAYS);
            let expanded_end =
                (effective_end + Duration::days(90)).max(add_months(end_of_month(effective_end), 6));
            (expanded_start, expanded_end)
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("valid first of month")
}

// ---------------------------------------------------------------------------
// Comparison, chart, savings (pure)
// ---------------------------------------------------------------------------

/// A (raw price, airline) pair for one comparison date.
type PricePoint = Option<(f64, String)>;

/// Build the before/after comparison around the anchor date.
///
/// Differences are computed on displayed prices. With no anchor price but
/// both neighbors present, their mean is the reference; with only one
/// neighbor, it is shown at 0%.
pub fn build_comparison(
    anchor: NaiveDate,
    anchor_point: PricePoint,
    before_point: PricePoint,
    after_point: PricePoint,
    display: &dyn Fn(f64) -> i64,
) -> PriceComparison {
    let before_date = anchor - Duration::days(COMPARISON_OFFSET_DAYS);
    let after_date = anchor + Duration::days(COMPARISON_OFFSET_DAYS);

    let anchor_disp = anchor_point.as_ref().map(|(p, _)| display(*p));
    let before_disp = before_point.as_ref().map(|(p, _)| display(*p));
    let after_disp = after_point.as_ref().map(|(p, _)| display(*p));

    let reference: Option<i64> = match (anchor_disp, before_disp, after_disp) {
        (Some(a), _, _) => Some(a),
        (None, Some(b), Some(af)) => Some((b + af) / 2),
        _ => None,
    };

    let side = |date: NaiveDate, disp: Option<i64>| -> ComparisonSide {
        let price = disp.unwrap_or(0);
        let (difference, percentage) = match (disp, reference) {
            (Some(p), Some(r)) if r != 0 => {
                let diff = p - r;
                (diff, 100.0 * diff as f64 / r as f64)
            }
            _ => (0, 0.0),
        };
        ComparisonSide { date: date.to_string(), price, difference, percentage }
    };

    PriceComparison {
        base_price: anchor_disp,
        base_airline: anchor_point.map(|(_, a)| a),
        if_go_before: side(before_date, before_disp),
        if_go_after: side(after_date, after_disp),
    }
}

/// Daily chart for the anchor's calendar month: one entry per day carrying
/// the cheapest stored price (0 when absent) and the month's season label.
pub fn build_chart(
    rows: &[FlightPrice],
    anchor: NaiveDate,
    month_season: SeasonKind,
    avg_duration_days: i64,
    trip_type: TripType,
    display: &dyn Fn(f64) -> i64,
) -> Vec<ChartEntry> {
    let mut cheapest_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    for row in rows {
        let price = dec_to_f64(row.price);
        cheapest_by_day
            .entry(row.departure_date)
            .and_modify(|p| *p = p.min(price))
            .or_insert(price);
    }

    let (year, month) = (anchor.year(), anchor.month());
    (1..=days_in_month(year, month))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .map(|date| {
            let raw = cheapest_by_day.get(&date).copied();
            ChartEntry {
                start_date: date.to_string(),
                return_date: (trip_type == TripType::RoundTrip)
                    .then(|| (date + Duration::days(avg_duration_days)).to_string()),
                price: raw.map(display).unwrap_or(0),
                season: month_season,
                duration: Some(avg_duration_days),
                has_data: raw.is_some(),
            }
        })
        .collect()
}

/// Savings for the recommended period: against the user's anchor when a
/// date was chosen, otherwise against the high season's best deal. Zero
/// whenever either side is missing.
pub fn compute_savings(
    user_chose_date: bool,
    anchor_display: Option<i64>,
    high_season_display: Option<i64>,
    recommended_display: Option<i64>,
) -> i64 {
    let Some(recommended) = recommended_display else {
        return 0;
    };
    let reference = if user_chose_date { anchor_display } else { high_season_display };
    reference.map(|r| (r - recommended).max(0)).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Analyze flight prices for a trip query, under the per-request deadline.
pub async fn analyze_flight_prices(
    deps: &AnalysisDeps,
    request: AnalysisRequest,
) -> Result<AnalysisResult, AppError> {
    let timeout = deps.request_timeout;
    tokio::time::timeout(timeout, run_analysis(deps, request))
        .await
        .map_err(|_| AppError::Timeout(timeout))?
}

async fn run_analysis(
    deps: &AnalysisDeps,
    request: AnalysisRequest,
) -> Result<AnalysisResult, AppError> {
    let pool = &deps.pool;
    let today = Utc::now().date_naive();

    // 1. Resolve origin/destination (fail fast on unknowns)
    let origins = crate::services::geo::resolve_location(&request.origin)?;
    let destinations = crate::services::geo::resolve_location(&request.destination)?;
    let primary_destination = destinations[0].clone();

    let mut route_ids = Vec::new();
    for origin in &origins {
        for destination in &destinations {
            let route = queries::get_or_create_route(pool, origin, destination).await?;
            route_ids.push(route.id);
        }
    }
    let route_key = format!("{}-{}", origins.join("/"), primary_destination);

    // 2. Airline filter
    let airline_ids = resolve_airline_filter(pool, &route_ids, &request.selected_airlines).await?;

    // 3. Window expansion
    let (window_start, window_end) = expand_window(request.start_date, request.end_date, today);
    let avg_duration_days = request.duration_range.avg_days();

    // 4. Load flight rows for the expanded window (transient errors retried)
    let rows = with_storage_retries("flight_prices_in_window", || {
        queries::flight_prices_in_window(
            pool,
            &route_ids,
            window_start,
            window_end,
            request.trip_type,
            request.cabin,
            airline_ids.as_deref(),
        )
    })
    .await?;
    tracing::debug!(
        "Loaded {} flight rows for {} over {}..{}",
        rows.len(),
        route_key,
        window_start,
        window_end,
    );

    // 5. Scores and seasons
    let monthly_avg = monthly_average_prices(&rows);
    let bundle = gather_scores(
        pool,
        &deps.holiday_client,
        &route_ids,
        &route_key,
        &primary_destination,
        &monthly_avg,
    )
    .await?;
    let seasons = build_seasons(&rows, &bundle);

    // 6–7. Recommendation and its end date
    let best_season = seasons
        .iter()
        .filter(|s| s.best_deal.is_some())
        .min_by(|a, b| {
            let pa = a.best_deal.as_ref().map(|d| d.price).unwrap_or(f64::INFINITY);
            let pb = b.best_deal.as_ref().map(|d| d.price).unwrap_or(f64::INFINITY);
            pa.partial_cmp(&pb).expect("prices are finite")
        });
    let recommended_date = best_season
        .and_then(|s| s.best_deal.as_ref())
        .map(|d| d.departure_date)
        .or(request.start_date)
        .unwrap_or(today);
    let recommended_end = recommended_date + Duration::days(avg_duration_days);

    // 8. Season label: the user-selected month's label when a date was given
    let recommended_season = request
        .start_date
        .and_then(|d| season_of_period(&seasons, &period_of(d)))
        .or_else(|| best_season.map(|s| s.kind))
        .unwrap_or(SeasonKind::Normal);

    let display = |p: f64| display_price(p, request.passengers, request.trip_type);

    // 9. Price comparison around the anchor
    let anchor = request.start_date.unwrap_or(recommended_date);
    let anchor_point = price_point_on(pool, &route_ids, anchor, &request).await?;
    let before_point = price_point_on(
        pool,
        &route_ids,
        anchor - Duration::days(COMPARISON_OFFSET_DAYS),
        &request,
    )
    .await?;
    let after_point = price_point_on(
        pool,
        &route_ids,
        anchor + Duration::days(COMPARISON_OFFSET_DAYS),
        &request,
    )
    .await?;
    let price_comparison =
        build_comparison(anchor, anchor_point.clone(), before_point, after_point, &display);

    // 10. Chart for the anchor's month
    let anchor_month_season =
        season_of_period(&seasons, &period_of(anchor)).unwrap_or(SeasonKind::Normal);
    let price_chart_data = build_chart(
        &rows,
        anchor,
        anchor_month_season,
        avg_duration_days,
        request.trip_type,
        &display,
    );

    // 11. Savings
    let recommended_display = best_season
        .and_then(|s| s.best_deal.as_ref())
        .map(|d| display(d.price));
    let high_display = seasons
        .iter()
        .find(|s| s.kind == SeasonKind::High)
        .and_then(|s| s.best_deal.as_ref())
        .map(|d| display(d.price));
    let savings = compute_savings(
        request.start_date.is_some(),
        anchor_point.as_ref().map(|(p, _)| display(*p)),
        high_display,
        recommended_display,
    );

    // 12. Forecast (best-effort; failures drop the optional fields)
    let (price_prediction, price_trend, price_graph_data) = forecast_fields(
        deps,
        &route_ids,
        &route_key,
        &request,
        anchor,
        today,
        &display,
    )
    .await;

    // 13. Assemble, with pricing rules on every money value
    let recommended_period = RecommendedPeriod {
        start_date: format_thai_date(recommended_date),
        end_date: format_thai_date(recommended_end),
        return_date: (request.trip_type == TripType::RoundTrip)
            .then(|| format_thai_date(recommended_end)),
        price: recommended_display.unwrap_or(0),
        airline: best_season
            .and_then(|s| s.best_deal.as_ref())
            .map(|d| d.airline.clone())
            .unwrap_or_default(),
        season: recommended_season,
        savings,
    };

    Ok(AnalysisResult {
        recommended_period,
        seasons: seasons.iter().map(|s| season_out(s, &display)).collect(),
        price_comparison,
        price_chart_data,
        price_prediction,
        price_trend,
        price_graph_data,
        flight_prices: rows.iter().map(|r| catalog_row(r, &display)).collect(),
    })
}

/// Map user-supplied airline codes to ids on these routes. Unknown codes
/// are ignored; if nothing matches, the filter is dropped entirely rather
/// than silently emptying the result.
async fn resolve_airline_filter(
    pool: &PgPool,
    route_ids: &[Uuid],
    selected_codes: &[String],
) -> Result<Option<Vec<Uuid>>, AppError> {
    if selected_codes.is_empty() {
        return Ok(None);
    }
    let airlines = queries::airlines_for_routes(pool, route_ids).await?;
    let ids: Vec<Uuid> = airlines
        .iter()
        .filter(|a| selected_codes.iter().any(|c| c.eq_ignore_ascii_case(&a.code)))
        .map(|a| a.id)
        .collect();
    if ids.is_empty() {
        tracing::warn!(
            "None of the selected airlines {:?} operate on this route; ignoring the filter",
            selected_codes,
        );
        return Ok(None);
    }
    Ok(Some(ids))
}

/// Cheapest (raw price, airline) on one exact date, matching trip type.
async fn price_point_on(
    pool: &PgPool,
    route_ids: &[Uuid],
    date: NaiveDate,
    request: &AnalysisRequest,
) -> Result<PricePoint, AppError> {
    let row = with_storage_retries("cheapest_price_on_date", || {
        queries::cheapest_price_on_date(pool, route_ids, date, request.trip_type, request.cabin)
    })
    .await?;
    Ok(row.map(|r| {
        let airline = r.airline_name_th.clone().unwrap_or_else(|| r.airline_name.clone());
        (dec_to_f64(r.price), airline)
    }))
}

fn season_of_period(seasons: &[SeasonAnalysis], period: &str) -> Option<SeasonKind> {
    seasons
        .iter()
        .find(|s| s.periods.iter().any(|p| p == period))
        .map(|s| s.kind)
}

/// Run the forecasting steps, swallowing every failure.
async fn forecast_fields(
    deps: &AnalysisDeps,
    route_ids: &[Uuid],
    route_key: &str,
    request: &AnalysisRequest,
    anchor: NaiveDate,
    today: NaiveDate,
    display: &dyn Fn(f64) -> i64,
) -> (Option<PricePredictionOut>, Option<PriceTrendOut>, Vec<GraphPointOut>) {
    let engine = &deps.forecast_engine;
    let model = match engine
        .get_or_train(&deps.pool, route_ids, route_key, request.trip_type, today)
        .await
    {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!("Forecast training failed, omitting forecast fields: {}", e);
            return (None, None, Vec::new());
        }
    };

    let price_prediction = engine.predict(&model, anchor, today).map(|p| PricePredictionOut {
        predicted_price: display(p.price),
        confidence: p.confidence,
        r_squared: p.r_squared,
        min_price: display(p.min_price),
        max_price: display(p.max_price),
    });

    let price_trend = match engine
        .trend(&deps.pool, &model, route_ids, request.trip_type, today)
        .await
    {
        Ok(t) => t.map(|t| PriceTrendOut {
            trend: t.trend,
            change_percent: t.change_percent,
            current_avg_price: display(t.current_avg_price),
            future_avg_price: display(t.future_avg_price),
        }),
        Err(e) => {
            tracing::warn!("Price trend failed, omitting: {}", e);
            None
        }
    };

    let price_graph_data = match engine
        .price_graph(
            &deps.pool,
            &model,
            route_ids,
            route_key,
            request.trip_type,
            today,
            DEFAULT_GRAPH_DAYS,
        )
        .await
    {
        Ok(points) => points
            .into_iter()
            .map(|p| GraphPointOut {
                date: p.date.to_string(),
                low: display(p.low),
                typical: display(p.typical),
                high: display(p.high),
                is_actual: p.is_actual,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Price graph failed, omitting: {}", e);
            Vec::new()
        }
    };

    (price_prediction, price_trend, price_graph_data)
}

fn season_out(season: &SeasonAnalysis, display: &dyn Fn(f64) -> i64) -> SeasonOut {
    SeasonOut {
        kind: season.kind,
        months: season.months.clone(),
        price_range: PriceRangeOut {
            min: display(season.price_range.min),
            max: display(season.price_range.max),
        },
        best_deal: season.best_deal.as_ref().map(|d| BestDealOut {
            dates: d.dates.clone(),
            price: display(d.price),
            airline: d.airline.clone(),
        }),
        description: season.description.to_string(),
    }
}

fn catalog_row(row: &FlightPrice, display: &dyn Fn(f64) -> i64) -> CatalogRow {
    CatalogRow {
        id: row.id,
        airline_code: row.airline_code.clone(),
        airline_name: row.airline_name.clone(),
        airline_name_th: row.airline_name_th.clone(),
        flight_number: row.flight_number.clone(),
        departure_date: row.departure_date,
        return_date: row.return_date,
        trip_type: row.trip_type,
        cabin_class: row.cabin_class,
        price: display(dec_to_f64(row.price)),
        base_price: dec_to_f64(row.base_price).round() as i64,
        season_label: row.season_label,
        departure_time: row.departure_time.clone(),
        arrival_time: row.arrival_time.clone(),
        duration_minutes: row.duration_minutes,
        airplane: row.airplane.clone(),
        carbon_emissions_kg: row.carbon_emissions_g.map(grams_to_kg_1dp),
        legroom: row.legroom.clone(),
        often_delayed: row.often_delayed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::test_flight;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn identity_display() -> impl Fn(f64) -> i64 {
        |p: f64| p.round() as i64
    }

    // --- window expansion ---

    #[test]
    fn test_classify_window_cases() {
        assert_eq!(classify_window(None, None), WindowCase::Missing);
        assert_eq!(classify_window(Some(d("2026-04-13")), None), WindowCase::SingleDate);
        assert_eq!(
            classify_window(Some(d("2026-04-01")), Some(d("2026-05-01"))),
            WindowCase::UserNarrow
        );
        assert_eq!(
            classify_window(Some(d("2026-01-01")), Some(d("2026-12-01"))),
            WindowCase::UserWide
        );
    }

    #[test]
    fn test_expand_single_date_spans_twelve_months() {
        let (start, end) = expand_window(Some(d("2026-04-13")), None, d("2026-02-01"));
        assert_eq!(start, d("2025-10-01"), "6 months back from April, month-aligned");
        assert_eq!(end, d("2026-09-30"), "12 calendar months total");
        assert_eq!((end - start).num_days() + 1, 365);
    }

    #[test]
    fn test_expand_narrow_clamps_to_twelve_months_past() {
        // Start far in the past: clamp to today − 12 months
        let (start, end) = expand_window(
            Some(d("2024-01-15")),
            Some(d("2024-02-15")),
            d("2026-02-01"),
        );
        assert_eq!(start, d("2025-02-01"), "clamped to 12 months before today");
        assert_eq!(end, d("2026-01-31"));
    }

    #[test]
    fn test_expand_missing_window_centers_on_today() {
        let (start, end) = expand_window(None, None, d("2026-02-10"));
        assert_eq!(start, d("2025-08-01"));
        assert_eq!(end, d("2026-07-31"));
    }

    #[test]
    fn test_expand_wide_window_keeps_user_span() {
        let (start, end) = expand_window(
            Some(d("2026-01-10")),
            Some(d("2026-08-20")),
            d("2026-01-01"),
        );
        assert_eq!(start, d("2025-12-27"), "start pulled back 14 days");
        // end-of-month(2026-08-20) + 6 months = 2027-02-28 > end + 90d
        assert_eq!(end, d("2027-02-28"));
    }

    #[test]
    fn test_duration_range_avg() {
        assert_eq!(DurationRange { min: 3.0, max: 7.0 }.avg_days(), 5);
        assert_eq!(DurationRange { min: 2.0, max: 5.0 }.avg_days(), 4, "3.5 rounds up");
    }

    // --- comparison ---

    #[test]
    fn test_comparison_with_anchor() {
        let display = identity_display();
        let c = build_comparison(
            d("2026-04-13"),
            Some((2000.0, "ไทยแอร์เอเชีย".to_string())),
            Some((1800.0, "a".to_string())),
            Some((2500.0, "b".to_string())),
            &display,
        );
        assert_eq!(c.base_price, Some(2000));
        assert_eq!(c.if_go_before.date, "2026-04-06");
        assert_eq!(c.if_go_after.date, "2026-04-20");
        assert_eq!(c.if_go_before.difference, -200);
        assert!((c.if_go_before.percentage - -10.0).abs() < 1e-9);
        assert_eq!(c.if_go_after.difference, 500);
        assert!((c.if_go_after.percentage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_comparison_mean_reference_without_anchor() {
        let display = identity_display();
        let c = build_comparison(
            d("2026-04-13"),
            None,
            Some((1000.0, "a".to_string())),
            Some((3000.0, "b".to_string())),
            &display,
        );
        assert_eq!(c.base_price, None);
        // Reference is the mean (2000)
        assert_eq!(c.if_go_before.difference, -1000);
        assert_eq!(c.if_go_after.difference, 1000);
        assert!((c.if_go_before.percentage - -50.0).abs() < 1e-9);
    }

    #[test]
    fn test_comparison_single_neighbor_is_zero_percent() {
        let display = identity_display();
        let c = build_comparison(
            d("2026-04-13"),
            None,
            Some((1500.0, "a".to_string())),
            None,
            &display,
        );
        assert_eq!(c.if_go_before.price, 1500);
        assert_eq!(c.if_go_before.difference, 0);
        assert_eq!(c.if_go_before.percentage, 0.0);
        assert_eq!(c.if_go_after.price, 0);
        assert_eq!(c.if_go_after.percentage, 0.0);
    }

    #[test]
    fn test_comparison_all_zero_percentages_when_everything_missing() {
        let display = identity_display();
        let c = build_comparison(d("2026-04-13"), None, None, None, &display);
        assert_eq!(c.if_go_before.percentage, 0.0);
        assert_eq!(c.if_go_after.percentage, 0.0);
        assert_eq!(c.if_go_before.price, 0);
    }

    // --- chart ---

    #[test]
    fn test_chart_one_entry_per_day_of_month() {
        let display = identity_display();
        let rows = vec![test_flight("2026-04-13", 2000), test_flight("2026-04-13", 1500)];
        let chart = build_chart(&rows, d("2026-04-13"), SeasonKind::High, 5, TripType::RoundTrip, &display);
        assert_eq!(chart.len(), 30, "April has 30 days");
        let day13 = &chart[12];
        assert_eq!(day13.start_date, "2026-04-13");
        assert_eq!(day13.price, 1500, "cheapest of the day");
        assert!(day13.has_data);
        assert_eq!(day13.season, SeasonKind::High);
        assert_eq!(day13.return_date.as_deref(), Some("2026-04-18"));

        let day1 = &chart[0];
        assert_eq!(day1.price, 0, "no data day carries price 0");
        assert!(!day1.has_data);
    }

    #[test]
    fn test_chart_one_way_has_no_return_date() {
        let display = identity_display();
        let chart = build_chart(&[], d("2026-04-13"), SeasonKind::Normal, 5, TripType::OneWay, &display);
        assert!(chart.iter().all(|e| e.return_date.is_none()));
    }

    // --- savings ---

    #[test]
    fn test_savings_user_date() {
        assert_eq!(compute_savings(true, Some(3000), Some(4000), Some(2000)), 1000);
        assert_eq!(compute_savings(true, Some(1500), None, Some(2000)), 0, "never negative");
        assert_eq!(compute_savings(true, None, Some(4000), Some(2000)), 0, "missing anchor");
    }

    #[test]
    fn test_savings_against_high_season() {
        assert_eq!(compute_savings(false, None, Some(4000), Some(2500)), 1500);
        assert_eq!(compute_savings(false, None, None, Some(2500)), 0);
        assert_eq!(compute_savings(false, None, Some(4000), None), 0);
    }

    // --- serde shape ---

    #[test]
    fn test_result_serializes_camel_case() {
        let side = ComparisonSide {
            date: "2026-04-06".to_string(),
            price: 1800,
            difference: -200,
            percentage: -10.0,
        };
        let v = serde_json::to_value(&side).unwrap();
        assert!(v.get("date").is_some());
        assert!(v.get("percentage").is_some());

        let entry = ChartEntry {
            start_date: "2026-04-13".to_string(),
            return_date: Some("2026-04-18".to_string()),
            price: 1500,
            season: SeasonKind::High,
            duration: Some(5),
            has_data: true,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["startDate"], serde_json::json!("2026-04-13"));
        assert_eq!(v["season"], serde_json::json!("high"));
        assert_eq!(v["hasData"], serde_json::json!(true));
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: AnalysisRequest = serde_json::from_value(serde_json::json!({
            "origin": "Bangkok",
            "destination": "Phuket",
            "tripType": "round-trip",
            "durationRange": { "min": 3.0, "max": 7.0 },
            "startDate": "2026-04-13",
            "endDate": null,
            "passengers": { "adults": 1, "children": 0, "infants": 0 },
            "cabin": "economy"
        }))
        .unwrap();
        assert_eq!(request.trip_type, TripType::RoundTrip);
        assert_eq!(request.start_date, Some(d("2026-04-13")));
        assert!(request.selected_airlines.is_empty(), "defaults apply");
    }

    #[test]
    fn test_catalog_row_carbon_in_kg() {
        let display = identity_display();
        let row = catalog_row(&test_flight("2026-04-13", 1000), &display);
        assert_eq!(row.carbon_emissions_kg, Some(96.3), "96250 g → 96.3 kg");
        assert_eq!(row.price, 1000);
    }
}
