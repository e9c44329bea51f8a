//! Season classification.
//!
//! Composes the three per-period scores into a season score, tercile-splits
//! the months of the query window into Low / Normal / High, and derives each
//! season's raw price range and best deal. Works entirely on pre-loaded
//! flight rows and pre-materialized score maps — no storage access — so the
//! aggregator and classifier stay decoupled.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;

use crate::calendar::{format_thai_date, format_thai_month, parse_period, period_of};
use crate::db::models::{FlightPrice, SeasonKind};
use crate::helpers::dec_to_f64;
use crate::services::scores::ScoreBundle;

/// Weight of the price percentile in the season score.
const PRICE_WEIGHT: f64 = 0.60;

/// Weight of the holiday score in the season score.
const HOLIDAY_WEIGHT: f64 = 0.30;

/// Weight of the weather score in the season score.
const WEATHER_WEIGHT: f64 = 0.10;

/// Neutral operand used when a score map is missing a period.
const NEUTRAL_SCORE: f64 = 50.0;

/// Raw (stored) price range of a season. `min == max == 0` is the
/// missing-data sentinel — never a synthetic average, so three empty seasons
/// can't collapse onto identical fabricated prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// The cheapest stored flight of a season.
#[derive(Debug, Clone)]
pub struct BestDeal {
    pub departure_date: chrono::NaiveDate,
    pub return_date: Option<chrono::NaiveDate>,
    /// Thai-formatted date(s) for display.
    pub dates: String,
    /// Raw stored price; pricing rules are applied by the orchestrator.
    pub price: f64,
    pub airline: String,
}

/// One season's classification output.
#[derive(Debug, Clone)]
pub struct SeasonAnalysis {
    pub kind: SeasonKind,
    /// Assigned periods (YYYY-MM), sorted ascending.
    pub periods: Vec<String>,
    /// Thai month names for display, parallel to `periods`.
    pub months: Vec<String>,
    pub price_range: PriceRange,
    pub best_deal: Option<BestDeal>,
    pub description: &'static str,
}

fn season_description(kind: SeasonKind) -> &'static str {
    match kind {
        SeasonKind::Low => "ช่วงราคาประหยัด เหมาะสำหรับการเดินทางแบบคุ้มค่า",
        SeasonKind::Normal => "ช่วงราคาปกติ สมดุลระหว่างราคากับช่วงเวลาเดินทาง",
        SeasonKind::High => "ช่วงราคาสูง ตรงกับเทศกาลและวันหยุดยาว",
    }
}

// ---------------------------------------------------------------------------
// Score composition and splitting
// ---------------------------------------------------------------------------

/// Average stored price per period over the given rows.
pub fn monthly_average_prices(rows: &[FlightPrice]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(period_of(row.departure_date)).or_insert((0.0, 0));
        entry.0 += dec_to_f64(row.price);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(period, (sum, n))| (period, sum / f64::from(n)))
        .collect()
}

/// The weighted season score for one period.
pub fn season_score(price_pct: f64, holiday: f64, weather: f64) -> f64 {
    PRICE_WEIGHT * price_pct + HOLIDAY_WEIGHT * holiday + WEATHER_WEIGHT * weather
}

/// Percentile of a sorted slice with `index = ceil(p/100 · n) − 1`,
/// clamped to 0.
pub fn percentile_threshold(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len() as f64;
    let index = ((p / 100.0 * n).ceil() as isize - 1).max(0) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Season scores per period from the score bundle; only months that have
/// flight data (i.e. appear in `monthly_avg`) receive a score.
pub fn season_scores(
    monthly_avg: &BTreeMap<String, f64>,
    bundle: &ScoreBundle,
) -> BTreeMap<String, f64> {
    monthly_avg
        .keys()
        .map(|period| {
            let get = |m: &HashMap<String, f64>| m.get(period).copied().unwrap_or(NEUTRAL_SCORE);
            let score = season_score(
                get(&bundle.price_pct),
                get(&bundle.holiday),
                get(&bundle.weather),
            );
            (period.clone(), score)
        })
        .collect()
}

/// Tercile-split season scores into Low / Normal / High.
///
/// `score ≤ t33 ⇒ Low`, `score ≥ t67 ⇒ High`; a score qualifying for both
/// (degenerate thresholds) is a tie and falls into Normal.
pub fn classify_periods(scores: &BTreeMap<String, f64>) -> HashMap<String, SeasonKind> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let mut sorted: Vec<f64> = scores.values().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
    let t33 = percentile_threshold(&sorted, 33.0);
    let t67 = percentile_threshold(&sorted, 67.0);

    scores
        .iter()
        .map(|(period, &score)| {
            let is_low = score <= t33;
            let is_high = score >= t67;
            let kind = match (is_low, is_high) {
                (true, true) => SeasonKind::Normal,
                (true, false) => SeasonKind::Low,
                (false, true) => SeasonKind::High,
                (false, false) => SeasonKind::Normal,
            };
            (period.clone(), kind)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Season assembly
// ---------------------------------------------------------------------------

/// Build the ordered [Low, Normal, High] season analyses for a window's rows.
pub fn build_seasons(rows: &[FlightPrice], bundle: &ScoreBundle) -> Vec<SeasonAnalysis> {
    let monthly_avg = monthly_average_prices(rows);
    let scores = season_scores(&monthly_avg, bundle);
    let assignment = classify_periods(&scores);

    [SeasonKind::Low, SeasonKind::Normal, SeasonKind::High]
        .into_iter()
        .map(|kind| {
            let mut periods: Vec<String> = assignment
                .iter()
                .filter(|(_, k)| **k == kind)
                .map(|(p, _)| p.clone())
                .collect();
            periods.sort();

            let months = periods
                .iter()
                .filter_map(|p| parse_period(p))
                .map(|(y, m)| format_thai_month(y, m))
                .collect();

            let season_rows: Vec<&FlightPrice> = rows
                .iter()
                .filter(|r| periods.contains(&period_of(r.departure_date)))
                .collect();

            SeasonAnalysis {
                kind,
                price_range: price_range_for(&season_rows, &periods, rows),
                best_deal: best_deal_for(&season_rows),
                periods,
                months,
                description: season_description(kind),
            }
        })
        .collect()
}

/// Min/max of raw stored prices for a season's rows. When the period filter
/// matches nothing, refilter by month-of-year alone before falling back to
/// the 0/0 sentinel.
fn price_range_for(
    season_rows: &[&FlightPrice],
    periods: &[String],
    all_rows: &[FlightPrice],
) -> PriceRange {
    let range_of = |rows: &[&FlightPrice]| -> Option<PriceRange> {
        let prices: Vec<f64> = rows.iter().map(|r| dec_to_f64(r.price)).collect();
        if prices.is_empty() {
            return None;
        }
        Some(PriceRange {
            min: prices.iter().cloned().fold(f64::INFINITY, f64::min),
            max: prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        })
    };

    if let Some(range) = range_of(season_rows) {
        return range;
    }

    // Same-month refilter: match on month-of-year regardless of year
    let months: Vec<u32> = periods
        .iter()
        .filter_map(|p| parse_period(p))
        .map(|(_, m)| m)
        .collect();
    let refiltered: Vec<&FlightPrice> = all_rows
        .iter()
        .filter(|r| months.contains(&r.departure_date.month()))
        .collect();

    range_of(&refiltered).unwrap_or(PriceRange { min: 0.0, max: 0.0 })
}

/// The cheapest row of a season, formatted for display.
fn best_deal_for(season_rows: &[&FlightPrice]) -> Option<BestDeal> {
    let cheapest = season_rows.iter().min_by(|a, b| {
        a.price.cmp(&b.price).then(a.departure_date.cmp(&b.departure_date))
    })?;

    let mut dates = format_thai_date(cheapest.departure_date);
    if let Some(ret) = cheapest.return_date {
        dates.push_str(" - ");
        dates.push_str(&format_thai_date(ret));
    }

    Some(BestDeal {
        departure_date: cheapest.departure_date,
        return_date: cheapest.return_date,
        dates,
        price: dec_to_f64(cheapest.price),
        airline: cheapest
            .airline_name_th
            .clone()
            .unwrap_or_else(|| cheapest.airline_name.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::test_flight as test_row;

    fn bundle_for(periods: &[(&str, f64, f64, f64)]) -> ScoreBundle {
        let mut bundle = ScoreBundle::default();
        for (p, price, holiday, weather) in periods {
            bundle.price_pct.insert(p.to_string(), *price);
            bundle.holiday.insert(p.to_string(), *holiday);
            bundle.weather.insert(p.to_string(), *weather);
        }
        bundle
    }

    #[test]
    fn test_season_score_weights() {
        let s = season_score(100.0, 100.0, 100.0);
        assert!((s - 100.0).abs() < 1e-9);
        let s = season_score(100.0, 0.0, 0.0);
        assert!((s - 60.0).abs() < 1e-9, "price carries 60% of the weight");
        let s = season_score(0.0, 100.0, 0.0);
        assert!((s - 30.0).abs() < 1e-9);
        let s = season_score(0.0, 0.0, 100.0);
        assert!((s - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_threshold_formula() {
        let sorted = [10.0, 20.0, 30.0];
        // ceil(0.33·3) − 1 = 0; ceil(0.67·3) − 1 = 2
        assert_eq!(percentile_threshold(&sorted, 33.0), 10.0);
        assert_eq!(percentile_threshold(&sorted, 67.0), 30.0);
    }

    #[test]
    fn test_three_periods_split_one_each() {
        let mut scores = BTreeMap::new();
        scores.insert("2026-01".to_string(), 30.0);
        scores.insert("2026-02".to_string(), 50.0);
        scores.insert("2026-03".to_string(), 80.0);
        let assignment = classify_periods(&scores);
        assert_eq!(assignment["2026-01"], SeasonKind::Low);
        assert_eq!(assignment["2026-02"], SeasonKind::Normal);
        assert_eq!(assignment["2026-03"], SeasonKind::High);
    }

    #[test]
    fn test_equal_scores_all_normal() {
        let mut scores = BTreeMap::new();
        for p in ["2026-01", "2026-02", "2026-03", "2026-04"] {
            scores.insert(p.to_string(), 55.0);
        }
        let assignment = classify_periods(&scores);
        assert!(
            assignment.values().all(|k| *k == SeasonKind::Normal),
            "ties between t33 and t67 fall into Normal"
        );
    }

    #[test]
    fn test_classification_idempotent() {
        let mut scores = BTreeMap::new();
        scores.insert("2026-01".to_string(), 42.0);
        scores.insert("2026-02".to_string(), 58.0);
        scores.insert("2026-03".to_string(), 71.0);
        scores.insert("2026-04".to_string(), 64.0);
        assert_eq!(classify_periods(&scores), classify_periods(&scores));
    }

    #[test]
    fn test_monthly_average_prices() {
        let rows = vec![
            test_row("2026-01-05", 1000),
            test_row("2026-01-20", 2000),
            test_row("2026-02-10", 3000),
        ];
        let avg = monthly_average_prices(&rows);
        assert_eq!(avg["2026-01"], 1500.0);
        assert_eq!(avg["2026-02"], 3000.0);
    }

    #[test]
    fn test_build_seasons_ordered_low_normal_high() {
        let rows = vec![
            test_row("2026-01-10", 1000),
            test_row("2026-02-10", 2000),
            test_row("2026-03-10", 3000),
        ];
        let bundle = bundle_for(&[
            ("2026-01", 33.3, 50.0, 50.0),
            ("2026-02", 66.7, 50.0, 50.0),
            ("2026-03", 100.0, 80.0, 60.0),
        ]);
        let seasons = build_seasons(&rows, &bundle);
        assert_eq!(seasons.len(), 3);
        assert_eq!(seasons[0].kind, SeasonKind::Low);
        assert_eq!(seasons[1].kind, SeasonKind::Normal);
        assert_eq!(seasons[2].kind, SeasonKind::High);
        assert_eq!(seasons[0].periods, vec!["2026-01"]);
        assert_eq!(seasons[2].periods, vec!["2026-03"]);
        assert_eq!(seasons[0].months, vec!["มกราคม 2569"]);

        let low_deal = seasons[0].best_deal.as_ref().unwrap();
        assert_eq!(low_deal.price, 1000.0);
        assert_eq!(low_deal.airline, "ไทยแอร์เอเชีย", "localized airline name preferred");
        assert_eq!(seasons[0].price_range, PriceRange { min: 1000.0, max: 1000.0 });
    }

    #[test]
    fn test_empty_season_uses_zero_sentinel() {
        // Two months only: High gets no period with this score spread
        let rows = vec![test_row("2026-01-10", 1000), test_row("2026-02-10", 2000)];
        let bundle = bundle_for(&[("2026-01", 50.0, 50.0, 50.0), ("2026-02", 100.0, 50.0, 50.0)]);
        let seasons = build_seasons(&rows, &bundle);
        let empty: Vec<_> = seasons.iter().filter(|s| s.periods.is_empty()).collect();
        assert!(!empty.is_empty(), "at least one season has no months here");
        for s in empty {
            assert_eq!(
                s.price_range,
                PriceRange { min: 0.0, max: 0.0 },
                "{:?} without months reports the sentinel",
                s.kind
            );
            assert!(s.best_deal.is_none());
        }
    }

    #[test]
    fn test_months_without_flights_not_classified() {
        let rows = vec![test_row("2026-01-10", 1000)];
        let bundle = bundle_for(&[
            ("2026-01", 50.0, 50.0, 50.0),
            // Score maps mention 2026-02 but no flight rows exist for it
            ("2026-02", 80.0, 50.0, 50.0),
        ]);
        let seasons = build_seasons(&rows, &bundle);
        let all_periods: Vec<&String> = seasons.iter().flat_map(|s| &s.periods).collect();
        assert_eq!(all_periods, vec!["2026-01"], "only months with data are classified");
    }
}
