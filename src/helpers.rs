//! Shared helpers for Decimal ↔ f64 conversions.
//!
//! Stored numerics (prices, weather values, scores) are rounded to 2 decimal
//! places; carbon emissions are converted from grams to kilograms at 1
//! decimal place for display. Non-finite inputs (NaN, ±Inf) become
//! `Decimal::ZERO`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Convert an f64 to Decimal, rounded to 2 decimal places.
///
/// Used for all stored numerics (temperatures, rain, humidity, scores,
/// prices) so repeated ingestion produces identical rows for dedup.
pub fn f64_to_decimal_2dp(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_2dp received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_str_exact(&format!("{:.2}", v)).unwrap_or_default()
}

/// Convert an optional f64 to Decimal (2 decimal places).
pub fn opt_f64_to_decimal_2dp(v: Option<f64>) -> Option<Decimal> {
    v.map(f64_to_decimal_2dp)
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be
/// represented. Replaces the repeated `d.to_f64().unwrap_or(0.0)` pattern.
pub fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Convert an Option<Decimal> to Option<f64>.
pub fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

/// Carbon emissions are stored in grams; the catalog displays kilograms
/// with one decimal place.
pub fn grams_to_kg_1dp(grams: i32) -> f64 {
    (f64::from(grams) / 100.0).round() / 10.0
}

/// Round a price for display. Exposed so pricing and forecasting round the
/// same way everywhere (half-away-from-zero, like the upstream data).
pub fn round_price(v: f64) -> i64 {
    if !v.is_finite() {
        return 0;
    }
    v.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_f64_to_decimal_2dp_normal() {
        let d = f64_to_decimal_2dp(3.14159);
        assert_eq!(d, Decimal::from_str("3.14").unwrap());
    }

    #[test]
    fn test_f64_to_decimal_2dp_rounds() {
        // 3.146 rounded to 2dp → 3.15
        let d = f64_to_decimal_2dp(3.146);
        assert_eq!(d, Decimal::from_str("3.15").unwrap());
    }

    #[test]
    fn test_f64_to_decimal_2dp_nan() {
        assert_eq!(f64_to_decimal_2dp(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_f64_to_decimal_2dp_infinity() {
        assert_eq!(f64_to_decimal_2dp(f64::INFINITY), Decimal::ZERO);
        assert_eq!(f64_to_decimal_2dp(f64::NEG_INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_opt_f64_to_decimal_2dp() {
        assert_eq!(opt_f64_to_decimal_2dp(None), None);
        assert_eq!(
            opt_f64_to_decimal_2dp(Some(71.005)),
            Some(Decimal::from_str("71.01").unwrap())
        );
    }

    #[test]
    fn test_dec_to_f64() {
        let d = Decimal::from_str("1234.56").unwrap();
        assert!((dec_to_f64(d) - 1234.56).abs() < 1e-9);
        assert_eq!(dec_to_f64(Decimal::ZERO), 0.0);
    }

    #[test]
    fn test_grams_to_kg_1dp() {
        assert_eq!(grams_to_kg_1dp(96_000), 96.0);
        assert_eq!(grams_to_kg_1dp(96_250), 96.3, "96.25 kg rounds to 96.3");
        assert_eq!(grams_to_kg_1dp(0), 0.0);
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(2849.5), 2850);
        assert_eq!(round_price(2849.4), 2849);
        assert_eq!(round_price(f64::NAN), 0);
    }
}
