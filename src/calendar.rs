//! Calendar utilities: long-weekend detection, Thai month names, Thai date
//! formatting, period (YYYY-MM) arithmetic, and the deterministic seeded
//! pseudo-random generator used for reproducible fallback scores.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Thai month names, indexed by month − 1.
pub const THAI_MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

/// Offset between the Common Era and the Buddhist Era used in Thai dates.
const BUDDHIST_ERA_OFFSET: i32 = 543;

// ---------------------------------------------------------------------------
// Long weekends
// ---------------------------------------------------------------------------

/// True if the date makes a long weekend: it falls on Friday or Monday, or
/// either adjacent day is Saturday/Sunday.
pub fn is_long_weekend(date: NaiveDate) -> bool {
    let wd = date.weekday();
    if wd == Weekday::Fri || wd == Weekday::Mon {
        return true;
    }
    let prev = (date - Duration::days(1)).weekday();
    let next = (date + Duration::days(1)).weekday();
    matches!(prev, Weekday::Sat | Weekday::Sun) || matches!(next, Weekday::Sat | Weekday::Sun)
}

// ---------------------------------------------------------------------------
// Thai month names
// ---------------------------------------------------------------------------

/// Thai month name for a 1–12 month index.
pub fn thai_month_name(month: u32) -> Option<&'static str> {
    THAI_MONTHS.get(month as usize - 1).copied()
}

/// Resolve a Thai month name back to its 1–12 index. Tries an exact match
/// first, then substring containment in either direction (upstream data
/// sometimes carries prefixes like "เดือนมกราคม").
pub fn thai_month_index(name: &str) -> Option<u32> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    for (i, m) in THAI_MONTHS.iter().enumerate() {
        if *m == trimmed {
            return Some(i as u32 + 1);
        }
    }
    for (i, m) in THAI_MONTHS.iter().enumerate() {
        if trimmed.contains(m) || m.contains(trimmed) {
            return Some(i as u32 + 1);
        }
    }
    None
}

/// Format a date in Thai convention: "13 เมษายน 2569" (Buddhist-era year).
pub fn format_thai_date(date: NaiveDate) -> String {
    let month = thai_month_name(date.month()).unwrap_or("");
    format!("{} {} {}", date.day(), month, date.year() + BUDDHIST_ERA_OFFSET)
}

/// Format a period's month in Thai convention: "เมษายน 2569".
pub fn format_thai_month(year: i32, month: u32) -> String {
    let name = thai_month_name(month).unwrap_or("");
    format!("{} {}", name, year + BUDDHIST_ERA_OFFSET)
}

// ---------------------------------------------------------------------------
// Periods (YYYY-MM)
// ---------------------------------------------------------------------------

/// The YYYY-MM period string for a date.
pub fn period_of(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parse a YYYY-MM period into (year, month).
pub fn parse_period(period: &str) -> Option<(i32, u32)> {
    let (y, m) = period.split_once('-')?;
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

/// First day of a period's month.
pub fn period_start(period: &str) -> Option<NaiveDate> {
    let (y, m) = parse_period(period)?;
    NaiveDate::from_ymd_opt(y, m, 1)
}

/// Add a (possibly negative) number of calendar months to a date, clamping
/// the day to the target month's length.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month() as i32 - 1 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is always valid")
}

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid first of month");
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid first of month");
    (next - first).num_days() as u32
}

/// Last day of a date's calendar month.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("valid first");
    add_months(first, 1) - Duration::days(1)
}

// ---------------------------------------------------------------------------
// Deterministic PRNG
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random value in [0, 1) from a seed string.
///
/// 32-bit rolling hash `h = (h << 5) − h + c` over the seed's characters
/// (wrapping), mapped through `(|h| mod 10^6) / 10^6`. The same seed yields
/// the same value across runs and processes, which keeps fabricated scores
/// reproducible.
pub fn seeded_unit(seed: &str) -> f64 {
    let mut h: i32 = 0;
    for c in seed.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32);
    }
    f64::from(h.unsigned_abs() % 1_000_000) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_long_weekend_friday_and_monday() {
        // 2026-04-10 is a Friday, 2026-04-13 a Monday
        assert!(is_long_weekend(d("2026-04-10")), "Friday is a long weekend");
        assert!(is_long_weekend(d("2026-04-13")), "Monday is a long weekend");
    }

    #[test]
    fn test_long_weekend_weekend_days() {
        assert!(is_long_weekend(d("2026-04-11")), "Saturday borders Sunday");
        assert!(is_long_weekend(d("2026-04-12")), "Sunday borders Saturday");
    }

    #[test]
    fn test_midweek_is_not_long_weekend() {
        // 2026-04-15 is a Wednesday
        assert!(!is_long_weekend(d("2026-04-15")));
        // 2026-04-14 is a Tuesday
        assert!(!is_long_weekend(d("2026-04-14")));
    }

    #[test]
    fn test_thai_month_round_trip() {
        for m in 1..=12u32 {
            let name = thai_month_name(m).unwrap();
            assert_eq!(thai_month_index(name), Some(m), "exact match for {}", name);
        }
    }

    #[test]
    fn test_thai_month_substring_match() {
        assert_eq!(thai_month_index("เดือนมกราคม"), Some(1));
        assert_eq!(thai_month_index("  เมษายน "), Some(4));
        assert_eq!(thai_month_index("January"), None);
        assert_eq!(thai_month_index(""), None);
    }

    #[test]
    fn test_format_thai_date_buddhist_era() {
        assert_eq!(format_thai_date(d("2026-04-13")), "13 เมษายน 2569");
        assert_eq!(format_thai_month(2026, 12), "ธันวาคม 2569");
    }

    #[test]
    fn test_period_of_and_parse() {
        assert_eq!(period_of(d("2026-04-13")), "2026-04");
        assert_eq!(parse_period("2026-04"), Some((2026, 4)));
        assert_eq!(parse_period("2026-13"), None);
        assert_eq!(parse_period("garbage"), None);
        assert_eq!(period_start("2026-04"), Some(d("2026-04-01")));
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(d("2026-01-31"), 1), d("2026-02-28"));
        assert_eq!(add_months(d("2026-03-15"), -3), d("2025-12-15"));
        assert_eq!(add_months(d("2026-11-30"), 3), d("2027-02-28"));
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2026, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29, "leap year");
        assert_eq!(days_in_month(2026, 4), 30);
        assert_eq!(days_in_month(2026, 12), 31);
    }

    #[test]
    fn test_end_of_month() {
        assert_eq!(end_of_month(d("2026-04-13")), d("2026-04-30"));
        assert_eq!(end_of_month(d("2026-02-01")), d("2026-02-28"));
    }

    #[test]
    fn test_seeded_unit_deterministic() {
        let a = seeded_unit("2026-04");
        let b = seeded_unit("2026-04");
        assert_eq!(a, b, "same seed must yield identical values");
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn test_seeded_unit_varies_with_seed() {
        let a = seeded_unit("2026-04-BKK-HKT");
        let b = seeded_unit("2026-04-BKK-CNX");
        assert_ne!(a, b, "different routes should get different mock curves");
    }

    #[test]
    fn test_seeded_unit_empty_seed() {
        assert_eq!(seeded_unit(""), 0.0);
    }
}
