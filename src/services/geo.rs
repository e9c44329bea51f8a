//! Origin/destination resolution.
//!
//! Converts free-text locations (airport codes, English or Thai city names)
//! into airport-code sets. Multi-airport cities expand to all of their
//! airports — currently only Bangkok ({BKK, DMK}); the table is the policy,
//! extension is a one-line change. Also maps airport codes to the province
//! used for weather lookups.

use crate::errors::AppError;

/// One airport the engine knows about.
struct AirportInfo {
    code: &'static str,
    /// English province name, matching `config::PROVINCES`.
    province: &'static str,
}

const AIRPORTS: &[AirportInfo] = &[
    AirportInfo { code: "BKK", province: "Bangkok" },
    AirportInfo { code: "DMK", province: "Bangkok" },
    AirportInfo { code: "HKT", province: "Phuket" },
    AirportInfo { code: "CNX", province: "Chiang Mai" },
    AirportInfo { code: "CEI", province: "Chiang Rai" },
    AirportInfo { code: "KBV", province: "Krabi" },
    AirportInfo { code: "URT", province: "Surat Thani" },
    AirportInfo { code: "USM", province: "Surat Thani" },
    AirportInfo { code: "HDY", province: "Songkhla" },
    AirportInfo { code: "UTH", province: "Udon Thani" },
    AirportInfo { code: "KKC", province: "Khon Kaen" },
    AirportInfo { code: "UBP", province: "Ubon Ratchathani" },
];

/// City aliases → airport codes. Multi-airport cities list every airport.
const CITY_ALIASES: &[(&str, &[&str])] = &[
    ("bangkok", &["BKK", "DMK"]),
    ("กรุงเทพ", &["BKK", "DMK"]),
    ("กรุงเทพมหานคร", &["BKK", "DMK"]),
    ("phuket", &["HKT"]),
    ("ภูเก็ต", &["HKT"]),
    ("chiang mai", &["CNX"]),
    ("เชียงใหม่", &["CNX"]),
    ("chiang rai", &["CEI"]),
    ("เชียงราย", &["CEI"]),
    ("krabi", &["KBV"]),
    ("กระบี่", &["KBV"]),
    ("surat thani", &["URT"]),
    ("สุราษฎร์ธานี", &["URT"]),
    ("koh samui", &["USM"]),
    ("samui", &["USM"]),
    ("เกาะสมุย", &["USM"]),
    ("hat yai", &["HDY"]),
    ("หาดใหญ่", &["HDY"]),
    ("songkhla", &["HDY"]),
    ("สงขลา", &["HDY"]),
    ("udon thani", &["UTH"]),
    ("อุดรธานี", &["UTH"]),
    ("khon kaen", &["KKC"]),
    ("ขอนแก่น", &["KKC"]),
    ("ubon ratchathani", &["UBP"]),
    ("อุบลราชธานี", &["UBP"]),
];

/// Resolve a textual location into one or more airport codes.
///
/// Accepts an IATA code directly (case-insensitive) or a city alias.
/// Fails fast with `AppError::Input` when nothing matches, per the
/// orchestrator's fail-fast contract.
pub fn resolve_location(input: &str) -> Result<Vec<String>, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::Input("empty origin/destination".to_string()));
    }

    // Direct airport code?
    let upper = trimmed.to_uppercase();
    if AIRPORTS.iter().any(|a| a.code == upper) {
        return Ok(vec![upper]);
    }

    // City alias (ASCII aliases are matched case-insensitively; Thai
    // aliases are already caseless)
    let lower = trimmed.to_lowercase();
    for (alias, codes) in CITY_ALIASES {
        if *alias == lower {
            return Ok(codes.iter().map(|c| c.to_string()).collect());
        }
    }

    Err(AppError::Input(format!(
        "cannot resolve location '{}' to an airport",
        trimmed
    )))
}

/// Province (English name) for an airport code, used for weather lookups.
/// `None` means no mapping exists and weather is treated as neutral.
pub fn airport_province(code: &str) -> Option<&'static str> {
    let upper = code.to_uppercase();
    AIRPORTS.iter().find(|a| a.code == upper).map(|a| a.province)
}
