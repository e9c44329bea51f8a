//! Pricing rules applied to every displayed money value.
//!
//! Stored prices are round-trip, per adult, already seasoned (seasonal,
//! holiday and variation multipliers baked in at ingestion). This module
//! only scales for the passenger mix, halves one-way trips, and knows the
//! cabin multipliers for data that is not already cabin-filtered.

use serde::{Deserialize, Serialize};

use crate::db::models::{CabinClass, TripType};
use crate::helpers::round_price;

/// Fraction of the adult fare charged per child.
const CHILD_FARE_FACTOR: f64 = 0.75;

/// Fraction of the adult fare charged per infant.
const INFANT_FARE_FACTOR: f64 = 0.1;

/// Stored prices model a round trip; one-way fares are half.
const ONE_WAY_FACTOR: f64 = 0.5;

/// Passenger mix for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerMix {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
}

impl Default for PassengerMix {
    fn default() -> Self {
        Self { adults: 1, children: 0, infants: 0 }
    }
}

impl PassengerMix {
    /// Combined fare factor: adults + 0.75·children + 0.1·infants.
    pub fn fare_factor(self) -> f64 {
        f64::from(self.adults)
            + CHILD_FARE_FACTOR * f64::from(self.children)
            + INFANT_FARE_FACTOR * f64::from(self.infants)
    }
}

/// Displayed price for a stored price under a passenger mix and trip type.
///
/// `round(p · (A + 0.75·C + 0.1·I))`, halved for one-way trips. Rounding
/// happens once, after both scalings.
pub fn display_price(stored_price: f64, passengers: PassengerMix, trip_type: TripType) -> i64 {
    let mut total = stored_price * passengers.fare_factor();
    if trip_type == TripType::OneWay {
        total *= ONE_WAY_FACTOR;
    }
    round_price(total)
}

/// Cabin multiplier for stores that are NOT already cabin-filtered.
///
/// The storage layer filters flight rows by cabin class at query time, so
/// the normal analysis path never applies this; it exists for callers that
/// start from economy-only data.
pub fn cabin_multiplier(cabin: CabinClass) -> f64 {
    match cabin {
        CabinClass::Economy => 1.0,
        CabinClass::Business => 2.5,
        CabinClass::First => 4.0,
    }
}
