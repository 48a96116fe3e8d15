//! Validation for inbound market data.
//!
//! Everything from the backend passes through here before reaching a
//! series store; the store itself trusts its input.

use charter_core::{Bar, CvdDatum, PriceLevel};

/// Validate a tick has reasonable values.
pub fn validate_tick(price: f64, size: f64) -> bool {
    price > 0.0 && price.is_finite() && size >= 0.0 && size.is_finite()
}

/// Validate a bar has reasonable values.
pub fn validate_bar(bar: &Bar) -> bool {
    bar.is_finite()
        && bar.high >= bar.low
        && bar.open > 0.0
        && bar.close > 0.0
        && bar.low > 0.0
        && bar.volume >= 0.0
        && bar.bid_volume.map_or(true, |v| v >= 0.0)
        && bar.ask_volume.map_or(true, |v| v >= 0.0)
}

/// Validate a cumulative delta sample.
pub fn validate_cvd(datum: &CvdDatum) -> bool {
    datum.delta.is_finite() && datum.cumulative_delta.is_finite()
}

/// Validate a footprint or profile level.
pub fn validate_level(level: &PriceLevel) -> bool {
    level.price.is_finite()
        && level.price > 0.0
        && level.volume.is_finite()
        && level.volume >= 0.0
        && level.bid.is_finite()
        && level.ask.is_finite()
}
