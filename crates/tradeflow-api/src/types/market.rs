//! Market data types.

use serde::{Deserialize, Serialize};

use super::common::{number, optional_number, WireTime};

/// One bar as returned by `GET /api/v1/market-data/bars`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BarRecord {
    /// Bucket start time.
    #[serde(alias = "timestamp")]
    pub time: WireTime,
    /// Open price.
    #[serde(deserialize_with = "number")]
    pub open: f64,
    /// High price.
    #[serde(deserialize_with = "number")]
    pub high: f64,
    /// Low price.
    #[serde(deserialize_with = "number")]
    pub low: f64,
    /// Close price.
    #[serde(deserialize_with = "number")]
    pub close: f64,
    /// Total volume.
    #[serde(deserialize_with = "number")]
    pub volume: f64,
    /// Volume traded at the bid.
    #[serde(default, deserialize_with = "optional_number")]
    pub bid_volume: Option<f64>,
    /// Volume traded at the ask.
    #[serde(default, deserialize_with = "optional_number")]
    pub ask_volume: Option<f64>,
    /// Number of trades in the bucket.
    #[serde(default, alias = "trade_count")]
    pub number_of_trades: Option<u32>,
    /// Symbol, when the backend includes it.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Timeframe label, when the backend includes it.
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// Query parameters for the bars endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BarsQuery<'a> {
    /// Symbol to load.
    pub symbol: &'a str,
    /// Timeframe label such as `1m`.
    pub timeframe: &'a str,
    /// Maximum number of bars, newest first.
    pub limit: u32,
}

/// A real-time trade/price update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickData {
    /// Last traded price.
    #[serde(alias = "close", alias = "last", deserialize_with = "number")]
    pub price: f64,
    /// Traded size.
    #[serde(default, alias = "volume", alias = "qty", deserialize_with = "optional_number")]
    pub size: Option<f64>,
    /// Trade time.
    #[serde(default, alias = "timestamp")]
    pub time: Option<WireTime>,
}
