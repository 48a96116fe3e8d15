//! Order-flow types.

use serde::{Deserialize, Serialize};

use super::common::{number, optional_number, WireTime};

/// Request body for the order-flow endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct OrderFlowRequest<'a> {
    /// Symbol to analyze.
    pub symbol: &'a str,
    /// Timeframe label.
    pub timeframe: &'a str,
    /// Number of bars.
    pub limit: u32,
    /// Imbalance ratio, only for `/imbalances`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

/// One cumulative delta sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CvdRecord {
    /// Bar time.
    #[serde(alias = "time")]
    pub timestamp: WireTime,
    /// Ask minus bid volume for the bar.
    #[serde(deserialize_with = "number")]
    pub delta: f64,
    /// Running sum of delta.
    #[serde(deserialize_with = "number")]
    pub cumulative_delta: f64,
    /// Bid volume.
    #[serde(default, deserialize_with = "optional_number")]
    pub bid_volume: Option<f64>,
    /// Ask volume.
    #[serde(default, deserialize_with = "optional_number")]
    pub ask_volume: Option<f64>,
}

/// Volume at one price level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceLevelRecord {
    /// Price.
    #[serde(alias = "price_level", deserialize_with = "number")]
    pub price: f64,
    /// Total volume.
    #[serde(deserialize_with = "number")]
    pub volume: f64,
    /// Bid volume.
    #[serde(default, alias = "bid_volume", deserialize_with = "optional_number")]
    pub bid: Option<f64>,
    /// Ask volume.
    #[serde(default, alias = "ask_volume", deserialize_with = "optional_number")]
    pub ask: Option<f64>,
}

/// Footprint for one bar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FootprintRecord {
    /// Bar time.
    #[serde(alias = "time")]
    pub timestamp: WireTime,
    /// Levels, highest price first.
    pub levels: Vec<PriceLevelRecord>,
}

/// Imbalance direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImbalanceKind {
    /// Aggressive buying.
    Buy,
    /// Aggressive selling.
    Sell,
}

/// One diagonal imbalance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImbalanceEntry {
    /// Direction.
    #[serde(rename = "type")]
    pub kind: ImbalanceKind,
    /// Price of the dominant level.
    #[serde(deserialize_with = "number")]
    pub price: f64,
    /// Dominant volume.
    #[serde(deserialize_with = "number")]
    pub volume: f64,
    /// Volume on the opposite diagonal.
    #[serde(deserialize_with = "number")]
    pub compared_to: f64,
}

/// Imbalances found in one bar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImbalanceRecord {
    /// Bar time.
    pub timestamp: WireTime,
    /// Imbalances in level order.
    pub imbalances: Vec<ImbalanceEntry>,
}

/// Volume profile response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VolumeProfileRecord {
    /// Levels, highest price first.
    #[serde(alias = "levels")]
    pub profile: Vec<PriceLevelRecord>,
    /// Point of control.
    #[serde(deserialize_with = "number")]
    pub poc: f64,
    /// Value area high.
    #[serde(deserialize_with = "number")]
    pub vah: f64,
    /// Value area low.
    #[serde(deserialize_with = "number")]
    pub val: f64,
    /// Sum of level volumes.
    #[serde(deserialize_with = "number")]
    pub total_volume: f64,
}
