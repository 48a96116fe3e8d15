//! Bar data structures for OHLCV data.

use crate::series::TimeKeyed;

/// One OHLCV sample for a fixed time bucket.
///
/// `time` is the bucket start as Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Volume traded at the bid (sell-initiated).
    pub bid_volume: Option<f64>,
    /// Volume traded at the ask (buy-initiated).
    pub ask_volume: Option<f64>,
    pub trade_count: Option<u32>,
}

impl Bar {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            bid_volume: None,
            ask_volume: None,
            trade_count: None,
        }
    }

    /// A flat bar where every price equals `price`.
    pub fn flat(time: i64, price: f64, volume: f64) -> Self {
        Self::new(time, price, price, price, price, volume)
    }

    /// Attach bid/ask volume split.
    #[must_use]
    pub fn with_order_flow(mut self, bid_volume: f64, ask_volume: f64) -> Self {
        self.bid_volume = Some(bid_volume);
        self.ask_volume = Some(ask_volume);
        self
    }

    /// Attach the number of trades in the bucket.
    #[must_use]
    pub fn with_trade_count(mut self, trade_count: u32) -> Self {
        self.trade_count = Some(trade_count);
        self
    }

    /// Whether the bar closed at or above its open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Ask volume minus bid volume. Missing sides count as zero.
    pub fn delta(&self) -> f64 {
        self.ask_volume.unwrap_or(0.0) - self.bid_volume.unwrap_or(0.0)
    }

    /// Whether every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
            && self.bid_volume.map_or(true, f64::is_finite)
            && self.ask_volume.map_or(true, f64::is_finite)
    }
}

impl TimeKeyed for Bar {
    fn time(&self) -> i64 {
        self.time
    }
}

/// Trait for types that provide OHLCV data.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}
