//! Core types for the charter application.
//!
//! This crate provides fundamental data structures with no external dependencies:
//! - `Bar` - OHLCV sample keyed by time
//! - `Series` - ordered, capped, deduplicated sequence of time-keyed items
//! - `SeriesStore` - bars and order-flow series for one symbol/timeframe
//! - `Timeframe` - bar durations and tick-to-bar rollover

pub mod bar;
pub mod orderflow;
pub mod series;
pub mod store;
pub mod timeframe;

pub use bar::{Bar, OHLCV};
pub use orderflow::{
    cumulative_delta, BarImbalances, CvdDatum, FootprintBar, FootprintLevel, Imbalance,
    ImbalanceSide, OrderFlowUpdate, PriceLevel, VolumeProfile, VolumeProfileLevel,
};
pub use series::{MergeOutcome, Series, TimeKeyed, DEFAULT_RETENTION};
pub use store::{SeriesKey, SeriesStore};
pub use timeframe::{ParseTimeframeError, TickAggregator, TickOutcome, Timeframe};
