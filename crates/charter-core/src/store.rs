//! Series store for one chart subscription.

use std::fmt;

use crate::bar::Bar;
use crate::orderflow::{BarImbalances, CvdDatum, FootprintBar, OrderFlowUpdate, VolumeProfile};
use crate::series::{MergeOutcome, Series, DEFAULT_RETENTION};
use crate::timeframe::Timeframe;

/// Identifies the series a store holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Canonical bars and order-flow series for a `(symbol, timeframe)` key.
///
/// The store is the only writer of its series. It does not validate
/// incoming data; callers reject malformed bars before merging.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    key: SeriesKey,
    bars: Series<Bar>,
    cvd: Series<CvdDatum>,
    footprint: Series<FootprintBar>,
    imbalances: Series<BarImbalances>,
    volume_profile: Option<VolumeProfile>,
    revision: u64,
}

impl SeriesStore {
    pub fn new(key: SeriesKey) -> Self {
        Self::with_retention(key, DEFAULT_RETENTION)
    }

    pub fn with_retention(key: SeriesKey, retention: usize) -> Self {
        Self {
            key,
            bars: Series::with_retention(retention),
            cvd: Series::with_retention(retention),
            footprint: Series::with_retention(retention),
            imbalances: Series::with_retention(retention),
            volume_profile: None,
            revision: 0,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Bumped on every mutation; renderers redraw when it changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Establishes the bar series from a historical load.
    pub fn replace(&mut self, bars: Vec<Bar>) {
        self.bars.replace(bars);
        self.revision += 1;
    }

    /// Upserts one bar from a push or poll update.
    pub fn merge_one(&mut self, bar: Bar) -> MergeOutcome {
        let outcome = self.bars.merge_one(bar);
        self.revision += 1;
        outcome
    }

    /// Merges a batched push/poll payload.
    pub fn merge_batch(&mut self, bars: Vec<Bar>) {
        if bars.is_empty() {
            return;
        }
        self.bars.merge_batch(bars);
        self.revision += 1;
    }

    /// Ordered bars, oldest first.
    pub fn snapshot(&self) -> &[Bar] {
        self.bars.snapshot()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn cvd(&self) -> &[CvdDatum] {
        self.cvd.snapshot()
    }

    pub fn footprint(&self) -> &[FootprintBar] {
        self.footprint.snapshot()
    }

    pub fn imbalances(&self) -> &[BarImbalances] {
        self.imbalances.snapshot()
    }

    /// Imbalances recorded for the bar starting at `time`.
    pub fn imbalances_at(&self, time: i64) -> Option<&BarImbalances> {
        self.imbalances.find(time)
    }

    pub fn volume_profile(&self) -> Option<&VolumeProfile> {
        self.volume_profile.as_ref()
    }

    /// Applies an order-flow payload according to its flow type.
    pub fn apply_order_flow(&mut self, update: OrderFlowUpdate) {
        match update {
            OrderFlowUpdate::Cvd(data) => self.cvd.merge_batch(data),
            OrderFlowUpdate::Footprint(bars) => self.footprint.replace(bars),
            OrderFlowUpdate::FootprintPush(bar) => {
                let merged = match self.footprint.find(bar.time) {
                    Some(existing) => {
                        let mut existing = existing.clone();
                        existing.merge(bar);
                        existing
                    }
                    None => bar,
                };
                self.footprint.merge_one(merged);
            }
            OrderFlowUpdate::Imbalances(found) => self.imbalances.merge_batch(found),
            OrderFlowUpdate::VolumeProfile(profile) => self.volume_profile = Some(profile),
        }
        self.revision += 1;
    }
}
