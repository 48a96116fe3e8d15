//! Order-flow data: cumulative delta, footprint and volume profile.
//!
//! Delta is ask volume minus bid volume: volume traded at the ask is
//! buy-initiated, volume traded at the bid is sell-initiated.

use std::cmp::Ordering;

use crate::bar::Bar;
use crate::series::TimeKeyed;

/// Share of total volume covered by the value area.
pub const VALUE_AREA_SHARE: f64 = 0.70;

/// One cumulative volume delta sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CvdDatum {
    pub time: i64,
    pub delta: f64,
    pub cumulative_delta: f64,
}

impl TimeKeyed for CvdDatum {
    fn time(&self) -> i64 {
        self.time
    }
}

/// Computes cumulative delta over bars in chronological order.
pub fn cumulative_delta(bars: &[Bar]) -> Vec<CvdDatum> {
    let mut running = 0.0;
    bars.iter()
        .map(|bar| {
            let delta = bar.delta();
            running += delta;
            CvdDatum {
                time: bar.time,
                delta,
                cumulative_delta: running,
            }
        })
        .collect()
}

/// Volume traded at one price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
    pub delta: f64,
}

impl PriceLevel {
    pub fn new(price: f64, bid: f64, ask: f64) -> Self {
        Self {
            price,
            volume: bid + ask,
            bid,
            ask,
            delta: ask - bid,
        }
    }

    fn same_price(&self, other: &PriceLevel) -> bool {
        self.price.total_cmp(&other.price) == Ordering::Equal
    }
}

/// Per-bar footprint level.
pub type FootprintLevel = PriceLevel;

/// Session volume profile level.
pub type VolumeProfileLevel = PriceLevel;

/// Side of a diagonal imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImbalanceSide {
    Buy,
    Sell,
}

/// A diagonal bid/ask imbalance between adjacent footprint levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imbalance {
    pub side: ImbalanceSide,
    pub price: f64,
    pub volume: f64,
    pub compared_to: f64,
}

/// Volume at price for a single bar.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintBar {
    pub time: i64,
    /// Levels sorted by price, highest first.
    pub levels: Vec<FootprintLevel>,
}

impl FootprintBar {
    pub fn new(time: i64, levels: Vec<FootprintLevel>) -> Self {
        let mut bar = Self {
            time,
            levels: Vec::with_capacity(levels.len()),
        };
        for level in levels {
            bar.merge_level(level);
        }
        bar
    }

    /// Upserts a level by price; an existing level at the same price is replaced.
    pub fn merge_level(&mut self, level: FootprintLevel) {
        match self.levels.iter_mut().find(|l| l.same_price(&level)) {
            Some(existing) => *existing = level,
            None => {
                let index = self
                    .levels
                    .partition_point(|l| l.price.total_cmp(&level.price) == Ordering::Greater);
                self.levels.insert(index, level);
            }
        }
    }

    /// Merges every level of `other` into this bar.
    pub fn merge(&mut self, other: FootprintBar) {
        for level in other.levels {
            self.merge_level(level);
        }
    }

    /// Detects diagonal imbalances between adjacent levels.
    ///
    /// Compares the ask at each level against the bid one level lower.
    pub fn imbalances(&self, ratio: f64) -> Vec<Imbalance> {
        let mut found = Vec::new();
        for pair in self.levels.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            if upper.ask <= 0.0 || lower.bid <= 0.0 {
                continue;
            }
            if upper.ask > lower.bid * ratio {
                found.push(Imbalance {
                    side: ImbalanceSide::Buy,
                    price: upper.price,
                    volume: upper.ask,
                    compared_to: lower.bid,
                });
            }
            if lower.bid > upper.ask * ratio {
                found.push(Imbalance {
                    side: ImbalanceSide::Sell,
                    price: lower.price,
                    volume: lower.bid,
                    compared_to: upper.ask,
                });
            }
        }
        found
    }
}

impl TimeKeyed for FootprintBar {
    fn time(&self) -> i64 {
        self.time
    }
}

/// Imbalances found in one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarImbalances {
    pub time: i64,
    pub imbalances: Vec<Imbalance>,
}

impl BarImbalances {
    /// Detects imbalances in a footprint bar locally.
    pub fn detect(footprint: &FootprintBar, ratio: f64) -> Self {
        Self {
            time: footprint.time,
            imbalances: footprint.imbalances(ratio),
        }
    }
}

impl TimeKeyed for BarImbalances {
    fn time(&self) -> i64 {
        self.time
    }
}

/// Volume profile over a time range with its point of control and value area.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeProfile {
    /// Levels sorted by price, highest first.
    pub levels: Vec<VolumeProfileLevel>,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub total_volume: f64,
}

impl VolumeProfile {
    /// Builds a profile and derives POC and the 70% value area.
    pub fn from_levels(mut levels: Vec<VolumeProfileLevel>) -> Self {
        levels.sort_by(|a, b| b.price.total_cmp(&a.price));
        levels.dedup_by(|next, kept| {
            let same = next.same_price(kept);
            if same {
                *kept = *next;
            }
            same
        });

        let total_volume: f64 = levels.iter().map(|l| l.volume).sum();

        let mut poc = (0.0, 0.0);
        for level in &levels {
            if level.volume > poc.1 {
                poc = (level.price, level.volume);
            }
        }

        let mut by_volume: Vec<&VolumeProfileLevel> = levels.iter().collect();
        by_volume.sort_by(|a, b| b.volume.total_cmp(&a.volume));

        let target = total_volume * VALUE_AREA_SHARE;
        let mut covered = 0.0;
        let mut vah = 0.0_f64;
        let mut val = f64::INFINITY;
        for level in by_volume {
            covered += level.volume;
            vah = vah.max(level.price);
            val = val.min(level.price);
            if covered >= target {
                break;
            }
        }
        if val.is_infinite() {
            val = 0.0;
        }

        Self {
            levels,
            poc: poc.0,
            vah,
            val,
            total_volume,
        }
    }

    /// Largest level volume, used to normalize histogram widths.
    pub fn max_volume(&self) -> f64 {
        self.levels.iter().map(|l| l.volume).fold(0.0, f64::max)
    }
}

/// Order-flow payloads, one variant per flow type.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderFlowUpdate {
    /// CVD samples; merged with the series discipline.
    Cvd(Vec<CvdDatum>),
    /// Full footprint snapshot; replaces stored footprint.
    Footprint(Vec<FootprintBar>),
    /// Incremental footprint for one bar; levels dedup by price.
    FootprintPush(FootprintBar),
    /// Per-bar imbalances; merged with the series discipline.
    Imbalances(Vec<BarImbalances>),
    /// Full volume profile snapshot.
    VolumeProfile(VolumeProfile),
}
