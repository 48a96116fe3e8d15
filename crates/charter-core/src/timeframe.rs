//! Timeframe types and tick-to-bar rollover.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::bar::Bar;

/// Timeframe enumeration for different chart periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    Sec1,
    Sec5,
    Sec15,
    Sec30,
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl Timeframe {
    /// Returns the duration of this timeframe in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Sec1 => 1,
            Timeframe::Sec5 => 5,
            Timeframe::Sec15 => 15,
            Timeframe::Sec30 => 30,
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 5 * 60,
            Timeframe::Min15 => 15 * 60,
            Timeframe::Min30 => 30 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Day1 => 24 * 60 * 60,
            Timeframe::Week1 => 7 * 24 * 60 * 60,
        }
    }

    /// Returns a short label for this timeframe.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Sec1 => "1s",
            Timeframe::Sec5 => "5s",
            Timeframe::Sec15 => "15s",
            Timeframe::Sec30 => "30s",
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }

    /// Returns all available timeframes in order.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Sec1,
            Timeframe::Sec5,
            Timeframe::Sec15,
            Timeframe::Sec30,
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Min30,
            Timeframe::Hour1,
            Timeframe::Hour4,
            Timeframe::Day1,
            Timeframe::Week1,
        ]
    }

    /// Whether bars are shorter than one minute.
    pub fn is_sub_minute(&self) -> bool {
        self.seconds() < 60
    }

    /// How often the poll fallback refreshes the latest bar.
    pub fn poll_interval(&self) -> Duration {
        if self.is_sub_minute() {
            Duration::from_millis(1000)
        } else {
            Duration::from_millis(30_000)
        }
    }

    /// Start of the bucket containing `time` (Unix seconds).
    pub fn bucket_start(&self, time: i64) -> i64 {
        time.div_euclid(self.seconds()) * self.seconds()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a timeframe label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeframeError(pub String);

impl fmt::Display for ParseTimeframeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeframe: {}", self.0)
    }
}

impl std::error::Error for ParseTimeframeError {}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    /// Accepts labels (`"1m"`, `"4h"`) and raw second counts (`"60s"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(tf) = Timeframe::all().iter().find(|tf| tf.label() == trimmed) {
            return Ok(*tf);
        }

        trimmed
            .strip_suffix('s')
            .and_then(|n| n.parse::<i64>().ok())
            .and_then(|secs| Timeframe::all().iter().find(|tf| tf.seconds() == secs))
            .copied()
            .ok_or_else(|| ParseTimeframeError(s.to_string()))
    }
}

/// Result of rolling one tick into the in-progress bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// First tick seen; a new bar was opened.
    Opened(Bar),
    /// The tick fell inside the current bucket.
    Updated(Bar),
    /// The tick crossed a bucket boundary: `closed` is final, `opened` starts
    /// the new bucket.
    Rolled { closed: Bar, opened: Bar },
    /// The tick belongs to a bucket older than the current bar.
    Stale,
}

/// Builds bars from ticks with explicit bucket-boundary detection.
#[derive(Debug, Clone)]
pub struct TickAggregator {
    timeframe: Timeframe,
    current: Option<Bar>,
}

impl TickAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            current: None,
        }
    }

    /// Continue from an existing bar, typically the last stored one.
    pub fn seed(&mut self, bar: Option<Bar>) {
        self.current = bar;
    }

    /// The in-progress bar.
    pub fn current(&self) -> Option<&Bar> {
        self.current.as_ref()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Rolls a trade at `price` for `size` at `time` (Unix seconds) into the
    /// in-progress bar.
    pub fn apply(&mut self, price: f64, size: f64, time: i64) -> TickOutcome {
        let bucket = self.timeframe.bucket_start(time);

        let Some(mut bar) = self.current else {
            let opened = Bar::flat(bucket, price, size);
            self.current = Some(opened);
            return TickOutcome::Opened(opened);
        };

        if bucket < bar.time {
            return TickOutcome::Stale;
        }

        if bucket > bar.time {
            let opened = Bar::flat(bucket, price, size);
            self.current = Some(opened);
            return TickOutcome::Rolled {
                closed: bar,
                opened,
            };
        }

        bar.high = bar.high.max(price);
        bar.low = bar.low.min(price);
        bar.close = price;
        bar.volume += size;
        self.current = Some(bar);
        TickOutcome::Updated(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_and_seconds() {
        assert_eq!("1m".parse::<Timeframe>(), Ok(Timeframe::Min1));
        assert_eq!("60s".parse::<Timeframe>(), Ok(Timeframe::Min1));
        assert_eq!("5s".parse::<Timeframe>(), Ok(Timeframe::Sec5));
        assert_eq!(" 4h ".parse::<Timeframe>(), Ok(Timeframe::Hour4));
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_poll_interval_depends_on_granularity() {
        assert_eq!(Timeframe::Sec5.poll_interval(), Duration::from_millis(1000));
        assert_eq!(Timeframe::Min1.poll_interval(), Duration::from_millis(30_000));
        assert_eq!(Timeframe::Day1.poll_interval(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_bucket_start() {
        assert_eq!(Timeframe::Min1.bucket_start(125), 120);
        assert_eq!(Timeframe::Min5.bucket_start(299), 0);
        assert_eq!(Timeframe::Min1.bucket_start(-1), -60);
    }

    #[test]
    fn test_tick_updates_current_bucket() {
        let mut agg = TickAggregator::new(Timeframe::Min1);
        assert!(matches!(agg.apply(100.0, 1.0, 60), TickOutcome::Opened(_)));

        let outcome = agg.apply(105.0, 2.0, 90);
        let TickOutcome::Updated(bar) = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(bar.time, 60);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.close, 105.0);
        assert_eq!(bar.volume, 3.0);
    }

    #[test]
    fn test_tick_rolls_over_bucket_boundary() {
        let mut agg = TickAggregator::new(Timeframe::Min1);
        agg.seed(Some(Bar::new(60, 100.0, 110.0, 95.0, 101.0, 5.0)));

        let outcome = agg.apply(99.0, 1.0, 121);
        let TickOutcome::Rolled { closed, opened } = outcome else {
            panic!("expected rollover, got {outcome:?}");
        };
        assert_eq!(closed.time, 60);
        assert_eq!(closed.close, 101.0);
        assert_eq!(opened.time, 120);
        assert_eq!(opened.open, 99.0);
        assert_eq!(agg.current().map(|b| b.time), Some(120));
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let mut agg = TickAggregator::new(Timeframe::Min1);
        agg.seed(Some(Bar::flat(120, 100.0, 0.0)));
        assert_eq!(agg.apply(50.0, 1.0, 30), TickOutcome::Stale);
        assert_eq!(agg.current().map(|b| b.close), Some(100.0));
    }
}
