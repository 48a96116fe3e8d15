//! Ordered, capped series of time-keyed items.
//!
//! [`Series`] is the reconciliation point for every stream that feeds the
//! chart. Items arrive from historical loads, push messages and poll
//! responses in no guaranteed order; the series keeps them strictly
//! ascending by time, unique per time key, and bounded by a retention cap
//! that evicts the oldest items first.

use std::collections::BTreeMap;

/// Default number of most-recent items kept per series.
pub const DEFAULT_RETENTION: usize = 500;

/// Items that carry a time key (Unix seconds).
pub trait TimeKeyed {
    fn time(&self) -> i64;
}

/// What a single [`Series::merge_one`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The series was empty.
    Inserted,
    /// Appended after the last item; `evicted` items were dropped from the head.
    Appended { evicted: usize },
    /// Same time as the last item, replaced in place.
    UpdatedLast,
    /// An older item with the same time was replaced in place.
    Corrected { index: usize },
    /// No item had that time; inserted at its sorted position.
    Backfilled { index: usize, evicted: usize },
}

/// Time-ordered sequence with dedup-by-time and a retention cap.
#[derive(Debug, Clone)]
pub struct Series<T> {
    items: Vec<T>,
    retention: usize,
}

impl<T: TimeKeyed> Series<T> {
    /// Creates an empty series with the default retention cap.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Creates an empty series keeping at most `retention` items.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            items: Vec::with_capacity(retention.min(DEFAULT_RETENTION)),
            retention: retention.max(1),
        }
    }

    /// Replaces the whole series.
    ///
    /// Input is expected ascending; it is re-sorted if not. Duplicate times
    /// keep the item that appears last in the input.
    pub fn replace<I: IntoIterator<Item = T>>(&mut self, items: I) {
        let mut incoming: Vec<T> = items.into_iter().collect();
        if !incoming.windows(2).all(|w| w[0].time() <= w[1].time()) {
            // Stable, so equal times keep input order for the dedup below.
            incoming.sort_by_key(|item| item.time());
        }

        let mut deduped: Vec<T> = Vec::with_capacity(incoming.len());
        for item in incoming {
            match deduped.last_mut() {
                Some(last) if last.time() == item.time() => *last = item,
                _ => deduped.push(item),
            }
        }

        self.items = deduped;
        self.evict_head();
    }

    /// Upserts a single item.
    ///
    /// Applying the same item twice leaves the series unchanged after the
    /// first call. Ordering and the retention cap hold after every call.
    pub fn merge_one(&mut self, item: T) -> MergeOutcome {
        let time = item.time();
        let Some(last_time) = self.items.last().map(TimeKeyed::time) else {
            self.items.push(item);
            return MergeOutcome::Inserted;
        };

        if time == last_time {
            let last = self.items.len() - 1;
            self.items[last] = item;
            return MergeOutcome::UpdatedLast;
        }

        if time > last_time {
            self.items.push(item);
            let evicted = self.evict_head();
            return MergeOutcome::Appended { evicted };
        }

        match self.items.binary_search_by_key(&time, TimeKeyed::time) {
            Ok(index) => {
                self.items[index] = item;
                MergeOutcome::Corrected { index }
            }
            Err(index) => {
                self.items.insert(index, item);
                let evicted = self.evict_head();
                MergeOutcome::Backfilled {
                    index: index.saturating_sub(evicted),
                    evicted,
                }
            }
        }
    }

    /// Merges a batch with last-applied-wins on equal times.
    ///
    /// Incoming items override stored ones, and later incoming items override
    /// earlier ones. The result is ascending and truncated to the most
    /// recent `retention` items.
    pub fn merge_batch<I: IntoIterator<Item = T>>(&mut self, items: I) {
        let mut merged: BTreeMap<i64, T> = self
            .items
            .drain(..)
            .map(|item| (item.time(), item))
            .collect();
        for item in items {
            merged.insert(item.time(), item);
        }
        self.items = merged.into_values().collect();
        self.evict_head();
    }

    /// Read-only view of the ordered items.
    pub fn snapshot(&self) -> &[T] {
        &self.items
    }

    /// Looks up an item by its time key.
    pub fn find(&self, time: i64) -> Option<&T> {
        self.items
            .binary_search_by_key(&time, TimeKeyed::time)
            .ok()
            .map(|index| &self.items[index])
    }

    /// Returns the most recent item.
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the series holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items kept.
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn evict_head(&mut self) -> usize {
        let excess = self.items.len().saturating_sub(self.retention);
        if excess > 0 {
            self.items.drain(..excess);
        }
        excess
    }
}

impl<T: TimeKeyed> Default for Series<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Point {
        time: i64,
        value: f64,
    }

    impl TimeKeyed for Point {
        fn time(&self) -> i64 {
            self.time
        }
    }

    fn p(time: i64, value: f64) -> Point {
        Point { time, value }
    }

    fn times(series: &Series<Point>) -> Vec<i64> {
        series.snapshot().iter().map(|p| p.time).collect()
    }

    #[test]
    fn test_replace_sorts_and_dedups_last_wins() {
        let mut series = Series::new();
        series.replace(vec![p(3, 1.0), p(1, 1.0), p(3, 2.0), p(2, 1.0)]);
        assert_eq!(times(&series), vec![1, 2, 3]);
        assert_eq!(series.last().map(|p| p.value), Some(2.0));
    }

    #[test]
    fn test_merge_one_into_empty() {
        let mut series = Series::new();
        assert_eq!(series.merge_one(p(10, 1.0)), MergeOutcome::Inserted);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_merge_one_out_of_order_correction() {
        let mut series = Series::new();
        series.replace(vec![p(1, 1.0), p(2, 1.0), p(3, 1.0)]);
        assert_eq!(
            series.merge_one(p(2, 9.0)),
            MergeOutcome::Corrected { index: 1 }
        );
        assert_eq!(series.find(2).map(|p| p.value), Some(9.0));
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_merge_one_backfills_missing_time() {
        let mut series = Series::new();
        series.replace(vec![p(1, 1.0), p(3, 1.0)]);
        assert_eq!(
            series.merge_one(p(2, 5.0)),
            MergeOutcome::Backfilled { index: 1, evicted: 0 }
        );
        assert_eq!(times(&series), vec![1, 2, 3]);
    }

    #[test]
    fn test_backfill_older_than_window_is_evicted() {
        let mut series = Series::with_retention(2);
        series.replace(vec![p(5, 1.0), p(6, 1.0)]);
        let outcome = series.merge_one(p(1, 1.0));
        assert_eq!(outcome, MergeOutcome::Backfilled { index: 0, evicted: 1 });
        assert_eq!(times(&series), vec![5, 6]);
    }

    #[test]
    fn test_merge_batch_last_applied_wins() {
        let mut series = Series::new();
        series.replace(vec![p(1, 1.0), p(2, 1.0)]);
        series.merge_batch(vec![p(2, 7.0), p(4, 1.0), p(3, 1.0), p(2, 8.0)]);
        assert_eq!(times(&series), vec![1, 2, 3, 4]);
        assert_eq!(series.find(2).map(|p| p.value), Some(8.0));
    }

    #[test]
    fn test_merge_batch_truncates_to_most_recent() {
        let mut series = Series::with_retention(3);
        series.merge_batch((1..=5).map(|t| p(t, 0.0)));
        assert_eq!(times(&series), vec![3, 4, 5]);
    }

    #[test]
    fn test_zero_retention_keeps_one() {
        let series: Series<Point> = Series::with_retention(0);
        assert_eq!(series.retention(), 1);
    }
}
