//! Ordered, key-unique candle series

use std::cmp::Ordering;
use std::sync::Arc;

use super::{Candle, TimeKey};

/// Candles ascending by time key with no repeated key.
///
/// Cloning is cheap; a clone is a read-only snapshot that later merges do
/// not affect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Arc<[Candle]>,
}

/// Result of merging older candles into an existing series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub conflicts: usize,
}

impl CandleSeries {
    /// Sort ascending and keep the first occurrence of every key.
    ///
    /// Returns the series and the number of duplicates removed.
    pub fn from_unsorted(mut candles: Vec<Candle>) -> (Self, usize) {
        // Stable sort keeps feed order among equal keys, so dedup keeps the first.
        candles.sort_by(|a, b| a.time.cmp(&b.time));
        let before = candles.len();
        candles.dedup_by(|later, earlier| later.time == earlier.time);
        let duplicates = before - candles.len();

        (
            Self {
                candles: candles.into(),
            },
            duplicates,
        )
    }

    /// Merge `incoming` (already sorted and key-unique) into this series.
    ///
    /// Entries already present win over incoming entries with the same key.
    pub fn merge(&self, incoming: &CandleSeries) -> (Self, MergeStats) {
        let mut merged = Vec::with_capacity(self.len() + incoming.len());
        let mut stats = MergeStats::default();
        let mut existing = self.candles.iter().peekable();
        let mut fresh = incoming.candles.iter().peekable();

        loop {
            match (existing.peek(), fresh.peek()) {
                (Some(a), Some(b)) => match a.time.cmp(&b.time) {
                    Ordering::Less => merged.extend(existing.next().cloned()),
                    Ordering::Greater => {
                        stats.added += 1;
                        merged.extend(fresh.next().cloned());
                    }
                    Ordering::Equal => {
                        stats.conflicts += 1;
                        fresh.next();
                        merged.extend(existing.next().cloned());
                    }
                },
                (Some(_), None) => merged.extend(existing.next().cloned()),
                (None, Some(_)) => {
                    stats.added += 1;
                    merged.extend(fresh.next().cloned());
                }
                (None, None) => break,
            }
        }

        (
            Self {
                candles: merged.into(),
            },
            stats,
        )
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn get(&self, key: &TimeKey) -> Option<&Candle> {
        self.candles
            .binary_search_by(|c| c.time.cmp(key))
            .ok()
            .map(|idx| &self.candles[idx])
    }

    /// Lowest low and highest high across the series.
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        let mut iter = self.candles.iter();
        let first = iter.next()?;
        Some(iter.fold((first.low, first.high), |(lo, hi), c| {
            (lo.min(c.low), hi.max(c.high))
        }))
    }

    pub fn is_strictly_ascending(&self) -> bool {
        self.candles.windows(2).all(|w| w[0].time < w[1].time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(secs: i64, close: f64) -> Candle {
        Candle::new(TimeKey::Epoch(secs), close, close + 1.0, close - 1.0, close)
    }

    #[test]
    fn test_sort_and_keep_first_duplicate() {
        let (series, duplicates) = CandleSeries::from_unsorted(vec![
            candle(300, 3.0),
            candle(100, 1.0),
            candle(300, 99.0),
            candle(200, 2.0),
        ]);

        assert_eq!(duplicates, 1);
        assert_eq!(series.len(), 3);
        assert!(series.is_strictly_ascending());
        assert_eq!(series.get(&TimeKey::Epoch(300)).unwrap().close, 3.0);
    }

    #[test]
    fn test_merge_prefers_existing() {
        let (existing, _) = CandleSeries::from_unsorted(vec![candle(200, 2.0), candle(300, 3.0)]);
        let (older, _) = CandleSeries::from_unsorted(vec![
            candle(100, 1.0),
            candle(200, 50.0),
            candle(250, 2.5),
        ]);

        let (merged, stats) = existing.merge(&older);

        assert_eq!(stats, MergeStats { added: 2, conflicts: 1 });
        assert_eq!(merged.len(), 4);
        assert!(merged.is_strictly_ascending());
        assert_eq!(merged.get(&TimeKey::Epoch(200)).unwrap().close, 2.0);
        assert_eq!(merged.first().unwrap().time, TimeKey::Epoch(100));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_merge() {
        let (existing, _) = CandleSeries::from_unsorted(vec![candle(200, 2.0)]);
        let snapshot = existing.clone();
        let (older, _) = CandleSeries::from_unsorted(vec![candle(100, 1.0)]);

        let (merged, _) = existing.merge(&older);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_price_bounds() {
        let (series, _) = CandleSeries::from_unsorted(vec![candle(1, 10.0), candle(2, 20.0)]);
        assert_eq!(series.price_bounds(), Some((9.0, 21.0)));
        assert_eq!(CandleSeries::default().price_bounds(), None);
    }
}
