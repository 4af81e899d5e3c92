use std::time::Duration;

use serde::Serialize;

use crate::types::Latency;

/// Fixed upper-bound buckets over every sample of the run.
///
/// A sample lands in the first bucket whose threshold it does not exceed.
/// Samples above the last threshold only count towards `total`.
#[derive(Debug, Clone)]
pub struct Histogram {
    thresholds: Vec<Duration>,
    buckets: Vec<u64>,
    total: u64,
}

impl Histogram {
    /// `thresholds` must be ascending.
    pub fn new(thresholds: Vec<Duration>) -> Self {
        let buckets = vec![0; thresholds.len()];
        Self {
            thresholds,
            buckets,
            total: 0,
        }
    }

    pub fn update(&mut self, latency: Latency) {
        if let Some(i) = self.thresholds.iter().position(|&t| latency <= t) {
            self.buckets[i] += 1;
        }
        self.total += 1;
    }

    pub fn thresholds(&self) -> &[Duration] {
        &self.thresholds
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Samples larger than every threshold.
    pub fn overflow(&self) -> u64 {
        self.total - self.buckets.iter().sum::<u64>()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            thresholds_ms: self
                .thresholds
                .iter()
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
                .collect(),
            buckets: self.buckets.clone(),
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistogramSnapshot {
    pub thresholds_ms: Vec<u64>,
    pub buckets: Vec<u64>,
    pub total: u64,
}

impl HistogramSnapshot {
    pub fn max_bucket(&self) -> u64 {
        self.buckets.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_THRESHOLDS_MS;

    fn default_histogram() -> Histogram {
        Histogram::new(DEFAULT_THRESHOLDS_MS.iter().map(|&ms| Duration::from_millis(ms)).collect())
    }

    fn bucket_of(h: &Histogram, ms: u64) -> u64 {
        let i = DEFAULT_THRESHOLDS_MS.iter().position(|&t| t == ms).expect("known threshold");
        h.buckets()[i]
    }

    #[test]
    fn sample_equal_to_threshold_stays_in_that_bucket() {
        let mut h = default_histogram();
        h.update(Duration::from_millis(5));
        assert_eq!(bucket_of(&h, 5), 1);
        assert_eq!(bucket_of(&h, 10), 0);
    }

    #[test]
    fn sample_just_above_threshold_moves_to_next_bucket() {
        let mut h = default_histogram();
        h.update(Duration::from_micros(5_001));
        assert_eq!(bucket_of(&h, 5), 0);
        assert_eq!(bucket_of(&h, 10), 1);
    }

    #[test]
    fn sub_millisecond_goes_to_first_bucket() {
        let mut h = default_histogram();
        h.update(Duration::from_micros(300));
        assert_eq!(bucket_of(&h, 1), 1);
    }

    #[test]
    fn overflow_counts_only_in_total() {
        let mut h = default_histogram();
        h.update(Duration::from_millis(20));
        h.update(Duration::from_millis(1_500));
        assert_eq!(h.total(), 2);
        assert_eq!(h.buckets().iter().sum::<u64>(), 1);
        assert_eq!(h.overflow(), 1);
    }

    #[test]
    fn bucket_sum_equals_total_when_nothing_overflows() {
        let mut h = default_histogram();
        for ms in [1, 2, 3, 7, 15, 999, 1000] {
            h.update(Duration::from_millis(ms));
        }
        assert_eq!(h.buckets().iter().sum::<u64>(), h.total());
        assert_eq!(h.overflow(), 0);
    }

    #[test]
    fn snapshot_reports_millisecond_thresholds() {
        let mut h = default_histogram();
        h.update(Duration::from_millis(2));
        let snap = h.snapshot();
        assert_eq!(snap.thresholds_ms, DEFAULT_THRESHOLDS_MS);
        assert_eq!(snap.buckets[1], 1);
        assert_eq!(snap.total, 1);
        assert_eq!(snap.max_bucket(), 1);
    }
}
