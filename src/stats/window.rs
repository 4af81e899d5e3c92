use std::time::Duration;

use serde::Serialize;

use crate::types::Latency;

/// Running {min, max, sum, count} over the latencies seen since the last reset.
/// An empty window reports zero for every field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    min: Duration,
    max: Duration,
    sum: Duration,
    count: u64,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, latency: Latency) {
        if self.count == 0 {
            self.min = latency;
            self.max = latency;
            self.sum = latency;
            self.count = 1;
            return;
        }

        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
        self.sum = self.sum.saturating_add(latency);
        self.count += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Truncating `sum / count`; zero for an empty window.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.sum.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sum(&self) -> Duration {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            min_ms: whole_millis(self.min),
            max_ms: whole_millis(self.max),
            avg_ms: whole_millis(self.average()),
            count: self.count,
        }
    }
}

/// Integer-millisecond view of a [`Window`] for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub count: u64,
}

impl std::fmt::Display for WindowStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Min: {}ms, Max: {}ms, Avg: {}ms", self.min_ms, self.max_ms, self.avg_ms)
    }
}

fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
