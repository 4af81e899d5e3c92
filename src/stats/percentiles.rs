//! Lifetime latency percentiles. Values stored in microseconds.

use std::time::Duration;

use serde::Serialize;

use crate::config::PERCENTILE_MAX_US;
use crate::error::{AppError, Result};
use crate::types::Latency;

pub struct LatencyPercentiles {
    inner: hdrhistogram::Histogram<u64>,
}

impl LatencyPercentiles {
    /// Tracks 1us to `PERCENTILE_MAX_US`, 3 significant figures.
    pub fn new() -> Result<Self> {
        let inner = hdrhistogram::Histogram::new_with_bounds(1, PERCENTILE_MAX_US, 3)
            .map_err(|e| AppError::Histogram(format!("{e:?}")))?;
        Ok(Self { inner })
    }

    pub fn record(&mut self, latency: Latency) {
        let us = latency.as_micros().min(u128::from(u64::MAX)) as u64;
        self.inner.saturating_record(us);
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// All fields are `None` until the first sample.
    pub fn summary(&self) -> PercentileSummary {
        if self.inner.len() == 0 {
            return PercentileSummary::default();
        }
        let at = |q: f64| Some(us_to_ms(self.inner.value_at_quantile(q)));
        PercentileSummary {
            p50_ms: at(0.5),
            p95_ms: at(0.95),
            p99_ms: at(0.99),
        }
    }
}

impl std::fmt::Debug for LatencyPercentiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyPercentiles").field("len", &self.inner.len()).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PercentileSummary {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

fn us_to_ms(us: u64) -> f64 {
    Duration::from_micros(us).as_secs_f64() * 1_000.0
}
