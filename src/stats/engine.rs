use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::stats::histogram::{Histogram, HistogramSnapshot};
use crate::stats::percentiles::{LatencyPercentiles, PercentileSummary};
use crate::stats::window::{Window, WindowStats};
use crate::types::Latency;

/// Aggregates the sample stream: a rolling window, the last completed window,
/// lifetime totals, the bucket histogram and lifetime percentiles.
///
/// Not shared: the consumer loop owns it and readers get [`Snapshot`]s.
/// Rollover is only checked inside [`StatsEngine::update`], so a window that
/// receives no samples after its span elapses stays open until the next one.
#[derive(Debug)]
pub struct StatsEngine {
    window_span: Duration,
    window_opened_at: Instant,
    current: Window,
    last: Window,
    totals: Window,
    histogram: Histogram,
    percentiles: LatencyPercentiles,
    rollovers: u64,
}

impl StatsEngine {
    pub fn new(window_span: Duration, thresholds: Vec<Duration>) -> Result<Self> {
        Self::starting_at(window_span, thresholds, Instant::now())
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.window_span(), cfg.threshold_durations())
    }

    /// Same as [`StatsEngine::new`] with an explicit window-open time.
    pub fn starting_at(window_span: Duration, thresholds: Vec<Duration>, now: Instant) -> Result<Self> {
        Ok(Self {
            window_span,
            window_opened_at: now,
            current: Window::new(),
            last: Window::new(),
            totals: Window::new(),
            histogram: Histogram::new(thresholds),
            percentiles: LatencyPercentiles::new()?,
            rollovers: 0,
        })
    }

    /// Applies one sample. Returns the completed window if this sample rolled it over.
    pub fn update(&mut self, latency: Latency) -> Option<WindowStats> {
        self.update_at(latency, Instant::now())
    }

    /// Windows and the histogram see the sample truncated to whole milliseconds;
    /// percentiles keep microsecond precision.
    pub fn update_at(&mut self, latency: Latency, now: Instant) -> Option<WindowStats> {
        let whole = whole_millis(latency);
        self.current.update(whole);
        self.totals.update(whole);
        self.histogram.update(whole);
        self.percentiles.record(latency);

        if now.saturating_duration_since(self.window_opened_at) <= self.window_span {
            return None;
        }

        self.last = self.current;
        self.current.reset();
        self.window_opened_at = now;
        self.rollovers += 1;
        Some(self.last.stats())
    }

    pub fn window_span(&self) -> Duration {
        self.window_span
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            window_span_secs: self.window_span.as_secs(),
            last_window: self.last.stats(),
            current_window: self.current.stats(),
            totals: self.totals.stats(),
            histogram: self.histogram.snapshot(),
            percentiles: self.percentiles.summary(),
            rollovers: self.rollovers,
        }
    }
}

fn whole_millis(latency: Latency) -> Latency {
    Duration::from_millis(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX))
}

/// Read-only view handed to renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub window_span_secs: u64,
    pub last_window: WindowStats,
    /// Window still accumulating.
    pub current_window: WindowStats,
    pub totals: WindowStats,
    pub histogram: HistogramSnapshot,
    pub percentiles: PercentileSummary,
    pub rollovers: u64,
}
