use nettest::config::{Config, HISTOGRAM_BAR_WIDTH};
use nettest::stats::{HistogramSnapshot, Snapshot};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Quit requested, waiting for the probe to be reaped.
    Stopping,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub host: String,
    pub interval_secs: u64,
    pub status: RunStatus,
    pub snapshot: Snapshot,
}

impl AppState {
    pub fn new(cfg: &Config, snapshot: Snapshot) -> Self {
        Self {
            host: cfg.host.clone(),
            interval_secs: cfg.interval,
            status: RunStatus::Running,
            snapshot,
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Bar length proportional to the fullest bucket.
pub fn bar_len(count: u64, max: u64, width: usize) -> usize {
    if max == 0 {
        return 0;
    }
    (count.saturating_mul(width as u64) / max) as usize
}

/// One `"  5ms : ████ 12"` line per bucket, plus an overflow line when needed.
pub fn histogram_lines(h: &HistogramSnapshot) -> Vec<String> {
    let max = h.max_bucket();
    let mut lines: Vec<String> = h
        .thresholds_ms
        .iter()
        .zip(&h.buckets)
        .map(|(threshold, &count)| {
            let bar = "█".repeat(bar_len(count, max, HISTOGRAM_BAR_WIDTH));
            format!("{threshold:>5}ms : {bar} {count}")
        })
        .collect();

    let overflow = h.total.saturating_sub(h.buckets.iter().sum());
    if overflow > 0 {
        if let Some(last) = h.thresholds_ms.last() {
            lines.push(format!("  >{last}ms : {overflow}"));
        }
    }
    lines
}

pub fn format_percentile(ms: Option<f64>) -> String {
    match ms {
        Some(v) if v >= 1000.0 => format!("{:.2}s", v / 1000.0),
        Some(v) => format!("{v:.1}ms"),
        None => "—".to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
