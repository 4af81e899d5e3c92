use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{AppError, Result};

pub const DEFAULT_HOST: &str = "google.co.uk";

/// Probe program invoked as `<probe> <host> -i <interval>`.
pub const DEFAULT_PROBE: &str = "ping";

/// Probe send interval (seconds).
pub const DEFAULT_INTERVAL_SECS: u64 = 1;

/// Statistics rollover period (seconds).
pub const DEFAULT_WINDOW_SECS: u64 = 5;

/// Histogram bucket upper bounds in milliseconds, ascending.
pub const DEFAULT_THRESHOLDS_MS: &[u64] = &[1, 2, 5, 10, 20, 50, 100, 200, 500, 1000];

/// Channel capacity between the probe producer and the consumer loop.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Upper bound of the percentile histogram (microseconds). Larger samples saturate.
pub const PERCENTILE_MAX_US: u64 = 60_000_000;

/// Width of the largest histogram bar in the dashboard.
pub const HISTOGRAM_BAR_WIDTH: usize = 50;

#[derive(Debug, Clone, Parser)]
#[command(name = "nettest", version, about = "A simple network testing CLI")]
pub struct Config {
    /// Hostname to ping
    #[arg(long, env = "NETTEST_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Interval in seconds
    #[arg(long, short = 'd', env = "NETTEST_INTERVAL", default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u64,

    /// Window size for stats calculation (seconds)
    #[arg(long, short = 'w', env = "NETTEST_WINDOW", default_value_t = DEFAULT_WINDOW_SECS)]
    pub window: u64,

    /// Histogram bucket upper bounds in milliseconds (comma-separated, ascending)
    #[arg(
        long,
        env = "NETTEST_THRESHOLDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_THRESHOLDS_MS.to_vec()
    )]
    pub thresholds: Vec<u64>,

    /// Probe executable
    #[arg(long, env = "NETTEST_PROBE", default_value = DEFAULT_PROBE)]
    pub probe: String,

    /// tracing filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write logs to this file (dashboard only; it never logs to the terminal)
    #[arg(long, env = "NETTEST_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Parse flags (falling back to env vars) and validate them.
    /// `--help`, `--version` and malformed flags are handled by clap, which exits.
    pub fn load() -> Result<Self> {
        let cfg = Self::parse();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".to_string()));
        }
        if self.interval == 0 {
            return Err(AppError::Config("interval must be a positive number of seconds".to_string()));
        }
        if self.window == 0 {
            return Err(AppError::Config("window must be a positive number of seconds".to_string()));
        }
        if self.thresholds.is_empty() {
            return Err(AppError::Config("at least one histogram threshold is required".to_string()));
        }
        if self.thresholds.contains(&0) {
            return Err(AppError::Config("histogram thresholds must be positive".to_string()));
        }
        if self.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::Config(format!(
                "histogram thresholds must be strictly ascending, got {:?}",
                self.thresholds
            )));
        }
        Ok(())
    }

    pub fn window_span(&self) -> Duration {
        Duration::from_secs(self.window)
    }

    pub fn threshold_durations(&self) -> Vec<Duration> {
        self.thresholds.iter().map(|&ms| Duration::from_millis(ms)).collect()
    }
}
