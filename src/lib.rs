//! Continuous round-trip latency measurement: a supervised `ping` subprocess
//! feeding a single-owner statistics engine.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod probe;
pub mod stats;
pub mod types;

pub use config::Config;
pub use error::{AppError, Result};
pub use pipeline::{EventSource, Pipeline};
pub use stats::{Snapshot, StatsEngine};
