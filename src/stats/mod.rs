pub mod engine;
pub mod histogram;
pub mod percentiles;
pub mod window;

pub use engine::{Snapshot, StatsEngine};
pub use histogram::{Histogram, HistogramSnapshot};
pub use percentiles::{LatencyPercentiles, PercentileSummary};
pub use window::{Window, WindowStats};
