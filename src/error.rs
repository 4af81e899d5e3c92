use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to start probe `{program}`: {source}")]
    ProbeStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Probe output stream failed: {0}")]
    ProbeStream(#[source] std::io::Error),

    #[error("Probe exited with {0}")]
    ProbeExit(ExitStatus),

    #[error("Probe exited unexpectedly ({0})")]
    ProbeExited(ExitStatus),

    #[error("Probe supervisor stopped without reporting an outcome")]
    ProbeLost,

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
