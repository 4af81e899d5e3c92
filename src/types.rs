use std::process::ExitStatus;
use std::time::Duration;

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One successful round trip, as reported by the probe.
pub type Latency = Duration;

// ---------------------------------------------------------------------------
// Producer outcome
// ---------------------------------------------------------------------------

/// Terminal result of one probe run. Exactly one is delivered per run.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The cancellation signal fired before the probe exited on its own.
    Cancelled,
    /// The subprocess could not be launched.
    StartFailed {
        program: String,
        error: std::io::Error,
    },
    /// Reading the subprocess's stdout failed.
    StreamFailed(std::io::Error),
    /// The subprocess exited with a non-zero status (or was killed externally).
    ExitFailed(ExitStatus),
    /// The subprocess exited with status 0. Still abnormal for a continuous probe.
    Exited(ExitStatus),
    /// The supervisor went away without sending an outcome.
    Lost,
}

impl ProbeOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProbeOutcome::Cancelled)
    }

    /// Cancellation is a clean shutdown; every other outcome ends the run with an error.
    pub fn into_result(self) -> Result<()> {
        match self {
            ProbeOutcome::Cancelled => Ok(()),
            ProbeOutcome::StartFailed { program, error } => Err(AppError::ProbeStart {
                program,
                source: error,
            }),
            ProbeOutcome::StreamFailed(e) => Err(AppError::ProbeStream(e)),
            ProbeOutcome::ExitFailed(status) => Err(AppError::ProbeExit(status)),
            ProbeOutcome::Exited(status) => Err(AppError::ProbeExited(status)),
            ProbeOutcome::Lost => Err(AppError::ProbeLost),
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Cancelled => write!(f, "cancelled"),
            ProbeOutcome::StartFailed { program, error } => write!(f, "start_failed ({program}: {error})"),
            ProbeOutcome::StreamFailed(e) => write!(f, "stream_failed ({e})"),
            ProbeOutcome::ExitFailed(status) => write!(f, "exit_failed ({status})"),
            ProbeOutcome::Exited(status) => write!(f, "exited ({status})"),
            ProbeOutcome::Lost => write!(f, "lost"),
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer loop events
// ---------------------------------------------------------------------------

/// Everything the consumer loop can wake up for, multiplexed into one source.
#[derive(Debug)]
pub enum PipelineEvent {
    Sample(Latency),
    Outcome(ProbeOutcome),
    CancelRequested,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancellation_is_ok() {
        assert!(ProbeOutcome::Cancelled.into_result().is_ok());

        let err = ProbeOutcome::StartFailed {
            program: "missing-ping".to_string(),
            error: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, AppError::ProbeStart { .. }));
        assert!(err.to_string().contains("missing-ping"));

        let err = ProbeOutcome::StreamFailed(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, AppError::ProbeStream(_)));
    }
}
