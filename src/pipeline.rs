use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::probe::{ProbeCommand, ProbeCounters, ProbeProducer};
use crate::stats::{Snapshot, StatsEngine, WindowStats};
use crate::types::{Latency, PipelineEvent, ProbeOutcome};

// ---------------------------------------------------------------------------
// Event source
// ---------------------------------------------------------------------------

/// Multiplexes samples, the producer outcome and the user's cancellation into
/// one stream of [`PipelineEvent`]s. Ready sources are picked fairly.
/// After an outcome or a cancellation it yields `None` forever.
pub struct EventSource {
    samples: mpsc::Receiver<Latency>,
    outcome: oneshot::Receiver<ProbeOutcome>,
    cancel: CancellationToken,
    finished: bool,
}

impl EventSource {
    pub fn new(
        samples: mpsc::Receiver<Latency>,
        outcome: oneshot::Receiver<ProbeOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            samples,
            outcome,
            cancel,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<PipelineEvent> {
        if self.finished {
            return None;
        }

        let event = tokio::select! {
            _ = self.cancel.cancelled() => PipelineEvent::CancelRequested,
            Some(sample) = self.samples.recv() => PipelineEvent::Sample(sample),
            outcome = &mut self.outcome => {
                PipelineEvent::Outcome(outcome.unwrap_or(ProbeOutcome::Lost))
            }
        };

        if !matches!(event, PipelineEvent::Sample(_)) {
            self.finished = true;
        }
        Some(event)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One measurement run: a probe producer feeding a single consumer loop that
/// owns the [`StatsEngine`].
pub struct Pipeline {
    events: EventSource,
    engine: StatsEngine,
    counters: Arc<ProbeCounters>,
    producer_task: JoinHandle<()>,
    /// Child of the user's token, so the producer can be stopped on any exit path.
    producer_cancel: CancellationToken,
}

impl Pipeline {
    /// Starts the producer immediately. Must be called inside a tokio runtime.
    pub fn start(producer: ProbeProducer, engine: StatsEngine, cancel: CancellationToken) -> Self {
        let producer_cancel = cancel.child_token();
        let handle = producer.start(producer_cancel.clone());

        Self {
            events: EventSource::new(handle.samples, handle.outcome, cancel),
            engine,
            counters: handle.counters,
            producer_task: handle.task,
            producer_cancel,
        }
    }

    pub fn from_config(cfg: &Config, cancel: CancellationToken) -> Result<Self> {
        let engine = StatsEngine::from_config(cfg)?;
        let producer = ProbeProducer::new(ProbeCommand::from_config(cfg));
        Ok(Self::start(producer, engine, cancel))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    /// Consumer loop. Publishes a fresh snapshot after every sample and
    /// returns the final one on cancellation, or the producer's error.
    /// The probe subprocess has been reaped by the time this returns.
    pub async fn run(mut self, snapshots: watch::Sender<Snapshot>) -> Result<Snapshot> {
        snapshots.send_replace(self.engine.snapshot());

        let mut result = Ok(());
        while let Some(event) = self.events.next().await {
            match event {
                PipelineEvent::Sample(latency) => {
                    debug!(latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX), "sample");
                    if let Some(completed) = self.engine.update(latency) {
                        log_rollover(&completed);
                    }
                    snapshots.send_replace(self.engine.snapshot());
                }
                PipelineEvent::Outcome(outcome) => {
                    info!(outcome = %outcome, "probe outcome received");
                    result = outcome.into_result();
                }
                PipelineEvent::CancelRequested => {
                    info!("cancellation requested, stopping");
                }
            }
        }

        self.producer_cancel.cancel();
        if let Err(e) = self.producer_task.await {
            warn!("probe supervisor task failed: {e}");
        }
        info!(
            lines = self.counters.lines_read(),
            samples = self.counters.samples(),
            dropped = self.counters.dropped(),
            "pipeline stopped"
        );

        result.map(|()| self.engine.snapshot())
    }
}

fn log_rollover(w: &WindowStats) {
    info!(
        event = "WINDOW_ROLLOVER",
        min_ms = w.min_ms,
        max_ms = w.max_ms,
        avg_ms = w.avg_ms,
        count = w.count,
        "WINDOW | {w} | samples: {}",
        w.count,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::config::DEFAULT_THRESHOLDS_MS;
    use crate::error::AppError;

    const WAIT: Duration = Duration::from_secs(10);

    fn engine() -> StatsEngine {
        let thresholds = DEFAULT_THRESHOLDS_MS.iter().map(|&ms| Duration::from_millis(ms)).collect();
        StatsEngine::new(Duration::from_secs(60), thresholds).unwrap()
    }

    /// Deleted on drop, so keep it alive until the run ends.
    struct Script(std::path::PathBuf);

    impl Drop for Script {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn script_probe(name: &str, body: &str) -> (ProbeProducer, Script) {
        let script = Script(std::env::temp_dir().join(format!("nettest-pipeline-{}-{name}.sh", std::process::id())));
        std::fs::write(&script.0, body).expect("write fake probe");
        let producer = ProbeProducer::new(ProbeCommand {
            program: "sh".to_string(),
            host: script.0.to_string_lossy().into_owned(),
            interval_secs: 1,
        });
        (producer, script)
    }

    #[tokio::test]
    async fn event_source_stops_after_cancellation() {
        let (sample_tx, samples) = mpsc::channel(4);
        let (_outcome_tx, outcome) = oneshot::channel();
        let cancel = CancellationToken::new();
        let mut events = EventSource::new(samples, outcome, cancel.clone());

        sample_tx.send(Duration::from_millis(7)).await.unwrap();
        assert!(matches!(events.next().await, Some(PipelineEvent::Sample(_))));

        cancel.cancel();
        assert!(matches!(events.next().await, Some(PipelineEvent::CancelRequested)));

        // Samples still queued after cancellation are never delivered.
        sample_tx.send(Duration::from_millis(8)).await.unwrap();
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn event_source_reports_lost_supervisor() {
        let (sample_tx, samples) = mpsc::channel::<Latency>(4);
        let (outcome_tx, outcome) = oneshot::channel::<ProbeOutcome>();
        let mut events = EventSource::new(samples, outcome, CancellationToken::new());

        drop(sample_tx);
        drop(outcome_tx);
        assert!(matches!(
            events.next().await,
            Some(PipelineEvent::Outcome(ProbeOutcome::Lost))
        ));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn event_source_delivers_outcome_once() {
        let (_sample_tx, samples) = mpsc::channel::<Latency>(4);
        let (outcome_tx, outcome) = oneshot::channel();
        let mut events = EventSource::new(samples, outcome, CancellationToken::new());

        outcome_tx.send(ProbeOutcome::Cancelled).unwrap();
        assert!(matches!(
            events.next().await,
            Some(PipelineEvent::Outcome(ProbeOutcome::Cancelled))
        ));
        assert!(events.next().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_output_reaches_statistics() {
        let (producer, _script) = script_probe(
            "e2e",
            "echo 'PING 1.2.3.4 (1.2.3.4) 56(84) bytes of data.'\n\
             echo '64 bytes from 1.2.3.4: icmp_seq=1 ttl=64 time=1.0 ms'\n\
             echo '64 bytes from 1.2.3.4: icmp_seq=2 ttl=64 time=3.0 ms'\n\
             echo '64 bytes from 1.2.3.4: icmp_seq=3 ttl=64 time=5.0 ms'\n\
             exec sleep 30\n",
        );
        let cancel = CancellationToken::new();
        let pipeline = Pipeline::start(producer, engine(), cancel.clone());
        let (tx, mut rx) = watch::channel(Snapshot::default());
        let run = tokio::spawn(pipeline.run(tx));

        timeout(WAIT, rx.wait_for(|s| s.totals.count == 3))
            .await
            .expect("three samples in time")
            .expect("pipeline alive");

        cancel.cancel();
        let snap = timeout(WAIT, run).await.expect("stops in time").unwrap().unwrap();
        assert_eq!(
            snap.totals,
            WindowStats {
                min_ms: 1,
                max_ms: 5,
                avg_ms: 3,
                count: 3
            }
        );
        assert_eq!(snap.histogram.buckets[0], 1);
        assert_eq!(snap.histogram.buckets[2], 2);
        assert_eq!(snap.histogram.total, 3);
    }

    #[tokio::test]
    async fn start_failure_ends_run_without_samples() {
        let producer = ProbeProducer::new(ProbeCommand {
            program: "/nonexistent/nettest-ping".to_string(),
            host: "localhost".to_string(),
            interval_secs: 1,
        });
        let pipeline = Pipeline::start(producer, engine(), CancellationToken::new());
        let (tx, rx) = watch::channel(Snapshot::default());

        let err = timeout(WAIT, pipeline.run(tx)).await.expect("fails in time").unwrap_err();
        assert!(matches!(err, AppError::ProbeStart { .. }), "{err}");

        let last = rx.borrow().clone();
        assert_eq!(last.totals, WindowStats::default());
        assert_eq!(last.histogram.total, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_exit_is_fatal() {
        let (producer, _script) = script_probe("exit", "exit 2\n");
        let pipeline = Pipeline::start(producer, engine(), CancellationToken::new());
        let (tx, _rx) = watch::channel(Snapshot::default());

        let err = timeout(WAIT, pipeline.run(tx)).await.expect("fails in time").unwrap_err();
        assert!(matches!(err, AppError::ProbeExit(_)), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_before_start_is_clean() {
        let (producer, _script) = script_probe("early-cancel", "exec sleep 30\n");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = Pipeline::start(producer, engine(), cancel);
        let (tx, _rx) = watch::channel(Snapshot::default());

        let snap = timeout(WAIT, pipeline.run(tx)).await.expect("stops in time").unwrap();
        assert_eq!(snap.totals.count, 0);
    }
}
