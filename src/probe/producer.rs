use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, SAMPLE_CHANNEL_CAPACITY};
use crate::probe::parser::{LineParser, ParsedLine, PingLineParser};
use crate::types::{Latency, ProbeOutcome};

/// How to launch the probe: `<program> <host> -i <interval_secs>`.
#[derive(Debug, Clone)]
pub struct ProbeCommand {
    pub program: String,
    pub host: String,
    pub interval_secs: u64,
}

impl ProbeCommand {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.probe.clone(),
            host: cfg.host.clone(),
            interval_secs: cfg.interval,
        }
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.host)
            .arg("-i")
            .arg(self.interval_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Line-level diagnostics for one probe run.
#[derive(Debug, Default)]
pub struct ProbeCounters {
    pub lines_read: AtomicU64,
    pub samples: AtomicU64,
    /// Lines that were neither samples nor ignorable.
    pub dropped: AtomicU64,
}

impl ProbeCounters {
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving side of a running probe.
pub struct ProbeHandle {
    /// Samples in the order the probe printed them. Closed before the outcome is sent.
    pub samples: mpsc::Receiver<Latency>,
    /// Written exactly once by the supervisor task.
    pub outcome: oneshot::Receiver<ProbeOutcome>,
    pub counters: Arc<ProbeCounters>,
    /// Supervisor task. Once joined, the subprocess has been reaped.
    pub task: JoinHandle<()>,
}

/// Supervises one probe subprocess and turns its stdout into latency samples.
pub struct ProbeProducer {
    command: ProbeCommand,
    parser: Arc<dyn LineParser>,
    counters: Arc<ProbeCounters>,
}

impl ProbeProducer {
    pub fn new(command: ProbeCommand) -> Self {
        Self {
            command,
            parser: Arc::new(PingLineParser),
            counters: Arc::new(ProbeCounters::default()),
        }
    }

    pub fn with_parser(mut self, parser: impl LineParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Spawns the supervisor task and returns immediately.
    pub fn start(self, cancel: CancellationToken) -> ProbeHandle {
        let (sample_tx, samples) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let (outcome_tx, outcome) = oneshot::channel();
        let counters = Arc::clone(&self.counters);

        let task = tokio::spawn(async move {
            let result = self.supervise(sample_tx, cancel).await;
            info!(
                outcome = %result,
                lines = self.counters.lines_read(),
                samples = self.counters.samples(),
                dropped = self.counters.dropped(),
                "[PROBE] finished"
            );
            // The consumer may already have stopped; its outcome is then irrelevant.
            let _ = outcome_tx.send(result);
        });

        ProbeHandle {
            samples,
            outcome,
            counters,
            task,
        }
    }

    /// Owns `sample_tx`, so the sample channel is closed when this returns.
    async fn supervise(
        &self,
        sample_tx: mpsc::Sender<Latency>,
        cancel: CancellationToken,
    ) -> ProbeOutcome {
        let mut child = match self.command.build().spawn() {
            Ok(child) => child,
            Err(error) => {
                return ProbeOutcome::StartFailed {
                    program: self.command.program.clone(),
                    error,
                };
            }
        };
        info!(
            pid = child.id(),
            program = %self.command.program,
            host = %self.command.host,
            interval_secs = self.command.interval_secs,
            "[PROBE] started"
        );

        let outcome = match child.stdout.take() {
            Some(stdout) => self.drive(&mut child, stdout, &sample_tx, &cancel).await,
            None => ProbeOutcome::StreamFailed(std::io::Error::other("probe stdout was not captured")),
        };

        if matches!(outcome, ProbeOutcome::Cancelled | ProbeOutcome::StreamFailed(_)) {
            terminate(&mut child).await;
        }
        outcome
    }

    /// Scans probe output until cancellation, a stream error or process exit.
    /// Cancellation wins over everything else that is ready at the same time.
    async fn drive(
        &self,
        child: &mut Child,
        stdout: ChildStdout,
        sample_tx: &mpsc::Sender<Latency>,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        let mut reader = BufReader::new(stdout);
        // Raw bytes: the probe may print anything, and only I/O errors are fatal.
        let mut buf = Vec::new();
        let mut stdout_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return ProbeOutcome::Cancelled,

                read = reader.read_until(b'\n', &mut buf), if stdout_open => match read {
                    Ok(n) => {
                        // A final line without `\n` arrives as its own read before EOF.
                        if n == 0 {
                            debug!("[PROBE] stdout closed");
                            stdout_open = false;
                            continue;
                        }
                        let line = decode_line(&buf);
                        buf.clear();

                        let Some(sample) = self.classify(&line) else { continue };
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
                            sent = sample_tx.send(sample) => {
                                if sent.is_err() {
                                    debug!("[PROBE] sample receiver dropped");
                                    return ProbeOutcome::Cancelled;
                                }
                            }
                        }
                    }
                    Err(e) => return ProbeOutcome::StreamFailed(e),
                },

                status = child.wait() => return match status {
                    Ok(status) if status.success() => ProbeOutcome::Exited(status),
                    Ok(status) => ProbeOutcome::ExitFailed(status),
                    Err(e) => ProbeOutcome::StreamFailed(e),
                },
            }
        }
    }

    fn classify(&self, line: &str) -> Option<Latency> {
        self.counters.lines_read.fetch_add(1, Ordering::Relaxed);
        match self.parser.parse(line) {
            ParsedLine::Sample(latency) => {
                self.counters.samples.fetch_add(1, Ordering::Relaxed);
                Some(latency)
            }
            ParsedLine::Ignored => None,
            ParsedLine::Unrecognized => {
                let count = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if count <= 10 || count % 1000 == 0 {
                    warn!(count, "[PROBE] unrecognized line: {line}");
                }
                None
            }
        }
    }
}

/// Lossy UTF-8 decode without the line terminator. Invalid bytes become
/// U+FFFD, so such a line simply fails to parse.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Kills the subprocess and reaps it.
async fn terminate(child: &mut Child) {
    match child.kill().await {
        Ok(()) => debug!("[PROBE] subprocess terminated"),
        Err(e) => warn!("[PROBE] failed to terminate subprocess: {e}"),
    }
}
