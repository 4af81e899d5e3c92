use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nettest::config::Config;
use nettest::error::Result;
use nettest::pipeline::Pipeline;
use nettest::stats::Snapshot;

#[tokio::main]
async fn main() {
    let cfg = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        host = %cfg.host,
        interval_secs = cfg.interval,
        window_secs = cfg.window,
        probe = %cfg.probe,
        "PING: {} (interval: {}s, window: {}s)",
        cfg.host, cfg.interval, cfg.window,
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                signal_cancel.cancel();
            }
            Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
        }
    });

    let pipeline = Pipeline::from_config(&cfg, cancel)?;
    let (snapshot_tx, _snapshot_rx) = watch::channel(Snapshot::default());
    let summary = pipeline.run(snapshot_tx).await?;

    info!("Window - {}", summary.last_window);
    info!("Totals - {}", summary.totals);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
