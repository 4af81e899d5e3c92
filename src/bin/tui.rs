mod tui_app;

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nettest::config::Config;
use nettest::error::{AppError, Result};
use nettest::pipeline::Pipeline;
use nettest::stats::{Snapshot, WindowStats};
use tui_app::{format_percentile, histogram_lines, truncate, AppState, RunStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cfg = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&cfg) {
        eprintln!("Logging setup failed: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cfg).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

/// Logs go to `--log-file` only; writing to the terminal would corrupt the dashboard.
fn init_logging(cfg: &Config) -> Result<()> {
    let Some(path) = &cfg.log_file else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

async fn run(cfg: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::from_config(&cfg, cancel.clone())?;
    let (snapshot_tx, snapshot_rx) = watch::channel(pipeline.snapshot());
    let mut app = AppState::new(&cfg, pipeline.snapshot());
    let consumer = tokio::spawn(pipeline.run(snapshot_tx));

    let ui_result = run_dashboard(&mut app, &snapshot_rx, &cancel, &consumer).await;

    // Stops the pipeline if the dashboard itself failed.
    cancel.cancel();
    let summary = consumer
        .await
        .map_err(|e| AppError::Io(io::Error::other(e)))??;
    ui_result?;

    info!("Totals - {}", summary.totals);
    Ok(())
}

/// Terminal setup, event loop, and teardown regardless of how the loop ended.
async fn run_dashboard(
    app: &mut AppState,
    snapshots: &watch::Receiver<Snapshot>,
    cancel: &CancellationToken,
    consumer: &JoinHandle<Result<Snapshot>>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app, snapshots, cancel, consumer).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    snapshots: &watch::Receiver<Snapshot>,
    cancel: &CancellationToken,
    consumer: &JoinHandle<Result<Snapshot>>,
) -> Result<()> {
    loop {
        app.snapshot = snapshots.borrow().clone();
        terminal.draw(|f| render(f, app))?;

        // Fatal outcome or completed shutdown: stop drawing.
        if consumer.is_finished() {
            return Ok(());
        }

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && is_quit(&key) {
                    app.status = RunStatus::Stopping;
                    cancel.cancel();
                }
            }
        }
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let area = f.area();

    // header | stats | percentiles | histogram | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_stats_table(f, app, chunks[1]);
    render_percentiles(f, app, chunks[2]);
    render_histogram(f, app, chunks[3]);
    render_footer(f, chunks[4]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match app.status {
        RunStatus::Running => ("● running", Color::Green),
        RunStatus::Stopping => ("◌ stopping", Color::Yellow),
    };

    let line = Line::from(vec![
        Span::styled(
            " PING: ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            truncate(&app.host, 40),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" (interval: {}s)", app.interval_secs)),
        Span::raw("  │  "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} rollovers", app.snapshot.rollovers),
            Style::default().fg(Color::White),
        ),
    ]);

    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn stats_row<'a>(label: String, w: &WindowStats) -> Row<'a> {
    Row::new(vec![
        Cell::from(label).style(Style::default().fg(Color::Cyan)),
        Cell::from(format!("{}ms", w.min_ms)),
        Cell::from(format!("{}ms", w.max_ms)),
        Cell::from(format!("{}ms", w.avg_ms)),
        Cell::from(w.count.to_string()).style(Style::default().fg(Color::DarkGray)),
    ])
}

fn render_stats_table(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["", "Min", "Max", "Avg", "Samples"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let snap = &app.snapshot;
    let rows = vec![
        stats_row(format!("Window ({}s)", snap.window_span_secs), &snap.last_window),
        stats_row("Totals".to_string(), &snap.totals),
    ];

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(7),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " LATENCY ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_percentiles(f: &mut Frame, app: &AppState, area: Rect) {
    let p = &app.snapshot.percentiles;
    let label = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::styled(" p50 ", label),
        Span::raw(format_percentile(p.p50_ms)),
        Span::raw("  │  "),
        Span::styled("p95 ", label),
        Span::raw(format_percentile(p.p95_ms)),
        Span::raw("  │  "),
        Span::styled("p99 ", label),
        Span::raw(format_percentile(p.p99_ms)),
        Span::raw("  │  "),
        Span::styled(
            format!("current window: {} samples", app.snapshot.current_window.count),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_histogram(f: &mut Frame, app: &AppState, area: Rect) {
    let lines: Vec<Line> = histogram_lines(&app.snapshot.histogram)
        .into_iter()
        .map(|l| Line::from(Span::styled(l, Style::default().fg(Color::Green))))
        .collect();

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                format!(" HISTOGRAM, Total: {} ", app.snapshot.histogram.total),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q/esc/ctrl+c] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit"),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
