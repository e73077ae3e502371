//! Live chart viewer for the photodiode CSV log.
//!
//! Usage:
//!   cargo run --bin viewer                      # watch ./led_data.csv
//!   cargo run --bin viewer -- --csv other.csv   # watch another file
//!
//! The whole file is re-read once per interval (1 s by default) and both
//! charts are rebuilt from scratch. A missing, empty, or malformed file is
//! reported in the header and retried on the next tick; the last good charts
//! stay on screen meanwhile.
//!
//! Keys
//! ----
//!   r        reload now
//!   q / Esc  quit

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};

use photodiode_rs::plot::PlotState;
use photodiode_rs::protocol::DEFAULT_CSV_PATH;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Key-poll timeout; also the upper bound on redraw latency after a reload.
const TICK: Duration = Duration::from_millis(33);

const SILICON_COLOR: Color = Color::Blue;
const INGA_COLOR: Color = Color::Green;

/// Braille spinner frames, advanced every 100 ms while waiting for data.
const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Watch the photodiode CSV log and plot it.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// CSV log written by the collector
    #[arg(long, default_value = DEFAULT_CSV_PATH)]
    csv: PathBuf,

    /// Reload interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn draw(frame: &mut Frame, state: &PlotState) {
    let root = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .split(frame.area());

    draw_header(frame, root[0], state);
    draw_charts(frame, root[1], state);
    draw_footer(frame, root[2]);
}

fn spinner_str() -> &'static str {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    SPINNER[(ms / 100) as usize % SPINNER.len()]
}

/// Title, file path, row count, and either the latest value or the last error.
fn draw_header(frame: &mut Frame, area: Rect, state: &PlotState) {
    let (status, color) = match &state.last_error {
        Some(e) => (format!("{} {e}", spinner_str()), Color::Red),
        None if state.series.is_empty() => {
            (format!("{} Waiting for data…", spinner_str()), Color::Yellow)
        }
        None => {
            let last_si = state.series.silicon.last().map(|p| p.1).unwrap_or(0.0);
            let last_in = state.series.inga.last().map(|p| p.1).unwrap_or(0.0);
            (
                format!("● Si {last_si:.4} V  InGaAs {last_in:.4} V"),
                Color::Green,
            )
        }
    };

    let mut spans = vec![
        Span::styled(
            " Photodiode Monitor ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        sep(),
        Span::styled(
            state.path().display().to_string(),
            Style::default().fg(Color::White),
        ),
        sep(),
        Span::styled(status, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        sep(),
        Span::styled(
            format!("{} rows", state.series.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if state.skipped > 0 {
        spans.push(sep());
        spans.push(Span::styled(
            format!("{} skipped", state.skipped),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn sep<'a>() -> Span<'a> {
    Span::styled(" │ ", Style::default().fg(Color::DarkGray))
}

/// Silicon on top, InGaAs below, both over the same x range.
fn draw_charts(frame: &mut Frame, area: Rect, state: &PlotState) {
    let [top, bottom] =
        Layout::vertical([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)]).areas(area);

    let s = &state.series;
    let x = s.x_bounds();
    draw_series(
        frame,
        top,
        " Silicon (670nm, 850nm, 950nm) ",
        "Silicon Signal (V)",
        &s.silicon,
        x,
        s.silicon_bounds(),
        SILICON_COLOR,
    );
    draw_series(
        frame,
        bottom,
        " InGaAs (1300nm) ",
        "InGaAs Signal (V)",
        &s.inga,
        x,
        s.inga_bounds(),
        INGA_COLOR,
    );
}

#[allow(clippy::too_many_arguments)]
fn draw_series(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    y_title: &str,
    data: &[(f64, f64)],
    x: [f64; 2],
    y: [f64; 2],
    color: Color,
) {
    let x_labels = vec![
        format!("{:.0}s", x[0]),
        format!("{:.0}s", (x[0] + x[1]) / 2.0),
        format!("{:.0}s", x[1]),
    ];
    let y_labels = vec![
        format!("{:.3}", y[0]),
        format!("{:.3}", (y[0] + y[1]) / 2.0),
        format!("{:.3}", y[1]),
    ];

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data);

    let chart = Chart::new(vec![dataset])
        .block(
            Block::default()
                .title(Span::styled(
                    title.to_owned(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .x_axis(
            Axis::default()
                .title("Time (s)")
                .bounds(x)
                .labels(x_labels)
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .title(y_title.to_owned())
                .bounds(y)
                .labels(y_labels)
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}

fn draw_footer(frame: &mut Frame, area: Rect) {
    let keys = Line::from(vec![
        Span::raw(" "),
        key("[r]"),
        Span::raw("Reload  "),
        key("[q]"),
        Span::raw("Quit"),
    ]);
    frame.render_widget(
        Paragraph::new(keys).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

#[inline]
fn key(s: &str) -> Span<'_> {
    Span::styled(
        s,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    use std::io::IsTerminal as _;
    if !io::stdout().is_terminal() {
        eprintln!("Error: the viewer requires a real terminal (TTY).");
        eprintln!("Run it directly in a terminal emulator, not piped or redirected.");
        std::process::exit(1);
    }

    let args = Args::parse();

    // ── Logging ─────────────────────────────────────────────────────────────
    // Logs go to viewer.log so they never interfere with the chart display.
    //   RUST_LOG=debug cargo run --bin viewer
    {
        use std::fs::File;
        if let Ok(file) = File::create("viewer.log") {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
    }

    let interval = Duration::from_millis(args.interval_ms.max(1));
    let mut state = PlotState::new(args.csv);
    // Errors are recorded in `state` and retried on the next tick.
    let _ = state.refresh();
    let mut last_refresh = Instant::now();

    // ── Terminal setup ────────────────────────────────────────────────────────
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    // ── Main loop ─────────────────────────────────────────────────────────────
    loop {
        if last_refresh.elapsed() >= interval {
            let _ = state.refresh();
            last_refresh = Instant::now();
        }

        terminal.draw(|f| draw(f, &state))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        // Raw mode swallows SIGINT; Ctrl+C arrives as a key event.
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            _ if ctrl_c => break,
            KeyCode::Char('r') => {
                let _ = state.refresh();
                last_refresh = Instant::now();
            }
            _ => {}
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
