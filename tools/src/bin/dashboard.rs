//! Live terminal view of a training run: status, score sparkline, recent iterations.
use std::io;
use std::time::{Duration, Instant};

use clap::Parser;
use cli_support::expand_path;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use data_contracts::{StatsRecord, TrainState, TrainStatus};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Sparkline},
    Terminal,
};

use unet_tools::{read_stats, read_status, score_series, StatsSummary, ToolConfig};

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Watch U-Net training stats in the terminal")]
struct Args {
    /// Stats JSON-lines file written by `train`.
    #[arg(long)]
    stats: Option<String>,
    /// Status snapshot written by `train`.
    #[arg(long)]
    status: Option<String>,
    /// Poll interval in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[derive(Clone, Copy)]
struct Theme {
    title_fg: Color,
    title_bg: Color,
    border: Color,
    highlight: Color,
    status_fg: Color,
    status_bg: Color,
    controls_fg: Color,
    controls_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title_fg: Color::Rgb(235, 240, 255),
            title_bg: Color::Rgb(20, 25, 36),
            border: Color::Rgb(88, 200, 196),
            highlight: Color::Rgb(168, 132, 255),
            status_fg: Color::Rgb(230, 230, 230),
            status_bg: Color::Rgb(12, 18, 28),
            controls_fg: Color::Rgb(214, 219, 230),
            controls_bg: Color::Rgb(28, 34, 48),
        }
    }
}

struct AppState {
    cfg: ToolConfig,
    records: Vec<StatsRecord>,
    summary: StatsSummary,
    train_status: Option<TrainStatus>,
    message: String,
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let mut cfg = ToolConfig::load();
    if let Some(p) = &args.stats {
        cfg.stats_path = expand_path(p);
    }
    if let Some(p) = &args.status {
        cfg.status_path = expand_path(p);
    }
    if let Some(ms) = args.tick_ms {
        cfg.tick_ms = ms;
    }
    if let Err(err) = run_app(cfg) {
        let _ = disable_raw_mode();
        eprintln!("dashboard error: {err}");
    }
    Ok(())
}

fn run_app(cfg: ToolConfig) -> io::Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(&mut stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(cfg.tick_ms.max(10));
    let mut last_tick = Instant::now();
    let mut state = AppState {
        cfg,
        records: Vec::new(),
        summary: StatsSummary::default(),
        train_status: None,
        message: "Waiting for stats".into(),
    };
    tick(&mut state);

    loop {
        terminal.draw(|f| draw_ui(f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('r') => {
                        tick(&mut state);
                        last_tick = Instant::now();
                    }
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            tick(&mut state);
            last_tick = Instant::now();
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn tick(state: &mut AppState) {
    match read_stats(&state.cfg.stats_path, Some(state.cfg.tail)) {
        Ok(records) => {
            state.summary = StatsSummary::from_records(&records, state.cfg.mean_window);
            state.message = format!(
                "{} records from {}",
                records.len(),
                state.cfg.stats_path.display()
            );
            state.records = records;
        }
        Err(err) => state.message = err.to_string(),
    }
    state.train_status = read_status(&state.cfg.status_path);
}

fn status_lines(state: &AppState) -> Vec<String> {
    let mut lines = Vec::new();
    match &state.train_status {
        Some(s) => {
            lines.push(format!(
                "{} epoch {}/{} iteration {} lr {:.3e}",
                s.state.as_str(),
                s.epoch,
                s.epochs,
                s.iteration,
                s.learning_rate
            ));
            if let Some(msg) = &s.message {
                lines.push(format!("message: {msg}"));
            }
        }
        None => lines.push("no status file yet".into()),
    }
    let summary = &state.summary;
    if let Some(last) = &summary.last {
        lines.push(format!("last score {:.6} at iteration {}", last.score, last.iteration));
    }
    if let (Some(best), Some(iter)) = (summary.best_score, summary.best_iteration) {
        lines.push(format!("best score {best:.6} at iteration {iter}"));
    }
    if let Some(mean) = summary.window_mean {
        lines.push(format!(
            "mean of last {} scores {mean:.6}",
            state.cfg.mean_window.min(summary.records)
        ));
    }
    lines.push(state.message.clone());
    lines
}

fn draw_ui(f: &mut ratatui::Frame<'_>, state: &AppState) {
    let theme = Theme::default();
    let root = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(1), // title
                Constraint::Length(3), // progress
                Constraint::Length(7), // status
                Constraint::Min(5),    // sparkline + recent
                Constraint::Length(1), // controls
            ]
            .as_ref(),
        )
        .split(f.size());

    let title = Paragraph::new(state.cfg.ui_title.as_str())
        .style(Style::default().fg(theme.title_fg).bg(theme.title_bg))
        .alignment(Alignment::Center);
    f.render_widget(title, root[0]);

    let (ratio, label) = match &state.train_status {
        Some(s) => (
            s.progress().clamp(0.0, 1.0),
            format!("{}/{} epochs", s.epoch, s.epochs),
        ),
        None => (0.0, "-".to_string()),
    };
    let gauge_color = match state.train_status.as_ref().map(|s| s.state) {
        Some(TrainState::Failed) => Color::Red,
        Some(TrainState::Finished) => Color::Green,
        _ => theme.highlight,
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title("Progress"),
        )
        .gauge_style(Style::default().fg(gauge_color))
        .ratio(ratio)
        .label(label);
    f.render_widget(gauge, root[1]);

    let status = Paragraph::new(status_lines(state).join("\n"))
        .style(Style::default().fg(theme.status_fg).bg(theme.status_bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title("Status"),
        );
    f.render_widget(status, root[2]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)].as_ref())
        .split(root[3]);

    let width = body[0].width.saturating_sub(2) as usize;
    let series = score_series(&state.records, width.max(1));
    let spark = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title("Score"),
        )
        .data(&series)
        .max(100)
        .style(Style::default().fg(theme.highlight));
    f.render_widget(spark, body[0]);

    let rows = body[1].height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = state
        .records
        .iter()
        .rev()
        .take(rows)
        .enumerate()
        .map(|(i, r)| {
            let style = if i == 0 {
                Style::default()
                    .fg(theme.highlight)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                "{:>7}  e{:<4} {:.6}",
                r.iteration, r.epoch, r.score
            ))
            .style(style)
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title("Recent iterations"),
    );
    f.render_widget(list, body[1]);

    let controls = Paragraph::new("Controls: [r] refresh  [q]/Esc quit")
        .style(Style::default().fg(theme.controls_fg).bg(theme.controls_bg))
        .alignment(Alignment::Center);
    f.render_widget(controls, root[4]);
}
