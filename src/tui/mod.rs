mod export;
mod help;
mod state;

use crate::cli::{post_run_options, Cli};
use crate::model::RunEvent;
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::{copy_to_clipboard, open_in_viewer};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{
    push_wrapped_status_kv, FormField, UiState, TAB_COUNT, TAB_FORM, TAB_HELP, TAB_LOG, TAB_PLOTS,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Rows the plot list can show; refreshed on every draw.
const DEFAULT_PLOT_ROWS: usize = 20;

pub async fn run(args: Cli) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&post_run_options(&args), event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<RunEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(&args);
    let mut plot_rows = DEFAULT_PLOT_ROWS;
    let mut quitting = false;

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(mpsc::error::TryRecvError::Empty) => break,
                // Controller exited: it only does so after a quit request.
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    quitting = true;
                    break;
                }
            }
        }
        if quitting && !state.running {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| {
                    plot_rows = plot_list_rows(f.area());
                    draw(f.area(), f, &state)
                })
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }

        if state.form.editing_input {
            match k.code {
                KeyCode::Enter | KeyCode::Esc => state.form.editing_input = false,
                KeyCode::Backspace => {
                    state.form.input.pop();
                }
                KeyCode::Char(c) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
                    state.form.input.push(c)
                }
                _ => {}
            }
            continue;
        }

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                quitting = true;
                if !state.running {
                    break Ok(());
                }
                state.info = "Quitting after the current run finishes…".into();
            }
            (_, KeyCode::Tab) => {
                state.tab = (state.tab + 1) % TAB_COUNT;
            }
            (_, KeyCode::BackTab) => {
                state.tab = (state.tab + TAB_COUNT - 1) % TAB_COUNT;
            }
            (_, KeyCode::Char('?')) => {
                state.tab = TAB_HELP;
            }
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => match state.tab {
                TAB_FORM => state.form.move_focus(-1),
                TAB_PLOTS => state.select_plot(-1, plot_rows),
                _ => {}
            },
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => match state.tab {
                TAB_FORM => state.form.move_focus(1),
                TAB_PLOTS => state.select_plot(1, plot_rows),
                _ => {}
            },
            (_, KeyCode::Left) | (_, KeyCode::Char('h')) if state.tab == TAB_FORM => {
                state.form.adjust(-1);
            }
            (_, KeyCode::Right) | (_, KeyCode::Char('l')) | (_, KeyCode::Char(' '))
                if state.tab == TAB_FORM =>
            {
                state.form.adjust(1);
            }
            (_, KeyCode::Enter) if state.tab == TAB_FORM => match state.form.focused() {
                FormField::Input => state.form.editing_input = true,
                FormField::Submit => submit(&mut state, &cmd_tx, quitting),
                _ => state.form.adjust(1),
            },
            (_, KeyCode::Enter) | (_, KeyCode::Char('o')) if state.tab == TAB_PLOTS => {
                if let Some(path) = state.selected_plot_path() {
                    state.info = match open_in_viewer(&path) {
                        Ok(()) => format!("Opened {}", path.display()),
                        Err(e) => format!("Open failed: {e:#}"),
                    };
                }
            }
            (_, KeyCode::Char('y')) if state.tab == TAB_PLOTS => {
                if let Some(path) = state.selected_plot_path() {
                    let path = path.display().to_string();
                    state.info = match copy_to_clipboard(&path) {
                        Ok(()) => format!("✓ Copied to clipboard: {}", path),
                        Err(e) => format!("Clipboard copy failed: {e:#}"),
                    };
                } else {
                    state.info = "No plot selected".into();
                }
            }
            _ => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn submit(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, quitting: bool) {
    if quitting {
        return;
    }
    if state.running {
        state.info = "A run is already in progress".into();
        return;
    }
    match state.form.to_config(&state.base_config) {
        Ok(cfg) => {
            state.begin_run();
            let _ = cmd_tx.send(UiCommand::Submit(Box::new(cfg)));
        }
        Err(msg) => state.info = msg,
    }
}

/// Rows available to the plot list for a given terminal area.
fn plot_list_rows(area: Rect) -> usize {
    // Tabs (3) + status (3) + list borders (2) + header (1).
    (area.height as usize).saturating_sub(9).max(1)
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Form"),
        Line::from("Plots"),
        Line::from("Log"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Redshift Classifier"),
    )
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_FORM => draw_form(chunks[1], f, state),
        TAB_PLOTS => draw_plots(chunks[1], f, state),
        TAB_LOG => draw_log(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }

    let status_style = if state.running {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let status = Paragraph::new(Line::from(Span::styled(state.info.clone(), status_style)))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[2]);
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "Yes"
    } else {
        "No"
    }
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let form = &state.form;
    let focused = form.focused();
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            "Please provide raw optical data",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for field in form.fields() {
        let (label, value) = match field {
            FormField::MEstimator => ("Use M-Estimator?", format!("◀ {} ▶", yes_no(form.m_estimator))),
            FormField::WeightCutoff => (
                "Weight cutoff",
                format!("◀ {:.2} ▶  (0.00 – 1.00)", form.weight_cutoff()),
            ),
            FormField::Mice => {
                let label = if form.m_estimator {
                    "Apply MICE with M-Estimator?"
                } else {
                    "Apply MICE without M-Estimator?"
                };
                (label, format!("◀ {} ▶", yes_no(form.mice)))
            }
            FormField::RedshiftCutoff => (
                "Redshift cutoff",
                format!("◀ {:.1} ▶  (2.0 – 4.0)", form.redshift_cutoff()),
            ),
            FormField::Input => {
                let value = if form.input.is_empty() && !form.editing_input {
                    "<press enter to type a .csv or .txt path>".to_string()
                } else if form.editing_input {
                    format!("{}▏", form.input)
                } else {
                    form.input.clone()
                };
                ("Input file", value)
            }
            FormField::Submit => ("", "[ Submit ]".to_string()),
        };

        let marker = if field == focused { "› " } else { "  " };
        let value_style = if field == focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let mut spans = vec![Span::styled(marker, Style::default().fg(Color::Magenta))];
        if !label.is_empty() {
            spans.push(Span::styled(
                format!("{label:<32}"),
                Style::default().fg(Color::Gray),
            ));
        }
        spans.push(Span::styled(value, value_style));
        lines.push(Line::from(spans));
        lines.push(Line::from(""));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Analysis"));
    f.render_widget(p, cols[0]);

    draw_workflow_panel(cols[1], f, state);
}

fn draw_workflow_panel(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let workflow = state.form.workflow();
    let mut lines: Vec<Line<'static>> = Vec::new();
    push_wrapped_status_kv(&mut lines, "Workflow", &workflow.to_string(), area.width);
    push_wrapped_status_kv(
        &mut lines,
        "Interpreter",
        &state.base_config.interpreter.display().to_string(),
        area.width,
    );
    push_wrapped_status_kv(
        &mut lines,
        "Plots",
        &workflow.plot_dir().display().to_string(),
        area.width,
    );
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Steps:",
        Style::default().fg(Color::Gray),
    )));

    for (i, step) in workflow.steps().iter().enumerate() {
        let style = match &state.current_step {
            Some((idx, _, _)) if *idx == i && state.running => {
                Style::default().fg(Color::Yellow)
            }
            Some((idx, _, _)) if *idx > i && state.running => Style::default().fg(Color::Green),
            _ => Style::default(),
        };
        lines.push(Line::from(Span::styled(
            format!("  {}. {}", i + 1, step.script()),
            style,
        )));
    }

    if let Some(start) = state.run_start.filter(|_| state.running) {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Running for {}",
            humantime::format_duration(Duration::from_secs(start.elapsed().as_secs()))
        )));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Pipeline"));
    f.render_widget(p, area);
}

fn draw_plots(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let Some(result) = state.last_result.as_ref() else {
        let msg = if state.running {
            "Waiting for the run to finish..."
        } else {
            "No plots yet. Submit the form to run a workflow."
        };
        let p = Paragraph::new(msg).block(Block::default().borders(Borders::ALL).title("Plots"));
        f.render_widget(p, area);
        return;
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let max_items = (cols[0].height as usize).saturating_sub(3).max(1);
    let total = result.plots.len();
    let mut lines: Vec<Line> = vec![Line::from(vec![
        Span::raw(format!(
            "{} ({}/{}) - ",
            result.plot_dir.display(),
            if total > 0 { state.plot_selected + 1 } else { 0 },
            total
        )),
        Span::styled("enter", Style::default().fg(Color::Magenta)),
        Span::raw(": open, "),
        Span::styled("y", Style::default().fg(Color::Magenta)),
        Span::raw(": copy path"),
    ])];

    if total == 0 {
        lines.push(Line::from("No matching .png files were produced."));
    }
    for (i, plot) in result
        .plots
        .iter()
        .enumerate()
        .skip(state.plot_scroll_offset)
        .take(max_items)
    {
        let style = if i == state.plot_selected {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(if i == state.plot_selected { "› " } else { "  " }, style),
            Span::styled(plot.file_name(), style),
            Span::styled(
                format!("  {}", format_bytes(plot.bytes)),
                Style::default().fg(Color::Gray),
            ),
        ]));
    }

    let list = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Plots"));
    f.render_widget(list, cols[0]);

    let mut details: Vec<Line<'static>> = Vec::new();
    push_wrapped_status_kv(&mut details, "Workflow", &result.workflow.to_string(), cols[1].width);
    push_wrapped_status_kv(&mut details, "Finished", &result.timestamp_utc, cols[1].width);
    push_wrapped_status_kv(
        &mut details,
        "Took",
        &humantime::format_duration(crate::model::round_ms(result.elapsed)).to_string(),
        cols[1].width,
    );
    if let Some(plot) = result.plots.get(state.plot_selected) {
        details.push(Line::from(""));
        push_wrapped_status_kv(
            &mut details,
            "Path",
            &plot.path.display().to_string(),
            cols[1].width,
        );
        push_wrapped_status_kv(&mut details, "Size", &format_bytes(plot.bytes), cols[1].width);
    }
    let p = Paragraph::new(details).block(Block::default().borders(Borders::ALL).title("Details"));
    f.render_widget(p, cols[1]);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let visible = (area.height as usize).saturating_sub(2);
    let start = state.log.len().saturating_sub(visible);
    let lines: Vec<Line> = state.log[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(p, area);
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn plot_rows_never_zero() {
        assert_eq!(plot_list_rows(Rect::new(0, 0, 80, 4)), 1);
        assert_eq!(plot_list_rows(Rect::new(0, 0, 80, 30)), 21);
    }
}
