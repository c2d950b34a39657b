use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit (waits for a running workflow)"),
        ]),
        key_line("tab", 9, "Switch tabs"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Form tab:"),
        key_line("↑/↓", 9, "Move between fields"),
        key_line("←/→", 9, "Adjust slider / toggle"),
        key_line("space", 7, "Toggle"),
        key_line("enter", 7, "Edit input path, or submit on Submit"),
        key_line("esc", 9, "Stop editing the input path"),
        Line::from(""),
        Line::from("Plots tab:"),
        key_line("↑/↓", 9, "Navigate"),
        key_line("enter", 7, "Open plot in image viewer"),
        key_line("y", 11, "Copy plot path to clipboard"),
        Line::from(""),
        Line::from("Rscript output is written to the child log (see --child-log)."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
