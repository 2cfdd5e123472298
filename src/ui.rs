//! Terminal user interface with ratatui.

use crate::app::App;
use crate::export::{ExportFormat, export_rows, format_percent, format_rsi};
use crate::models::{ListId, MetricRow, SortDirection, SortKey};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

/// Colors for the UI.
pub struct UiColors {
    pub gain: Color,
    pub loss: Color,
    pub neutral: Color,
    pub header_bg: Color,
    pub selected_bg: Color,
    pub border: Color,
    pub star: Color,
}

impl Default for UiColors {
    fn default() -> Self {
        Self {
            gain: Color::Green,
            loss: Color::Red,
            neutral: Color::White,
            header_bg: Color::DarkGray,
            selected_bg: Color::Rgb(40, 40, 60),
            border: Color::DarkGray,
            star: Color::Yellow,
        }
    }
}

const COLUMNS: [(&str, Option<SortKey>); 8] = [
    ("SYMBOL", Some(SortKey::Symbol)),
    ("1D%", Some(SortKey::Perf1d)),
    ("5D%", Some(SortKey::Perf5d)),
    ("20D%", Some(SortKey::Perf20d)),
    ("60D%", Some(SortKey::Perf60d)),
    ("RSI14", Some(SortKey::Rsi14)),
    ("CURVE", None),
    ("★", None),
];

/// Render the main UI.
pub fn render(frame: &mut Frame, app: &App) {
    let colors = UiColors::default();
    let rows = app.visible_rows();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs and summary
            Constraint::Min(5),    // Table
            Constraint::Length(1), // Status or chart link
            Constraint::Length(1), // Key hints
        ])
        .split(frame.area());

    render_header(frame, app, &rows, chunks[0], &colors);
    render_table(frame, app, &rows, chunks[1], &colors);
    render_status(frame, app, chunks[2], &colors);
    render_footer(frame, app, chunks[3], &colors);

    if let Some(ref input) = app.input {
        render_input(frame, app.active, input, &colors);
    }

    if app.show_help {
        render_help_overlay(frame, &colors);
    }

    if let Some(ref error) = app.error {
        render_error(frame, error, &colors);
    }
}

/// Render list tabs with a one-line summary below.
fn render_header(frame: &mut Frame, app: &App, rows: &[MetricRow], area: Rect, colors: &UiColors) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(2)])
        .split(area);

    let titles = ListId::ALL
        .iter()
        .enumerate()
        .map(|(i, id)| Line::from(format!("{} {}", i + 1, id.title())));
    let selected = ListId::ALL.iter().position(|id| *id == app.active).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(colors.neutral))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        );
    frame.render_widget(tabs, chunks[0]);

    let gains = rows.iter().filter(|r| r.perf1d.is_some_and(|p| p > 0.0)).count();
    let losses = rows.iter().filter(|r| r.perf1d.is_some_and(|p| p < 0.0)).count();

    let summary = Line::from(vec![
        Span::styled(
            "WATCHBOARD ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("- {} symbols  ", rows.len())),
        Span::styled(format!("{} ", gains), Style::default().fg(colors.gain)),
        Span::raw("up  "),
        Span::styled(format!("{} ", losses), Style::default().fg(colors.loss)),
        Span::raw("down  "),
        Span::raw(format!("Updated: {}", app.time_since_refresh())),
    ]);

    let header = Paragraph::new(summary).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(colors.border)),
    );
    frame.render_widget(header, chunks[1]);
}

fn percent_cell(value: Option<f64>, colors: &UiColors) -> Cell<'static> {
    let color = match value {
        Some(v) if v > 0.0 => colors.gain,
        Some(v) if v < 0.0 => colors.loss,
        _ => colors.neutral,
    };
    Cell::from(format_percent(value)).style(Style::default().fg(color))
}

/// Render the metrics table.
fn render_table(frame: &mut Frame, app: &App, rows: &[MetricRow], area: Rect, colors: &UiColors) {
    let (sort_key, direction) = app.sort_state();

    let header_cells = COLUMNS.iter().map(|(name, key)| {
        let active = *key == Some(sort_key);
        let style = if active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        let indicator = match (active, direction) {
            (false, _) => "",
            (true, SortDirection::Ascending) => " ▲",
            (true, SortDirection::Descending) => " ▼",
        };
        Cell::from(format!("{}{}", name, indicator)).style(style)
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(colors.header_bg))
        .height(1);

    let body = rows.iter().enumerate().map(|(i, row)| {
        let row_style = if i == app.selected {
            Style::default().bg(colors.selected_bg)
        } else {
            Style::default()
        };
        let star = if app.is_starred(&row.symbol) { "★" } else { "" };

        Row::new(vec![
            Cell::from(row.symbol.to_string()),
            percent_cell(row.perf1d, colors),
            percent_cell(row.perf5d, colors),
            percent_cell(row.perf20d, colors),
            percent_cell(row.perf60d, colors),
            Cell::from(format_rsi(row.rsi14)),
            Cell::from(row.curve_shape.clone().unwrap_or_default()),
            Cell::from(star).style(Style::default().fg(colors.star)),
        ])
        .style(row_style)
    });

    let widths = [
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(3),
    ];

    let placeholder = if rows.is_empty() {
        if app.loading { " Loading... " } else { " No data " }
    } else {
        ""
    };

    let table = Table::new(body, widths)
        .header(header)
        .block(Block::default().borders(Borders::NONE).title(placeholder))
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = TableState::default();
    state.select((!rows.is_empty()).then_some(app.selected));

    frame.render_stateful_widget(table, area, &mut state);
}

/// Render the status line: loading, last action, or the selected chart link.
fn render_status(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let line = if app.loading {
        Line::from(Span::styled(" Loading...", Style::default().fg(Color::Yellow)))
    } else if let Some(ref status) = app.status {
        Line::from(format!(" {}", status))
    } else if let Some(row) = app.selected_row() {
        Line::from(vec![
            Span::raw(" Chart: "),
            Span::styled(row.symbol.chart_url(), Style::default().fg(Color::Cyan)),
        ])
    } else {
        Line::from("")
    };

    frame.render_widget(Paragraph::new(line).style(Style::default().fg(colors.neutral)), area);
}

/// Render the footer with keybindings.
fn render_footer(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let (key, direction) = app.sort_state();
    let sort_info = format!(
        "{} {}",
        key.header(),
        match direction {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    );

    let mut spans = Vec::new();
    for (k, label) in [
        (" q", ":quit "),
        ("?", ":help "),
        ("Tab", ":list "),
        ("s", ":sort "),
        ("r", ":reverse "),
        ("R", ":refresh "),
        ("*", ":star "),
    ] {
        spans.push(Span::styled(k, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
    }
    if !app.active.is_server_determined() {
        spans.push(Span::styled("a", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(":add "));
        spans.push(Span::styled("d", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(":remove "));
    }
    spans.push(Span::raw(format!("| {}", sort_info)));

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(colors.header_bg));
    frame.render_widget(footer, area);
}

/// Render the add-symbol prompt.
fn render_input(frame: &mut Frame, list: ListId, input: &str, colors: &UiColors) {
    let area = centered_rect(40, 15, frame.area());
    let prompt = Paragraph::new(Line::from(vec![
        Span::raw(input.to_string()),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ]))
    .block(
        Block::default()
            .title(format!(" Add to {} (Enter/Esc) ", list.title()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(colors.border)),
    );

    frame.render_widget(Clear, area);
    frame.render_widget(prompt, area);
}

/// Render help overlay.
fn render_help_overlay(frame: &mut Frame, colors: &UiColors) {
    let area = centered_rect(60, 70, frame.area());

    let help_text = vec![
        Line::from(Span::styled("WATCHBOARD HELP", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  ↑/k       Move up"),
        Line::from("  ↓/j       Move down"),
        Line::from("  g/Home    Go to top"),
        Line::from("  G/End     Go to bottom"),
        Line::from("  Tab/→     Next list"),
        Line::from("  1-5       Jump to list"),
        Line::from(""),
        Line::from("Sorting:"),
        Line::from("  s         Cycle sort column"),
        Line::from("  r         Reverse sort order"),
        Line::from("  F1-F6     Sort by column"),
        Line::from(""),
        Line::from("Lists:"),
        Line::from("  a         Add symbol"),
        Line::from("  d/Del     Remove selected"),
        Line::from("  */Space   Star or unstar"),
        Line::from("  R         Refresh (retry after an error)"),
        Line::from("  q/Esc     Quit"),
        Line::from("  h/?       Toggle help"),
        Line::from(""),
        Line::from("Press any key to close"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.border)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
}

/// Render error message.
fn render_error(frame: &mut Frame, error: &str, colors: &UiColors) {
    let area = centered_rect(50, 20, frame.area());

    let text = vec![
        Line::from(error.to_string()),
        Line::from(""),
        Line::from(Span::styled("Press R to retry", Style::default().fg(colors.neutral))),
    ];

    let error_widget = Paragraph::new(text)
        .block(
            Block::default()
                .title(" Error ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.loss)),
        )
        .style(Style::default().fg(colors.loss))
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(error_widget, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Render batch mode output (non-interactive).
pub fn render_batch(title: &str, rows: &[MetricRow], format: ExportFormat) {
    print!("{}", export_rows(title, rows, format));
}
