//! UI rendering functions
//!
//! Layout: a one-line header, the body for the current screen and a footer
//! with the keys valid on that screen. An error replaces the body until it is
//! dismissed.

use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use super::app::{App, DeleteSession, DeleteStatus, Screen};
use crate::output::{self, OutputOptions, TimeStyle};

mod colors {
    use ratatui::style::Color;

    pub const TITLE: Color = Color::Cyan;
    pub const MARKED: Color = Color::Yellow;
    pub const OK: Color = Color::Green;
    pub const ERROR: Color = Color::Red;
    pub const INACTIVE: Color = Color::DarkGray;
}

/// Main drawing function
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    match (&app.error, &app.screen) {
        (Some(error), _) => draw_error(f, error, chunks[1]),
        (None, Screen::ProviderList) => draw_providers(f, app, chunks[1]),
        (None, Screen::FetchingDisks { provider }) => draw_fetching(f, app, *provider, chunks[1]),
        (None, Screen::ProviderView { provider }) => draw_disks(f, app, *provider, chunks[1]),
        (None, Screen::DeletingDisks(session)) => draw_deleting(f, app, session, chunks[1]),
    }
    draw_footer(f, app, chunks[2]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        "unused",
        Style::default()
            .fg(colors::TITLE)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(filter) = &app.options.filter {
        spans.push(Span::raw(format!("  filter: {}", filter)));
    }
    spans.push(Span::styled(
        format!("  sort: {}", app.options.sort),
        Style::default().fg(colors::INACTIVE),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_error(f: &mut Frame, error: &str, area: Rect) {
    let text = vec![
        Line::from(Span::styled(
            "Error",
            Style::default()
                .fg(colors::ERROR)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(error.to_string()),
    ];
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_providers(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .providers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let cached = match app.cache.get(&i) {
                Some(disks) => format!(
                    "  {} disks, {} GB",
                    disks.len(),
                    output::total_size_gb(disks)
                ),
                None => String::new(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<6}", p.name()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(p.meta().to_string()),
                Span::styled(cached, Style::default().fg(colors::INACTIVE)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Providers"))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(colors::TITLE)
                .fg(Color::Black),
        );
    let mut state = ListState::default().with_selected(Some(app.provider_cursor));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_fetching(f: &mut Frame, app: &App, provider: usize, area: Rect) {
    let text = format!("Fetching unused disks from {}...", app.providers[provider].info());
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn draw_disks(f: &mut Frame, app: &App, provider: usize, area: Rect) {
    let options = OutputOptions {
        verbose: app.options.verbose,
        extra_columns: app.options.extra_columns.clone(),
        ..Default::default()
    };
    let now = Utc::now();

    let mut header = vec![String::new()];
    header.extend(output::headers(&options));
    let widths: Vec<Constraint> = header
        .iter()
        .enumerate()
        .map(|(i, _)| match i {
            0 => Constraint::Length(1),
            2 => Constraint::Min(20),
            _ => Constraint::Length(10),
        })
        .collect();

    let disks = app.cache.get(&provider);
    let rows: Vec<Row> = disks
        .into_iter()
        .flatten()
        .map(|disk| {
            let marked = app.marked.contains(disk.id());
            let mut cells = vec![if marked { "*" } else { " " }.to_string()];
            cells.extend(output::cells(disk.as_ref(), &options, TimeStyle::Relative(now)));
            let style = if marked {
                Style::default().fg(colors::MARKED)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        })
        .collect();

    let count = disks.map(|d| d.len()).unwrap_or(0);
    let size = disks.map(|d| output::total_size_gb(d)).unwrap_or(0);
    let title = format!(
        "{} - {} disks, {} GB ({} marked)",
        app.providers[provider].info(),
        count,
        size,
        app.marked.len()
    );

    let table = Table::new(rows, widths)
        .header(Row::new(header).style(Style::default().add_modifier(Modifier::BOLD)))
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .column_spacing(1);
    let mut state = TableState::default().with_selected(Some(app.disk_cursor));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_deleting(f: &mut Frame, app: &App, session: &DeleteSession, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let provider = app.providers[session.provider].info();
    let prompt = if !session.confirmed {
        Span::styled(
            format!(
                "Delete {} disks from {}? Press y to confirm, n to cancel",
                session.items.len(),
                provider
            ),
            Style::default()
                .fg(colors::MARKED)
                .add_modifier(Modifier::BOLD),
        )
    } else if session.is_done() {
        Span::styled(
            format!(
                "Done: {} deleted, {} failed. Press any key to refresh",
                session.items.len() - session.failed(),
                session.failed()
            ),
            Style::default().fg(colors::OK),
        )
    } else {
        Span::raw(format!("Deleting disks from {}...", provider))
    };
    f.render_widget(
        Paragraph::new(Line::from(prompt)).block(Block::default().borders(Borders::ALL)),
        chunks[0],
    );

    let items: Vec<ListItem> = session
        .items
        .iter()
        .map(|item| {
            let (label, color) = match &item.status {
                DeleteStatus::Pending => ("pending".to_string(), colors::INACTIVE),
                DeleteStatus::Deleting => ("deleting".to_string(), colors::MARKED),
                DeleteStatus::Deleted => ("deleted".to_string(), colors::OK),
                DeleteStatus::Failed(reason) => (format!("failed: {}", reason), colors::ERROR),
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{:<40} ", item.disk.name())),
                Span::styled(label, Style::default().fg(color)),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Disks")),
        chunks[1],
    );
}

fn key_help(keys: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, (key, action)) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" | "));
        }
        spans.push(Span::styled(*key, Style::default().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(format!(" {}", action)));
    }
    Line::from(spans)
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let keys: &[(&str, &str)] = if app.error.is_some() {
        &[("any key", "dismiss")]
    } else {
        match &app.screen {
            Screen::ProviderList => &[("↑/↓", "select"), ("enter", "open"), ("q", "quit")],
            Screen::FetchingDisks { .. } => &[("esc", "back"), ("q", "quit")],
            Screen::ProviderView { .. } => &[
                ("space", "mark"),
                ("a", "mark all"),
                ("d", "delete"),
                ("r", "refresh"),
                ("esc", "back"),
                ("q", "quit"),
            ],
            Screen::DeletingDisks(session) if !session.confirmed => {
                &[("y", "confirm"), ("n", "cancel")]
            }
            Screen::DeletingDisks(session) if session.is_done() => &[("any key", "refresh")],
            Screen::DeletingDisks(_) => &[("esc", "stop")],
        }
    };

    let help = Paragraph::new(key_help(keys))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(help, area);
}
