//! UI rendering for the task grid.

use crate::app::{App, InputMode};
use grid_core::{render_row, RenderedRow, StyleScheme, TaskStatus, TextRenderer};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};

const HEADER_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 3;

/// Table rows that fit in a terminal `height` lines tall.
pub fn body_height(height: u16) -> u16 {
    // Two borders plus the column header line.
    height.saturating_sub(HEADER_HEIGHT + FOOTER_HEIGHT + 3)
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(5),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(f.area());

    draw_title(f, app, chunks[0]);
    draw_table(f, app, chunks[1]);
    draw_status_bar(f, app, chunks[2]);

    if app.show_help {
        draw_help(f);
    }
}

fn draw_title(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        " Task Grid ",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];

    if app.input_mode == InputMode::Search || !app.search_buffer.is_empty() {
        spans.push(Span::raw(format!(" /{}", app.search_buffer)));
        if app.input_mode == InputMode::Search {
            spans.push(Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)));
        }
    }
    if let Some(i) = app.status_filter {
        spans.push(Span::raw(format!("  [status: {}]", TaskStatus::ALL[i].label())));
    }
    if app.from_today {
        spans.push(Span::raw("  [from today]"));
    }

    let title = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn status_style(scheme: StyleScheme, status: TaskStatus) -> Style {
    match scheme {
        StyleScheme::Css => Style::default(),
        StyleScheme::Utility => Style::default().fg(match status {
            TaskStatus::Overdue => Color::Red,
            TaskStatus::Blocked => Color::Magenta,
            TaskStatus::InProgress => Color::Cyan,
            TaskStatus::OnHold => Color::Yellow,
            TaskStatus::NotStarted => Color::Gray,
        }),
    }
}

fn draw_table(f: &mut Frame, app: &App, area: Rect) {
    let widths: Vec<Constraint> = app
        .columns
        .resolve_widths(area.width.saturating_sub(2))
        .into_iter()
        .map(Constraint::Length)
        .collect();

    let header_cells = app.columns.iter().enumerate().map(|(i, col)| {
        let arrow = app
            .state
            .sort
            .as_ref()
            .filter(|s| s.key == col.key)
            .map(|s| format!(" {}", s.direction.arrow()))
            .unwrap_or_default();
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if i == app.selected_column {
            style = style.fg(Color::Yellow);
        }
        Cell::from(format!("{}{}", col.header, arrow)).style(style)
    });
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray));

    let keys: Vec<&str> = app.columns.iter().map(|c| c.key.as_str()).collect();
    let rows: Vec<Row> = app
        .view
        .rows()
        .iter()
        .map(|placement| match render_row(placement, &app.columns, &TextRenderer) {
            RenderedRow::Cells { index, cells, .. } => {
                let task = placement.record();
                let cells = cells.into_iter().enumerate().map(|(c, text)| {
                    let editing = task.is_some_and(|t| app.state.editing.is_editing_cell(&t.id, keys[c]));
                    if editing {
                        Cell::from(format!("{}\u{258f}", app.state.editing.draft()))
                            .style(Style::default().fg(Color::Black).bg(Color::Yellow))
                    } else if keys[c] == "status" {
                        let style = task
                            .map(|t| status_style(app.config.style, t.status))
                            .unwrap_or_default();
                        Cell::from(text).style(style)
                    } else {
                        Cell::from(text)
                    }
                });
                let mut row = Row::new(cells);
                if index == app.selected {
                    row = row.style(Style::default().add_modifier(Modifier::REVERSED));
                }
                row
            }
            RenderedRow::Loading { .. } => Row::new(vec![Cell::from("Loading more...")])
                .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)),
        })
        .collect();

    let title = if app.is_scrolled() { " Tasks (scrolling) " } else { " Tasks " };
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let position = match app.view.page_info {
        Some(info) => info.to_string(),
        None if app.view.total_count == 0 => "No rows".to_string(),
        None => format!(
            "Rows {} to {} of {}",
            app.view.range_start + 1,
            app.view.range_end,
            app.view.total_count
        ),
    };
    let loading = if app.reloading {
        " (refreshing)"
    } else if app.state.loader.is_in_flight() {
        " (loading)"
    } else {
        ""
    };
    let left = format!("{} | {} loaded{}", position, app.view.source_count, loading);
    f.render_widget(
        Paragraph::new(left).block(Block::default().borders(Borders::ALL)),
        chunks[0],
    );

    let right = app.message.clone().unwrap_or_else(|| {
        format!(
            "Overdue: {} | Blocked: {} | In progress: {} | ? help",
            app.stats.overdue, app.stats.blocked, app.stats.in_progress
        )
    });
    f.render_widget(
        Paragraph::new(right).block(Block::default().borders(Borders::ALL)),
        chunks[1],
    );
}

fn draw_help(f: &mut Frame) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let help_text = vec![
        Line::from(Span::styled("Navigation", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  j/k or arrows  Move selection"),
        Line::from("  h/l            Select column"),
        Line::from("  g/G            First/last row"),
        Line::from("  n/p, PgDn/PgUp Next/previous page"),
        Line::from("  v              Toggle paged/scrolling"),
        Line::from(""),
        Line::from(Span::styled("Editing", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  e or Enter     Edit cell (Enter/Tab save, Esc cancel)"),
        Line::from("  Space          Cycle status"),
        Line::from("  d              Delete task"),
        Line::from(""),
        Line::from(Span::styled("Queries", Style::default().add_modifier(Modifier::BOLD))),
        Line::from("  s / S          Sort by column / clear sort"),
        Line::from("  /              Search"),
        Line::from("  f              Cycle status filter"),
        Line::from("  t              Only tasks starting today or later"),
        Line::from("  Esc            Clear filters"),
        Line::from("  r              Refresh from source"),
        Line::from(""),
        Line::from("  q              Quit"),
    ];

    let help = Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_height() {
        assert_eq!(body_height(30), 21);
        assert_eq!(body_height(4), 0);
    }
}
