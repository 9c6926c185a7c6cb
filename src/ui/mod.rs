mod theme;

use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    prelude::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Paragraph},
};

use crate::app::App;
use crate::clock::Clock;
use crate::flags::FlagStore;
use crate::report::format_duration;
use theme::Theme;

/// Renders the watch screen for a single frame.
pub fn draw<F: FlagStore, C: Clock>(frame: &mut Frame, app: &App<'_, F, C>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(7),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "  lifebalance  ",
            Style::default().fg(Color::Black).bg(Theme::primary()),
        ),
        Span::raw(" "),
        Span::styled(
            "timer",
            Style::default()
                .fg(Theme::secondary())
                .add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(rounded_block());
    frame.render_widget(header, layout[0]);

    let body = Paragraph::new(body_text(app))
        .style(Style::default().fg(Theme::text()))
        .alignment(Alignment::Center)
        .block(rounded_block());
    frame.render_widget(body, layout[1]);

    let footer = Paragraph::new(Line::from(Span::styled(
        " s: stop   r: resume from saved state   q: quit",
        Style::default().fg(Theme::dim()),
    )))
    .block(rounded_block());
    frame.render_widget(footer, layout[2]);
}

fn body_text<'a, F: FlagStore, C: Clock>(app: &'a App<'_, F, C>) -> Text<'a> {
    let mut lines = vec![Line::from("")];

    if let Some(status) = &app.status {
        lines.push(Line::from(Span::styled(
            status.as_str(),
            Style::default().fg(Theme::warn()),
        )));
        lines.push(Line::from(""));
    }

    match (&app.task, app.is_timer_running()) {
        (Some(task), true) => {
            let project_color = app
                .project
                .as_ref()
                .and_then(|project| crate::color::rgb(&project.color))
                .map(|(r, g, b)| Color::Rgb(r, g, b))
                .unwrap_or(Theme::primary());
            let project_name = app
                .project
                .as_ref()
                .map(|project| project.name.as_str())
                .unwrap_or("Unknown project");
            lines.push(Line::from(vec![
                Span::styled("● ", Style::default().fg(project_color)),
                Span::styled(
                    project_name,
                    Style::default()
                        .fg(project_color)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" / ", Style::default().fg(Theme::dim())),
                Span::raw(task.name.as_str()),
            ]));
            lines.push(Line::from(""));
            let elapsed = app.elapsed.map(format_duration).unwrap_or_default();
            lines.push(Line::from(Span::styled(
                elapsed,
                Style::default()
                    .fg(Theme::active())
                    .add_modifier(Modifier::BOLD),
            )));
            if let Some(started_at) = app.started_at {
                lines.push(Line::from(Span::styled(
                    format!(
                        "started {}",
                        started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                    ),
                    Style::default().fg(Theme::dim()),
                )));
            }
        }
        _ => {
            lines.push(Line::from(Span::styled(
                "No timer running.",
                Style::default().fg(Theme::dim()),
            )));
            if let Some(entry) = &app.last_stopped {
                lines.push(Line::from(""));
                lines.push(Line::from(vec![
                    Span::styled("Recorded ", Style::default().fg(Theme::dim())),
                    Span::styled(
                        format_duration(entry.duration()),
                        Style::default()
                            .fg(Theme::ended())
                            .add_modifier(Modifier::BOLD),
                    ),
                ]));
            }
        }
    }
    Text::from(lines)
}

fn rounded_block() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().fg(Theme::secondary()))
}
