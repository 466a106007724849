pub mod charting;

use chidori::{
    clock::Clock,
    session::{Event, SessionStatus},
    time_series::as_tuples,
    util::{format_event_time, format_optional, trend_arrow},
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::{App, Connection, Mode};
use charting::{axis_labels, time_bounds, value_bounds};

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;
const TIMELINE_SEPARATOR: &str = "   ";

impl<C: Clock> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // status line
                Constraint::Length(3), // metric cards
                Constraint::Min(6),    // impedance chart
                Constraint::Length(8), // rate chart
                Constraint::Length(3), // events timeline
                Constraint::Length(1), // alarm banner / status message
                Constraint::Length(1), // alarm settings
                Constraint::Length(1), // legend
            ])
            .split(area);

        render_status_line(self, chunks[0], buf);
        render_cards(self, chunks[1], buf);
        render_impedance_chart(self, chunks[2], buf);
        render_rate_chart(self, chunks[3], buf);
        render_timeline(self.engine.events(), chunks[4], buf);
        render_banner(self, chunks[5], buf);

        Paragraph::new(Span::styled(
            self.engine.alarm().describe(),
            Style::default().fg(Color::Gray),
        ))
        .alignment(Alignment::Center)
        .render(chunks[6], buf);

        render_legend(self, chunks[7], buf);
    }
}

fn status_style(status: SessionStatus) -> Style {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    match status {
        SessionStatus::Idle => bold.fg(Color::Gray),
        SessionStatus::Running => bold.fg(Color::Green),
        SessionStatus::Paused => bold.fg(Color::Yellow),
    }
}

fn render_status_line<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let status = app.engine.status();

    let connection = match &app.connection {
        Connection::Online(addr) => Span::styled(format!("● {addr}"), Style::default().fg(Color::Green)),
        Connection::Offline => Span::styled("○ offline", Style::default().fg(Color::DarkGray)),
        Connection::Lost(addr) => Span::styled(
            format!("✕ {addr} disconnected"),
            Style::default().fg(Color::Red),
        ),
    };

    let line = Line::from(vec![
        Span::styled("CHIDORI", bold_style.fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(status.to_string().to_uppercase(), status_style(status)),
        Span::raw("   "),
        connection,
        Span::raw("   "),
        Span::styled(format!("⏱ {}", app.engine.elapsed_label()), bold_style),
    ]);

    Paragraph::new(line).render(area, buf);
}

fn card(title: &str, value: String, style: Style, area: Rect, buf: &mut Buffer) {
    Paragraph::new(Span::styled(value, style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title))
        .render(area, buf);
}

fn render_cards<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let stats = app.engine.statistics();

    let cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(area);

    card(
        "Initial Ω",
        format_optional(stats.initial_value),
        bold_style,
        cells[0],
        buf,
    );
    card(
        "Current Ω",
        format_optional(stats.current_value),
        bold_style.fg(Color::Cyan),
        cells[1],
        buf,
    );

    let (change_text, change_style) = match stats.change() {
        Some(change) => {
            let pct = stats
                .change_percent()
                .map(|p| format!(" ({p:+.1}%)"))
                .unwrap_or_default();
            let color = if change < 0.0 { Color::Red } else { Color::Green };
            (
                format!("{} {change:+.2}{pct}", trend_arrow(change)),
                bold_style.fg(color),
            )
        }
        None => (String::from("--"), bold_style),
    };
    card("Change", change_text, change_style, cells[2], buf);

    card(
        "Rate Ω/min",
        format!("{:+.2}", stats.rate),
        bold_style.fg(Color::Magenta),
        cells[3],
        buf,
    );
    card(
        "Min / Max / Avg",
        format!(
            "{} / {} / {}",
            format_optional(stats.min),
            format_optional(stats.max),
            format_optional(stats.mean())
        ),
        Style::default(),
        cells[4],
        buf,
    );
    card(
        "Events",
        app.engine.events().len().to_string(),
        bold_style.fg(Color::Yellow),
        cells[5],
        buf,
    );
}

fn render_impedance_chart<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let engine = &app.engine;

    let readings = as_tuples(engine.readings());
    let markers: Vec<(f64, f64)> = engine
        .events()
        .iter()
        .filter_map(|e| e.value.map(|v| (e.time, v)))
        .collect();

    let x_bounds = time_bounds(&readings, engine.elapsed_secs());
    let threshold = engine
        .statistics()
        .initial_value
        .and_then(|initial| engine.alarm().threshold_for(initial))
        .filter(|_| engine.alarm().enabled);
    let threshold_line: Vec<(f64, f64)> = threshold
        .map(|t| vec![(x_bounds[0], t), (x_bounds[1], t)])
        .unwrap_or_default();
    let y_bounds = value_bounds(&readings, threshold.as_slice());

    let mut datasets = vec![Dataset::default()
        .name("impedance")
        .marker(Marker::Braille)
        .style(Style::default().fg(Color::Cyan))
        .graph_type(GraphType::Line)
        .data(&readings)];
    if !markers.is_empty() {
        datasets.push(
            Dataset::default()
                .name("events")
                .marker(Marker::Dot)
                .style(bold_style.fg(Color::Yellow))
                .graph_type(GraphType::Scatter)
                .data(&markers),
        );
    }
    if !threshold_line.is_empty() {
        datasets.push(
            Dataset::default()
                .name("alarm")
                .marker(Marker::Braille)
                .style(Style::default().fg(Color::Red))
                .graph_type(GraphType::Line)
                .data(&threshold_line),
        );
    }

    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title("Impedance (Ω)"))
        .x_axis(
            Axis::default()
                .title("seconds")
                .bounds(x_bounds)
                .labels(axis_labels(x_bounds, 3)),
        )
        .y_axis(
            Axis::default()
                .title("Ω")
                .bounds(y_bounds)
                .labels(axis_labels(y_bounds, 3)),
        )
        .render(area, buf);
}

fn render_rate_chart<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let rates = as_tuples(app.engine.rate_series());
    let x_bounds = time_bounds(&rates, app.engine.elapsed_secs());
    let y_bounds = value_bounds(&rates, &[0.0]);

    let datasets = vec![Dataset::default()
        .marker(Marker::Braille)
        .style(Style::default().fg(Color::Magenta))
        .graph_type(GraphType::Line)
        .data(&rates)];

    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title("Rate of change (Ω/min)"))
        .x_axis(Axis::default().bounds(x_bounds))
        .y_axis(
            Axis::default()
                .bounds(y_bounds)
                .labels(axis_labels(y_bounds, 2)),
        )
        .render(area, buf);
}

fn timeline_entry(event: &Event) -> String {
    let value = event
        .value
        .map(|v| format!(" {v:.2} Ω"))
        .unwrap_or_default();
    let change = event
        .change
        .map(|c| format!(" ({c:+.2})"))
        .unwrap_or_default();
    format!("▲ #{} {}{value}{change}", event.id, format_event_time(event.time))
}

/// Newest events that fit on one line, oldest of them first
fn visible_timeline(events: &[Event], width: usize) -> Vec<String> {
    let mut used = 0;
    let mut entries: Vec<String> = events
        .iter()
        .rev()
        .map(timeline_entry)
        .take_while(|entry| {
            let needed = entry.width() + if used == 0 { 0 } else { TIMELINE_SEPARATOR.width() };
            if used + needed > width {
                return false;
            }
            used += needed;
            true
        })
        .collect();
    entries.reverse();
    entries
}

fn render_timeline(events: &[Event], area: Rect, buf: &mut Buffer) {
    let block = Block::default().borders(Borders::ALL).title("Events");
    let inner_width = block.inner(area).width as usize;

    let text = if events.is_empty() {
        Span::styled(
            "no events marked",
            Style::default().add_modifier(Modifier::DIM),
        )
    } else {
        Span::styled(
            visible_timeline(events, inner_width).join(TIMELINE_SEPARATOR),
            Style::default().fg(Color::Yellow),
        )
    };

    Paragraph::new(text).block(block).render(area, buf);
}

fn render_banner<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let line = if app.engine.alarm_fired() {
        Span::styled(
            "⚠ ALARM: impedance reached the threshold, it is advisable to urinate",
            Style::default()
                .fg(Color::White)
                .bg(Color::Red)
                .add_modifier(Modifier::BOLD),
        )
    } else if let Some(message) = &app.status_message {
        Span::styled(
            message.as_str(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::ITALIC),
        )
    } else {
        Span::raw("")
    };

    Paragraph::new(line)
        .alignment(Alignment::Center)
        .render(area, buf);
}

fn render_legend<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let text = match &app.mode {
        Mode::Monitor => {
            let toggle = if app.engine.is_running() {
                "(space) pause"
            } else {
                "(space) start"
            };
            format!(
                "{toggle} / (e)vent / (ctrl+r) reset / e(x)port / (a)larm / (m)ode / (t)hreshold / (q)uit"
            )
        }
        Mode::ConfirmReset => {
            String::from("reset session? all readings and events are discarded  (y)es / (n)o")
        }
        Mode::ExportMenu => String::from("export as (c)sv / (t)xt / (j)son / (esc) cancel"),
        Mode::EditThreshold(input) => format!(
            "{} threshold ({}): {input}█  (enter) save / (esc) cancel",
            app.engine.alarm().mode,
            app.engine.alarm().mode.unit()
        ),
    };

    Paragraph::new(Span::styled(text, italic_style)).render(area, buf);
}
