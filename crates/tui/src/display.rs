//! Rendering of a display window: banners, clock, station map and arrival screen.

use std::time::Duration;

use chrono::{Local, Timelike};
use pids_core::{
    color::{arrow_color, parse_color, Rgb},
    layout::{
        linear::Orientation, marquee, select_arrival_window, DriftWarning, LinearLayout,
        LinearParams, Marquee, MarqueeConfig, RingLayout, RingParams, StationRole,
    },
    markup::StyledText,
    models::{LineData, LineMode, RouteState, RunState},
    sync::{ChannelState, DisplayView, DisplayWindow, SnapshotSource},
    DisplayFacts,
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Points},
        Block, Borders, Paragraph, Widget, Wrap,
    },
    Frame,
};

use crate::clock_font;

/// Samples per layout unit when tracing ring segments.
const RING_SAMPLES_PER_UNIT: f64 = 0.5;
/// Arrival screen columns per station.
const ARRIVAL_COLUMN_WIDTH: u16 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayScreen {
    Map,
    Arrival,
}

impl DisplayScreen {
    pub fn toggled(self) -> Self {
        match self {
            DisplayScreen::Map => DisplayScreen::Arrival,
            DisplayScreen::Arrival => DisplayScreen::Map,
        }
    }
}

/// A display window as the terminal host sees it: the task handle plus the
/// last view it reported.
pub struct DisplayPane {
    pub window: DisplayWindow,
    pub view: Option<DisplayView>,
    pub state: ChannelState,
    pub recording: Option<u64>,
    pub screen: DisplayScreen,
}

impl DisplayPane {
    pub fn new(window: DisplayWindow) -> Self {
        Self {
            window,
            view: None,
            state: ChannelState::Disconnected,
            recording: None,
            screen: DisplayScreen::Map,
        }
    }

    pub fn title(&self, position: usize) -> String {
        let marker = if self.recording.is_some() { " ●REC" } else { "" };
        format!("Display {} #{}{marker}", position + 1, self.window.id())
    }
}

/// Everything a display needs besides its own view.
pub struct RenderContext<'a> {
    pub marquee: &'a MarqueeConfig,
    pub ring: RingParams,
    /// Layout units per terminal column.
    pub cell_width: f64,
    pub visible_count: usize,
    pub elapsed: Duration,
    pub drift: Option<&'a DriftWarning>,
}

pub fn rgb(color: Rgb) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

/// Spans for markup-bearing text, colored runs keep their color.
pub fn styled_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    StyledText::parse(text)
        .runs
        .into_iter()
        .map(|run| match run.color {
            Some(color) => Span::styled(run.text, base.fg(rgb(color))),
            None => Span::styled(run.text, base),
        })
        .collect()
}

pub fn draw_display(frame: &mut Frame, area: Rect, pane: &DisplayPane, ctx: &RenderContext) {
    let Some(view) = pane.view.as_ref() else {
        let message = match pane.state {
            ChannelState::Disconnected => "未连接 No controller connection",
            ChannelState::AwaitingSnapshot | ChannelState::Synced => {
                "等待控制器 Waiting for the controller..."
            }
        };
        let paragraph = Paragraph::new(message)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(clock_font::FONT_HEIGHT as u16 + 2),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(area);

    let clock_width = clock_font::width("00:00") as u16 + 2;
    let header = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(clock_width)])
        .split(chunks[0]);

    let facts = DisplayFacts::derive(&view.line, &view.route);
    render_banner(frame, header[0], view, facts.as_ref(), ctx);
    render_clock(frame, header[1]);

    match pane.screen {
        DisplayScreen::Map if view.line.meta.mode == LineMode::Loop => {
            render_ring(frame, chunks[1], &view.line, &view.route, ctx)
        }
        DisplayScreen::Map => render_linear(frame, chunks[1], &view.line, &view.route, ctx),
        DisplayScreen::Arrival => {
            render_arrival(frame, chunks[1], &view.line, &view.route, ctx.visible_count)
        }
    }

    render_footer(frame, chunks[2], pane, view, ctx);
}

fn render_banner(
    frame: &mut Frame,
    area: Rect,
    view: &DisplayView,
    facts: Option<&DisplayFacts>,
    ctx: &RenderContext,
) {
    let line = &view.line;
    let theme = pids_core::layout::theme_color(&line.meta);
    let bold = Style::default().add_modifier(Modifier::BOLD);

    let mut title = styled_spans(&line.meta.line_name, bold.fg(rgb(theme)));
    title.push(Span::raw("  "));
    title.push(Span::raw(line.meta.dir_type.label()));
    title.push(Span::raw("  "));
    title.push(Span::raw(line.meta.service_mode.label()));
    let mut lines = vec![Line::from(title)];

    let Some(facts) = facts else {
        lines.push(Line::from("无车站 No stations"));
        let block = Block::default().borders(Borders::ALL);
        frame.render_widget(Paragraph::new(lines).block(block), area);
        return;
    };

    let label = match (view.route.state, facts.at_terminus) {
        (RunState::Arriving, true) => "终点站 Terminus ",
        (RunState::Arriving, false) => "本站 Now at ",
        (RunState::Running, true) => "下一站 终点站 Next, terminus ",
        (RunState::Running, false) => "下一站 Next ",
    };
    if let Some(station) = line.station(facts.announced) {
        let inner_width = area.width.saturating_sub(2) as usize;
        let container = inner_width.saturating_sub(Line::from(label).width());
        let mut spans = vec![Span::styled(label, Style::default().fg(Color::Gray))];
        spans.extend(scrolling_spans(&station.name, container, ctx, bold));
        lines.push(Line::from(spans));
        lines.push(Line::from(Span::styled(
            station.en.clone(),
            Style::default().fg(Color::Gray),
        )));
    }

    let mut details = Vec::new();
    if let Some(terminal) = facts.terminal.and_then(|idx| line.station(idx)) {
        details.push(Span::raw("终点 To "));
        details.extend(styled_spans(&terminal.name, Style::default()));
        details.push(Span::raw(format!(" {}  ", terminal.en)));
    }
    details.push(Span::styled(
        facts.door.label(),
        Style::default().fg(Color::Yellow),
    ));
    lines.push(Line::from(details));

    if !facts.transfers.is_empty() {
        let mut badges = vec![Span::raw("换乘 Transfer ")];
        for transfer in &facts.transfers {
            let color = parse_color(&transfer.color).unwrap_or(Rgb::INACTIVE);
            let mut style = Style::default().bg(rgb(color)).fg(rgb(arrow_color(color)));
            if transfer.suspended {
                style = style.add_modifier(Modifier::CROSSED_OUT);
            }
            let mut text = format!(" {} ", pids_core::markup::strip(&transfer.line));
            if transfer.exit_transfer {
                text.push_str("出站 ");
            }
            badges.push(Span::styled(text, style));
            badges.push(Span::raw(" "));
        }
        lines.push(Line::from(badges));
    }

    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

/// `text` fitted into `container` columns, looping when it does not fit.
fn scrolling_spans(
    text: &str,
    container: usize,
    ctx: &RenderContext,
    base: Style,
) -> Vec<Span<'static>> {
    let plain = pids_core::markup::strip(text);
    let text_cols = Line::from(plain.as_str()).width();
    let decision = Marquee::decide(
        text_cols as f64 * ctx.cell_width,
        container as f64 * ctx.cell_width,
        ctx.marquee.separator_width(ctx.cell_width),
        ctx.marquee,
    );
    if !decision.is_scrolling() {
        return styled_spans(text, base);
    }
    let chars = plain.chars().count().max(1);
    // Frame in characters; wide glyphs take two columns.
    let budget = container * chars / text_cols.max(1);
    let offset_cols = decision.offset_at(ctx.elapsed) / ctx.cell_width.max(1.0);
    let offset = (offset_cols * chars as f64 / text_cols.max(1) as f64) as usize;
    vec![Span::styled(
        marquee::frame(&plain, &ctx.marquee.separator, budget, offset),
        base,
    )]
}

fn render_clock(frame: &mut Frame, area: Rect) {
    let now = Local::now();
    let mut text = now.format("%H:%M").to_string();
    if now.second() % 2 == 1 {
        text = text.replace(':', " ");
    }
    let lines: Vec<Line> = clock_font::render(&text)
        .into_iter()
        .map(|row| Line::from(Span::styled(row, Style::default().fg(Color::White))))
        .collect();
    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn render_linear(
    frame: &mut Frame,
    area: Rect,
    line: &LineData,
    route: &RouteState,
    ctx: &RenderContext,
) {
    let block = Block::default().borders(Borders::ALL).title("线路图 Line map");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let layout = LinearLayout::compute(
        line,
        route,
        LinearParams {
            viewport_width: f64::from(inner.width) * ctx.cell_width,
            visible_count: ctx.visible_count,
        },
    );
    frame.render_widget(
        LinearMap {
            layout: &layout,
            line,
            cell_width: ctx.cell_width,
            marquee: ctx.marquee,
            elapsed: ctx.elapsed,
        },
        inner,
    );
}

struct LinearMap<'a> {
    layout: &'a LinearLayout,
    line: &'a LineData,
    cell_width: f64,
    marquee: &'a MarqueeConfig,
    elapsed: Duration,
}

impl LinearMap<'_> {
    fn column(&self, area: Rect, x: f64) -> Option<u16> {
        let col = (x / self.cell_width).floor();
        if col < 0.0 || col >= f64::from(area.width) {
            return None;
        }
        Some(area.x + col as u16)
    }
}

impl Widget for LinearMap<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 3 {
            return;
        }
        let track_y = area.y + area.height / 2;
        let name_y = track_y.saturating_sub(2).max(area.y);
        let en_y = track_y.saturating_sub(1).max(area.y);
        let xfer_y = (track_y + 1).min(area.bottom().saturating_sub(1));

        for segment in &self.layout.segments {
            let color = rgb(segment.tone.color(self.layout.theme));
            let start = (segment.x_from.min(segment.x_to) / self.cell_width).floor();
            let end = (segment.x_from.max(segment.x_to) / self.cell_width).floor();
            let (start, end) = (start.max(0.0) as u16, end.min(f64::from(area.width)) as u16);
            for col in start..end {
                buf.get_mut(area.x + col, track_y)
                    .set_symbol("━")
                    .set_style(Style::default().fg(color));
            }
            if let Some(col) = self.column(area, segment.arrow.x) {
                let glyph = match segment.arrow.orientation {
                    Orientation::Right => "▶",
                    Orientation::Left => "◀",
                };
                let track = segment.tone.color(self.layout.theme);
                let mut style = Style::default().fg(rgb(arrow_color(track))).bg(color);
                if segment.arrow.current {
                    style = style.add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK);
                }
                buf.get_mut(col, track_y).set_symbol(glyph).set_style(style);
            }
        }

        let label_width = ((self.layout.station_width / self.cell_width).floor() as usize)
            .saturating_sub(1)
            .max(2);
        for mark in &self.layout.stations {
            let Some(col) = self.column(area, mark.x) else {
                continue;
            };
            let Some(station) = self.line.station(mark.idx) else {
                continue;
            };
            let inactive = mark.suppressed || mark.role == StationRole::Passed;
            let (glyph, mut style) = match mark.role {
                StationRole::Current => ("◉", Style::default().fg(Color::White)),
                StationRole::Next => ("●", Style::default().fg(rgb(self.layout.theme))),
                StationRole::Passed => ("○", Style::default().fg(Color::DarkGray)),
                StationRole::Upcoming => ("●", Style::default().fg(Color::White)),
            };
            if mark.suppressed {
                style = Style::default().fg(rgb(Rgb::INACTIVE));
            }
            let glyph = if mark.dock_blocked { "×" } else { glyph };
            buf.get_mut(col, track_y).set_symbol(glyph).set_style(style);

            let name_style = if inactive {
                Style::default().fg(Color::DarkGray)
            } else if mark.role == StationRole::Current {
                Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                Style::default()
            };
            let name = pids_core::markup::strip(&station.name);
            let label = fit_label(&name, label_width, self.marquee, self.elapsed);
            put_centered(buf, area, col, name_y, &label, name_style);
            let en = fit_label(&station.en, label_width, self.marquee, self.elapsed);
            put_centered(buf, area, col, en_y, &en, Style::default().fg(Color::Gray));

            if let Some(transfer) = station.xfer.first() {
                let color = parse_color(&transfer.color).unwrap_or(Rgb::INACTIVE);
                let badge = pids_core::markup::strip(&transfer.line);
                let badge: String = badge.chars().take(label_width).collect();
                put_centered(
                    buf,
                    area,
                    col,
                    xfer_y,
                    &badge,
                    Style::default().bg(rgb(color)).fg(rgb(arrow_color(color))),
                );
            }
        }
    }
}

/// Station labels longer than the threshold scroll inside their slot.
fn fit_label(text: &str, width: usize, config: &MarqueeConfig, elapsed: Duration) -> String {
    let decision = Marquee::decide_by_chars(text, config);
    let chars = text.chars().count();
    if !decision.is_scrolling() && chars <= width {
        return text.to_string();
    }
    let offset = decision.offset_at(elapsed) as usize;
    marquee::frame(text, &config.separator, width.min(chars), offset)
}

fn put_centered(buf: &mut Buffer, area: Rect, col: u16, y: u16, text: &str, style: Style) {
    let width = Line::from(text).width() as u16;
    let x = col.saturating_sub(width / 2).max(area.x);
    let room = area.right().saturating_sub(x) as usize;
    buf.set_stringn(x, y, text, room, style);
}

fn render_ring(
    frame: &mut Frame,
    area: Rect,
    line: &LineData,
    route: &RouteState,
    ctx: &RenderContext,
) {
    let layout = RingLayout::compute(line, route, ctx.ring);
    let geometry = layout.geometry;
    let (width, height) = geometry.extent();
    let (ox, oy) = geometry.origin;
    let margin = geometry.radius * 0.6 + 10.0;
    let x_bounds = [ox - margin, ox + width + margin];
    let y_bounds = [oy - margin, oy + height + margin];
    // Canvas y grows upward; the ring's grows downward.
    let flip = |y: f64| y_bounds[0] + y_bounds[1] - y;

    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title("环线 Loop line"))
        .marker(Marker::Braille)
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(|painter| {
            for segment in &layout.segments {
                let length = segment.to_distance - segment.from_distance;
                let samples = ((length * RING_SAMPLES_PER_UNIT).ceil() as usize).max(2);
                let coords: Vec<(f64, f64)> = (0..=samples)
                    .map(|step| {
                        let distance =
                            segment.from_distance + length * step as f64 / samples as f64;
                        let (x, y) = geometry.point_at(distance);
                        (x, flip(y))
                    })
                    .collect();
                painter.draw(&Points {
                    coords: &coords,
                    color: rgb(segment.tone.color(layout.theme)),
                });
            }
            painter.layer();

            for segment in &layout.segments {
                let (x, y) = segment.arrow.point;
                let track = segment.tone.color(layout.theme);
                let mut style = Style::default().fg(rgb(arrow_color(track))).bg(rgb(track));
                if segment.arrow.current {
                    style = style.add_modifier(Modifier::BOLD);
                }
                painter.print(
                    x,
                    flip(y),
                    Span::styled(arrow_glyph(segment.arrow.angle_degrees), style),
                );
            }

            for station in &layout.stations {
                let Some(data) = line.station(station.idx) else {
                    continue;
                };
                let (x, y) = station.point;
                let color = if station.suppressed {
                    rgb(Rgb::INACTIVE)
                } else {
                    match station.role {
                        StationRole::Current => Color::White,
                        StationRole::Next => rgb(layout.theme),
                        StationRole::Passed | StationRole::Upcoming => Color::Gray,
                    }
                };
                let glyph = if station.dock_blocked { "×" } else { "●" };
                painter.print(x, flip(y), Span::styled(glyph, Style::default().fg(color)));

                let label_y = if station.on_top {
                    flip(y) + margin * 0.5
                } else {
                    flip(y) - margin * 0.5
                };
                let mut style = Style::default().fg(color);
                if station.role == StationRole::Current {
                    style = style.add_modifier(Modifier::BOLD);
                }
                let name: String = pids_core::markup::strip(&data.name)
                    .chars()
                    .take(ctx.marquee.char_threshold)
                    .collect();
                painter.print(x, label_y, Span::styled(name, style));
            }
        });
    frame.render_widget(canvas, area);
}

/// Arrow glyph closest to `angle` (degrees, 0 right, 90 down).
fn arrow_glyph(angle: f64) -> &'static str {
    const GLYPHS: [&str; 8] = ["→", "↘", "↓", "↙", "←", "↖", "↑", "↗"];
    let sector = ((angle.rem_euclid(360.0) + 22.5) / 45.0).floor() as usize % 8;
    GLYPHS[sector]
}

fn render_arrival(
    frame: &mut Frame,
    area: Rect,
    line: &LineData,
    route: &RouteState,
    visible_count: usize,
) {
    let block = Block::default().borders(Borders::ALL).title("到站 Arrival");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let fits = usize::from((inner.width / ARRIVAL_COLUMN_WIDTH).max(1));
    let target = visible_count.min(fits);
    let Some(window) = select_arrival_window(line, route, target) else {
        return;
    };
    let theme = rgb(pids_core::layout::theme_color(&line.meta));
    let ordered = window.ordered();
    let constraints: Vec<Constraint> = ordered
        .iter()
        .map(|_| Constraint::Ratio(1, ordered.len() as u32))
        .collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(inner);

    for (column, idx) in columns.iter().zip(ordered.iter().copied()) {
        let Some(station) = line.station(idx) else {
            continue;
        };
        let past = window.past.contains(&idx);
        let suppressed = pids_core::route::suppressed_at(line, idx);
        let (marker, style) = if idx == window.current {
            ("◉", Style::default().fg(Color::White).add_modifier(Modifier::BOLD))
        } else if past || suppressed {
            ("○", Style::default().fg(Color::DarkGray))
        } else {
            ("●", Style::default().fg(theme))
        };
        let mut lines = vec![
            Line::from(Span::styled(marker, style)),
            Line::from(styled_spans(&station.name, style)),
            Line::from(Span::styled(station.en.clone(), Style::default().fg(Color::Gray))),
        ];
        for transfer in &station.xfer {
            let color = parse_color(&transfer.color).unwrap_or(Rgb::INACTIVE);
            lines.push(Line::from(Span::styled(
                pids_core::markup::strip(&transfer.line),
                Style::default().bg(rgb(color)).fg(rgb(arrow_color(color))),
            )));
        }
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, *column);
    }
}

fn render_footer(
    frame: &mut Frame,
    area: Rect,
    pane: &DisplayPane,
    view: &DisplayView,
    ctx: &RenderContext,
) {
    let source = match view.source {
        SnapshotSource::Restored => "restored from cache",
        SnapshotSource::Live => "live",
    };
    let mut spans = vec![Span::raw(format!("{:?} ({source})", pane.state))];
    if let Some(bps) = pane.recording {
        spans.push(Span::styled(
            format!("  ● REC {} kbps", bps / 1000),
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(warning) = ctx.drift {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            warning.message(),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }
    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
