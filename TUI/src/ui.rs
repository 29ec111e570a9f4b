use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::App;
use crate::backend::BackendStatus;
use crate::transcript::{ConversationEntry, Role};

// Copper Sapphire Morning color palette
const BG_DARK: Color = Color::Rgb(12, 12, 16);           // Deep background
const BG_PANEL: Color = Color::Rgb(18, 18, 24);          // Slightly lighter for panels

const SAPPHIRE: Color = Color::Rgb(101, 150, 243);       // #6596F3 - Primary accent
const COPPER: Color = Color::Rgb(138, 72, 38);           // #8A4826 - Copper
const TAN: Color = Color::Rgb(216, 180, 169);            // #D8B4A9 - Tan/beige
const BURGUNDY: Color = Color::Rgb(204, 92, 68);         // #CC5C44 - Warnings/errors
const OLIVE: Color = Color::Rgb(131, 179, 102);          // #83B366 - Success/green
const PALE_YELLOW: Color = Color::Rgb(234, 208, 148);    // #EAD094 - Pale yellow

const TEXT_PRIMARY: Color = Color::Rgb(240, 240, 245);   // Near white
const TEXT_SECONDARY: Color = Color::Rgb(180, 180, 190); // Light gray
const TEXT_MUTED: Color = Color::Rgb(105, 116, 133);     // #697485 - Medium gray

const BORDER_DIM: Color = Color::Rgb(45, 50, 60);        // Dim border

const BADGE_WIDTH: u16 = 10;
const BADGE_HEIGHT: u16 = 3;
const PANEL_MAX_WIDTH: u16 = 64;
const PANEL_MAX_HEIGHT: u16 = 24;
const INPUT_HEIGHT: u16 = 3;
const LABEL_WIDTH: usize = 8;

/// Where the floating toggle button sits: pinned to the bottom-right corner.
pub fn badge_area(area: Rect) -> Rect {
    let width = BADGE_WIDTH.min(area.width);
    let height = BADGE_HEIGHT.min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + area.height.saturating_sub(height),
        width,
        height,
    }
}

/// The popup, anchored just above the badge.
pub fn panel_area(area: Rect) -> Rect {
    let width = PANEL_MAX_WIDTH.min(area.width.saturating_sub(2));
    let height = PANEL_MAX_HEIGHT.min(area.height.saturating_sub(BADGE_HEIGHT + 1));
    Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + area.height.saturating_sub(height + BADGE_HEIGHT),
        width,
        height,
    }
}

fn panel_chunks(panel: Rect) -> (Rect, Rect) {
    let inner = Block::default().borders(Borders::ALL).inner(panel);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),                // Transcript
            Constraint::Length(INPUT_HEIGHT),  // Input
        ])
        .split(inner);
    (chunks[0], chunks[1])
}

/// Screen region of the text input while the panel is open.
pub fn input_area(area: Rect) -> Rect {
    panel_chunks(panel_area(area)).1
}

pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    draw_page(frame, area, app.animation_frame);
    draw_badge(frame, app, badge_area(area));

    if app.panel.is_open() {
        draw_panel(frame, app, panel_area(area));
    }
}

fn draw_page(frame: &mut Frame, area: Rect, anim_frame: usize) {
    let pattern_offset = (anim_frame / 30) % 4;

    // Simple twinkling starfield background
    let mut lines: Vec<Line> = Vec::new();
    for y in 0..area.height as usize {
        let mut spans: Vec<Span> = Vec::new();
        for x in 0..area.width as usize {
            let show_star = ((x + pattern_offset) % 12 == 0) && ((y + pattern_offset) % 6 == 0);
            if show_star {
                let brightness = 25 + ((anim_frame as f64 / 60.0 + (x as f64 / 12.0)).sin().abs() * 15.0) as u8;
                let color = Color::Rgb(brightness, brightness + 2, brightness + 5);
                spans.push(Span::styled(".", Style::default().fg(color)));
            } else {
                spans.push(Span::raw(" "));
            }
        }
        lines.push(Line::from(spans));
    }
    frame.render_widget(Paragraph::new(lines).style(Style::default().bg(BG_DARK)), area);

    let hint_area = Rect {
        height: 1.min(area.height),
        ..area
    };
    let hint = Paragraph::new(Line::from(vec![
        Span::styled(" Ctrl+O", Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD)),
        Span::styled(" chat  ", Style::default().fg(TEXT_MUTED)),
        Span::styled("ESC", Style::default().fg(COPPER).add_modifier(Modifier::BOLD)),
        Span::styled(" close/quit", Style::default().fg(TEXT_MUTED)),
    ]));
    frame.render_widget(hint, hint_area);
}

fn draw_badge(frame: &mut Frame, app: &App, area: Rect) {
    // Glow cycles between sapphire and copper while the panel is closed
    let border_color = if app.panel.is_open() {
        SAPPHIRE
    } else {
        let t = (app.animation_frame as f64 / 120.0).sin() * 0.5 + 0.5;
        let r = (84.0 + (138.0 - 84.0) * t) as u8;
        let g = (112.0 + (72.0 - 112.0) * t) as u8;
        let b = (156.0 + (38.0 - 156.0) * t) as u8;
        Color::Rgb(r, g, b)
    };

    let label = if app.panel.is_open() { "Close" } else { "Chat" };
    let badge = Paragraph::new(label)
        .alignment(Alignment::Center)
        .style(Style::default().fg(TEXT_PRIMARY).bg(BG_PANEL).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border_color)),
        );
    frame.render_widget(Clear, area);
    frame.render_widget(badge, area);
}

fn status_style(status: BackendStatus) -> Style {
    let color = match status {
        BackendStatus::Unknown => TEXT_MUTED,
        BackendStatus::Online => OLIVE,
        BackendStatus::Degraded => PALE_YELLOW,
        BackendStatus::Offline => BURGUNDY,
    };
    Style::default().fg(color)
}

fn draw_panel(frame: &mut Frame, app: &App, area: Rect) {
    frame.render_widget(Clear, area);

    let mut title = Line::from(vec![
        Span::styled(" Assistant ", Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        Span::styled("● ", status_style(app.backend_status)),
        Span::styled(format!("{} ", app.backend_status.label()), Style::default().fg(TEXT_MUTED)),
    ]);
    let outstanding = app.pipeline.outstanding();
    if outstanding > 0 {
        let waiting = match app.pipeline.queued() {
            0 => format!("· {} waiting ", outstanding),
            queued => format!("· {} waiting, {} queued ", outstanding, queued),
        };
        title.push_span(Span::styled(waiting, Style::default().fg(TAN)));
    }
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(SAPPHIRE))
        .style(Style::default().bg(BG_PANEL));
    frame.render_widget(block, area);

    let (transcript_area, input_area) = panel_chunks(area);
    draw_transcript(frame, app, transcript_area);
    draw_input(frame, app, input_area);
}

// Alternating runs of whitespace and non-whitespace, so spacing survives wrapping
fn split_runs(line: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_space = None;
    for (idx, c) in line.char_indices() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|prev| prev != space) {
            runs.push(&line[start..idx]);
            start = idx;
        }
        in_space = Some(space);
    }
    if start < line.len() {
        runs.push(&line[start..]);
    }
    runs
}

// Wrap on display width, keeping explicit line breaks and inner spacing from the text.
// Only the whitespace run at a wrap point is dropped.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }
    let mut result = Vec::new();

    for raw_line in text.split('\n') {
        let raw_line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let mut current_line = String::new();
        let mut gap = String::new();
        let mut wrapped = false;

        for run in split_runs(raw_line) {
            if run.starts_with(char::is_whitespace) {
                gap.push_str(run);
                continue;
            }
            let gap = std::mem::take(&mut gap);
            if current_line.is_empty() {
                // Leading indentation is kept, the break before a continuation line is not
                if !wrapped {
                    current_line.push_str(&gap);
                }
                current_line.push_str(run);
            } else if current_line.width() + gap.width() + run.width() <= max_width {
                current_line.push_str(&gap);
                current_line.push_str(run);
            } else {
                result.push(std::mem::take(&mut current_line));
                wrapped = true;
                current_line.push_str(run);
            }

            // Hard-split words longer than the line
            while current_line.width() > max_width {
                let mut split = 0;
                let mut used = 0;
                for (idx, c) in current_line.char_indices() {
                    let char_width = c.width().unwrap_or(0);
                    if idx > 0 && used + char_width > max_width {
                        split = idx;
                        break;
                    }
                    used += char_width;
                }
                if split == 0 {
                    break;
                }
                let tail = current_line.split_off(split);
                result.push(std::mem::replace(&mut current_line, tail));
                wrapped = true;
            }
        }

        if current_line.width() + gap.width() <= max_width {
            current_line.push_str(&gap);
        }
        result.push(current_line);
    }
    result
}

fn entry_lines(entry: &ConversationEntry, content_width: usize, anim_frame: usize) -> Vec<Line<'static>> {
    let (label, label_style, content_style) = match entry.role {
        Role::User => (
            "you",
            Style::default().fg(SAPPHIRE).add_modifier(Modifier::BOLD),
            Style::default().fg(TEXT_PRIMARY),
        ),
        Role::Bot => (
            "bot",
            Style::default().fg(COPPER).add_modifier(Modifier::BOLD),
            Style::default().fg(TEXT_PRIMARY),
        ),
        Role::Error => (
            "error",
            Style::default().fg(BURGUNDY).add_modifier(Modifier::BOLD),
            Style::default().fg(BURGUNDY),
        ),
        Role::Pending => (
            "",
            Style::default(),
            Style::default().fg(TAN).add_modifier(Modifier::ITALIC),
        ),
    };

    let formatted_label = format!("{:>width$} │ ", label, width = LABEL_WIDTH - 3);
    let indent = format!("{:>width$} │ ", "", width = LABEL_WIDTH - 3);

    let body = if entry.role == Role::Pending {
        // Animated dots: . .. ...
        let dots = (anim_frame / 20) % 3 + 1;
        vec![".".repeat(dots)]
    } else {
        wrap_text(&entry.text, content_width)
    };

    let mut lines: Vec<Line<'static>> = Vec::new();
    for (i, text) in body.into_iter().enumerate() {
        let prefix = if i == 0 { formatted_label.clone() } else { indent.clone() };
        let prefix_style = if i == 0 { label_style } else { Style::default().fg(BORDER_DIM) };
        lines.push(Line::from(vec![
            Span::styled(prefix, prefix_style),
            Span::styled(text, content_style),
        ]));
    }

    if matches!(entry.role, Role::User | Role::Bot) {
        let time = entry.timestamp.with_timezone(&chrono::Local).format("%H:%M").to_string();
        lines.push(Line::from(vec![
            Span::styled(indent, Style::default().fg(BORDER_DIM)),
            Span::styled(time, Style::default().fg(TEXT_MUTED)),
        ]));
    }
    lines
}

// Offset counts back from the newest line; ratatui scrolls in u16 rows
fn scroll_top(max_scroll: usize, offset: usize) -> u16 {
    let top = max_scroll - offset.min(max_scroll);
    u16::try_from(top).unwrap_or(u16::MAX)
}

fn draw_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let padded = Rect {
        x: area.x + 1,
        width: area.width.saturating_sub(2),
        ..area
    };

    if app.transcript.is_empty() {
        app.transcript.set_max_scroll(0);
        let welcome = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled("Ask me anything.", Style::default().fg(TEXT_SECONDARY))),
            Line::from(Span::styled("Enter to send, Esc to close", Style::default().fg(TEXT_MUTED))),
        ])
        .alignment(Alignment::Center);
        frame.render_widget(welcome, padded);
        return;
    }

    let content_width = (padded.width as usize).saturating_sub(LABEL_WIDTH);
    let mut lines: Vec<Line> = Vec::new();
    for entry in app.transcript.entries() {
        lines.extend(entry_lines(entry, content_width, app.animation_frame));
        lines.push(Line::from(""));
    }

    let visible = padded.height as usize;
    let max_scroll = lines.len().saturating_sub(visible);
    app.transcript.set_max_scroll(max_scroll);

    let offset = app.transcript.scroll_offset().min(max_scroll);
    let paragraph = Paragraph::new(lines).scroll((scroll_top(max_scroll, offset), 0));
    frame.render_widget(paragraph, padded);

    if offset > 0 {
        let marker = Paragraph::new(format!("↓ {} more ", offset))
            .alignment(Alignment::Right)
            .style(Style::default().fg(TEXT_MUTED));
        let marker_area = Rect {
            y: area.y + area.height.saturating_sub(1),
            height: 1.min(area.height),
            ..area
        };
        frame.render_widget(marker, marker_area);
    }
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.panel.input_focused();
    let border_color = if focused { SAPPHIRE } else { BORDER_DIM };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let prompt = "> ";
    let available = (inner.width as usize).saturating_sub(prompt.len() + 1);

    // Keep the tail of long input visible
    let mut visible = app.input.as_str();
    while visible.width() > available {
        let mut chars = visible.chars();
        chars.next();
        visible = chars.as_str();
    }

    let line = if app.input.is_empty() && !focused {
        Line::from(vec![
            Span::styled(prompt, Style::default().fg(TEXT_MUTED)),
            Span::styled("Type a message...", Style::default().fg(TEXT_MUTED)),
        ])
    } else {
        Line::from(vec![
            Span::styled(prompt, Style::default().fg(COPPER).add_modifier(Modifier::BOLD)),
            Span::styled(visible.to_string(), Style::default().fg(TEXT_PRIMARY)),
        ])
    };
    frame.render_widget(Paragraph::new(line), inner);

    if focused {
        let x = inner.x + (prompt.len() + visible.width()) as u16;
        frame.set_cursor_position((x.min(inner.right().saturating_sub(1)), inner.y));
    }
}
