//! Rendering for the loop TUI.
//!
//! Three stacked panes: a header with backlog progress and the controller's
//! status line, the output of the viewed iteration with a scrollbar, and a
//! one-line footer of keybinds. Everything renders from a [`Snapshot`], so the
//! draw path never touches shared state.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, BorderType, Borders, Padding, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};

use super::app::Snapshot;
use super::colors;
use crate::controller::IterationStatus;

/// Render one frame from a snapshot.
pub fn render(frame: &mut Frame, snap: &Snapshot) {
    let [header_area, log_area, footer_area] =
        Layout::vertical([Constraint::Length(7), Constraint::Fill(1), Constraint::Length(1)]).areas(frame.area());

    render_header(frame, header_area, snap);
    render_log(frame, log_area, snap);
    render_footer(frame, footer_area, snap);
}

fn render_header(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let total_tasks = snap.completed_tasks + snap.remaining_tasks;
    let progress_str = format!("{}/{}", snap.completed_tasks, total_tasks);
    let iteration_str = format!("#{}", snap.current_iteration);

    let lines = vec![
        Line::from(vec![
            Span::styled("PRD: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(snap.prd_name.as_str(), Style::default().fg(Color::White)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Progress: ", Style::default().fg(Color::White)),
            Span::styled(progress_str, Style::default().fg(colors::PENDING)),
            Span::styled(" tasks complete", Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Iteration: ", Style::default().fg(Color::White)),
            Span::styled(iteration_str, Style::default().fg(colors::HEADER)),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::White)),
            Span::styled(snap.status_line.as_str(), Style::default().fg(Color::Gray)),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(Color::Green))
        .title(" prdloop ")
        .title_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        .padding(Padding::horizontal(1));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let output = snap.viewed.as_ref().map(|v| v.output.as_str()).unwrap_or("");
    let content_height = if output.is_empty() { 1 } else { output.lines().count() };
    let visible_height = area.height.saturating_sub(2) as usize;

    let title = match &snap.viewed {
        None => " Iteration Log (waiting...) ".to_string(),
        Some(viewed) => format!(
            " Iteration Log [{}/{}]{} ",
            viewed.position + 1,
            snap.record_count,
            status_suffix(viewed.status),
        ),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(Color::Blue))
        .title(title)
        .title_style(Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD))
        .padding(Padding::horizontal(1));

    let paragraph = Paragraph::new(Text::from(styled_output_lines(output)))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset(snap.scroll), 0));

    frame.render_widget(paragraph, area);

    if content_height > visible_height {
        let mut scroll_state = ScrollbarState::default()
            .content_length(content_height)
            .viewport_content_length(visible_height)
            .position(snap.scroll);

        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scroll_state,
        );
    }
}

fn render_footer(frame: &mut Frame, area: Rect, snap: &Snapshot) {
    let (mode, mode_color) = if snap.finished {
        ("Finished", colors::SUCCEEDED)
    } else if snap.kill_requested {
        ("Killing", colors::KILLED)
    } else if snap.stop_queued {
        ("Stop queued", colors::PENDING)
    } else {
        ("Running", colors::RUNNING)
    };

    let footer_text = Line::from(vec![
        Span::styled(" prdloop ", Style::default().fg(colors::KEYBIND)),
        Span::styled("| ", Style::default().fg(colors::DIM)),
        Span::styled("Mode: ", Style::default().fg(Color::White)),
        Span::styled(mode, Style::default().fg(mode_color)),
        Span::styled(" | ", Style::default().fg(colors::DIM)),
        Span::styled("<←/→>", Style::default().fg(Color::Green)),
        Span::styled(" logs  ", Style::default().fg(Color::Gray)),
        Span::styled("<↑/↓>", Style::default().fg(Color::Green)),
        Span::styled(" scroll  ", Style::default().fg(Color::Gray)),
        Span::styled("<q>", Style::default().fg(Color::Green)),
        Span::styled(" stop  ", Style::default().fg(Color::Gray)),
        Span::styled("<r>", Style::default().fg(Color::Green)),
        Span::styled(" resume  ", Style::default().fg(Color::Gray)),
        Span::styled("<ctrl-c>", Style::default().fg(Color::Green)),
        Span::styled(" kill", Style::default().fg(Color::Gray)),
    ]);

    frame.render_widget(
        Paragraph::new(footer_text).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Paragraph scroll takes a u16; saturate for very long buffers instead of
/// wrapping around.
fn scroll_offset(scroll: usize) -> u16 {
    u16::try_from(scroll).unwrap_or(u16::MAX)
}

fn status_suffix(status: IterationStatus) -> &'static str {
    match status {
        IterationStatus::Running => "",
        IterationStatus::Succeeded => " ok",
        IterationStatus::Failed => " failed",
        IterationStatus::Killed => " killed",
    }
}

/// Style agent output line by line: markdown-ish headings, bullets, and
/// inline code get color; everything else renders plain.
fn styled_output_lines(output: &str) -> Vec<Line<'_>> {
    if output.is_empty() {
        return vec![Line::from(Span::styled(
            "Waiting for output...",
            Style::default().fg(colors::DIM),
        ))];
    }

    output.lines().map(style_line).collect()
}

fn style_line(line: &str) -> Line<'_> {
    if line.starts_with("# ") {
        Line::from(Span::styled(
            line.strip_prefix("# ").unwrap_or(line),
            Style::default()
                .fg(colors::HEADER)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    } else if line.starts_with("## ") || line.starts_with("### ") {
        let stripped = line
            .strip_prefix("### ")
            .or_else(|| line.strip_prefix("## "))
            .unwrap_or(line);
        Line::from(Span::styled(
            stripped,
            Style::default().fg(colors::HEADER).add_modifier(Modifier::BOLD),
        ))
    } else if line.trim_start().starts_with("* ") || line.trim_start().starts_with("- ") {
        let indent = line.len() - line.trim_start().len();
        let content = line
            .trim_start()
            .strip_prefix("* ")
            .or_else(|| line.trim_start().strip_prefix("- "))
            .unwrap_or(line);

        let (bullet, bullet_color) = if indent > 0 {
            ("  -", Color::Gray)
        } else {
            ("*", Color::Yellow)
        };

        Line::from(vec![
            Span::raw(" ".repeat(indent)),
            Span::styled(format!("{} ", bullet), Style::default().fg(bullet_color)),
            Span::styled(content, Style::default().fg(Color::White)),
        ])
    } else if line.contains('`') {
        style_inline_code(line)
    } else {
        Line::from(Span::styled(line, Style::default().fg(Color::White)))
    }
}

fn style_inline_code(line: &str) -> Line<'_> {
    let mut spans = Vec::new();
    let mut in_code = false;
    let mut current = String::new();

    for ch in line.chars() {
        if ch == '`' {
            if !current.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut current), segment_style(in_code)));
            }
            in_code = !in_code;
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        spans.push(Span::styled(current, segment_style(in_code)));
    }

    Line::from(spans)
}

fn segment_style(in_code: bool) -> Style {
    if in_code {
        Style::default().fg(Color::Magenta).bg(Color::Black)
    } else {
        Style::default().fg(Color::White)
    }
}
