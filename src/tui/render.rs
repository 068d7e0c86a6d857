/// Ratatui draw entry-point for loandesk.
/// Thin dispatcher; the history pane lives in chat.rs.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::chat::SPINNER_GLYPHS;
use super::{AppState, Mode};
use crate::orchestrate::Phase;

// ── Main draw entry point ─────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // history
            Constraint::Length(1), // status bar
            Constraint::Length(3), // input box
        ])
        .split(f.area());

    super::chat::draw_history(f, state, chunks[0]);
    draw_status_bar(f, state, chunks[1]);
    draw_input(f, state, chunks[2]);
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let (status_glyph, status_color) = match state.mode {
        Mode::AskingUser => ("?", Color::Yellow),
        Mode::Busy => {
            let g = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
            (g, Color::Cyan)
        }
        Mode::Normal => ("▲", Color::White),
    };

    let (session, session_color) = match &state.session_id {
        Some(id) => (id.to_string(), Color::Rgb(140, 120, 220)),
        None => ("no session".to_string(), Color::DarkGray),
    };

    let phase_color = match state.phase {
        Phase::Idle => Color::DarkGray,
        Phase::AwaitingDirective => Color::Cyan,
        Phase::RunningStep(_) => Color::Rgb(200, 160, 50),
    };

    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled(status_glyph, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::styled(" loandesk", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(state.profile.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(state.endpoint.clone(), Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::styled("  ◈ ", Style::default().fg(Color::Rgb(80, 70, 140))),
        Span::styled(session, Style::default().fg(session_color)),
        Span::styled("  ", Style::default()),
        Span::styled(state.phase.to_string(), Style::default().fg(phase_color)),
        Span::styled("  Ctrl+N new chat  /help", Style::default().fg(Color::Rgb(55, 50, 90))),
    ]);

    let bar_style = if state.mode == Mode::Busy {
        Style::default().bg(Color::Rgb(15, 15, 25))
    } else {
        Style::default().bg(Color::Rgb(10, 10, 18))
    };

    f.render_widget(Paragraph::new(line).style(bar_style), area);
}

// ── Input box ─────────────────────────────────────────────────────────────────

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let (border_color, prompt_color, prompt_char) = match state.mode {
        Mode::Busy       => (Color::Rgb(40, 40, 60), Color::DarkGray, "·"),
        Mode::AskingUser => (Color::Yellow,          Color::Yellow,   "?"),
        Mode::Normal     => (Color::Rgb(60, 60, 80), Color::Cyan,     "❯"),
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let content_span = if state.mode == Mode::Busy {
        Span::styled("waiting for the assistant…", Style::default().fg(Color::Rgb(60, 60, 80)))
    } else if state.input.is_empty() {
        match (&state.mode, &state.question) {
            (Mode::AskingUser, Some(q)) => Span::styled(
                format!("{q} · Enter to send · Ctrl+C to skip"),
                Style::default().fg(Color::Rgb(180, 140, 40)),
            ),
            _ => Span::styled(
                "message · /help for commands · Ctrl+N new chat",
                Style::default().fg(Color::Rgb(70, 70, 90)),
            ),
        }
    } else {
        Span::styled(state.input.clone(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    let paragraph = Paragraph::new(Line::from(vec![prompt_span, content_span]))
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);

    // Position cursor at the actual edit cursor, not end of string
    if state.mode != Mode::Busy {
        // prompt is "  ❯ ", 4 visible cols
        let prompt_width: u16 = 4;
        let before = &state.input[..state.cursor.min(state.input.len())];
        let cursor_x = area.x + prompt_width + before.width() as u16;
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}
