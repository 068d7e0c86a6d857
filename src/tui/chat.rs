/// Chat history pane rendering: build_items, draw_history, segment wrapping.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem},
};
use unicode_width::UnicodeWidthStr;

use super::{AppState, ConversationEntry, DisplayTurn};
use crate::markup::{MarkupLine, Segment};
use crate::orchestrate::Sender;

// ── Spinner ────────────────────────────────────────────────────────────────────

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

// ── History items builder ──────────────────────────────────────────────────────

pub fn build_items(state: &AppState, term_width: u16) -> Vec<ListItem<'static>> {
    let mut items: Vec<ListItem<'static>> = Vec::new();

    for entry in &state.entries {
        match entry {
            ConversationEntry::Turn(turn) if turn.sender == Sender::User => {
                push_user_bubble(&mut items, turn, term_width, state.show_timestamps);
            }
            ConversationEntry::Turn(turn) => {
                push_assistant_turn(&mut items, turn, term_width, state.show_timestamps);
            }
            ConversationEntry::SystemMsg(msg) => {
                for line in msg.lines() {
                    items.push(ListItem::new(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(line.to_string(), Style::default().fg(Color::DarkGray)),
                    ])));
                }
            }
        }
    }

    // Transient placeholder while a request is in flight
    if state.typing {
        let glyph = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{glyph} "), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled("...", Style::default().fg(Color::Rgb(180, 220, 255))),
        ])));
    }

    items
}

fn push_user_bubble(items: &mut Vec<ListItem<'static>>, turn: &DisplayTurn, term_width: u16, ts: bool) {
    let bg       = Color::Rgb(28, 26, 52);
    let border   = Color::Rgb(110, 90, 200);
    let label_fg = Color::Rgb(160, 140, 255);
    let text_fg  = Color::Rgb(235, 232, 255);
    let body_style = Style::default().fg(text_fg).bg(bg);
    let edge_style = Style::default().fg(border).bg(bg);

    // 2 chars left margin, 1 right margin
    let inner_w = (term_width as usize).saturating_sub(3).max(10);
    let label = if ts { format!("you {}", turn.at.format("%H:%M")) } else { "you".to_string() };
    // "╭─ " + label + " " + "╮"
    let dash_total = inner_w.saturating_sub(4 + label.width() + 1);
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled("╭─ ", edge_style),
        Span::styled(label, Style::default().fg(label_fg).bg(bg).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {}╮", "─".repeat(dash_total)), edge_style),
    ])));

    let wrap_width = inner_w.saturating_sub(2).max(10);
    for line in &turn.visible().lines {
        for row in wrap_segments(line, wrap_width) {
            let mut spans = vec![Span::raw("  "), Span::styled("│ ", edge_style)];
            spans.extend(styled(row, body_style));
            items.push(ListItem::new(Line::from(spans)));
        }
    }

    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("╰{}╯", "─".repeat(inner_w.saturating_sub(2))), edge_style),
    ])));
    items.push(ListItem::new(Line::raw("")));
}

fn push_assistant_turn(items: &mut Vec<ListItem<'static>>, turn: &DisplayTurn, term_width: u16, ts: bool) {
    // "  desk  " indent = 8 cols
    let wrap_width = (term_width as usize).saturating_sub(8).max(20);
    let label_fg = Color::Rgb(0, 210, 210);
    let text_style = Style::default().fg(Color::Rgb(210, 230, 255));

    let mut first = true;
    for line in &turn.visible().lines {
        for row in wrap_segments(line, wrap_width) {
            let mut spans = if first {
                first = false;
                vec![
                    Span::raw("  "),
                    Span::styled("desk", Style::default().fg(label_fg).add_modifier(Modifier::BOLD)),
                    Span::raw("  "),
                ]
            } else {
                vec![Span::raw("        ")]
            };
            spans.extend(styled(row, text_style));
            items.push(ListItem::new(Line::from(spans)));
        }
    }
    if ts {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("        {}", turn.at.format("%H:%M:%S")),
            Style::default().fg(Color::Rgb(60, 60, 80)),
        ))));
    }
    items.push(ListItem::new(Line::raw("")));
}

fn styled(row: Vec<Segment>, base: Style) -> Vec<Span<'static>> {
    row.into_iter()
        .map(|seg| {
            let style = if seg.strong {
                base.add_modifier(Modifier::BOLD).fg(Color::White)
            } else {
                base
            };
            Span::styled(seg.text, style)
        })
        .collect()
}

// ── Draw ───────────────────────────────────────────────────────────────────────

pub fn draw_history(f: &mut Frame, state: &AppState, area: Rect) {
    let all_items = build_items(state, area.width);
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list = List::new(sliced)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

// ── Utilities ──────────────────────────────────────────────────────────────────

/// Word-wrap one markup line to `max_width` columns, keeping each word's style.
/// Runs of whitespace collapse to a single space; a word wider than the line
/// gets a row of its own.
pub fn wrap_segments(line: &MarkupLine, max_width: usize) -> Vec<Vec<Segment>> {
    // A word may span several segments ("**EMI**," is strong then plain)
    let mut words: Vec<Vec<Segment>> = Vec::new();
    let mut current: Vec<Segment> = Vec::new();
    for seg in &line.segments {
        let mut buf = String::new();
        for ch in seg.text.chars() {
            if ch.is_whitespace() {
                if !buf.is_empty() {
                    current.push(Segment { text: std::mem::take(&mut buf), strong: seg.strong });
                }
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            } else {
                buf.push(ch);
            }
        }
        if !buf.is_empty() {
            current.push(Segment { text: buf, strong: seg.strong });
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut rows: Vec<Vec<Segment>> = Vec::new();
    let mut row: Vec<Segment> = Vec::new();
    let mut width = 0usize;
    for word in words {
        let w: usize = word.iter().map(|s| s.text.width()).sum();
        if width > 0 && width + 1 + w > max_width {
            rows.push(std::mem::take(&mut row));
            width = 0;
        }
        if width > 0 {
            row.push(Segment::plain(" "));
            width += 1;
        }
        row.extend(word);
        width += w;
    }
    if !row.is_empty() || rows.is_empty() {
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::format;

    fn row_text(row: &[Segment]) -> String {
        row.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_wrap_short_line_is_one_row() {
        let m = format("EMI is **monthly**");
        let rows = wrap_segments(&m.lines[0], 40);
        assert_eq!(rows.len(), 1);
        assert_eq!(row_text(&rows[0]), "EMI is monthly");
        assert!(rows[0].last().is_some_and(|s| s.strong));
    }

    #[test]
    fn test_wrap_breaks_between_words() {
        let m = format("one two three four");
        let rows = wrap_segments(&m.lines[0], 9);
        let texts: Vec<String> = rows.iter().map(|r| row_text(r)).collect();
        assert_eq!(texts, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_wrap_keeps_attached_punctuation_with_word() {
        let m = format("rate **8.5%**, fixed");
        let rows = wrap_segments(&m.lines[0], 10);
        assert_eq!(row_text(&rows[0]), "rate 8.5%,");
        assert_eq!(rows[0][2], Segment { text: "8.5%".to_string(), strong: true });
        assert_eq!(row_text(&rows[1]), "fixed");
    }

    #[test]
    fn test_wrap_empty_line_gives_one_blank_row() {
        let rows = wrap_segments(&MarkupLine::default(), 20);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_empty());
    }

    #[test]
    fn test_wrap_overlong_word_gets_own_row() {
        let m = format("id custABCDEFGHIJKLMNOP ok");
        let rows = wrap_segments(&m.lines[0], 8);
        let texts: Vec<String> = rows.iter().map(|r| row_text(r)).collect();
        assert_eq!(texts, vec!["id", "custABCDEFGHIJKLMNOP", "ok"]);
    }
}
