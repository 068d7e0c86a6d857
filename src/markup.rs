/// Lightweight message markup: line breaks, `**strong**` spans and bullet lines.
///
/// Every displayed turn goes through [`format`]. The result is renderer-neutral
/// (the TUI maps it to ratatui spans, plain mode flattens it back to text).
use std::sync::LazyLock;

use regex::Regex;

// Dot-all so a strong span may run across a line break.
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*(.*?)\*\*").expect("emphasis pattern is valid"));

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+").expect("bullet pattern is valid"));

pub const BULLET_PREFIX: &str = "• ";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub strong: bool,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), strong: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupLine {
    pub segments: Vec<Segment>,
}

impl MarkupLine {
    fn push(&mut self, seg: Segment) {
        if !seg.text.is_empty() {
            self.segments.push(seg);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    pub lines: Vec<MarkupLine>,
}

// ── Transform ─────────────────────────────────────────────────────────────────

/// Apply the three display rules in their fixed order:
/// line breaks, then emphasis, then bullet lines.
///
/// Emphasis is resolved over the whole text before any line is inspected for a
/// bullet marker, so a `*` that belongs to a strong span is never read as one.
pub fn format(text: &str) -> Markup {
    // (text, strong) runs over the full input, newlines still embedded
    let mut runs: Vec<(&str, bool)> = Vec::new();
    let mut last = 0;
    for caps in EMPHASIS.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        runs.push((&text[last..whole.start()], false));
        runs.push((inner.as_str(), true));
        last = whole.end();
    }
    runs.push((&text[last..], false));

    // Split runs on line breaks; a strong run that spans a break stays strong
    // on both sides of it.
    let mut lines = vec![MarkupLine::default()];
    for (run, strong) in runs {
        let mut parts = run.split('\n');
        if let Some(first) = parts.next() {
            if let Some(line) = lines.last_mut() {
                line.push(Segment { text: first.to_string(), strong });
            }
        }
        for part in parts {
            let mut line = MarkupLine::default();
            line.push(Segment { text: part.to_string(), strong });
            lines.push(line);
        }
    }

    for line in &mut lines {
        apply_bullet(line);
    }

    Markup { lines }
}

fn apply_bullet(line: &mut MarkupLine) {
    let Some(first) = line.segments.first_mut() else { return };
    if first.strong {
        return;
    }
    if let Some(m) = BULLET.find(&first.text) {
        let rest = first.text[m.end()..].to_string();
        first.text = format!("{BULLET_PREFIX}{rest}");
    }
}

// ── Word-level access (for the incremental reveal) ───────────────────────────

impl Markup {
    /// Number of whitespace-separated words across all lines.
    pub fn word_count(&self) -> usize {
        let mut count = 0;
        for line in &self.lines {
            let mut in_word = false;
            for seg in &line.segments {
                for ch in seg.text.chars() {
                    if ch.is_whitespace() {
                        in_word = false;
                    } else if !in_word {
                        in_word = true;
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// The prefix of this markup holding its first `n` whole words.
    /// Formatting is already resolved, so a cut never lands inside a token.
    pub fn truncate_words(&self, n: usize) -> Markup {
        let mut out = Markup::default();
        let mut seen = 0usize;
        for line in &self.lines {
            let mut kept = MarkupLine::default();
            let mut in_word = false;
            for seg in &line.segments {
                let mut buf = String::new();
                for ch in seg.text.chars() {
                    if ch.is_whitespace() {
                        in_word = false;
                    } else if !in_word {
                        in_word = true;
                        seen += 1;
                        if seen > n {
                            kept.push(Segment { text: buf, strong: seg.strong });
                            trim_line_end(&mut kept);
                            out.lines.push(kept);
                            return out;
                        }
                    }
                    buf.push(ch);
                }
                kept.push(Segment { text: buf, strong: seg.strong });
            }
            if seen >= n && n < self.word_count() {
                // Stop at the end of the line holding the last shown word
                out.lines.push(kept);
                return out;
            }
            out.lines.push(kept);
        }
        out
    }
}

fn trim_line_end(line: &mut MarkupLine) {
    while let Some(last) = line.segments.last_mut() {
        let trimmed = last.text.trim_end().len();
        last.text.truncate(trimmed);
        if !last.text.is_empty() {
            break;
        }
        line.segments.pop();
    }
}

impl Markup {
    /// Flatten back to text: lines joined by `\n`, emphasis markers dropped.
    pub fn to_plain(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.segments.iter().map(|s| s.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Reveal ────────────────────────────────────────────────────────────────────

/// A word-per-tick producer over formatted markup.
///
/// The owner drives it from a timer; dropping it or calling [`Reveal::finish`]
/// ends the sequence.
#[derive(Debug, Clone)]
pub struct Reveal {
    markup: Markup,
    shown: usize,
    total: usize,
}

impl Reveal {
    pub fn new(markup: Markup) -> Self {
        let total = markup.word_count();
        Self { markup, shown: 0, total }
    }

    /// Show one more word. Returns `true` while words remain hidden.
    pub fn tick(&mut self) -> bool {
        if self.shown < self.total {
            self.shown += 1;
        }
        !self.is_done()
    }

    pub fn is_done(&self) -> bool {
        self.shown >= self.total
    }

    pub fn finish(&mut self) {
        self.shown = self.total;
    }

    pub fn visible(&self) -> Markup {
        if self.is_done() {
            self.markup.clone()
        } else {
            self.markup.truncate_words(self.shown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong(text: &str) -> Segment {
        Segment { text: text.to_string(), strong: true }
    }

    #[test]
    fn test_plain_text_passes_through() {
        let m = format("Welcome! How can I help you today?");
        assert_eq!(m.lines.len(), 1);
        assert_eq!(m.to_plain(), "Welcome! How can I help you today?");
        assert!(m.lines[0].segments.iter().all(|s| !s.strong));
    }

    #[test]
    fn test_line_breaks_become_lines() {
        let m = format("one\ntwo\n\nfour");
        assert_eq!(m.lines.len(), 4);
        assert!(m.lines[2].segments.is_empty());
        assert_eq!(m.to_plain(), "one\ntwo\n\nfour");
    }

    #[test]
    fn test_emphasis_becomes_strong() {
        let m = format("EMI is **monthly** and **fixed**");
        assert_eq!(
            m.lines[0].segments,
            vec![
                Segment::plain("EMI is "),
                strong("monthly"),
                Segment::plain(" and "),
                strong("fixed"),
            ]
        );
    }

    #[test]
    fn test_emphasis_spanning_line_break_stays_strong() {
        let m = format("a **bold\nline** end");
        assert_eq!(m.lines.len(), 2);
        assert_eq!(m.lines[0].segments, vec![Segment::plain("a "), strong("bold")]);
        assert_eq!(m.lines[1].segments, vec![strong("line"), Segment::plain(" end")]);
        assert!(!m.to_plain().contains("**"));
    }

    #[test]
    fn test_unclosed_emphasis_is_left_alone() {
        let m = format("price **starts at 10");
        assert_eq!(m.to_plain(), "price **starts at 10");
    }

    #[test]
    fn test_bullet_lines() {
        let m = format("Documents:\n- PAN card\n* salary slips\n  - bank statement");
        assert_eq!(
            m.to_plain(),
            "Documents:\n• PAN card\n• salary slips\n• bank statement"
        );
    }

    #[test]
    fn test_dash_without_space_is_not_a_bullet() {
        let m = format("-5 degrees");
        assert_eq!(m.to_plain(), "-5 degrees");
    }

    #[test]
    fn test_emphasis_resolved_before_bullets() {
        // A leading `**` belongs to the strong span, not a bullet marker
        let m = format("** note** here");
        assert_eq!(m.lines[0].segments, vec![strong(" note"), Segment::plain(" here")]);

        // A strong span that itself starts with "- " is not turned into a bullet
        let m = format("**- not a bullet**");
        assert_eq!(m.lines[0].segments, vec![strong("- not a bullet")]);

        // A real bullet followed by emphasis keeps both
        let m = format("* **Approved** today");
        assert_eq!(
            m.lines[0].segments,
            vec![Segment::plain("• "), strong("Approved"), Segment::plain(" today")]
        );
    }

    #[test]
    fn test_idempotent_on_bullet_text() {
        let text = "• PAN card\n• salary slips";
        let once = format(text);
        assert_eq!(once.to_plain(), text);
        assert_eq!(format(&once.to_plain()), once);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(format("").word_count(), 0);
        assert_eq!(format("a **b c**\n- d").word_count(), 5); // "•" counts as a word
        assert_eq!(format("KYC Verified for Jane Doe").word_count(), 5);
    }

    #[test]
    fn test_truncate_words_keeps_whole_tokens() {
        let m = format("Loan **pre approved** now");
        let two = m.truncate_words(2);
        assert_eq!(two.lines[0].segments, vec![Segment::plain("Loan "), strong("pre")]);
        let all = m.truncate_words(10);
        assert_eq!(all, m);
    }

    #[test]
    fn test_truncate_words_across_lines() {
        let m = format("first line\nsecond line");
        let two = m.truncate_words(2);
        assert_eq!(two.to_plain(), "first line");
        let three = m.truncate_words(3);
        assert_eq!(three.to_plain(), "first line\nsecond");
    }

    #[test]
    fn test_reveal_ticks_word_by_word() {
        let mut r = Reveal::new(format("Approved for **Jane**"));
        assert!(!r.is_done());
        assert_eq!(r.visible().to_plain(), "");
        assert!(r.tick());
        assert_eq!(r.visible().to_plain(), "Approved");
        assert!(r.tick());
        assert_eq!(r.visible().to_plain(), "Approved for");
        assert!(!r.tick());
        assert!(r.is_done());
        assert_eq!(r.visible(), format("Approved for **Jane**"));
    }

    #[test]
    fn test_reveal_finish_shows_everything() {
        let full = format("one two three four");
        let mut r = Reveal::new(full.clone());
        r.tick();
        r.finish();
        assert!(r.is_done());
        assert_eq!(r.visible(), full);
    }

    #[test]
    fn test_reveal_of_empty_text_is_done() {
        let r = Reveal::new(format(""));
        assert!(r.is_done());
    }
}
