/// Ratatui-based TUI for loandesk.
///
/// Architecture:
///   main thread:      event loop (crossterm keyboard events + mpsc UiEvent drain)
///   controller task:  tokio::spawn, receives Commands, sends UiEvents back
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  conversation history (scrollable, Min(0))     │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  input box (3 lines, fixed)                    │
///   └────────────────────────────────────────────────┘
pub mod chat;
pub mod input;
pub mod render;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};

use crate::client::Client;
use crate::config::ResolvedConfig;
use crate::markup::{self, Markup, Reveal};
use crate::orchestrate::{Command, Controller, Phase, Prompter, Sender, Turn};
use crate::session::SessionId;

// ── UiEvent: typed events from controller → TUI ──────────────────────────────

#[derive(Debug, Clone)]
pub enum UiEvent {
    /// A turn was added to the transcript
    TurnAppended(Turn),
    /// A chat or step request is in flight
    TypingStarted,
    TypingStopped,
    /// Transcript emptied by a reset
    Cleared,
    PhaseChanged(Phase),
    /// Session bound (or left unbound after a failed reset)
    SessionBound(Option<SessionId>),
    /// The controller is suspended until an answer (or skip) arrives
    AskUser { question: String },
    /// The current command has been fully handled
    Ready,
}

// ── ConversationEntry: displayable items in history ──────────────────────────

#[derive(Debug, Clone)]
pub struct DisplayTurn {
    pub sender: Sender,
    pub at: DateTime<Local>,
    pub markup: Markup,
    /// Present while the turn is still being revealed
    pub reveal: Option<Reveal>,
}

impl DisplayTurn {
    fn new(turn: &Turn, reveal_words: bool) -> Self {
        let markup = markup::format(&turn.text);
        let reveal = (reveal_words && turn.sender == Sender::Assistant)
            .then(|| Reveal::new(markup.clone()))
            .filter(|r| !r.is_done());
        Self { sender: turn.sender, at: turn.at, markup, reveal }
    }

    pub fn visible(&self) -> Markup {
        match &self.reveal {
            Some(r) => r.visible(),
            None => self.markup.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConversationEntry {
    Turn(DisplayTurn),
    SystemMsg(String),
}

// ── Mode: TUI modal state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Controller is handling a command; input is locked
    Busy,
    /// Manual prompt: Enter answers, Ctrl+C skips
    AskingUser,
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub entries: Vec<ConversationEntry>,
    pub input: String,
    pub cursor: usize, // byte offset in input
    pub mode: Mode,
    pub scroll: usize, // lines scrolled up in history
    pub profile: String,
    pub endpoint: String,
    pub session_id: Option<SessionId>,
    pub phase: Phase,
    pub typing: bool,
    pub show_timestamps: bool,
    /// Incremented every 120ms while busy, for the spinner
    pub spinner_tick: u32,
    pub reveal_words: bool,
    /// Question of the pending manual prompt
    pub question: Option<String>,
}

impl AppState {
    pub fn new(resolved: &ResolvedConfig, show_timestamps: bool) -> Self {
        Self {
            entries: Vec::new(),
            input: String::new(),
            cursor: 0,
            mode: Mode::Busy, // until the controller's first Ready
            scroll: 0,
            profile: resolved.profile_name.clone(),
            endpoint: resolved.endpoint.clone(),
            session_id: None,
            phase: Phase::Idle,
            typing: false,
            show_timestamps,
            spinner_tick: 0,
            reveal_words: resolved.reveal_interval_ms > 0,
            question: None,
        }
    }

    fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
        self.scroll = 0; // auto-scroll to bottom on new content
    }

    fn system(&mut self, msg: impl Into<String>) {
        self.push(ConversationEntry::SystemMsg(msg.into()));
    }

    fn apply_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::TurnAppended(turn) => {
                let display = DisplayTurn::new(&turn, self.reveal_words);
                self.push(ConversationEntry::Turn(display));
            }
            UiEvent::TypingStarted => self.typing = true,
            UiEvent::TypingStopped => self.typing = false,
            UiEvent::Cleared => {
                self.entries.clear();
                self.scroll = 0;
            }
            UiEvent::PhaseChanged(phase) => self.phase = phase,
            UiEvent::SessionBound(id) => self.session_id = id,
            UiEvent::AskUser { question } => {
                self.system(format!("? {question}"));
                self.question = Some(question);
                self.mode = Mode::AskingUser;
            }
            UiEvent::Ready => {
                self.mode = Mode::Normal;
                self.question = None;
            }
        }
    }

    /// Advance every active reveal by one word. Returns true while any remain.
    fn tick_reveals(&mut self) -> bool {
        let mut active = false;
        for entry in &mut self.entries {
            let ConversationEntry::Turn(turn) = entry else { continue };
            let more = match &mut turn.reveal {
                Some(r) => r.tick(),
                None => continue,
            };
            if more {
                active = true;
            } else {
                turn.reveal = None;
            }
        }
        active
    }

    fn finish_reveals(&mut self) {
        for entry in &mut self.entries {
            if let ConversationEntry::Turn(DisplayTurn { reveal: Some(r), .. }) = entry {
                r.finish();
            }
        }
    }

    /// True while any turn still hides words.
    fn has_reveals(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(e, ConversationEntry::Turn(DisplayTurn { reveal: Some(r), .. }) if !r.is_done())
        })
    }

    fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input).trim().to_string()
    }
}

// ── Prompt channel ────────────────────────────────────────────────────────────

/// Prompter that asks through the TUI and waits for the key handler's answer.
pub struct ChannelPrompter {
    events: mpsc::UnboundedSender<UiEvent>,
    answers: mpsc::UnboundedReceiver<Option<String>>,
}

#[async_trait]
impl Prompter for ChannelPrompter {
    async fn ask(&mut self, question: &str) -> Option<String> {
        let _ = self.events.send(UiEvent::AskUser { question: question.to_string() });
        self.answers.recv().await.flatten()
    }
}

/// Channels from the key handler to the controller task.
struct Outbound {
    commands: mpsc::UnboundedSender<Command>,
    answers: mpsc::UnboundedSender<Option<String>>,
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(resolved: ResolvedConfig, show_timestamps: bool) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, resolved, show_timestamps).await;

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    resolved: ResolvedConfig,
    show_timestamps: bool,
) -> Result<()> {
    let mut state = AppState::new(&resolved, show_timestamps);

    // Channels: controller → TUI, TUI → controller
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (answer_tx, answer_rx) = mpsc::unbounded_channel::<Option<String>>();

    let backend = Arc::new(Client::new(resolved.endpoint.clone(), resolved.routes.clone()));
    let prompter = ChannelPrompter { events: ui_tx.clone(), answers: answer_rx };
    let controller = Controller::new(backend, Box::new(prompter), resolved.greeting.clone(), ui_tx);
    tokio::spawn(controller.run(cmd_rx));
    tracing::info!(profile = %resolved.profile_name, endpoint = %resolved.endpoint, "tui started");

    let outbound = Outbound { commands: cmd_tx, answers: answer_tx };

    let mut crossterm_events = EventStream::new();
    let mut spinner = tokio::time::interval(Duration::from_millis(120));
    let mut reveal = tokio::time::interval(Duration::from_millis(resolved.reveal_interval_ms.max(1)));
    reveal.set_missed_tick_behavior(MissedTickBehavior::Skip);

    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Reveal tick ───────────────────────────────────────────────────
            _ = reveal.tick() => {
                if state.has_reveals() {
                    state.tick_reveals();
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Spinner tick ──────────────────────────────────────────────────
            _ = spinner.tick() => {
                if state.mode == Mode::Busy || state.typing {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Drain UI events from the controller ───────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev);
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                if let Event::Key(key) = ev {
                    if !handle_key(key, &mut state, &outbound) {
                        break;
                    }
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    tracing::info!("tui closed");
    Ok(())
}

// ── Key handler ───────────────────────────────────────────────────────────────

/// Returns false when the user asked to quit.
fn handle_key(key: KeyEvent, state: &mut AppState, out: &Outbound) -> bool {
    let editable = state.mode != Mode::Busy;

    match (key.modifiers, key.code) {
        // Ctrl+C: skip the pending prompt, otherwise quit
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            if state.mode == Mode::AskingUser {
                state.input.clear();
                state.cursor = 0;
                state.question = None;
                state.mode = Mode::Busy;
                state.system("  skipped");
                let _ = out.answers.send(None);
            } else {
                return false;
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Char('d')) if state.input.is_empty() => {
            return false;
        }
        // Ctrl+N: new chat
        (KeyModifiers::CONTROL, KeyCode::Char('n')) => {
            if state.mode == Mode::Normal {
                start_new_chat(state, out);
            }
        }
        // Esc: show all revealing turns in full
        (_, KeyCode::Esc) => state.finish_reveals(),
        // Enter: submit input, answer the prompt, or run a slash command
        (KeyModifiers::NONE, KeyCode::Enter) => match state.mode {
            Mode::Busy => {}
            Mode::AskingUser => {
                let answer = state.take_input();
                state.system(format!("  {answer}"));
                state.question = None;
                state.mode = Mode::Busy;
                let _ = out.answers.send(Some(answer));
            }
            Mode::Normal => {
                let text = state.take_input();
                if text.starts_with('/') {
                    return execute_command(&text, state, out);
                }
                if !text.is_empty() {
                    state.mode = Mode::Busy;
                    let _ = out.commands.send(Command::Submit(text));
                }
            }
        },
        (KeyModifiers::NONE, KeyCode::Backspace) if editable => {
            input::backspace(&mut state.input, &mut state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Delete) if editable => {
            input::delete_forward(&mut state.input, &mut state.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Backspace) | (KeyModifiers::CONTROL, KeyCode::Char('w'))
            if editable =>
        {
            input::delete_word(&mut state.input, &mut state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Left) if editable => {
            state.cursor = input::prev_char_boundary(&state.input, state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Right) if editable => {
            state.cursor = input::next_char_boundary(&state.input, state.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Left) if editable => {
            state.cursor = input::word_left(&state.input, state.cursor);
        }
        (KeyModifiers::CONTROL, KeyCode::Right) if editable => {
            state.cursor = input::word_right(&state.input, state.cursor);
        }
        (KeyModifiers::NONE, KeyCode::Home) | (KeyModifiers::CONTROL, KeyCode::Char('a')) if editable => {
            state.cursor = 0;
        }
        (KeyModifiers::NONE, KeyCode::End) | (KeyModifiers::CONTROL, KeyCode::Char('e')) if editable => {
            state.cursor = state.input.len();
        }
        // Ctrl+U: clear line before cursor
        (KeyModifiers::CONTROL, KeyCode::Char('u')) if editable => {
            state.input.drain(..state.cursor);
            state.cursor = 0;
        }
        // Scroll
        (KeyModifiers::NONE, KeyCode::Up) => state.scroll = state.scroll.saturating_add(1),
        (KeyModifiers::NONE, KeyCode::Down) => state.scroll = state.scroll.saturating_sub(1),
        (KeyModifiers::NONE, KeyCode::PageUp) => state.scroll = state.scroll.saturating_add(10),
        (KeyModifiers::NONE, KeyCode::PageDown) => state.scroll = state.scroll.saturating_sub(10),
        // Regular char input, inserted at cursor
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) if editable => {
            input::insert_char(&mut state.input, &mut state.cursor, c);
        }
        _ => {}
    }

    true
}

fn start_new_chat(state: &mut AppState, out: &Outbound) {
    state.mode = Mode::Busy;
    let _ = out.commands.send(Command::NewChat);
}

// ── Slash command handler ─────────────────────────────────────────────────────

const HELP: &str = "Commands: /new  /clear  /ts  /help  /quit\n\
Ctrl+N new chat  ·  Esc show replies in full  ·  ↑↓ PgUp PgDn scroll  ·  Ctrl+C quit (or skip a prompt)";

fn execute_command(input: &str, state: &mut AppState, out: &Outbound) -> bool {
    let cmd = input.split_whitespace().next().unwrap_or(input);
    match cmd {
        "/quit" | "/exit" | "/q" => return false,
        "/help" | "/h" => state.system(HELP),
        "/new" => start_new_chat(state, out),
        "/clear" => {
            // Display only; the conversation and session are untouched
            state.entries.clear();
            state.scroll = 0;
        }
        "/ts" => {
            state.show_timestamps = !state.show_timestamps;
            let status = if state.show_timestamps { "on" } else { "off" };
            state.system(format!("timestamps {status}"));
        }
        other => state.system(format!("unknown command: {other}  (/help for the list)")),
    }
    true
}
