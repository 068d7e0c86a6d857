/// Conversation/orchestration controller.
///
/// Owns the session and the transcript. Every user turn goes to the chat
/// endpoint; when the reply carries a known step directive the controller runs
/// that backend step inline, then falls back to plain chat.
///
///   Idle ──submit──▶ AwaitingDirective ──plain reply──▶ Idle
///                          │
///                          └─directive──▶ RunningStep(K) ──any outcome──▶ Idle
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::{Backend, ChatReply, StepRequest};
use crate::error::TransportError;
use crate::extract::{self, FieldKind};
use crate::session::{SessionId, SessionManager};
use crate::tui::UiEvent;

pub const PROCESSING_TEXT: &str = "Processing request...";
pub const SERVER_ERROR_TEXT: &str = "Server error, please try again.";
pub const ASK_AMOUNT_TEXT: &str = "How much loan amount would you like to apply for?";

const ENVELOPE_OPEN: &str = "[[FLASK_CALL:";
const ENVELOPE_CLOSE: &str = "]]";

// ── Directive ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    VerifyKyc,
    Underwrite,
}

impl StepKind {
    pub fn name(self) -> &'static str {
        match self {
            StepKind::VerifyKyc => "VERIFY_KYC",
            StepKind::Underwrite => "UNDERWRITE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VERIFY_KYC" => Some(StepKind::VerifyKyc),
            "UNDERWRITE" => Some(StepKind::Underwrite),
            _ => None,
        }
    }

    /// Fields this step pulls out of the user message that triggered it.
    pub fn required_fields(self) -> &'static [FieldKind] {
        match self {
            StepKind::VerifyKyc => &[FieldKind::CustomerId],
            StepKind::Underwrite => &[FieldKind::LoanAmount],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Run(StepKind),
    /// Not a workflow directive: the reply is shown as ordinary text.
    PassThrough,
}

/// Bare step name inside `[[FLASK_CALL:NAME]]`, or `None` if the envelope is absent.
pub fn strip_envelope(payload: &str) -> Option<&str> {
    payload
        .trim()
        .strip_prefix(ENVELOPE_OPEN)?
        .strip_suffix(ENVELOPE_CLOSE)
}

impl Directive {
    pub fn decode(payload: &str) -> Self {
        match strip_envelope(payload).and_then(StepKind::from_name) {
            Some(kind) => Directive::Run(kind),
            None => Directive::PassThrough,
        }
    }

    pub fn from_reply(reply: &ChatReply) -> Self {
        match reply.orchestration_command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => Directive::decode(cmd),
            _ => Directive::PassThrough,
        }
    }
}

/// Text shown for a reply that is not run as a step.
fn display_text(reply: &ChatReply) -> Option<&str> {
    reply
        .response_text
        .as_deref()
        .or(reply.orchestration_command.as_deref())
}

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingDirective,
    RunningStep(StepKind),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::AwaitingDirective => f.write_str("waiting for reply"),
            Phase::RunningStep(kind) => write!(f, "running {kind}"),
        }
    }
}

// ── Turns ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    pub at: DateTime<Local>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { sender: Sender::User, text: text.into(), at: Local::now() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { sender: Sender::Assistant, text: text.into(), at: Local::now() }
    }
}

/// Append-only turn sequence; only a reset empties it.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

// ── Step results ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub customer_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KycResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_data: Option<CustomerRecord>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub next_step: Option<Value>,
}

impl KycResult {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnderwriteResult {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub worker_message: Option<String>,
    #[serde(default)]
    pub email_message: Option<String>,
    // Logged only, so any JSON shape is accepted
    #[serde(default)]
    pub emi: Option<Value>,
    #[serde(default)]
    pub tenure_months: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum StepResult {
    Kyc(KycResult),
    Underwrite(UnderwriteResult),
}

impl StepResult {
    pub fn decode(kind: StepKind, value: Value) -> Result<Self, TransportError> {
        Ok(match kind {
            StepKind::VerifyKyc => StepResult::Kyc(serde_json::from_value(value)?),
            StepKind::Underwrite => StepResult::Underwrite(serde_json::from_value(value)?),
        })
    }

    /// Assistant turns for this result, in display order.
    pub fn turns(&self) -> Vec<String> {
        match self {
            StepResult::Kyc(r) if r.is_success() => {
                let name = r
                    .customer_data
                    .as_ref()
                    .and_then(|c| c.name.as_deref())
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or("customer");
                vec![format!("KYC Verified for {name}"), ASK_AMOUNT_TEXT.to_string()]
            }
            StepResult::Kyc(r) => {
                let message = r
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Verification failed.".to_string());
                vec![message]
            }
            StepResult::Underwrite(r) => [&r.worker_message, &r.email_message]
                .into_iter()
                .flatten()
                .filter(|m| !m.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

// ── Prompter ──────────────────────────────────────────────────────────────────

/// Operator fallback for a field that could not be extracted.
/// `ask` suspends the controller until an answer (or a skip, `None`) arrives.
#[async_trait]
pub trait Prompter: Send {
    async fn ask(&mut self, question: &str) -> Option<String>;
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    NewChat,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct Controller {
    backend: Arc<dyn Backend>,
    prompter: Box<dyn Prompter>,
    session: SessionManager,
    transcript: Transcript,
    phase: Phase,
    greeting: String,
    events: mpsc::UnboundedSender<UiEvent>,
}

impl Controller {
    pub fn new(
        backend: Arc<dyn Backend>,
        prompter: Box<dyn Prompter>,
        greeting: String,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            backend,
            prompter,
            session: SessionManager::default(),
            transcript: Transcript::default(),
            phase: Phase::Idle,
            greeting,
            events,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.current()
    }

    /// Process commands one at a time until the sender side is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.start();
        while let Some(cmd) = commands.recv().await {
            self.handle(cmd).await;
        }
        tracing::debug!("command channel closed, controller stopping");
    }

    /// Show the greeting once. No session is created until the first send.
    pub fn start(&mut self) {
        if self.transcript.is_empty() {
            let greeting = self.greeting.clone();
            self.append(Turn::assistant(greeting));
        }
        self.emit(UiEvent::Ready);
    }

    pub async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(text) => self.submit(&text).await,
            Command::NewChat => self.reset().await,
        }
        tracing::debug!(
            turns = self.transcript().len(),
            last = ?self.transcript().turns().last().map(|t| t.sender),
            phase = %self.phase(),
            session = self.session_id().map(SessionId::as_str).unwrap_or("-"),
            "command handled"
        );
        self.emit(UiEvent::Ready);
    }

    pub async fn submit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let session = self.session.ensure(self.backend.as_ref()).await;
        self.append(Turn::user(text));
        let session = match session {
            Ok(id) => {
                self.emit(UiEvent::SessionBound(Some(id.clone())));
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "session creation failed");
                self.append(Turn::assistant(SERVER_ERROR_TEXT));
                return;
            }
        };

        self.set_phase(Phase::AwaitingDirective);
        self.emit(UiEvent::TypingStarted);
        let reply = self.backend.chat(&session, text).await;
        self.emit(UiEvent::TypingStopped);

        match reply {
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                self.append(Turn::assistant(SERVER_ERROR_TEXT));
            }
            Ok(reply) => match Directive::from_reply(&reply) {
                Directive::Run(kind) => {
                    self.append(Turn::assistant(PROCESSING_TEXT));
                    self.set_phase(Phase::RunningStep(kind));
                    self.run_step(kind, &session, text).await;
                }
                Directive::PassThrough => match display_text(&reply) {
                    Some(t) => self.append(Turn::assistant(t)),
                    None => tracing::warn!("chat reply carried neither text nor directive"),
                },
            },
        }

        self.set_phase(Phase::Idle);
    }

    /// Discard the transcript and session, bind a new one and greet again.
    pub async fn reset(&mut self) {
        self.transcript.clear();
        self.emit(UiEvent::Cleared);
        self.set_phase(Phase::Idle);

        let result = self.session.reset(self.backend.as_ref()).await;
        self.emit(UiEvent::SessionBound(result.as_ref().ok().cloned()));

        let greeting = self.greeting.clone();
        self.append(Turn::assistant(greeting));
        if let Err(e) = result {
            tracing::warn!(error = %e, "session reset failed");
            self.append(Turn::assistant(SERVER_ERROR_TEXT));
        }
    }

    async fn run_step(&mut self, kind: StepKind, session: &SessionId, original: &str) {
        let mut request = StepRequest::new(kind, session.clone());
        for &field in kind.required_fields() {
            let value = self.field_value(original, field).await;
            request = request.with_field(field, value);
        }
        tracing::info!(step = %kind, session = %session, "running step");

        self.emit(UiEvent::TypingStarted);
        let outcome = match self.backend.run_step(&request).await {
            Ok(value) => StepResult::decode(kind, value),
            Err(e) => Err(e),
        };
        self.emit(UiEvent::TypingStopped);

        match outcome {
            Ok(result) => {
                log_outcome(&result);
                for text in result.turns() {
                    self.append(Turn::assistant(text));
                }
            }
            Err(e) => {
                tracing::warn!(step = %kind, error = %e, "step failed");
                self.append(Turn::assistant(SERVER_ERROR_TEXT));
            }
        }
    }

    /// Extracted value, the operator's answer, or an empty string, per field policy.
    async fn field_value(&mut self, original: &str, field: FieldKind) -> String {
        if let Some(v) = extract::extract(original, field) {
            return v;
        }
        match field.fallback_prompt() {
            Some(question) => {
                tracing::debug!(field = %field, "field not found, asking operator");
                self.prompter
                    .ask(question)
                    .await
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            }
            None => {
                tracing::debug!(field = %field, "field not found, sending empty value");
                String::new()
            }
        }
    }

    fn append(&mut self, turn: Turn) {
        self.transcript.push(turn.clone());
        self.emit(UiEvent::TurnAppended(turn));
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase");
            self.phase = phase;
            self.emit(UiEvent::PhaseChanged(phase));
        }
    }

    fn emit(&self, ev: UiEvent) {
        let _ = self.events.send(ev);
    }
}

fn log_outcome(result: &StepResult) {
    match result {
        StepResult::Kyc(r) => tracing::info!(
            status = r.status.as_deref().unwrap_or("-"),
            next_step = %loggable(r.next_step.as_ref()),
            customer = %loggable(r.customer_data.as_ref().and_then(|c| c.customer_id.as_ref())),
            "kyc result"
        ),
        StepResult::Underwrite(r) => tracing::info!(
            status = r.status.as_deref().unwrap_or("-"),
            emi = %loggable(r.emi.as_ref()),
            tenure_months = %loggable(r.tenure_months.as_ref()),
            "underwrite result"
        ),
    }
}

fn loggable(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(v) => v.to_string(),
    }
}
