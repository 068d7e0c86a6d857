mod client;
mod config;
mod error;
mod extract;
mod markup;
mod orchestrate;
mod session;
mod tui;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use clap::{CommandFactory, Parser};
use config::{ConfigFile, ResolvedConfig};
use orchestrate::{Controller, Prompter, Sender};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tui::UiEvent;

#[derive(Parser, Debug)]
#[command(
    name = "loandesk",
    about = "Terminal chat desk for the loan-sales assistant",
    long_about = None,
)]
struct Args {
    /// Message to send once in plain mode (omit to enter interactive TUI mode)
    message: Option<String>,

    /// Profile to use from config file
    #[arg(short, long, env = "LOANDESK_PROFILE")]
    profile: Option<String>,

    /// Override the assistant service URL
    #[arg(long, env = "LOANDESK_ENDPOINT")]
    endpoint: Option<String>,

    /// Show timestamps on messages
    #[arg(long)]
    timestamps: bool,

    /// Show session and phase changes in plain mode
    #[arg(short, long)]
    verbose: bool,

    /// Write a default config file to ~/.config/loandesk/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: loandesk");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    init_logging();

    let resolved = ResolvedConfig::resolve(
        &file,
        args.profile.as_deref(),
        args.endpoint.as_deref(),
    );

    // ── Single-shot mode (non-TUI) ────────────────────────────────────────────
    if let Some(message) = args.message {
        return run_single_shot(message, resolved, args.verbose).await;
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    tui::run(resolved, args.timestamps).await
}

// ── Logging ───────────────────────────────────────────────────────────────────

/// File-backed tracing; the TUI owns the terminal so nothing goes to stderr.
fn init_logging() {
    use std::fs::OpenOptions;
    use std::sync::Mutex;
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "loandesk=info".into());
    let dir = config::data_dir();
    let log_file = std::fs::create_dir_all(&dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("loandesk.log"))
    });
    let layer = tracing_subscriber::fmt::layer().with_ansi(false);
    let registry = tracing_subscriber::registry().with(filter);

    let _ = match log_file {
        Ok(f) => registry.with(layer.with_writer(Mutex::new(f))).try_init(),
        Err(_) => registry.with(layer.with_writer(std::io::sink)).try_init(),
    };
}

// ── Single-shot mode (plain stdout, no TUI) ───────────────────────────────────

/// Reads the manual prompt answer from stdin. EOF or a blank line skips.
struct StdinPrompter {
    events: mpsc::UnboundedSender<UiEvent>,
    lines: Lines<BufReader<Stdin>>,
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&mut self, question: &str) -> Option<String> {
        // Routed through the event channel so it prints after earlier turns
        let _ = self.events.send(UiEvent::AskUser { question: question.to_string() });
        match self.lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => Some(line),
            _ => None,
        }
    }
}

async fn run_single_shot(message: String, resolved: ResolvedConfig, verbose: bool) -> Result<()> {
    println!();
    println!("  ▲ loandesk  {}  ·  {}", resolved.profile_name, resolved.endpoint);
    println!();

    let backend = Arc::new(client::Client::new(resolved.endpoint.clone(), resolved.routes.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel::<UiEvent>();
    let prompter = StdinPrompter {
        events: tx.clone(),
        lines: BufReader::new(tokio::io::stdin()).lines(),
    };
    let mut controller = Controller::new(backend, Box::new(prompter), resolved.greeting.clone(), tx);

    // The controller (and with it every sender) drops when the task ends
    let handle = tokio::spawn(async move {
        controller.start();
        controller.submit(&message).await;
    });

    while let Some(ev) = rx.recv().await {
        print_event_plain(&ev, verbose);
    }

    handle.await?;
    Ok(())
}

fn print_event_plain(ev: &UiEvent, verbose: bool) {
    match ev {
        UiEvent::TurnAppended(turn) => {
            let label = match turn.sender {
                Sender::User => "you ",
                Sender::Assistant => "desk",
            };
            let text = markup::format(&turn.text).to_plain();
            let mut lines = text.lines();
            println!("  {label}  {}", lines.next().unwrap_or(""));
            for line in lines {
                println!("        {line}");
            }
        }
        UiEvent::AskUser { question } => {
            print!("  ? {question} ");
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }
        UiEvent::PhaseChanged(phase) if verbose => println!("  · {phase}"),
        UiEvent::SessionBound(Some(id)) if verbose => println!("  · session {id}"),
        // Typing indicator, reset and completion events only matter in TUI mode
        UiEvent::PhaseChanged(_)
        | UiEvent::SessionBound(_)
        | UiEvent::TypingStarted
        | UiEvent::TypingStopped
        | UiEvent::Cleared
        | UiEvent::Ready => {}
    }
}

// ── Profiles listing (non-TUI) ────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    println!();
    println!("  Profiles");
    if file.profiles.is_empty() {
        println!("  (none, run `loandesk --init` to create a config)");
    }
    for name in file.profile_names() {
        let Some(p) = file.profiles.get(name) else { continue };
        let marker = if name == file.default_profile { " ←" } else { "" };
        println!("  {name}{marker}");
        println!("    endpoint  {}", p.endpoint);
        println!("    reveal    {}ms", p.reveal_interval_ms);
        println!();
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => bail!("unknown shell: {shell_name} (supported: bash, zsh, fish, elvish)"),
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "loandesk", &mut std::io::stdout());
    Ok(())
}
