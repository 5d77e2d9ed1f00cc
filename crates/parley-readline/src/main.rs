use std::borrow::Cow::{self, Borrowed, Owned};
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing_subscriber::EnvFilter;

use parley_application::{SessionCommand, SessionManager};
use parley_core::recovery::RecoveryState;
use parley_core::session::{Message, MessageRole};
use parley_infrastructure::{ConfigService, FileCheckpointStore, ParleyPaths, open_session_store};

const COMMANDS: &[&str] = &[
    "/new",
    "/save",
    "/load",
    "/sessions",
    "/delete",
    "/search",
    "/export",
    "/branch",
    "/branches",
    "/tree",
    "/switch",
    "/merge",
    "/recover",
    "/attach",
    "/tag",
    "/rename",
    "/help",
    "/quit",
];

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

type ParleyEditor = Editor<CliHelper, DefaultHistory>;

/// Stand-in for a model backend: repeats the last user message.
fn echo_reply(history: &[Message]) -> String {
    history
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| format!("You said: {}", m.content))
        .unwrap_or_else(|| "Say something.".to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PARLEY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// On SIGTERM: write a final checkpoint (kept for the next start) and exit.
#[cfg(unix)]
fn spawn_terminate_handler(manager: Arc<SessionManager>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                tracing::warn!("[Parley] Cannot listen for SIGTERM: {}", e);
                return;
            }
        };
        if terminate.recv().await.is_some() {
            tracing::info!("[Parley] SIGTERM received, writing final checkpoint");
            if let Err(e) = manager.shutdown(false).await {
                tracing::warn!("[Parley] Shutdown after SIGTERM failed: {}", e);
            }
            std::process::exit(143);
        }
    });
}

/// Asks whether to restore a checkpoint left by a previous run.
async fn offer_recovery(
    rl: &mut ParleyEditor,
    manager: &SessionManager,
    state: &RecoveryState,
) -> Result<()> {
    println!(
        "{}",
        format!(
            "Found unsaved work from a previous run: '{}' ({} messages, {}).",
            state.session_name,
            state.message_count,
            state.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .bright_yellow()
    );

    loop {
        let answer = match rl.readline("Recover it? [y]es / [n]o / [l]ater: ") {
            Ok(answer) => answer.trim().to_lowercase(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => "l".to_string(),
            Err(e) => return Err(e.into()),
        };

        match answer.as_str() {
            "y" | "yes" => {
                let recovered = manager.recover().await?;
                println!(
                    "{}",
                    format!(
                        "Recovered '{}' ({} messages).",
                        recovered.session.name, recovered.session.message_count
                    )
                    .bright_green()
                );
                return Ok(());
            }
            "n" | "no" => {
                manager.discard_recovery().await?;
                println!("{}", "Checkpoint discarded.".bright_black());
                return Ok(());
            }
            "l" | "later" => {
                println!(
                    "{}",
                    "Kept. Use /recover when ready; until then new work is saved on exit only."
                        .bright_black()
                );
                return Ok(());
            }
            _ => continue,
        }
    }
}

/// Runs one command. Returns `true` when the REPL should exit.
async fn run_command(
    manager: &SessionManager,
    command: SessionCommand,
) -> parley_core::Result<bool> {
    match command {
        SessionCommand::Help => println!("{}", SessionCommand::help_text().bright_black()),
        SessionCommand::Quit => return Ok(true),
        SessionCommand::New { name } => {
            let outcome = manager.new_session(name.as_deref()).await;
            if let Some(warning) = outcome.save_warning {
                println!(
                    "{}",
                    format!("Warning: previous session not saved: {}", warning).yellow()
                );
            }
            let message = format!(
                "New session '{}' ({})",
                outcome.session.name, outcome.session.id
            );
            println!("{}", message.green());
        }
        SessionCommand::Save { name } => {
            let info = manager.save(name.as_deref()).await?;
            println!("{}", format!("Saved '{}' ({})", info.name, info.id).green());
        }
        SessionCommand::Load { id } => {
            let outcome = manager.load(&id).await?;
            report_switch(outcome);
        }
        SessionCommand::Switch { id } => {
            let outcome = manager.switch(&id).await?;
            report_switch(outcome);
        }
        SessionCommand::Sessions => {
            let active = manager.active_info().await.id;
            let sessions = manager.list().await?;
            if sessions.is_empty() {
                println!("{}", "No saved sessions.".bright_black());
            }
            for info in sessions {
                let marker = if info.id == active { "*" } else { " " };
                println!(
                    "{} {}  {}  {} messages  {}",
                    marker,
                    info.id.bright_black(),
                    info.name.bold(),
                    info.message_count,
                    info.updated.format("%Y-%m-%d %H:%M")
                );
            }
        }
        SessionCommand::Delete { id } => {
            manager.delete(&id).await?;
            println!("{}", format!("Deleted {}", id).green());
        }
        SessionCommand::Search { query } => {
            let results = manager.search(&query).await?;
            if results.is_empty() {
                println!("{}", format!("No matches for '{}'.", query).bright_black());
            }
            for result in results {
                println!("{} {}", result.session.id.bright_black(), result.session.name.bold());
                for m in result.matches {
                    println!("    [{}] {}", m.match_type, m.snippet);
                }
            }
        }
        SessionCommand::Export { format, path } => {
            let written = manager.export_active(format, path.as_deref()).await?;
            println!("{}", format!("Exported to {}", written.display()).green());
        }
        SessionCommand::Branch { name, at } => {
            let info = manager.branch(&name, at).await?;
            println!(
                "{}",
                format!(
                    "Branch '{}' ({}) created with {} messages. Use /switch to enter it.",
                    info.name, info.id, info.message_count
                )
                .green()
            );
        }
        SessionCommand::Branches => {
            let branches = manager.branches().await?;
            if branches.is_empty() {
                println!("{}", "No branches.".bright_black());
            }
            for info in branches {
                println!(
                    "  {}  {}  at {}",
                    info.id.bright_black(),
                    info.name.bold(),
                    info.branch_point.unwrap_or(0)
                );
            }
        }
        SessionCommand::Tree => {
            let active = manager.active_info().await.id;
            let tree = manager.tree().await?;
            print!("{}", tree.render(Some(active.as_str())));
        }
        SessionCommand::Merge { source_id } => {
            let summary = manager.merge(&source_id).await?;
            println!(
                "{}",
                format!(
                    "Merged {}: {} appended, {} already present.",
                    summary.source_id, summary.appended, summary.skipped
                )
                .green()
            );
        }
        SessionCommand::Recover => {
            let recovered = manager.recover().await?;
            let message = format!(
                "Recovered '{}' ({} messages).",
                recovered.session.name, recovered.session.message_count
            );
            println!("{}", message.bright_green());
        }
        SessionCommand::Attach { path } => {
            let attachment = manager.attach_file(&path).await?;
            let message = format!(
                "Attached {} ({}) to the next message.",
                attachment.name, attachment.mime_type
            );
            println!("{}", message.green());
        }
        SessionCommand::Tag { tag } => {
            if manager.add_tag(&tag).await {
                println!("{}", format!("Tagged '{}'.", tag).green());
            } else {
                println!("{}", format!("Already tagged '{}'.", tag).bright_black());
            }
        }
        SessionCommand::Rename { name } => {
            let info = manager.rename(&name).await?;
            println!("{}", format!("Renamed to '{}'.", info.name).green());
        }
    }
    Ok(false)
}

fn report_switch(outcome: parley_application::SwitchOutcome) {
    if let Some(warning) = outcome.save_warning {
        println!("{}", format!("Warning: previous session not saved: {}", warning).yellow());
    }
    println!(
        "{}",
        format!(
            "Switched to '{}' ({} messages).",
            outcome.session.name, outcome.session.message_count
        )
        .green()
    );
}

/// The main entry point for the Parley readline REPL.
///
/// 1. Loads configuration and opens the configured session store
/// 2. Offers recovery of a checkpoint left by an abnormal exit
/// 3. Dispatches session commands and echoes chat messages
/// 4. Saves and clears the checkpoint on a clean exit
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // ===== Backend Initialization =====
    let config = ConfigService::for_paths(&ParleyPaths::platform()?)
        .get_config()
        .await?;
    let paths = ParleyPaths::for_storage(&config.storage)?;
    let store = open_session_store(&config.storage, &paths).await?;
    let checkpoints = Arc::new(FileCheckpointStore::new(paths.recovery_file()));
    let manager = Arc::new(SessionManager::new(store, checkpoints, &config));
    let _interrupts = manager.spawn_interrupt_checkpointer();
    #[cfg(unix)]
    spawn_terminate_handler(manager.clone());

    // ===== REPL Setup =====
    let mut rl: ParleyEditor = Editor::new()?;
    rl.set_helper(Some(CliHelper::new()));

    println!("{}", "=== Parley ===".bright_magenta().bold());
    println!(
        "{}",
        "Type a message to chat, '/help' for commands, or '/quit' to exit.".bright_black()
    );
    println!();

    if let Some(state) = manager.startup().await? {
        offer_recovery(&mut rl, &manager, &state).await?;
    }

    // ===== Main REPL Loop =====
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match SessionCommand::parse(trimmed) {
                    Ok(Some(command)) => match run_command(&manager, command).await {
                        Ok(true) => {
                            println!("{}", "Goodbye!".bright_green());
                            break;
                        }
                        Ok(false) => {}
                        Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                    },
                    Ok(None) => {
                        manager.add_message(MessageRole::User, trimmed).await;
                        let reply = echo_reply(&manager.history_for_generation().await);
                        for line in reply.lines() {
                            println!("{}", line.bright_blue());
                        }
                        manager.add_message(MessageRole::Assistant, reply).await;
                    }
                    Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                match manager.checkpoint_now().await {
                    Ok(()) => println!(
                        "{}",
                        "CTRL-C detected. Checkpoint written; type '/quit' to exit.".yellow()
                    ),
                    Err(e) => eprintln!(
                        "{}",
                        format!("CTRL-C detected. Checkpoint failed: {}", e).red()
                    ),
                }
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                manager.shutdown(false).await?;
                return Err(err.into());
            }
        }
    }

    manager.shutdown(true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_reply_uses_last_user_message() {
        let history = vec![
            Message::system("be nice"),
            Message::user("first"),
            Message::assistant("You said: first"),
            Message::user("second"),
        ];
        assert_eq!(echo_reply(&history), "You said: second");
        assert_eq!(echo_reply(&[]), "Say something.");
    }

    #[test]
    fn test_every_completion_parses_as_command() {
        for command in COMMANDS {
            let parsed = SessionCommand::parse(command);
            assert!(
                !matches!(parsed, Ok(None)),
                "{command} should be recognized"
            );
        }
    }
}
