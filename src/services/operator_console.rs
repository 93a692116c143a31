//! Operator console.
//!
//! Parses operator command lines, runs them against the lifecycle manager
//! and renders the outcome as text. The same rendering serves the stdin
//! console and requests forwarded by the admin module.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::domain::models::{ConversationId, UserId};
use crate::domain::ports::{CommandInvocation, Event, OperatorCommand, OperatorRequest, Reply};
use crate::services::lifecycle_manager::{LifecycleManager, UnloadOutcome};

/// Actor id used for events emitted from the console.
pub const OPERATOR_ACTOR: UserId = 0;

const HELP: &str = "\
commands:
  load <module>
  unload <module> [--force]
  reload <module> [--force]
  reloadall [--force]
  list
  emit [@<conversation>] <command> [args...]
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Operator(OperatorCommand),
    Emit {
        conversation_id: Option<ConversationId>,
        name: String,
        args: Vec<String>,
    },
    Help,
    Quit,
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    let Some(verb) = words.first().copied() else {
        return Ok(None);
    };

    if verb == "emit" {
        let mut rest = &words[1..];
        let mut conversation_id = None;
        if let Some(target) = rest.first().and_then(|w| w.strip_prefix('@')) {
            conversation_id = Some(
                target
                    .parse::<ConversationId>()
                    .map_err(|_| format!("invalid conversation id '{target}'"))?,
            );
            rest = &rest[1..];
        }
        let (name, args) = rest
            .split_first()
            .ok_or_else(|| "usage: emit [@<conversation>] <command> [args...]".to_string())?;
        return Ok(Some(ConsoleCommand::Emit {
            conversation_id,
            name: (*name).to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }));
    }

    let force = words.iter().any(|w| *w == "--force" || *w == "-f");
    words.retain(|w| *w != "--force" && *w != "-f");
    let target = || {
        words
            .get(1)
            .map(|w| (*w).to_string())
            .ok_or_else(|| format!("usage: {verb} <module>"))
    };

    let command = match verb {
        "load" => ConsoleCommand::Operator(OperatorCommand::Load(target()?)),
        "unload" => ConsoleCommand::Operator(OperatorCommand::Unload { name: target()?, force }),
        "reload" => ConsoleCommand::Operator(OperatorCommand::Reload { name: target()?, force }),
        "reloadall" => ConsoleCommand::Operator(OperatorCommand::ReloadAll { force }),
        "list" | "modules" => ConsoleCommand::Operator(OperatorCommand::List),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

#[derive(Debug, Clone)]
pub struct OperatorConsole {
    lifecycle: Arc<LifecycleManager>,
}

impl OperatorConsole {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    /// Run a lifecycle command and render its outcome.
    pub async fn execute(&self, command: OperatorCommand) -> String {
        match command {
            OperatorCommand::Load(name) => match self.lifecycle.load(&name).await {
                Ok(()) => format!("loaded: {name}"),
                Err(err) => failure(&err),
            },
            OperatorCommand::Unload { name, force } => match self.lifecycle.unload(&name, force).await {
                Ok(UnloadOutcome::Unloaded) => format!("unloaded: {name}"),
                Ok(UnloadOutcome::NotLoaded) => format!("not_loaded: {name}"),
                Err(err) => failure(&err),
            },
            OperatorCommand::Reload { name, force } => match self.lifecycle.reload(&name, force).await {
                Ok(()) => format!("reloaded: {name}"),
                Err(err) => failure(&err),
            },
            OperatorCommand::ReloadAll { force } => {
                let reports = self.lifecycle.reload_all(force).await;
                if reports.is_empty() {
                    return "no modules loaded".to_string();
                }
                let lines: Vec<String> = reports
                    .iter()
                    .map(|report| match &report.result {
                        Ok(()) => format!("reloaded: {}", report.module),
                        Err(err) => failure(err),
                    })
                    .collect();
                lines.join("\n")
            }
            OperatorCommand::List => {
                let loaded = self.lifecycle.list_loaded().await;
                if loaded.is_empty() {
                    return "no modules loaded".to_string();
                }
                let mut out = String::new();
                for status in loaded {
                    let _ = write!(out, "{} {} ({}", status.name, status.version, status.state.as_str());
                    if status.critical {
                        out.push_str(", critical");
                    }
                    let _ = writeln!(out, ", since {})", status.loaded_at.format("%Y-%m-%d %H:%M:%S"));
                }
                out.trim_end().to_string()
            }
        }
    }

    /// Push a command event through the dispatcher as the operator.
    pub async fn emit(&self, conversation_id: Option<ConversationId>, name: String, args: Vec<String>) -> String {
        let event = Event::Command(CommandInvocation {
            name: name.clone(),
            args,
            actor_id: OPERATOR_ACTOR,
            conversation_id,
        });
        let results = self.lifecycle.dispatcher().dispatch(&event).await;
        if results.is_empty() {
            return format!("no handler for command '{name}'");
        }
        let lines: Vec<String> = results
            .into_iter()
            .map(|d| match d.result {
                Ok(Reply::Text(text)) => format!("[{}] {}", d.owner, text),
                Ok(Reply::Silent) => format!("[{}] ok", d.owner),
                Err(err) => format!("[{}] error: {}", d.owner, err),
            })
            .collect();
        lines.join("\n")
    }

    /// Serve requests forwarded by modules until every sender is gone.
    pub async fn serve(self, mut requests: mpsc::Receiver<OperatorRequest>) {
        while let Some(request) = requests.recv().await {
            tracing::debug!(command = ?request.command, "operator request from module");
            let outcome = self.execute(request.command).await;
            if request.reply.send(outcome).is_err() {
                tracing::debug!("operator request abandoned before reply");
            }
        }
    }

    /// Read command lines from `input` until `quit` or end of input,
    /// writing replies to `output`.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let reply = match parse_command(&line) {
                Ok(None) => continue,
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(ConsoleCommand::Help)) => HELP.to_string(),
                Ok(Some(ConsoleCommand::Operator(command))) => self.execute(command).await,
                Ok(Some(ConsoleCommand::Emit {
                    conversation_id,
                    name,
                    args,
                })) => self.emit(conversation_id, name, args).await,
                Err(message) => message,
            };
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok(())
    }
}

fn failure(err: &crate::domain::errors::LifecycleError) -> String {
    tracing::warn!(reason = err.reason(), error = %err, "operator command failed");
    err.summary()
}
