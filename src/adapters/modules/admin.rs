//! Admin module: chat-side front end for the operator commands.
//!
//! Commands are forwarded to the host over the [`OperatorHandle`]; the host
//! runs them against the lifecycle manager and replies with the rendered
//! outcome. Overrides are never passed from chat, so critical modules are
//! out of reach. The admin module must itself be critical: a handler that
//! waits on its own unload would never drain.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::errors::{DomainError, DomainResult, ModuleError};
use crate::domain::ports::{Event, EventHandler, Module, ModuleContext, OperatorCommand, OperatorHandle, Reply};

const COMMANDS: [&str; 5] = ["load", "unload", "reload", "reloadall", "modules"];

const NAME: &str = "admin";

#[derive(Debug, Default)]
pub struct AdminModule;

impl AdminModule {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for AdminModule {
    fn name(&self) -> &str {
        NAME
    }

    fn default_config(&self) -> Value {
        json!({})
    }

    async fn on_load(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let operator = ctx
            .host()
            .operator
            .clone()
            .ok_or_else(|| ModuleError::Config("host does not serve operator commands".to_string()))?;
        if !ctx.host().settings.critical_modules.iter().any(|m| m == NAME) {
            return Err(ModuleError::Config(format!("'{NAME}' must be listed in critical_modules")));
        }

        let handler: Arc<dyn EventHandler> = Arc::new(AdminCommands { operator });
        for command in COMMANDS {
            ctx.register_command(command, handler.clone());
        }
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

struct AdminCommands {
    operator: OperatorHandle,
}

impl AdminCommands {
    fn parse(name: &str, args: &[String]) -> DomainResult<OperatorCommand> {
        let target = || {
            args.first()
                .cloned()
                .ok_or_else(|| DomainError::ValidationFailed(format!("usage: {name} <module>")))
        };
        match name {
            "load" => Ok(OperatorCommand::Load(target()?)),
            "unload" => Ok(OperatorCommand::Unload {
                name: target()?,
                force: false,
            }),
            "reload" => Ok(OperatorCommand::Reload {
                name: target()?,
                force: false,
            }),
            "reloadall" => Ok(OperatorCommand::ReloadAll { force: false }),
            "modules" => Ok(OperatorCommand::List),
            other => Err(DomainError::ValidationFailed(format!("unknown admin command '{other}'"))),
        }
    }
}

#[async_trait]
impl EventHandler for AdminCommands {
    async fn handle(&self, event: &Event) -> DomainResult<Reply> {
        let Event::Command(cmd) = event else {
            return Ok(Reply::Silent);
        };
        let command = Self::parse(&cmd.name, &cmd.args)?;
        tracing::info!(actor_id = cmd.actor_id, command = ?command, "admin command");
        let outcome = self.operator.send(command).await?;
        Ok(Reply::text(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_never_forces() {
        let args = vec!["admin".to_string()];
        assert_eq!(
            AdminCommands::parse("unload", &args).unwrap(),
            OperatorCommand::Unload {
                name: "admin".to_string(),
                force: false
            }
        );
        assert_eq!(
            AdminCommands::parse("reloadall", &[]).unwrap(),
            OperatorCommand::ReloadAll { force: false }
        );
        assert!(AdminCommands::parse("load", &[]).is_err());
    }

    #[tokio::test]
    async fn test_commands_round_trip_through_operator_channel() {
        let (operator, mut rx) = OperatorHandle::channel(4);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let _ = request.reply.send(format!("ok: {:?}", request.command));
            }
        });

        let handler = AdminCommands { operator };
        let reply = handler
            .handle(&Event::command("load", &["tickets"], 1))
            .await
            .unwrap();
        assert_eq!(reply.as_text(), Some("ok: Load(\"tickets\")"));
    }
}
