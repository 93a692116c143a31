//! Tickets module.
//!
//! Owns `data.db` in its module directory (tickets, per-category sequence
//! counters, reminders) and the reminder scheduler loop that delivers due
//! reminders. Everything it starts in `on_load` is stopped in `on_unload`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    initialize_database, tickets_migrations, PoolConfig, SqliteReminderRepository, SqliteSequenceRepository,
    SqliteTicketRepository,
};
use crate::domain::errors::{DomainError, DomainResult, ModuleError};
use crate::domain::models::{ConversationId, TicketCategory};
use crate::domain::ports::{
    CommandInvocation, ControlInteraction, Event, EventHandler, Module, ModuleContext, Reply,
};
use crate::services::reminder_scheduler::{ReminderScheduler, SchedulerHandle};
use crate::services::reminder_service::{ReminderPolicy, ReminderService};
use crate::services::ticket_numbering::TicketNumbering;
use crate::services::ticket_service::TicketService;

/// Resolved `config.yml` of the tickets module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsSettings {
    #[serde(default = "default_categories")]
    pub categories: Vec<TicketCategory>,
    #[serde(default)]
    pub reminders: ReminderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// Hours between repeats; 0 makes reminders one-shot.
    #[serde(default = "default_recurrence_hours")]
    pub recurrence_hours: u32,
    #[serde(default = "default_max_delay_days")]
    pub max_delay_days: u32,
}

const fn default_recurrence_hours() -> u32 {
    24
}

const fn default_max_delay_days() -> u32 {
    30
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            recurrence_hours: default_recurrence_hours(),
            max_delay_days: default_max_delay_days(),
        }
    }
}

fn default_categories() -> Vec<TicketCategory> {
    let category = |key: &str, label: &str, numbered| TicketCategory {
        key: key.to_string(),
        label: label.to_string(),
        numbered,
    };
    vec![
        category("support", "Support", true),
        category("report", "Report", true),
        category("feedback", "Feedback", false),
    ]
}

impl Default for TicketsSettings {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            reminders: ReminderSettings::default(),
        }
    }
}

impl TicketsSettings {
    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.categories.is_empty() {
            errors.push("categories must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.key.trim().is_empty() {
                errors.push("category key must not be empty".to_string());
            } else if !seen.insert(category.key.to_lowercase()) {
                errors.push(format!("category '{}' is declared twice", category.key));
            }
        }
        if self.reminders.max_delay_days == 0 {
            errors.push("reminders.max_delay_days must be at least 1".to_string());
        }
        errors
    }
}

struct TicketsRuntime {
    pool: SqlitePool,
    scheduler: SchedulerHandle,
}

#[derive(Default)]
pub struct TicketsModule {
    runtime: Option<TicketsRuntime>,
}

impl std::fmt::Debug for TicketsModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketsModule")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

impl TicketsModule {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Module for TicketsModule {
    fn name(&self) -> &str {
        "tickets"
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(TicketsSettings::default()).unwrap_or(Value::Null)
    }

    fn validate_config(&self, config: &Value) -> Result<(), Vec<String>> {
        let settings: TicketsSettings =
            serde_json::from_value(config.clone()).map_err(|e| vec![e.to_string()])?;
        let errors = settings.problems();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn on_load(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let settings: TicketsSettings = ctx.settings()?;
        let host = ctx.host().clone();

        let pool = initialize_database(
            &ctx.database_url(),
            PoolConfig::from(&host.settings.database),
            tickets_migrations(),
        )
        .await
        .map_err(|e| ModuleError::Store(e.to_string()))?;

        let ticket_repo = Arc::new(SqliteTicketRepository::new(pool.clone()));
        let reminder_repo = Arc::new(SqliteReminderRepository::new(pool.clone()));
        let numbering = TicketNumbering::new(
            Arc::new(SqliteSequenceRepository::new(pool.clone())),
            host.settings.allocation.clone(),
        );

        let policy = ReminderPolicy::from_settings(
            settings.reminders.recurrence_hours,
            settings.reminders.max_delay_days,
        );
        let handler: Arc<dyn EventHandler> = Arc::new(TicketsHandler {
            tickets: TicketService::new(ticket_repo.clone(), numbering, settings.categories),
            reminders: ReminderService::new(reminder_repo.clone(), ticket_repo, policy),
        });

        ctx.register_command("ticket.open", handler.clone());
        ctx.register_command("ticket.close", handler.clone());
        ctx.register_command("ticket.stats", handler.clone());
        ctx.register_command("ticket.list", handler.clone());
        ctx.register_command("ticket.reopen", handler.clone());
        ctx.register_command("ticket.add", handler.clone());
        ctx.register_command("remindme", handler.clone());
        ctx.register_command("stopreminder", handler.clone());
        ctx.register_command("snooze", handler.clone());
        ctx.register_control("ticket:", handler.clone());
        ctx.register_control("reminder:", handler.clone());
        ctx.register_conversation_updates(handler);

        let scheduler = ReminderScheduler::new(
            reminder_repo,
            host.delivery.clone(),
            Duration::from_secs(host.settings.scheduler.poll_interval_secs.max(1)),
        )
        .start();

        tracing::info!(database = %ctx.database_path().display(), "tickets module started");
        self.runtime = Some(TicketsRuntime { pool, scheduler });
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), ModuleError> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };
        let stopped = runtime.scheduler.shutdown().await;
        runtime.pool.close().await;
        stopped.map_err(|e| ModuleError::Failed(e.to_string()))?;
        tracing::info!("tickets module stopped");
        Ok(())
    }
}

struct TicketsHandler {
    tickets: TicketService,
    reminders: ReminderService,
}

fn require_conversation(conversation_id: Option<ConversationId>) -> DomainResult<ConversationId> {
    conversation_id.ok_or_else(|| {
        DomainError::ValidationFailed("this must be used inside a ticket conversation".to_string())
    })
}

fn parse_reminder_id(raw: Option<&str>) -> DomainResult<i64> {
    raw.and_then(|s| s.parse().ok())
        .ok_or_else(|| DomainError::ValidationFailed("expected a reminder id".to_string()))
}

impl TicketsHandler {
    async fn command(&self, cmd: &CommandInvocation) -> DomainResult<Reply> {
        match cmd.name.as_str() {
            "ticket.open" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let category = cmd.args.first().ok_or_else(|| {
                    DomainError::ValidationFailed("usage: ticket.open <category>".to_string())
                })?;
                self.open(conversation_id, cmd.actor_id, category).await
            }
            "ticket.close" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let reason = (!cmd.args.is_empty()).then(|| cmd.args.join(" "));
                self.close(conversation_id, cmd.actor_id, reason.as_deref()).await
            }
            "ticket.stats" => {
                let stats = self.tickets.stats().await?;
                if stats.is_empty() {
                    return Ok(Reply::text("No tickets yet"));
                }
                let lines: Vec<String> = stats
                    .iter()
                    .map(|s| format!("{}: {} open, {} closed", s.category, s.open, s.closed))
                    .collect();
                Ok(Reply::text(lines.join("\n")))
            }
            "ticket.list" => {
                let open = self.tickets.list_open(cmd.actor_id).await?;
                if open.is_empty() {
                    return Ok(Reply::text("You don't have any open tickets"));
                }
                let lines: Vec<String> = open
                    .iter()
                    .map(|t| {
                        format!(
                            "{} ticket {} in conversation {} (opened {})",
                            self.label(&t.category),
                            t.display_id(),
                            t.conversation_id,
                            t.created_at.format("%Y-%m-%d %H:%M UTC")
                        )
                    })
                    .collect();
                Ok(Reply::text(lines.join("\n")))
            }
            "ticket.reopen" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let ticket = self.tickets.reopen(conversation_id, cmd.actor_id).await?;
                Ok(Reply::text(format!("Reopened ticket {}", ticket.display_id())))
            }
            "ticket.add" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let category = cmd.args.first().ok_or_else(|| {
                    DomainError::ValidationFailed("usage: ticket.add <category> [owner-id]".to_string())
                })?;
                let owner_id = match cmd.args.get(1) {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| DomainError::ValidationFailed(format!("invalid owner id '{raw}'")))?,
                    None => cmd.actor_id,
                };
                let ticket = self.tickets.add(conversation_id, owner_id, category).await?;
                Ok(Reply::text(format!(
                    "Registered conversation {} as {} ticket {}",
                    conversation_id,
                    self.label(&ticket.category),
                    ticket.display_id()
                )))
            }
            "remindme" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let direct = cmd.args.iter().any(|a| a == "dm" || a == "--dm");
                let delay = cmd.args.iter().find(|a| *a != "dm" && *a != "--dm");
                let record = self
                    .reminders
                    .set_reminder(conversation_id, cmd.actor_id, delay.map(String::as_str), direct)
                    .await?;
                let repeat = match self.reminders.policy().recurrence {
                    Some(every) => format!(", then every {}h", every.num_hours()),
                    None => String::new(),
                };
                Ok(Reply::text(format!(
                    "Reminder {} set for {}{}",
                    record.id,
                    record.next_fire_at.format("%Y-%m-%d %H:%M UTC"),
                    repeat
                )))
            }
            "stopreminder" => {
                let conversation_id = require_conversation(cmd.conversation_id)?;
                let record = self.reminders.stop(conversation_id, cmd.actor_id).await?;
                Ok(Reply::text(format!("Reminder {} stopped", record.id)))
            }
            "snooze" => {
                let id = parse_reminder_id(cmd.args.first().map(String::as_str))?;
                let duration = cmd.args.get(1).ok_or_else(|| {
                    DomainError::ValidationFailed("usage: snooze <id> <duration>".to_string())
                })?;
                self.snooze(id, cmd.actor_id, duration).await
            }
            _ => Ok(Reply::Silent),
        }
    }

    /// `ticket:open:<category>`, `ticket:close`, `reminder:stop:<id>`,
    /// `reminder:snooze:<id>:<duration>`.
    async fn control(&self, ctl: &ControlInteraction) -> DomainResult<Reply> {
        let parts: Vec<&str> = ctl.custom_id.split(':').collect();
        match parts.as_slice() {
            ["ticket", "open", category] => {
                self.open(require_conversation(ctl.conversation_id)?, ctl.actor_id, category)
                    .await
            }
            ["ticket", "close"] => {
                self.close(require_conversation(ctl.conversation_id)?, ctl.actor_id, None)
                    .await
            }
            ["reminder", "stop", id] => {
                let record = self
                    .reminders
                    .stop_by_id(parse_reminder_id(Some(*id))?, ctl.actor_id)
                    .await?;
                Ok(Reply::text(format!("Reminder {} stopped", record.id)))
            }
            ["reminder", "snooze", id, duration] => {
                self.snooze(parse_reminder_id(Some(*id))?, ctl.actor_id, duration).await
            }
            _ => {
                tracing::debug!(custom_id = %ctl.custom_id, "unknown tickets control");
                Ok(Reply::Silent)
            }
        }
    }

    async fn open(&self, conversation_id: ConversationId, user_id: i64, category: &str) -> DomainResult<Reply> {
        let ticket = self.tickets.open(conversation_id, user_id, category).await?;
        Ok(Reply::text(format!(
            "Opened {} ticket {}",
            self.label(&ticket.category),
            ticket.display_id()
        )))
    }

    fn label<'a>(&'a self, category: &'a str) -> &'a str {
        self.tickets.category(category).map_or(category, |c| c.label.as_str())
    }

    async fn close(
        &self,
        conversation_id: ConversationId,
        user_id: i64,
        reason: Option<&str>,
    ) -> DomainResult<Reply> {
        let closure = self.tickets.close(conversation_id, user_id, reason).await?;
        Ok(Reply::text(format!(
            "Closed ticket {} ({} reminder(s) cancelled)",
            closure.ticket.display_id(),
            closure.cancelled_reminders
        )))
    }

    async fn snooze(&self, id: i64, user_id: i64, duration: &str) -> DomainResult<Reply> {
        let record = self.reminders.snooze(id, user_id, duration).await?;
        Ok(Reply::text(format!(
            "Reminder {} snoozed until {}",
            record.id,
            record.next_fire_at.format("%Y-%m-%d %H:%M UTC")
        )))
    }
}

#[async_trait]
impl EventHandler for TicketsHandler {
    async fn handle(&self, event: &Event) -> DomainResult<Reply> {
        match event {
            Event::Command(cmd) => self.command(cmd).await,
            Event::Control(ctl) => self.control(ctl).await,
            Event::ConversationUpdate(update) => {
                if let Some(ticket) = self.tickets.on_conversation_update(update).await? {
                    return Ok(Reply::text(format!("Ticket {} reopened", ticket.display_id())));
                }
                Ok(Reply::Silent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::AllocationConfig;
    use crate::domain::ports::ConversationUpdate;

    async fn handler() -> TicketsHandler {
        let pool = create_migrated_test_pool().await.unwrap();
        let tickets = Arc::new(SqliteTicketRepository::new(pool.clone()));
        TicketsHandler {
            tickets: TicketService::new(
                tickets.clone(),
                TicketNumbering::new(
                    Arc::new(SqliteSequenceRepository::new(pool.clone())),
                    AllocationConfig::default(),
                ),
                default_categories(),
            ),
            reminders: ReminderService::new(
                Arc::new(SqliteReminderRepository::new(pool)),
                tickets,
                ReminderPolicy::default(),
            ),
        }
    }

    async fn text(handler: &TicketsHandler, event: Event) -> String {
        handler
            .handle(&event)
            .await
            .unwrap()
            .as_text()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_default_config_validates() {
        let module = TicketsModule::new();
        assert!(module.validate_config(&module.default_config()).is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let module = TicketsModule::new();
        let config = serde_json::json!({
            "categories": [
                {"key": "support", "label": "Support"},
                {"key": "Support", "label": "Again"},
            ],
            "reminders": {"max_delay_days": 0},
        });
        let errors = module.validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_open_command_numbers_per_category() {
        let h = handler().await;
        let first = text(&h, Event::command("ticket.open", &["support"], 1).in_conversation(100)).await;
        let second = text(&h, Event::command("ticket.open", &["support"], 2).in_conversation(101)).await;
        let unnumbered = text(&h, Event::command("ticket.open", &["feedback"], 3).in_conversation(102)).await;

        assert_eq!(first, "Opened Support ticket #1");
        assert_eq!(second, "Opened Support ticket #2");
        assert_eq!(unnumbered, "Opened Feedback ticket ID:3");
    }

    #[tokio::test]
    async fn test_open_requires_conversation() {
        let h = handler().await;
        let err = h
            .handle(&Event::command("ticket.open", &["support"], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_reminder_controls_and_close() {
        let h = handler().await;
        text(&h, Event::command("ticket.open", &["support"], 1).in_conversation(100)).await;

        let set = text(&h, Event::command("remindme", &["2h", "dm"], 1).in_conversation(100)).await;
        assert!(set.starts_with("Reminder 1 set for"), "{set}");

        let snoozed = text(&h, Event::control("reminder:snooze:1:1d", 1)).await;
        assert!(snoozed.starts_with("Reminder 1 snoozed until"), "{snoozed}");

        // Only the creator may stop it.
        assert!(h.handle(&Event::control("reminder:stop:1", 2)).await.is_err());

        let closed = text(&h, Event::control("ticket:close", 1).in_conversation(100)).await;
        assert_eq!(closed, "Closed ticket #1 (1 reminder(s) cancelled)");
    }

    #[tokio::test]
    async fn test_thread_activity_reopens_closed_ticket() {
        let h = handler().await;
        text(&h, Event::command("ticket.open", &["report"], 5).in_conversation(300)).await;
        text(&h, Event::command("ticket.close", &["done"], 5).in_conversation(300)).await;

        let update = |archived, locked| {
            Event::ConversationUpdate(ConversationUpdate {
                conversation_id: 300,
                archived,
                locked,
            })
        };
        assert_eq!(h.handle(&update(true, true)).await.unwrap(), Reply::Silent);
        assert_eq!(text(&h, update(false, true)).await, "Ticket #1 reopened");

        text(&h, Event::command("ticket.close", &[], 5).in_conversation(300)).await;
        assert_eq!(text(&h, update(true, false)).await, "Ticket #1 reopened");
        assert_eq!(h.handle(&update(false, false)).await.unwrap(), Reply::Silent);
    }

    #[tokio::test]
    async fn test_list_reopen_and_add_commands() {
        let h = handler().await;
        assert_eq!(
            text(&h, Event::command("ticket.list", &[], 1)).await,
            "You don't have any open tickets"
        );

        text(&h, Event::command("ticket.open", &["support"], 1).in_conversation(100)).await;
        let listed = text(&h, Event::command("ticket.list", &[], 1)).await;
        assert!(listed.starts_with("Support ticket #1 in conversation 100 (opened "), "{listed}");

        let reopen_open = h
            .handle(&Event::command("ticket.reopen", &[], 2).in_conversation(100))
            .await
            .unwrap_err();
        assert!(matches!(reopen_open, DomainError::ValidationFailed(_)));

        text(&h, Event::command("ticket.close", &[], 1).in_conversation(100)).await;
        assert_eq!(
            text(&h, Event::command("ticket.reopen", &[], 2).in_conversation(100)).await,
            "Reopened ticket #1"
        );

        let added = text(&h, Event::command("ticket.add", &["report", "8"], 2).in_conversation(200)).await;
        assert_eq!(added, "Registered conversation 200 as Report ticket #1");
        let owner = text(&h, Event::command("ticket.list", &[], 8)).await;
        assert!(owner.starts_with("Report ticket #1 in conversation 200"), "{owner}");

        let again = h
            .handle(&Event::command("ticket.add", &["support"], 2).in_conversation(200))
            .await
            .unwrap_err();
        assert!(matches!(again, DomainError::TicketExists(200)));

        let bad_owner = h
            .handle(&Event::command("ticket.add", &["support", "someone"], 2).in_conversation(201))
            .await
            .unwrap_err();
        assert!(matches!(bad_owner, DomainError::ValidationFailed(_)));
    }
}
