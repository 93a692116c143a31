//! Tickets module integration tests
//!
//! Loads the real tickets module from a definition on disk and drives it
//! through the dispatcher and the operator console.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use common::{setup_test_logging, temp_dir, wait_until, write_config, write_definition, TestHost};
use oak::adapters::modules::ModuleCatalog;
use oak::adapters::sqlite::{create_pool, SqliteReminderRepository};
use oak::domain::errors::LifecycleError;
use oak::domain::models::{DeliveryTarget, NewReminder};
use oak::domain::ports::{ConversationUpdate, Event, ReminderRepository, MODULE_DATABASE_FILE};
use oak::services::OperatorConsole;

fn tickets_host() -> TestHost {
    setup_test_logging();
    let dir = temp_dir();
    write_definition(dir.path(), "tickets", "description: Support tickets\n");
    TestHost::new(dir, ModuleCatalog::builtin(), &["admin"])
}

#[tokio::test]
async fn test_discovery_loads_tickets_and_writes_default_config() {
    let host = tickets_host();
    let loaded = host.lifecycle.discover().await;
    assert_eq!(loaded, vec!["tickets".to_string()]);

    let config = std::fs::read_to_string(host.root().join("tickets").join("config.yml")).unwrap();
    assert!(config.contains("support"), "{config}");
    assert!(host.root().join("tickets").join(MODULE_DATABASE_FILE).exists());

    let replies = host
        .command(Event::command("ticket.open", &["support"], 1).in_conversation(100))
        .await;
    assert_eq!(replies, vec!["Opened Support ticket #1".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_numbering_and_data_survive_reload() {
    let host = tickets_host();
    host.lifecycle.discover().await;

    host.command(Event::command("ticket.open", &["support"], 1).in_conversation(100))
        .await;
    let reminder = host
        .command(Event::command("remindme", &["2h"], 1).in_conversation(100))
        .await;
    assert!(reminder[0].starts_with("Reminder 1 set for"), "{reminder:?}");

    host.lifecycle.reload("tickets", false).await.unwrap();

    let second = host
        .command(Event::command("ticket.open", &["support"], 2).in_conversation(101))
        .await;
    assert_eq!(second, vec!["Opened Support ticket #2".to_string()]);

    let closed = host
        .command(Event::command("ticket.close", &["fixed"], 1).in_conversation(100))
        .await;
    assert_eq!(closed, vec!["Closed ticket #1 (1 reminder(s) cancelled)".to_string()]);

    let stats = host.command(Event::command("ticket.stats", &[], 1)).await;
    assert_eq!(stats, vec!["support: 1 open, 1 closed".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_unloaded_module_stops_receiving_events() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    host.command(Event::command("ticket.open", &["report"], 4).in_conversation(400))
        .await;

    host.lifecycle.unload("tickets", false).await.unwrap();
    assert!(!host.lifecycle.is_loaded("tickets").await);
    assert!(host
        .command(Event::command("ticket.open", &["report"], 5).in_conversation(401))
        .await
        .is_empty());
    assert!(host
        .command(Event::control("ticket:close", 4).in_conversation(400))
        .await
        .is_empty());

    host.lifecycle.load("tickets").await.unwrap();
    let reopened = host
        .command(Event::command("ticket.open", &["report"], 5).in_conversation(401))
        .await;
    assert_eq!(reopened, vec!["Opened Report ticket #2".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_blocks_reload_until_fixed() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    host.command(Event::command("ticket.open", &["support"], 1).in_conversation(100))
        .await;

    write_config(host.root(), "tickets", "categories: []\n");
    let err = host.lifecycle.reload("tickets", false).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ReloadFailed { .. }), "{err}");
    assert!(err.to_string().contains("categories must not be empty"), "{err}");
    assert!(!host.lifecycle.is_loaded("tickets").await);

    write_config(
        host.root(),
        "tickets",
        "categories:\n  - key: support\n    label: Help desk\n",
    );
    host.lifecycle.load("tickets").await.unwrap();
    let replies = host
        .command(Event::command("ticket.open", &["support"], 2).in_conversation(101))
        .await;
    assert_eq!(replies, vec!["Opened Help desk ticket #2".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_unarchived_thread_reopens_ticket() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    host.command(Event::command("ticket.open", &["feedback"], 9).in_conversation(900))
        .await;
    host.command(Event::command("ticket.close", &[], 9).in_conversation(900))
        .await;

    let replies = host
        .command(Event::ConversationUpdate(ConversationUpdate {
            conversation_id: 900,
            archived: false,
            locked: false,
        }))
        .await;
    assert_eq!(replies, vec!["Ticket ID:9 reopened".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_locked_or_archived_thread_still_reopens() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    host.command(Event::command("ticket.open", &["support"], 1).in_conversation(100))
        .await;
    host.command(Event::command("ticket.close", &[], 1).in_conversation(100))
        .await;

    let update = |archived, locked| {
        Event::ConversationUpdate(ConversationUpdate {
            conversation_id: 100,
            archived,
            locked,
        })
    };
    assert_eq!(host.command(update(true, true)).await, vec![String::new()]);
    assert_eq!(
        host.command(update(false, true)).await,
        vec!["Ticket #1 reopened".to_string()]
    );

    host.command(Event::command("ticket.close", &[], 1).in_conversation(100))
        .await;
    assert_eq!(
        host.command(update(true, false)).await,
        vec!["Ticket #1 reopened".to_string()]
    );

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_list_reopen_and_register_tickets() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    host.command(Event::command("ticket.open", &["support"], 1).in_conversation(100))
        .await;

    let added = host
        .command(Event::command("ticket.add", &["support", "3"], 2).in_conversation(300))
        .await;
    assert_eq!(added, vec!["Registered conversation 300 as Support ticket #2".to_string()]);

    let listed = host.command(Event::command("ticket.list", &[], 3)).await;
    assert!(listed[0].starts_with("Support ticket #2 in conversation 300"), "{listed:?}");

    host.command(Event::command("ticket.close", &[], 1).in_conversation(100))
        .await;
    assert_eq!(
        host.command(Event::command("ticket.list", &[], 1)).await,
        vec!["You don't have any open tickets".to_string()]
    );

    // Numbering and ticket state survive a reload.
    host.lifecycle.reload("tickets", false).await.unwrap();
    let reopened = host
        .command(Event::command("ticket.reopen", &[], 2).in_conversation(100))
        .await;
    assert_eq!(reopened, vec!["Reopened ticket #1".to_string()]);
    let next = host
        .command(Event::command("ticket.open", &["support"], 4).in_conversation(400))
        .await;
    assert_eq!(next, vec!["Opened Support ticket #3".to_string()]);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_unload_stops_reminder_delivery() {
    let host = tickets_host();
    host.lifecycle.discover().await;

    let url = format!("sqlite:{}", host.root().join("tickets").join(MODULE_DATABASE_FILE).display());
    let reminders = SqliteReminderRepository::new(create_pool(&url, None).await.unwrap());
    let due_reminder = |conversation_id| NewReminder {
        conversation_id,
        creator_id: 1,
        next_fire_at: Utc::now() - ChronoDuration::seconds(1),
        recurrence_secs: None,
        target: DeliveryTarget::Conversation,
    };

    let first = reminders.create(&due_reminder(100)).await.unwrap();
    let delivery = host.delivery.clone();
    assert!(wait_until(move || delivery.delivered().len() == 1, Duration::from_secs(5)).await);
    assert_eq!(host.delivery.delivered()[0].reminder_id, first.id);

    host.lifecycle.unload("tickets", false).await.unwrap();
    let second = reminders.create(&due_reminder(200)).await.unwrap();

    // Two and a half poll intervals with nothing listening.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(host.delivery.delivered().len(), 1);
    let pending = reminders.get(second.id).await.unwrap().unwrap();
    assert!(pending.active);
    assert!(pending.is_due(Utc::now()));

    host.lifecycle.load("tickets").await.unwrap();
    let delivery = host.delivery.clone();
    assert!(wait_until(move || delivery.delivered().len() == 2, Duration::from_secs(5)).await);
    assert_eq!(host.delivery.delivered()[1].reminder_id, second.id);

    host.lifecycle.shutdown().await;
}

#[tokio::test]
async fn test_operator_console_script() {
    let host = tickets_host();
    host.lifecycle.discover().await;
    let console = OperatorConsole::new(host.lifecycle.clone());

    let script = b"\
list
emit @100 ticket.open support
emit ticket.open support
unload tickets
emit @101 ticket.open support
load tickets
emit @101 ticket.open support
load missing
quit
emit @102 ticket.open support
";
    let mut output: Vec<u8> = Vec::new();
    console.run(&script[..], &mut output).await.unwrap();

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("tickets 1.0.0 (attached, since "), "{text}");
    assert_eq!(lines[1], "[tickets] Opened Support ticket #1");
    assert_eq!(
        lines[2],
        "[tickets] error: Validation failed: this must be used inside a ticket conversation"
    );
    assert_eq!(lines[3], "unloaded: tickets");
    assert_eq!(lines[4], "no handler for command 'ticket.open'");
    assert_eq!(lines[5], "loaded: tickets");
    assert_eq!(lines[6], "[tickets] Opened Support ticket #2");
    assert_eq!(lines[7], "not_found: missing");
    assert_eq!(lines.len(), 8, "{text}");

    host.lifecycle.shutdown().await;
}
