//! Reminder domain model.
//!
//! A reminder belongs to one conversation (a ticket thread) and one creator.
//! It fires at `next_fire_at`; recurring reminders are re-armed on their
//! original cadence, one-shot reminders are deleted after delivery.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};

/// Where a reminder is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// Posted in the owning conversation only.
    Conversation,
    /// Posted in the conversation and sent to the creator directly.
    ConversationAndDirect,
}

impl DeliveryTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::ConversationAndDirect => "conversation_and_direct",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversation" => Some(Self::Conversation),
            "conversation_and_direct" | "direct" => Some(Self::ConversationAndDirect),
            _ => None,
        }
    }

    pub fn includes_direct(&self) -> bool {
        matches!(self, Self::ConversationAndDirect)
    }
}

/// Whether a delivery is the first occurrence or a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Initial,
    Recurring,
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub creator_id: UserId,
    pub next_fire_at: DateTime<Utc>,
    /// Recurrence interval in seconds; `None` for one-shot reminders.
    pub recurrence_secs: Option<i64>,
    pub target: DeliveryTarget,
    pub active: bool,
    pub fire_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ReminderRecord {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_fire_at <= now
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_secs.is_some_and(|secs| secs > 0)
    }

    pub fn kind(&self) -> ReminderKind {
        if self.fire_count == 0 {
            ReminderKind::Initial
        } else {
            ReminderKind::Recurring
        }
    }

    /// Fire time after a successful delivery at `now`, or `None` if the
    /// record retires.
    ///
    /// Advances by whole intervals to the first slot after `now`, so
    /// occurrences missed while the host was down collapse into the one
    /// just delivered.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = self.recurrence_secs.filter(|secs| *secs > 0)?;
        let behind = (now - self.next_fire_at).num_seconds().max(0);
        let steps = behind / secs + 1;
        Some(self.next_fire_at + Duration::seconds(secs * steps))
    }
}

/// Input for creating a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub conversation_id: ConversationId,
    pub creator_id: UserId,
    pub next_fire_at: DateTime<Utc>,
    pub recurrence_secs: Option<i64>,
    pub target: DeliveryTarget,
}

/// What the delivery channel receives for one due occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderNotice {
    pub reminder_id: i64,
    pub conversation_id: ConversationId,
    pub recipient_id: UserId,
    pub kind: ReminderKind,
    pub due_at: DateTime<Utc>,
}

impl From<&ReminderRecord> for ReminderNotice {
    fn from(record: &ReminderRecord) -> Self {
        Self {
            reminder_id: record.id,
            conversation_id: record.conversation_id,
            recipient_id: record.creator_id,
            kind: record.kind(),
            due_at: record.next_fire_at,
        }
    }
}
