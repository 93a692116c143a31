//! Reminder commands: set, stop and snooze.
//!
//! These only touch the store; the scheduler picks the new state up on its
//! next pass.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ConversationId, DeliveryTarget, NewReminder, ReminderRecord, UserId};
use crate::domain::ports::{ReminderRepository, TicketRepository};

/// Recurrence and limits applied to new reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    /// Interval between repeats; `None` makes every reminder one-shot.
    pub recurrence: Option<Duration>,
    /// Longest accepted delay or snooze.
    pub max_delay: Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            recurrence: Some(Duration::hours(24)),
            max_delay: Duration::days(30),
        }
    }
}

impl ReminderPolicy {
    pub fn from_settings(recurrence_hours: u32, max_delay_days: u32) -> Self {
        Self {
            recurrence: (recurrence_hours > 0).then(|| Duration::hours(i64::from(recurrence_hours))),
            max_delay: Duration::days(i64::from(max_delay_days)),
        }
    }
}

/// Parse `30m`, `2h`, `1d` or a bare number of minutes.
pub fn parse_duration(input: &str, max: Duration) -> DomainResult<Duration> {
    let text = input.trim().to_lowercase();
    let invalid = || DomainError::InvalidDuration(format!("'{}' (use e.g. 30m, 2h, 1d)", input.trim()));

    let (digits, unit_secs) = match text.char_indices().last() {
        Some((i, 'm')) => (&text[..i], 60),
        Some((i, 'h')) => (&text[..i], 3_600),
        Some((i, 'd')) => (&text[..i], 86_400),
        Some(_) => (text.as_str(), 60),
        None => return Err(invalid()),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: i64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(DomainError::InvalidDuration("duration must be positive".to_string()));
    }

    let secs = value.checked_mul(unit_secs).ok_or_else(invalid)?;
    if secs > max.num_seconds() {
        return Err(DomainError::InvalidDuration(format!(
            "'{}' exceeds the maximum of {} days",
            input.trim(),
            max.num_days()
        )));
    }
    Ok(Duration::seconds(secs))
}

pub struct ReminderService {
    reminders: Arc<dyn ReminderRepository>,
    tickets: Arc<dyn TicketRepository>,
    policy: ReminderPolicy,
}

impl ReminderService {
    pub fn new(
        reminders: Arc<dyn ReminderRepository>,
        tickets: Arc<dyn TicketRepository>,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            reminders,
            tickets,
            policy,
        }
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.policy
    }

    /// Set a reminder on the open ticket of `conversation_id`.
    ///
    /// The first occurrence fires after `delay`, or after one recurrence
    /// interval when no delay is given.
    pub async fn set_reminder(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        delay: Option<&str>,
        direct: bool,
    ) -> DomainResult<ReminderRecord> {
        let ticket = self
            .tickets
            .get_by_conversation(conversation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "ticket",
                id: conversation_id.to_string(),
            })?;
        if !ticket.is_open() {
            return Err(DomainError::TicketNotOpen(conversation_id));
        }

        if self.reminders.find_active(conversation_id, user_id).await?.is_some() {
            return Err(DomainError::ReminderAlreadyActive {
                conversation_id,
                user_id,
            });
        }

        let first_delay = match delay {
            Some(text) => parse_duration(text, self.policy.max_delay)?,
            None => self.policy.recurrence.ok_or_else(|| {
                DomainError::ValidationFailed("a delay is required when reminders do not repeat".to_string())
            })?,
        };

        let record = self
            .reminders
            .create(&NewReminder {
                conversation_id,
                creator_id: user_id,
                next_fire_at: Utc::now() + first_delay,
                recurrence_secs: self.policy.recurrence.map(|d| d.num_seconds()),
                target: if direct {
                    DeliveryTarget::ConversationAndDirect
                } else {
                    DeliveryTarget::Conversation
                },
            })
            .await?;

        tracing::info!(
            reminder_id = record.id,
            conversation_id,
            user_id,
            next_fire_at = %record.next_fire_at,
            "reminder set"
        );
        Ok(record)
    }

    /// Stop `user_id`'s active reminder in a conversation.
    pub async fn stop(&self, conversation_id: ConversationId, user_id: UserId) -> DomainResult<ReminderRecord> {
        let record = self
            .reminders
            .find_active(conversation_id, user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "reminder",
                id: format!("{conversation_id}/{user_id}"),
            })?;
        self.stop_by_id(record.id, user_id).await
    }

    /// Stop a reminder by id. Only its creator may stop it.
    pub async fn stop_by_id(&self, id: i64, actor_id: UserId) -> DomainResult<ReminderRecord> {
        let record = self.owned_active(id, actor_id).await?;
        if !self.reminders.cancel(id).await? {
            return Err(inactive(id));
        }
        tracing::info!(reminder_id = id, user_id = actor_id, "reminder stopped");
        Ok(ReminderRecord { active: false, ..record })
    }

    /// Push the next occurrence of a reminder to `now + duration`.
    pub async fn snooze(&self, id: i64, actor_id: UserId, duration: &str) -> DomainResult<ReminderRecord> {
        let delay = parse_duration(duration, self.policy.max_delay)?;
        let record = self.owned_active(id, actor_id).await?;
        let until = Utc::now() + delay;
        if !self.reminders.snooze(id, until).await? {
            return Err(inactive(id));
        }
        tracing::info!(reminder_id = id, until = %until, "reminder snoozed");
        Ok(self
            .reminders
            .get(id)
            .await?
            .unwrap_or(ReminderRecord { next_fire_at: until, ..record }))
    }

    async fn owned_active(&self, id: i64, actor_id: UserId) -> DomainResult<ReminderRecord> {
        let record = self
            .reminders
            .get(id)
            .await?
            .filter(|r| r.active)
            .ok_or_else(|| inactive(id))?;
        if record.creator_id != actor_id {
            return Err(DomainError::ValidationFailed(
                "only the reminder's creator can change it".to_string(),
            ));
        }
        Ok(record)
    }
}

fn inactive(id: i64) -> DomainError {
    DomainError::NotFound {
        entity: "active reminder",
        id: id.to_string(),
    }
}
