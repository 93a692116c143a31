//! Repository port for reminder persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConversationId, NewReminder, ReminderRecord, UserId};

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Create a reminder. At most one active reminder per (conversation, creator).
    async fn create(&self, reminder: &NewReminder) -> DomainResult<ReminderRecord>;

    async fn get(&self, id: i64) -> DomainResult<Option<ReminderRecord>>;

    /// Active reminder set by `user_id` in `conversation_id`, if any.
    async fn find_active(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> DomainResult<Option<ReminderRecord>>;

    /// Active records with `next_fire_at <= now`, oldest first.
    async fn due(&self, now: DateTime<Utc>) -> DomainResult<Vec<ReminderRecord>>;

    /// Record a successful delivery of `record`'s current occurrence.
    ///
    /// With `next` the record is re-armed at that time, otherwise it is
    /// deleted. Applies only if the record is still active and still due at
    /// the `next_fire_at` that was delivered; returns `false` when a
    /// concurrent stop or snooze got there first.
    async fn complete_occurrence(
        &self,
        record: &ReminderRecord,
        next: Option<DateTime<Utc>>,
    ) -> DomainResult<bool>;

    /// Push an active reminder's next fire time to `until`.
    async fn snooze(&self, id: i64, until: DateTime<Utc>) -> DomainResult<bool>;

    /// Mark a reminder inactive. Returns `false` if it was not active.
    async fn cancel(&self, id: i64) -> DomainResult<bool>;

    /// Cancel every active reminder of a conversation; returns how many.
    async fn cancel_for_conversation(&self, conversation_id: ConversationId) -> DomainResult<u64>;

    async fn count_active(&self) -> DomainResult<i64>;
}
