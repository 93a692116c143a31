//! SQLite adapter for ReminderRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConversationId, DeliveryTarget, NewReminder, ReminderRecord, UserId,
};
use crate::domain::ports::ReminderRepository;

#[derive(Clone)]
pub struct SqliteReminderRepository {
    pool: SqlitePool,
}

impl SqliteReminderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: i64,
    conversation_id: i64,
    creator_id: i64,
    next_fire_at: String,
    recurrence_secs: Option<i64>,
    target: String,
    active: bool,
    fire_count: i64,
    created_at: String,
}

fn row_to_reminder(row: ReminderRow) -> DomainResult<ReminderRecord> {
    let target = DeliveryTarget::from_str(&row.target)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown delivery target: {}", row.target)))?;

    Ok(ReminderRecord {
        id: row.id,
        conversation_id: row.conversation_id,
        creator_id: row.creator_id,
        next_fire_at: parse_datetime(&row.next_fire_at)?,
        recurrence_secs: row.recurrence_secs,
        target,
        active: row.active,
        fire_count: u32::try_from(row.fire_count).unwrap_or(u32::MAX),
        created_at: parse_datetime(&row.created_at)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ReminderRepository for SqliteReminderRepository {
    async fn create(&self, reminder: &NewReminder) -> DomainResult<ReminderRecord> {
        let result = sqlx::query(
            "INSERT INTO ticket_reminders
             (conversation_id, creator_id, next_fire_at, recurrence_secs, target, active, fire_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6)",
        )
        .bind(reminder.conversation_id)
        .bind(reminder.creator_id)
        .bind(format_datetime(reminder.next_fire_at))
        .bind(reminder.recurrence_secs)
        .bind(reminder.target.as_str())
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => {
                return Err(DomainError::ReminderAlreadyActive {
                    conversation_id: reminder.conversation_id,
                    user_id: reminder.creator_id,
                })
            }
            Err(err) => return Err(err.into()),
        };

        self.get(id).await?.ok_or_else(|| DomainError::NotFound {
            entity: "reminder",
            id: id.to_string(),
        })
    }

    async fn get(&self, id: i64) -> DomainResult<Option<ReminderRecord>> {
        let row: Option<ReminderRow> = sqlx::query_as("SELECT * FROM ticket_reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_reminder).transpose()
    }

    async fn find_active(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> DomainResult<Option<ReminderRecord>> {
        let row: Option<ReminderRow> = sqlx::query_as(
            "SELECT * FROM ticket_reminders
             WHERE conversation_id = ?1 AND creator_id = ?2 AND active = 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_reminder).transpose()
    }

    async fn due(&self, now: DateTime<Utc>) -> DomainResult<Vec<ReminderRecord>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT * FROM ticket_reminders
             WHERE active = 1 AND next_fire_at <= ?1
             ORDER BY next_fire_at ASC, id ASC",
        )
        .bind(format_datetime(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_reminder).collect()
    }

    async fn complete_occurrence(
        &self,
        record: &ReminderRecord,
        next: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let delivered_at = format_datetime(record.next_fire_at);
        let result = match next {
            Some(next) => {
                sqlx::query(
                    "UPDATE ticket_reminders
                     SET next_fire_at = ?1, fire_count = fire_count + 1
                     WHERE id = ?2 AND active = 1 AND next_fire_at = ?3",
                )
                .bind(format_datetime(next))
                .bind(record.id)
                .bind(&delivered_at)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "DELETE FROM ticket_reminders
                     WHERE id = ?1 AND active = 1 AND next_fire_at = ?2",
                )
                .bind(record.id)
                .bind(&delivered_at)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn snooze(&self, id: i64, until: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE ticket_reminders SET next_fire_at = ?1 WHERE id = ?2 AND active = 1")
            .bind(format_datetime(until))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: i64) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE ticket_reminders SET active = 0 WHERE id = ?1 AND active = 1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_for_conversation(&self, conversation_id: ConversationId) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE ticket_reminders SET active = 0 WHERE conversation_id = ?1 AND active = 1",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_active(&self) -> DomainResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticket_reminders WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteReminderRepository {
        SqliteReminderRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn new_reminder(conversation_id: i64, at: DateTime<Utc>, recurrence_secs: Option<i64>) -> NewReminder {
        NewReminder {
            conversation_id,
            creator_id: 7,
            next_fire_at: at,
            recurrence_secs,
            target: DeliveryTarget::Conversation,
        }
    }

    #[tokio::test]
    async fn test_one_active_reminder_per_user_and_conversation() {
        let repo = setup().await;
        let at = Utc::now();
        let first = repo.create(&new_reminder(1, at, None)).await.unwrap();

        let err = repo.create(&new_reminder(1, at, None)).await.unwrap_err();
        assert!(matches!(err, DomainError::ReminderAlreadyActive { conversation_id: 1, user_id: 7 }));

        assert!(repo.cancel(first.id).await.unwrap());
        assert!(!repo.cancel(first.id).await.unwrap());
        repo.create(&new_reminder(1, at, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_due_skips_future_and_inactive_records() {
        let repo = setup().await;
        let now = Utc::now();
        let due = repo.create(&new_reminder(1, now - Duration::minutes(1), None)).await.unwrap();
        repo.create(&new_reminder(2, now + Duration::minutes(5), None)).await.unwrap();
        let cancelled = repo.create(&new_reminder(3, now - Duration::minutes(2), None)).await.unwrap();
        repo.cancel(cancelled.id).await.unwrap();

        let found = repo.due(now).await.unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![due.id]);
    }

    #[tokio::test]
    async fn test_complete_occurrence_rearms_or_deletes() {
        let repo = setup().await;
        let at = Utc::now() - Duration::minutes(1);
        let recurring = repo.create(&new_reminder(1, at, Some(3600))).await.unwrap();
        let one_shot = repo.create(&new_reminder(2, at, None)).await.unwrap();

        let next = recurring.next_occurrence(Utc::now());
        assert!(repo.complete_occurrence(&recurring, next).await.unwrap());
        let rearmed = repo.get(recurring.id).await.unwrap().unwrap();
        assert_eq!(Some(rearmed.next_fire_at), next);
        assert_eq!(rearmed.fire_count, 1);
        assert!(rearmed.active);

        assert!(repo.complete_occurrence(&one_shot, None).await.unwrap());
        assert!(repo.get(one_shot.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_occurrence_loses_to_concurrent_snooze() {
        let repo = setup().await;
        let record = repo.create(&new_reminder(1, Utc::now(), None)).await.unwrap();
        let later = Utc::now() + Duration::hours(2);
        assert!(repo.snooze(record.id, later).await.unwrap());

        assert!(!repo.complete_occurrence(&record, None).await.unwrap());
        assert!(repo.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_for_conversation() {
        let repo = setup().await;
        let at = Utc::now();
        repo.create(&new_reminder(1, at, None)).await.unwrap();
        repo.create(&NewReminder { creator_id: 8, ..new_reminder(1, at, Some(60)) }).await.unwrap();
        repo.create(&new_reminder(2, at, None)).await.unwrap();

        assert_eq!(repo.cancel_for_conversation(1).await.unwrap(), 2);
        assert_eq!(repo.count_active().await.unwrap(), 1);
        assert!(repo.find_active(1, 7).await.unwrap().is_none());
    }
}
