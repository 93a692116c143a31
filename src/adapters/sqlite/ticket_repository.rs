//! SQLite adapter for TicketRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CategoryStats, ConversationId, NewTicket, Ticket, TicketStatus, UserId};
use crate::domain::ports::{TicketClosure, TicketRepository};

#[derive(Clone)]
pub struct SqliteTicketRepository {
    pool: SqlitePool,
}

impl SqliteTicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require(&self, conversation_id: ConversationId) -> DomainResult<Ticket> {
        self.get_by_conversation(conversation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "ticket",
                id: conversation_id.to_string(),
            })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    conversation_id: i64,
    user_id: i64,
    category: String,
    ticket_number: Option<i64>,
    status: String,
    closed_by: Option<i64>,
    close_reason: Option<String>,
    created_at: String,
    closed_at: Option<String>,
}

fn row_to_ticket(row: TicketRow) -> DomainResult<Ticket> {
    let status = TicketStatus::from_str(&row.status)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown ticket status: {}", row.status)))?;

    Ok(Ticket {
        id: row.id,
        conversation_id: row.conversation_id,
        user_id: row.user_id,
        category: row.category,
        number: row.ticket_number,
        status,
        closed_by: row.closed_by,
        close_reason: row.close_reason,
        created_at: parse_datetime(&row.created_at)?,
        closed_at: parse_optional_datetime(row.closed_at)?,
    })
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn create(&self, ticket: &NewTicket) -> DomainResult<Ticket> {
        sqlx::query(
            "INSERT INTO tickets (conversation_id, user_id, category, ticket_number, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5)",
        )
        .bind(ticket.conversation_id)
        .bind(ticket.user_id)
        .bind(&ticket.category)
        .bind(ticket.number)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.require(ticket.conversation_id).await
    }

    async fn get_by_conversation(&self, conversation_id: ConversationId) -> DomainResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as("SELECT * FROM tickets WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_ticket).transpose()
    }

    async fn find_open(&self, user_id: UserId, category: &str) -> DomainResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT * FROM tickets WHERE user_id = ?1 AND category = ?2 AND status = 'open'
             ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_ticket).transpose()
    }

    async fn list_open(&self, user_id: UserId) -> DomainResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT * FROM tickets WHERE user_id = ?1 AND status = 'open' ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_ticket).collect()
    }

    async fn close(
        &self,
        conversation_id: ConversationId,
        closed_by: UserId,
        reason: Option<&str>,
    ) -> DomainResult<TicketClosure> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            "UPDATE tickets SET status = 'closed', closed_by = ?1, close_reason = ?2, closed_at = ?3
             WHERE conversation_id = ?4 AND status = 'open'",
        )
        .bind(closed_by)
        .bind(reason)
        .bind(format_datetime(Utc::now()))
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::TicketNotOpen(conversation_id));
        }

        let cancelled = sqlx::query(
            "UPDATE ticket_reminders SET active = 0 WHERE conversation_id = ?1 AND active = 1",
        )
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TicketClosure {
            ticket: self.require(conversation_id).await?,
            cancelled_reminders: cancelled.rows_affected(),
        })
    }

    async fn reopen(&self, conversation_id: ConversationId) -> DomainResult<Option<Ticket>> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'open', closed_by = NULL, close_reason = NULL, closed_at = NULL
             WHERE conversation_id = ?1 AND status = 'closed'",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_conversation(conversation_id).await
    }

    async fn stats(&self) -> DomainResult<Vec<CategoryStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT category,
                    SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'closed' THEN 1 ELSE 0 END)
             FROM tickets GROUP BY category ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(category, open, closed)| CategoryStats { category, open, closed })
            .collect())
    }
}
