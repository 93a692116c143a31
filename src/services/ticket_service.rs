//! Ticket lifecycle: open, register, close and reopen.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CategoryStats, ConversationId, NewTicket, Ticket, TicketCategory, UserId};
use crate::domain::ports::{ConversationUpdate, TicketClosure, TicketRepository};
use crate::services::ticket_numbering::TicketNumbering;

pub struct TicketService {
    tickets: Arc<dyn TicketRepository>,
    numbering: TicketNumbering,
    categories: Vec<TicketCategory>,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        numbering: TicketNumbering,
        categories: Vec<TicketCategory>,
    ) -> Self {
        Self {
            tickets,
            numbering,
            categories,
        }
    }

    pub fn category(&self, key: &str) -> Option<&TicketCategory> {
        self.categories.iter().find(|c| c.key.eq_ignore_ascii_case(key))
    }

    pub fn categories(&self) -> &[TicketCategory] {
        &self.categories
    }

    /// Open a ticket bound to `conversation_id`.
    ///
    /// A user holds at most one open ticket per category. Numbered
    /// categories draw their number before the ticket is written; a number
    /// whose ticket is never written stays consumed.
    pub async fn open(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        category: &str,
    ) -> DomainResult<Ticket> {
        let category = self
            .category(category)
            .ok_or_else(|| DomainError::ValidationFailed(format!("unknown ticket category '{category}'")))?;

        if let Some(existing) = self.tickets.find_open(user_id, &category.key).await? {
            return Err(DomainError::TicketAlreadyOpen {
                user_id,
                category: category.key.clone(),
                conversation_id: existing.conversation_id,
            });
        }

        let number = if category.numbered {
            Some(self.numbering.allocate(&category.key).await?)
        } else {
            None
        };

        let ticket = self
            .tickets
            .create(&NewTicket {
                conversation_id,
                user_id,
                category: category.key.clone(),
                number,
            })
            .await?;

        tracing::info!(
            conversation_id,
            user_id,
            category = %ticket.category,
            ticket = %ticket.display_id(),
            "ticket opened"
        );
        Ok(ticket)
    }

    /// Register an existing conversation as a ticket owned by `owner_id`.
    ///
    /// Unlike `open` this skips the one-open-ticket rule; the conversation
    /// already exists and only needs a record (and a number).
    pub async fn add(
        &self,
        conversation_id: ConversationId,
        owner_id: UserId,
        category: &str,
    ) -> DomainResult<Ticket> {
        let category = self
            .category(category)
            .ok_or_else(|| DomainError::ValidationFailed(format!("unknown ticket category '{category}'")))?;

        if self.tickets.get_by_conversation(conversation_id).await?.is_some() {
            return Err(DomainError::TicketExists(conversation_id));
        }

        let number = if category.numbered {
            Some(self.numbering.allocate(&category.key).await?)
        } else {
            None
        };

        let ticket = self
            .tickets
            .create(&NewTicket {
                conversation_id,
                user_id: owner_id,
                category: category.key.clone(),
                number,
            })
            .await?;

        tracing::info!(
            conversation_id,
            owner_id,
            category = %ticket.category,
            ticket = %ticket.display_id(),
            "existing conversation registered as ticket"
        );
        Ok(ticket)
    }

    pub async fn list_open(&self, user_id: UserId) -> DomainResult<Vec<Ticket>> {
        self.tickets.list_open(user_id).await
    }

    /// Explicitly reopen the closed ticket of a conversation.
    pub async fn reopen(&self, conversation_id: ConversationId, reopened_by: UserId) -> DomainResult<Ticket> {
        let existing = self
            .tickets
            .get_by_conversation(conversation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "ticket",
                id: conversation_id.to_string(),
            })?;
        if existing.is_open() {
            return Err(DomainError::ValidationFailed("this ticket is already open".to_string()));
        }

        let ticket = self
            .tickets
            .reopen(conversation_id)
            .await?
            .ok_or_else(|| DomainError::ValidationFailed("this ticket is already open".to_string()))?;
        tracing::info!(conversation_id, reopened_by, "ticket reopened");
        Ok(ticket)
    }

    /// Close a ticket; its reminders are cancelled in the same transaction.
    pub async fn close(
        &self,
        conversation_id: ConversationId,
        closed_by: UserId,
        reason: Option<&str>,
    ) -> DomainResult<TicketClosure> {
        let closure = self.tickets.close(conversation_id, closed_by, reason).await?;
        tracing::info!(
            conversation_id,
            closed_by,
            cancelled_reminders = closure.cancelled_reminders,
            "ticket closed"
        );
        Ok(closure)
    }

    /// A closed ticket is reopened as soon as its thread is no longer both
    /// archived and locked.
    pub async fn on_conversation_update(&self, update: &ConversationUpdate) -> DomainResult<Option<Ticket>> {
        if update.archived && update.locked {
            return Ok(None);
        }
        let reopened = self.tickets.reopen(update.conversation_id).await?;
        if let Some(ticket) = &reopened {
            tracing::info!(conversation_id = ticket.conversation_id, "ticket reopened after thread unarchive");
        }
        Ok(reopened)
    }

    pub async fn stats(&self) -> DomainResult<Vec<CategoryStats>> {
        self.tickets.stats().await
    }
}
