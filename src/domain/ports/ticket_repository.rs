//! Repository port for support tickets.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CategoryStats, ConversationId, NewTicket, Ticket, UserId};

/// Outcome of closing a ticket.
#[derive(Debug, Clone)]
pub struct TicketClosure {
    pub ticket: Ticket,
    /// Reminders cancelled together with the ticket.
    pub cancelled_reminders: u64,
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, ticket: &NewTicket) -> DomainResult<Ticket>;

    async fn get_by_conversation(&self, conversation_id: ConversationId) -> DomainResult<Option<Ticket>>;

    async fn find_open(&self, user_id: UserId, category: &str) -> DomainResult<Option<Ticket>>;

    /// Open tickets of one user, newest first.
    async fn list_open(&self, user_id: UserId) -> DomainResult<Vec<Ticket>>;

    /// Close the open ticket of a conversation and cancel its reminders in
    /// the same transaction.
    async fn close(
        &self,
        conversation_id: ConversationId,
        closed_by: UserId,
        reason: Option<&str>,
    ) -> DomainResult<TicketClosure>;

    /// Reopen a closed ticket. Returns `None` if it was not closed.
    async fn reopen(&self, conversation_id: ConversationId) -> DomainResult<Option<Ticket>>;

    async fn stats(&self) -> DomainResult<Vec<CategoryStats>>;
}
