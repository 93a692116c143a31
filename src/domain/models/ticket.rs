//! Support ticket model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A ticket is bound to the conversation (thread) opened for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub category: String,
    /// Per-category sequence number; `None` for unnumbered categories.
    pub number: Option<i64>,
    pub status: TicketStatus,
    pub closed_by: Option<UserId>,
    pub close_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// `#12` for numbered tickets, `ID:<user>` otherwise.
    pub fn display_id(&self) -> String {
        match self.number {
            Some(number) => format!("#{number}"),
            None => format!("ID:{}", self.user_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub category: String,
    pub number: Option<i64>,
}

/// Open/closed counts for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub open: i64,
    pub closed: i64,
}

/// A ticket category as configured for the tickets module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCategory {
    pub key: String,
    pub label: String,
    /// Numbered categories draw a per-category sequence number.
    #[serde(default = "default_numbered")]
    pub numbered: bool,
}

const fn default_numbered() -> bool {
    true
}
