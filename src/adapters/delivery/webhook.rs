//! HTTP webhook delivery.
//!
//! Each notice is POSTed as JSON to the configured URL. The receiving side
//! (the chat gateway) answers `404`/`410` when the conversation no longer
//! exists; any other non-2xx status is a rejected delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::domain::errors::DeliveryError;
use crate::domain::models::{ReminderKind, ReminderNotice};
use crate::domain::ports::ReminderDelivery;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Channel {
    Conversation,
    Direct,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: Channel,
    reminder_id: i64,
    conversation_id: i64,
    recipient_id: i64,
    kind: ReminderKind,
    due_at: &'a chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    http: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { http, url: url.into() })
    }

    async fn post(&self, notice: &ReminderNotice, channel: Channel) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            channel,
            reminder_id: notice.reminder_id,
            conversation_id: notice.conversation_id,
            recipient_id: notice.recipient_id,
            kind: notice.kind,
            due_at: &notice.due_at,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    DeliveryError::Unreachable(e.to_string())
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if channel == Channel::Conversation && matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(DeliveryError::ConversationGone(notice.conversation_id));
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ReminderDelivery for WebhookDelivery {
    async fn deliver_in_conversation(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        self.post(notice, Channel::Conversation).await
    }

    async fn deliver_direct(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        self.post(notice, Channel::Direct).await
    }
}
