//! Log-only delivery, used when no outbound channel is configured.

use async_trait::async_trait;

use crate::domain::errors::DeliveryError;
use crate::domain::models::ReminderNotice;
use crate::domain::ports::ReminderDelivery;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl ReminderDelivery for LogDelivery {
    async fn deliver_in_conversation(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        tracing::info!(
            reminder_id = notice.reminder_id,
            conversation_id = notice.conversation_id,
            recipient_id = notice.recipient_id,
            kind = ?notice.kind,
            "reminder posted in conversation"
        );
        Ok(())
    }

    async fn deliver_direct(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        tracing::info!(
            reminder_id = notice.reminder_id,
            recipient_id = notice.recipient_id,
            "reminder sent directly"
        );
        Ok(())
    }
}
