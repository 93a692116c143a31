//! Reminder delivery port.
//!
//! The chat platform is not part of this crate; reminder notices leave the
//! host through this trait and the scheduler only learns success or failure.

use async_trait::async_trait;

use crate::domain::errors::DeliveryError;
use crate::domain::models::ReminderNotice;

#[async_trait]
pub trait ReminderDelivery: Send + Sync {
    /// Post the notice in its owning conversation.
    async fn deliver_in_conversation(&self, notice: &ReminderNotice) -> Result<(), DeliveryError>;

    /// Notify the recipient directly.
    async fn deliver_direct(&self, notice: &ReminderNotice) -> Result<(), DeliveryError>;
}
