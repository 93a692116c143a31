//! Reminder delivery channels.

pub mod logged;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

pub use logged::LogDelivery;
pub use webhook::WebhookDelivery;

use crate::domain::errors::DeliveryError;
use crate::domain::models::DeliveryConfig;
use crate::domain::ports::ReminderDelivery;

/// Build the channel the configuration asks for: the webhook when a URL is
/// set, log-only delivery otherwise.
pub fn from_config(config: &DeliveryConfig) -> Result<Arc<dyn ReminderDelivery>, DeliveryError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookDelivery::new(
            url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogDelivery)),
    }
}
