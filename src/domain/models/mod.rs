//! Domain models for the Oak module host.

pub mod config;
pub mod module;
pub mod reminder;
pub mod ticket;

/// Identifier of a conversation (a ticket thread) on the chat platform.
pub type ConversationId = i64;

/// Identifier of a chat platform user.
pub type UserId = i64;

pub use config::{
    AllocationConfig, Config, DatabaseConfig, DeliveryConfig, LogFormat, LoggingConfig,
    RotationPolicy, SchedulerConfig,
};
pub use module::{
    ModuleDescriptor, ModuleManifest, ModuleState, ModuleStatus, CONFIG_FILE, DEFINITION_FILE,
};
pub use reminder::{DeliveryTarget, NewReminder, ReminderKind, ReminderNotice, ReminderRecord};
pub use ticket::{CategoryStats, NewTicket, Ticket, TicketCategory, TicketStatus};
