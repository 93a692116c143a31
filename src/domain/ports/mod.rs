//! Port trait definitions (Hexagonal Architecture)
//!
//! Traits at the seams between the host and its collaborators:
//! - Module: the contract every loadable module implements
//! - EventDispatcher / EventHandler: routing of external events
//! - SequenceRepository, ReminderRepository, TicketRepository: module-owned stores
//! - ReminderDelivery: outbound reminder notices

pub mod delivery;
pub mod dispatcher;
pub mod module;
pub mod operator;
pub mod reminder_repository;
pub mod sequence_repository;
pub mod ticket_repository;

pub use delivery::ReminderDelivery;
pub use dispatcher::{
    CommandInvocation, ControlInteraction, ConversationUpdate, Dispatched, Event, EventDispatcher,
    EventHandler, Registration, Reply, Route,
};
pub use module::{HostServices, Module, ModuleContext, MODULE_DATABASE_FILE};
pub use operator::{OperatorCommand, OperatorHandle, OperatorRequest};
pub use reminder_repository::ReminderRepository;
pub use sequence_repository::SequenceRepository;
pub use ticket_repository::{TicketClosure, TicketRepository};
