//! Service layer: lifecycle management, dispatch and the tickets domain logic.

pub mod event_dispatcher;
pub mod lifecycle_manager;
pub mod module_loader;
pub mod module_registry;
pub mod operator_console;
pub mod reminder_scheduler;
pub mod reminder_service;
pub mod ticket_numbering;
pub mod ticket_service;

pub use event_dispatcher::LocalDispatcher;
pub use lifecycle_manager::{LifecycleManager, ReloadReport, UnloadOutcome};
pub use module_loader::{read_descriptor, resolve_config, scan_modules, ScanResult};
pub use module_registry::{LoadedModule, ModuleInstance, ModuleRegistry};
pub use operator_console::{parse_command, ConsoleCommand, OperatorConsole, OPERATOR_ACTOR};
pub use reminder_scheduler::{PassReport, ReminderScheduler, SchedulerHandle, SchedulerStatus};
pub use reminder_service::{parse_duration, ReminderPolicy, ReminderService};
pub use ticket_numbering::TicketNumbering;
pub use ticket_service::TicketService;
