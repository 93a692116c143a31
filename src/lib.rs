//! Oak - modular service host
//!
//! Oak loads units of feature logic ("modules") from definitions on disk and
//! lets an operator load, unload and reload them while the process keeps
//! running. The built-in `tickets` module adds per-category ticket numbering
//! and a polling reminder scheduler on top of a module-owned SQLite store.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, port traits and typed errors
//! - **Adapters** (`adapters`): SQLite stores, reminder delivery, built-in modules
//! - **Service Layer** (`services`): lifecycle manager, dispatcher, scheduler, ticket logic
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use adapters::modules::ModuleCatalog;
pub use domain::errors::{DomainError, DomainResult, LifecycleError, SequenceError};
pub use domain::models::Config;
pub use domain::ports::{Event, EventDispatcher, Module, ModuleContext, Reply};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{LifecycleManager, LocalDispatcher, OperatorConsole, UnloadOutcome};
