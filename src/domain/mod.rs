//! Domain layer for the Oak module host
//!
//! Plain models, the port traits at the host's seams and the error taxonomy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    DeliveryError, DiscoveryError, DispatchError, DomainError, DomainResult, LifecycleError,
    ModuleError, SequenceError,
};
