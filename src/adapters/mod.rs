//! Adapters for module-owned stores, reminder delivery and the built-in modules.

pub mod delivery;
pub mod modules;
pub mod sqlite;
