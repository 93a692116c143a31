//! CLI command implementations.

pub mod modules;
pub mod run;
