//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with an optional
//! rolling JSON file written through tracing-appender.

pub mod logger;

pub use logger::{LoggerImpl, LOG_FILE_NAME};
