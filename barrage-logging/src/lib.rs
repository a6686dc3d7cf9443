//! Structured logging infrastructure for Barrage
//!
//! Thin layer over `tracing-subscriber` that turns the `logging` domain of
//! the Barrage configuration into a global subscriber.

pub mod init;

pub use barrage_config::{LogFormat, LogLevel, LoggingConfig};
pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
