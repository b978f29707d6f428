//! Infrastructure layer module
//!
//! Process-level concerns the domain does not know about:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing-subscriber, tracing-appender)

pub mod config;
pub mod logging;
