//! Domain layer for the SPSA coordinator
//!
//! This module contains the optimizer data model and the port traits the
//! coordinator depends on.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, RunSpecError};
