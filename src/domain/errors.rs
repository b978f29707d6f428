//! Domain errors for the SPSA coordinator.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the run repository.
///
/// Worker-facing coordinator operations never surface these; they log and
/// degrade to a no-op instead.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Errors in a user-supplied tuning definition, detected at run creation.
#[derive(Debug, Error, PartialEq)]
pub enum RunSpecError {
    #[error("Line {line}: expected {expected} comma-separated fields, got {found}")]
    FieldCount {
        line: usize,
        expected: &'static str,
        found: usize,
    },

    #[error("Line {line}: field '{field}' is not a number: {value}")]
    NotANumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("Line {0}: parameter name is empty")]
    EmptyName(usize),

    #[error("Parameter '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("Parameter '{name}': min ({min}) must be less than max ({max})")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("Parameter '{name}': start ({start}) is outside [{min}, {max}]")]
    StartOutOfBounds {
        name: String,
        start: f64,
        min: f64,
        max: f64,
    },

    #[error("Parameter '{name}': {field} must be positive, got {value}")]
    NonPositive {
        name: String,
        field: &'static str,
        value: f64,
    },

    #[error("Tuning definition has no parameters")]
    NoParameters,

    #[error("Run must play at least one game pair, got num_games={0}")]
    TooFewGames(u64),

    #[error("Invalid hyper-parameter {name}={value}: {reason}")]
    InvalidHyperParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}
