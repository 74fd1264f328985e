use thiserror::Error;

use crate::model::ActionType;

/// Malformed user input. Recovered locally and surfaced inline; never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rule name must not be empty")]
    EmptyRuleName,
    #[error("rule must declare at least one condition")]
    NoConditions,
    #[error("a destination is required for {0:?} rules")]
    MissingDestination(ActionType),
    #[error("older-than day count must be positive, got {0}")]
    NonPositiveDays(i64),
    #[error("rule text still carries unresolved ambiguity: {0}")]
    UnresolvedAmbiguity(String),
}

/// Destination access failure. Requires a user re-grant, so the engine
/// surfaces it without retrying.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("destination '{0}' could not be resolved")]
    Unresolvable(String),
    #[error("permission denied for '{0}'")]
    PermissionDenied(String),
}

/// Save/load failure for persisted engine state. The in-memory state stays
/// valid when a commit fails.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read state from {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse state at {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state to {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state for {path}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown cluster id: {0}")]
    UnknownCluster(String),
}
