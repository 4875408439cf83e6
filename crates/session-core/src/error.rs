//! Top-level error type aggregating each module's own error enum, surfaced
//! at the tool-operation boundary.

use thiserror::Error;

use crate::registry::RegistryError;
use crate::store::StoreError;

/// The named error kinds surfaced at the tool-operation boundary, plus
/// `Registry`/`BadRequest` for internal-plumbing failures that don't map
/// onto one of the named kinds but still must not panic the caller.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("unknown session id {0}")]
    UnknownSession(String),

    #[error("no active process for session {0}")]
    NoActiveProcess(String),

    #[error("session {0} is already terminal")]
    AlreadyTerminal(String),

    #[error("session {0} has no pending question")]
    NoPendingQuestion(String),

    #[error("question id mismatch for session {session}: outstanding is {outstanding}, got {given}")]
    IdMismatch {
        session: String,
        outstanding: String,
        given: String,
    },

    #[error("{active} active sessions already at the configured limit of {max}")]
    CapacityExceeded { active: usize, max: usize },

    #[error("session {0} is busy: a live-stdin follow-up was requested but the agent family is one-process-per-turn")]
    Busy(String),

    #[error("failed to spawn agent process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("question registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("working directory {0} does not exist")]
    InvalidWorkingDirectory(String),

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl From<StoreError> for SupervisorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CapacityExceeded { active, max } => {
                SupervisorError::CapacityExceeded { active, max }
            }
            StoreError::NotFound(id) => SupervisorError::UnknownSession(id),
        }
    }
}
