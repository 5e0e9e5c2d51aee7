use crate::models::{ActivityState, MatchTransitionError};
use crate::services::StorageError;
use thiserror::Error;

/// Errors reported by the matching engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Seeker {user_id} must be active to browse (state: {state:?})")]
    InvalidSeekerState { user_id: String, state: ActivityState },

    #[error("Invalid weight configuration: {0}")]
    InvalidWeightConfiguration(String),

    #[error("Cannot record a decision about yourself")]
    SelfInteraction,

    #[error("Undo window expired")]
    UndoExpired,

    #[error("No decision to undo")]
    NothingToUndo,

    #[error("Match {0} was created concurrently")]
    DuplicateMatchAttempt(String),

    #[error("Decision from {actor} about {target} already recorded")]
    DuplicateDecision { actor: String, target: String },

    #[error("{actor} is matched with {target}; end the match instead of passing")]
    MatchedDecision { actor: String, target: String },

    #[error("Daily like limit of {limit} reached")]
    DailyLimitReached { limit: u32 },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error(transparent)]
    Transition(#[from] MatchTransitionError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateMatch(id) => EngineError::DuplicateMatchAttempt(id),
            other => EngineError::Storage(other),
        }
    }
}
