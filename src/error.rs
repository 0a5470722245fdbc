//! Error types for the workout core.
//!
//! Precondition violations are reported through [`ControllerError`] and never
//! change controller state. Storage and collaborator failures have their own
//! types so the controller can log and swallow them.

use thiserror::Error;

use crate::session::SessionPhase;

/// A command was rejected by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("`{command}` is not valid while {phase}")]
    InvalidPhase {
        command: &'static str,
        phase: SessionPhase,
    },

    #[error("workout `{0}` has no exercises")]
    EmptyWorkout(String),

    #[error("the previous set is still being processed")]
    FeedbackPending,

    #[error("invalid set entry: {0}")]
    InvalidEntry(String),

    #[error("all {sets} sets of `{exercise}` are logged; add a set or move on")]
    ExerciseComplete { exercise: String, sets: u32 },

    #[error("session cannot be resumed: {0}")]
    NotResumable(String),
}

/// Persistence failure reported by a [`crate::storage::WorkoutStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by an external collaborator (health session, etc.).
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("{0}")]
    Rejected(String),
}

/// Error returned by [`crate::session::SessionHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("workout session runtime has stopped")]
    Closed,

    #[error("workout session is busy, command dropped")]
    Busy,
}
