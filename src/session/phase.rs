use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Live state of the session controller. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionPhase {
    Idle,
    Countdown { remaining: u32 },
    Exercising,
    LoggingSet,
    Resting { remaining: u32 },
    BetweenExercises,
    Completed,
    Paused,
}

impl SessionPhase {
    /// Phases that belong to a running workout (everything but idle and completed).
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Completed)
    }

    /// Phases in which the elapsed-time clock advances.
    pub fn counts_elapsed(self) -> bool {
        matches!(
            self,
            Self::Exercising | Self::LoggingSet | Self::Resting { .. } | Self::BetweenExercises
        )
    }

    pub fn can_pause(self) -> bool {
        matches!(self, Self::Exercising | Self::LoggingSet | Self::Resting { .. })
    }

    pub fn rest_remaining(self) -> Option<u32> {
        match self {
            Self::Resting { remaining } => Some(remaining),
            _ => None,
        }
    }

    pub fn countdown_remaining(self) -> Option<u32> {
        match self {
            Self::Countdown { remaining } => Some(remaining),
            _ => None,
        }
    }
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Countdown { remaining } => write!(f, "countdown({remaining})"),
            Self::Exercising => write!(f, "exercising"),
            Self::LoggingSet => write!(f, "logging-set"),
            Self::Resting { remaining } => write!(f, "resting({remaining})"),
            Self::BetweenExercises => write!(f, "between-exercises"),
            Self::Completed => write!(f, "completed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Everything an outside surface needs to render the current workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSnapshot {
    pub workout_name: String,
    pub exercise_name: String,
    pub exercise_index: usize,
    pub exercise_count: usize,
    pub set_number: u32,
    pub total_sets: u32,
    /// Every target set of the current exercise is logged.
    pub exercise_complete: bool,
    pub target_weight: Option<f64>,
    pub target_reps: u32,
    pub phase: SessionPhase,
    pub is_resting: bool,
    pub rest_remaining: Option<u32>,
    pub countdown_remaining: Option<u32>,
    pub elapsed_seconds: u64,
    pub is_paused: bool,
}

/// Where a saved-mid-session workout should pick up again.
/// Stored as JSON in `Session::notes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePoint {
    pub exercise_index: usize,
    pub exercise_count: usize,
    pub sets_completed: u32,
    pub summary: String,
}

impl ResumePoint {
    pub fn new(exercise_index: usize, exercise_count: usize, sets_completed: u32) -> Self {
        let summary = format!(
            "exercise {} of {}, set {}",
            exercise_index + 1,
            exercise_count,
            sets_completed
        );

        Self {
            exercise_index,
            exercise_count,
            sets_completed,
            summary,
        }
    }

    pub fn to_note(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a note written by [`ResumePoint::to_note`]. Free-form notes yield `None`.
    pub fn from_note(note: &str) -> Option<Self> {
        serde_json::from_str(note).ok()
    }
}
