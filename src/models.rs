use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;
use std::fmt::Display;
use uuid::Uuid;

/// An ordered workout template. Never mutated while a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDefinition {
    pub id: Uuid,
    pub name: String,
    pub slots: Vec<ExerciseSlot>,
}

impl WorkoutDefinition {
    pub fn new(name: impl Into<String>, slots: Vec<ExerciseSlot>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slots,
        }
    }

    pub fn slot(&self, index: usize) -> Option<&ExerciseSlot> {
        self.slots.get(index)
    }
}

/// One exercise's position and targets within a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSlot {
    pub id: Uuid,
    pub order_index: u32,
    pub exercise_name: String,
    pub target_sets: u32,
    pub target_reps: u32,
    pub target_weight: Option<f64>,
    pub rest_seconds: u32,
}

impl ExerciseSlot {
    pub fn new(
        order_index: u32,
        exercise_name: impl Into<String>,
        target_sets: u32,
        target_reps: u32,
        target_weight: Option<f64>,
        rest_seconds: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_index,
            exercise_name: exercise_name.into(),
            target_sets,
            target_reps,
            target_weight,
            rest_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Cancelled,
    SavedMidSession,
}

impl SessionStatus {
    /// In-progress and paused sessions count as the device's active session.
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::SavedMidSession => "saved-mid-session",
        };

        write!(f, "{}", s)
    }
}

/// Flags the store keeps on a definition while it is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum WorkoutState {
    Inactive,
    Active,
    Completed,
}

impl Display for WorkoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Completed => "completed",
        };

        write!(f, "{}", s)
    }
}

/// One attempt at executing a workout definition.
/// `completed_at` stays `None` until the session completes or is saved mid-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub workout_id: Uuid,
    pub workout_name: String,
    pub started_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub status: SessionStatus,
    pub elapsed_seconds: u64,
    pub notes: Option<String>,
}

impl Session {
    pub fn begin(definition: &WorkoutDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            workout_id: definition.id,
            workout_name: definition.name.clone(),
            started_at: Local::now(),
            completed_at: None,
            status: SessionStatus::NotStarted,
            elapsed_seconds: 0,
            notes: None,
        }
    }
}

/// Immutable record of a performed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSet {
    pub id: Uuid,
    pub session_id: Uuid,
    pub slot_id: Uuid,
    pub exercise_name: String,
    pub set_number: u32,
    pub reps: u32,
    pub weight: f64,
    pub effort: Option<u8>,
    pub completed_at: DateTime<Local>,
}

/// Heaviest weight ever logged for an exercise name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecordEntry {
    pub exercise_name: String,
    pub weight: f64,
    pub reps: u32,
    pub achieved_at: DateTime<Local>,
}
