use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ControllerError;
use crate::models::{CompletedSet, ExerciseSlot, PersonalRecordEntry};
use crate::storage::WorkoutStore;

/// What the lifter reports for one set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetEntry {
    pub reps: u32,
    pub weight: f64,
    /// Subjective effort, 1 to 10.
    pub effort: Option<u8>,
}

impl SetEntry {
    pub fn new(reps: u32, weight: f64) -> Self {
        Self {
            reps,
            weight,
            effort: None,
        }
    }

    pub fn with_effort(mut self, effort: u8) -> Self {
        self.effort = Some(effort);
        self
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.reps == 0 {
            return Err(ControllerError::InvalidEntry("reps must be at least 1".into()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ControllerError::InvalidEntry(format!(
                "weight must be a non-negative number, got {}",
                self.weight
            )));
        }
        if let Some(e) = self.effort {
            if !(1..=10).contains(&e) {
                return Err(ControllerError::InvalidEntry(format!(
                    "effort must be between 1 and 10, got {e}"
                )));
            }
        }
        Ok(())
    }
}

/// Where in the workout a set is being logged.
#[derive(Debug, Clone, Copy)]
pub struct SetPosition<'a> {
    pub slot: &'a ExerciseSlot,
    pub set_number: u32,
    /// Slot target plus any sets added during this session.
    pub target_sets: u32,
    pub exercise_index: usize,
    pub exercise_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub set: CompletedSet,
    pub record: Option<PersonalRecordEntry>,
    pub is_last_set: bool,
    pub is_last_exercise: bool,
    /// `false` when the store rejected the write. The set still counts.
    pub saved: bool,
}

impl RecordOutcome {
    pub fn is_personal_record(&self) -> bool {
        self.record.is_some()
    }
}

/// Strictly heavier than everything before. Zero never counts.
pub fn qualifies_as_record(weight: f64, prior_max: Option<f64>) -> bool {
    weight > 0.0 && prior_max.is_none_or(|max| weight > max)
}

pub fn is_last_set(set_number: u32, target_sets: u32) -> bool {
    set_number >= target_sets
}

pub fn is_last_exercise(exercise_index: usize, exercise_count: usize) -> bool {
    exercise_index + 1 >= exercise_count
}

/// Commits completed sets and derives personal records.
pub struct SetRecorder {
    store: Arc<dyn WorkoutStore>,
}

impl SetRecorder {
    pub fn new(store: Arc<dyn WorkoutStore>) -> Self {
        Self { store }
    }

    /// Records are matched by exercise name across every session, so renaming
    /// an exercise starts a fresh record history.
    pub async fn record_set(
        &self,
        session_id: Uuid,
        position: SetPosition<'_>,
        entry: SetEntry,
    ) -> RecordOutcome {
        let name = &position.slot.exercise_name;

        // An unreadable history must not mint a record.
        let is_record = match self.store.max_weight(name).await {
            Ok(prior) => qualifies_as_record(entry.weight, prior),
            Err(e) => {
                warn!(exercise = %name, error = %e, "could not read record history");
                false
            }
        };

        let now = Local::now();
        let set = CompletedSet {
            id: Uuid::new_v4(),
            session_id,
            slot_id: position.slot.id,
            exercise_name: name.clone(),
            set_number: position.set_number,
            reps: entry.reps,
            weight: entry.weight,
            effort: entry.effort,
            completed_at: now,
        };

        let record = is_record.then(|| PersonalRecordEntry {
            exercise_name: name.clone(),
            weight: entry.weight,
            reps: entry.reps,
            achieved_at: now,
        });

        let saved = match self.store.save_set(&set, record.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(exercise = %name, set = set.set_number, error = %e, "failed to save set");
                false
            }
        };

        if record.is_some() {
            info!(exercise = %name, weight = entry.weight, reps = entry.reps, "personal record");
        }

        RecordOutcome {
            set,
            record,
            is_last_set: is_last_set(position.set_number, position.target_sets),
            is_last_exercise: is_last_exercise(position.exercise_index, position.exercise_count),
            saved,
        }
    }
}
