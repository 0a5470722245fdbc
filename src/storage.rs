use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CompletedSet, PersonalRecordEntry, Session, SessionStatus, WorkoutDefinition, WorkoutState,
};

/// Persistence seen by the workout core and the CLI.
///
/// Each method is one logical unit of work and commits before returning.
#[async_trait]
pub trait WorkoutStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Most recent sessions first.
    async fn recent_sessions(&self, limit: u32) -> Result<Vec<Session>, StoreError>;

    async fn completed_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Persists a set and, when given, replaces the exercise's personal record.
    async fn save_set(
        &self,
        set: &CompletedSet,
        record: Option<&PersonalRecordEntry>,
    ) -> Result<(), StoreError>;

    async fn sets_for_session(&self, session_id: Uuid) -> Result<Vec<CompletedSet>, StoreError>;

    /// Heaviest weight ever logged for `exercise_name`, across all sessions.
    async fn max_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError>;

    /// Weight of the most recently logged set for `exercise_name`.
    async fn last_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError>;

    async fn personal_records(&self) -> Result<Vec<PersonalRecordEntry>, StoreError>;

    async fn set_workout_state(&self, workout_id: Uuid, state: WorkoutState) -> Result<(), StoreError>;

    async fn save_definition(&self, definition: &WorkoutDefinition) -> Result<(), StoreError>;

    async fn find_definition(&self, name: &str) -> Result<Option<WorkoutDefinition>, StoreError>;

    async fn definition(&self, id: Uuid) -> Result<Option<WorkoutDefinition>, StoreError>;

    async fn definitions(&self) -> Result<Vec<(WorkoutDefinition, WorkoutState)>, StoreError>;

    /// Returns `false` when no definition had that name.
    async fn delete_definition(&self, name: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<Session>,
    sets: Vec<CompletedSet>,
    records: HashMap<String, PersonalRecordEntry>,
    definitions: Vec<(WorkoutDefinition, WorkoutState)>,
    fail_writes: bool,
}

/// In-process store. Writes can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write returns [`StoreError::Unavailable`] and changes nothing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn sets(&self) -> Vec<CompletedSet> {
        self.lock().sets.clone()
    }

    pub fn record(&self, exercise_name: &str) -> Option<PersonalRecordEntry> {
        self.lock().records.get(exercise_name).cloned()
    }

    pub fn workout_state(&self, workout_id: Uuid) -> Option<WorkoutState> {
        self.lock()
            .definitions
            .iter()
            .find(|(d, _)| d.id == workout_id)
            .map(|(_, s)| *s)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let state = self.lock();
        if state.fail_writes {
            return Err(StoreError::Unavailable("memory store is read-only".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl WorkoutStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.writable()?.sessions.push(session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        let slot = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session.id)))?;
        *slot = session.clone();
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.session(id))
    }

    async fn recent_sessions(&self, limit: u32) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.lock().sessions.clone();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn completed_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .cloned()
            .collect())
    }

    async fn save_set(
        &self,
        set: &CompletedSet,
        record: Option<&PersonalRecordEntry>,
    ) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        state.sets.push(set.clone());
        if let Some(pr) = record {
            state.records.insert(pr.exercise_name.clone(), pr.clone());
        }
        Ok(())
    }

    async fn sets_for_session(&self, session_id: Uuid) -> Result<Vec<CompletedSet>, StoreError> {
        Ok(self
            .lock()
            .sets
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn max_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .lock()
            .sets
            .iter()
            .filter(|s| s.exercise_name == exercise_name)
            .map(|s| s.weight)
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |m| m.max(w)))))
    }

    async fn last_weight(&self, exercise_name: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .lock()
            .sets
            .iter()
            .filter(|s| s.exercise_name == exercise_name)
            .max_by_key(|s| s.completed_at)
            .map(|s| s.weight))
    }

    async fn personal_records(&self) -> Result<Vec<PersonalRecordEntry>, StoreError> {
        let mut records: Vec<_> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| a.exercise_name.cmp(&b.exercise_name));
        Ok(records)
    }

    async fn set_workout_state(&self, workout_id: Uuid, state: WorkoutState) -> Result<(), StoreError> {
        let mut inner = self.writable()?;
        if let Some((_, s)) = inner.definitions.iter_mut().find(|(d, _)| d.id == workout_id) {
            *s = state;
        }
        Ok(())
    }

    async fn save_definition(&self, definition: &WorkoutDefinition) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        state.definitions.retain(|(d, _)| d.id != definition.id);
        state.definitions.push((definition.clone(), WorkoutState::Inactive));
        Ok(())
    }

    async fn find_definition(&self, name: &str) -> Result<Option<WorkoutDefinition>, StoreError> {
        Ok(self
            .lock()
            .definitions
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(d, _)| d.clone()))
    }

    async fn definition(&self, id: Uuid) -> Result<Option<WorkoutDefinition>, StoreError> {
        Ok(self
            .lock()
            .definitions
            .iter()
            .find(|(d, _)| d.id == id)
            .map(|(d, _)| d.clone()))
    }

    async fn definitions(&self) -> Result<Vec<(WorkoutDefinition, WorkoutState)>, StoreError> {
        let mut all = self.lock().definitions.clone();
        all.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(all)
    }

    async fn delete_definition(&self, name: &str) -> Result<bool, StoreError> {
        let mut state = self.writable()?;
        let before = state.definitions.len();
        state.definitions.retain(|(d, _)| d.name != name);
        Ok(state.definitions.len() != before)
    }
}
