use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::collaborators::{CompanionChannel, Collaborators, Feedback, Haptics, LiveStatus};
use crate::session::{ResumePoint, WorkoutSnapshot};

const EVENT_CAPACITY: usize = 64;

/// Discrete things that happened during a workout, for the companion and UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkoutEvent {
    WorkoutStarted { workout_name: String },
    SetLogged { exercise_name: String, set_number: u32, reps: u32, weight: f64 },
    PersonalRecord { exercise_name: String, weight: f64, reps: u32 },
    ExerciseCompleted { exercise_name: String },
    SetAdvanced { exercise_index: usize, set_number: u32 },
    WorkoutCompleted { elapsed_seconds: u64 },
    WorkoutCancelled,
    WorkoutSaved { resume: ResumePoint },
    PersistenceFailed { operation: String },
}

impl WorkoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkoutStarted { .. } => "workoutStarted",
            Self::SetLogged { .. } => "setLogged",
            Self::PersonalRecord { .. } => "personalRecord",
            Self::ExerciseCompleted { .. } => "exerciseCompleted",
            Self::SetAdvanced { .. } => "setAdvanced",
            Self::WorkoutCompleted { .. } => "workoutCompleted",
            Self::WorkoutCancelled => "workoutCancelled",
            Self::WorkoutSaved { .. } => "workoutSaved",
            Self::PersistenceFailed { .. } => "persistenceFailed",
        }
    }

    fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            warn!(event = self.name(), error = %e, "could not encode event payload");
            Value::Null
        })
    }
}

/// Pushes snapshots and events outward. Nothing here ever waits on a consumer.
pub struct ProgressNotifier {
    companion: Arc<dyn CompanionChannel>,
    live_status: Arc<dyn LiveStatus>,
    haptics: Arc<dyn Haptics>,
    snapshots: watch::Sender<Option<WorkoutSnapshot>>,
    events: broadcast::Sender<WorkoutEvent>,
    last: Option<WorkoutSnapshot>,
    live_started: bool,
    elapsed_every: u64,
}

impl ProgressNotifier {
    /// `elapsed_every` is the companion's elapsed-only update interval in seconds.
    pub fn new(collaborators: &Collaborators, elapsed_every: u64) -> Self {
        let (snapshots, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            companion: collaborators.companion.clone(),
            live_status: collaborators.live_status.clone(),
            haptics: collaborators.haptics.clone(),
            snapshots,
            events,
            last: None,
            live_started: false,
            elapsed_every: elapsed_every.max(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WorkoutSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Sender<WorkoutEvent> {
        self.events.clone()
    }

    pub fn last(&self) -> Option<&WorkoutSnapshot> {
        self.last.as_ref()
    }

    /// Pushes `snapshot` unless it equals the last one pushed.
    /// Returns whether anything went out.
    pub fn publish(&mut self, snapshot: WorkoutSnapshot) -> bool {
        if self.last.as_ref() == Some(&snapshot) {
            return false;
        }
        self.push(snapshot);
        true
    }

    /// Per-second publish, plus the companion's rate-limited elapsed update.
    /// Ticks that leave elapsed unchanged (countdown) never resend it.
    pub fn tick(&mut self, snapshot: WorkoutSnapshot) {
        let elapsed = snapshot.elapsed_seconds;
        let advanced = self.last.as_ref().is_none_or(|s| s.elapsed_seconds != elapsed);
        self.publish(snapshot);

        if advanced && elapsed > 0 && elapsed % self.elapsed_every == 0 {
            self.companion
                .send_event("elapsed", json!({ "elapsedSeconds": elapsed }));
        }
    }

    /// Republishes even if nothing changed, e.g. after the companion relaunches.
    pub fn resync(&mut self, snapshot: Option<WorkoutSnapshot>) {
        match snapshot {
            Some(s) => self.push(s),
            None => debug!("resync requested with no workout running"),
        }
    }

    pub fn start_live(&mut self, snapshot: &WorkoutSnapshot) {
        if !self.live_started {
            self.live_status.start(snapshot);
            self.live_started = true;
        }
    }

    /// Ends the live surface but leaves the final snapshot visible.
    pub fn end_live(&mut self) {
        if self.live_started {
            self.live_status.end();
            self.live_started = false;
        }
    }

    /// Tears down the live surface and clears observers' snapshot.
    pub fn finish(&mut self) {
        self.end_live();
        self.last = None;
        self.snapshots.send_replace(None);
    }

    pub fn emit(&self, event: WorkoutEvent) {
        self.companion.send_event(event.name(), event.payload());
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn feedback(&self, kind: Feedback) {
        self.haptics.feedback(kind);
    }

    fn push(&mut self, snapshot: WorkoutSnapshot) {
        self.companion.send_snapshot(&snapshot);
        if self.live_started {
            self.live_status.update(&snapshot);
        }
        self.snapshots.send_replace(Some(snapshot.clone()));
        self.last = Some(snapshot);
    }
}
