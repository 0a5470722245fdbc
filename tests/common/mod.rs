#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;

use repline::collaborators::{
    AchievementEvaluator, ActivityKind, Collaborators, CompanionAction, CompanionChannel, Feedback,
    Haptics, HealthSession, InboundHandler, LiveStatus,
};
use repline::error::CollaboratorError;
use repline::models::{ExerciseSlot, Session, WorkoutDefinition};
use repline::session::{
    ManualScheduler, SessionController, SessionPhase, SetEntry, Timing, WorkoutSnapshot,
};
use repline::storage::{MemoryStore, WorkoutStore};

#[derive(Default)]
pub struct RecordingCompanion {
    pub snapshots: Mutex<Vec<WorkoutSnapshot>>,
    pub events: Mutex<Vec<(String, Value)>>,
    inbound: Mutex<Option<InboundHandler>>,
}

impl RecordingCompanion {
    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn last_snapshot(&self) -> Option<WorkoutSnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }

    /// Simulates the paired device sending an action.
    pub fn fire(&self, action: CompanionAction) {
        let handler = self.inbound.lock().unwrap().clone();
        if let Some(h) = handler {
            h(action);
        }
    }
}

impl CompanionChannel for RecordingCompanion {
    fn send_snapshot(&self, snapshot: &WorkoutSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn send_event(&self, name: &str, payload: Value) {
        self.events.lock().unwrap().push((name.to_string(), payload));
    }

    fn register_inbound(&self, handler: InboundHandler) {
        *self.inbound.lock().unwrap() = Some(handler);
    }
}

#[derive(Default)]
pub struct RecordingLive {
    pub starts: Mutex<u32>,
    pub updates: Mutex<u32>,
    pub ends: Mutex<u32>,
}

impl LiveStatus for RecordingLive {
    fn start(&self, _snapshot: &WorkoutSnapshot) {
        *self.starts.lock().unwrap() += 1;
    }

    fn update(&self, _snapshot: &WorkoutSnapshot) {
        *self.updates.lock().unwrap() += 1;
    }

    fn end(&self) {
        *self.ends.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingHaptics {
    pub log: Mutex<Vec<Feedback>>,
}

impl RecordingHaptics {
    pub fn last(&self) -> Option<Feedback> {
        self.log.lock().unwrap().last().copied()
    }
}

impl Haptics for RecordingHaptics {
    fn feedback(&self, kind: Feedback) {
        self.log.lock().unwrap().push(kind);
    }
}

#[derive(Default)]
pub struct RecordingHealth {
    pub starts: Mutex<u32>,
    pub ends: Mutex<u32>,
    pub fail: bool,
}

impl HealthSession for RecordingHealth {
    fn start_session(&self, _kind: ActivityKind) -> Result<(), CollaboratorError> {
        *self.starts.lock().unwrap() += 1;
        if self.fail {
            return Err(CollaboratorError::Unavailable("no wearable".into()));
        }
        Ok(())
    }

    fn end_session(&self) -> Result<(), CollaboratorError> {
        *self.ends.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAchievements {
    pub calls: Mutex<Vec<usize>>,
}

impl AchievementEvaluator for RecordingAchievements {
    fn evaluate(&self, completed: &[Session]) {
        self.calls.lock().unwrap().push(completed.len());
    }
}

pub struct Fakes {
    pub companion: Arc<RecordingCompanion>,
    pub live: Arc<RecordingLive>,
    pub haptics: Arc<RecordingHaptics>,
    pub health: Arc<RecordingHealth>,
    pub achievements: Arc<RecordingAchievements>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            companion: Arc::default(),
            live: Arc::default(),
            haptics: Arc::default(),
            health: Arc::default(),
            achievements: Arc::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            companion: self.companion.clone(),
            live_status: self.live.clone(),
            haptics: self.haptics.clone(),
            health: self.health.clone(),
            achievements: self.achievements.clone(),
        }
    }
}

/// Three exercises of three sets, 45 seconds rest.
pub fn three_by_three() -> WorkoutDefinition {
    WorkoutDefinition::new(
        "Full Body",
        vec![
            ExerciseSlot::new(0, "Squat", 3, 5, Some(100.0), 45),
            ExerciseSlot::new(1, "Bench Press", 3, 5, Some(80.0), 45),
            ExerciseSlot::new(2, "Row", 3, 8, None, 45),
        ],
    )
}

/// A controller over a memory store with a hand-driven clock.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scheduler: ManualScheduler,
    pub fakes: Fakes,
    pub controller: SessionController,
}

impl Harness {
    pub async fn new(definition: &WorkoutDefinition) -> Self {
        Self::with_store(definition, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(definition: &WorkoutDefinition, store: Arc<MemoryStore>) -> Self {
        store.save_definition(definition).await.unwrap();
        let scheduler = ManualScheduler::new();
        let fakes = Fakes::new();
        let controller = SessionController::new(
            store.clone(),
            &fakes.collaborators(),
            Box::new(scheduler.clone()),
            Timing::default(),
        );

        Self {
            store,
            scheduler,
            fakes,
            controller,
        }
    }

    /// Delivers `n` ticks from whatever ticker is running.
    pub async fn tick(&mut self, n: u32) {
        for _ in 0..n {
            if let Some(token) = self.scheduler.ticker() {
                self.controller.tick(token).await;
            }
        }
    }

    /// Lets every pending feedback delay elapse.
    pub async fn fire_deferred(&mut self) {
        for task in self.scheduler.take_pending() {
            self.controller.run_deferred(task.token, task.task).await;
        }
    }

    /// Starts `definition` and runs out the countdown.
    pub async fn start_exercising(&mut self, definition: WorkoutDefinition) {
        self.controller.start(definition).await.unwrap();
        self.tick(Timing::default().countdown_ticks).await;
        assert_eq!(self.controller.phase(), SessionPhase::Exercising);
    }

    /// Opens the logger, submits, and lets the feedback delay pass.
    pub async fn log_set(&mut self, reps: u32, weight: f64) {
        self.controller.open_set_logger().unwrap();
        self.controller
            .submit_set(SetEntry::new(reps, weight))
            .await
            .unwrap();
        self.fire_deferred().await;
    }

    /// Logs a set, then skips whatever rest follows it.
    pub async fn log_and_skip_rest(&mut self, reps: u32, weight: f64) {
        self.log_set(reps, weight).await;
        if matches!(self.controller.phase(), SessionPhase::Resting { .. }) {
            self.controller.skip_rest().unwrap();
        }
    }
}
