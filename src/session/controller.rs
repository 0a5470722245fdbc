//! The workout phase state machine.
//!
//! ```text
//! idle ──start──▶ countdown(n) ──ticks──▶ exercising ──open logger──▶ logging-set
//!   logging-set ──submit──▶ [delay] ──▶ resting(rest) ──ticks / skip──▶ exercising (set + 1)
//!   logging-set ──submit last set──▶ between-exercises ──[delay]──▶ exercising (next) | completed
//!   exercising | logging-set | resting ──pause──▶ paused ──resume──▶ (frozen phase)
//!   any active phase ──cancel / save and exit──▶ idle
//! ```
//!
//! Every public command either fails with [`ControllerError`] and leaves state
//! untouched, or applies its transition and ends with one snapshot publish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use itertools::Itertools;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    AchievementEvaluator, ActivityKind, Collaborators, CompanionAction, Feedback, HealthSession,
};
use crate::error::ControllerError;
use crate::models::{ExerciseSlot, Session, SessionStatus, WorkoutDefinition, WorkoutState};
use crate::session::notifier::{ProgressNotifier, WorkoutEvent};
use crate::session::recorder::{RecordOutcome, SetEntry, SetPosition, SetRecorder};
use crate::session::timer::{DeferredTask, Scheduler, TimerToken};
use crate::session::{ResumePoint, SessionPhase, WorkoutSnapshot};
use crate::storage::WorkoutStore;

/// Countdown length and feedback pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub countdown_ticks: u32,
    pub set_feedback: Duration,
    pub exercise_complete: Duration,
    pub personal_record: Duration,
    pub companion_elapsed_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            countdown_ticks: 3,
            set_feedback: Duration::from_millis(1_200),
            exercise_complete: Duration::from_millis(2_000),
            personal_record: Duration::from_millis(3_000),
            companion_elapsed_secs: 5,
        }
    }
}

/// Values pre-filled into the set logger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetDraft {
    pub reps: u32,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Rest,
    NextExercise,
    Finish,
}

#[derive(Debug, Clone, Copy)]
struct PendingAdvance {
    advance: Advance,
    delay: Duration,
}

struct ActiveWorkout {
    definition: WorkoutDefinition,
    session: Session,
    exercise_index: usize,
    set_number: u32,
    elapsed: u64,
    /// Sets logged this session, per slot.
    logged: Vec<u32>,
    /// Sets added on top of the slot target, per slot.
    extra: Vec<u32>,
    suggested_weight: f64,
    last_logged_weight: Option<f64>,
    draft: Option<SetDraft>,
    pending: Option<PendingAdvance>,
}

impl ActiveWorkout {
    fn slot(&self) -> &ExerciseSlot {
        &self.definition.slots[self.exercise_index]
    }

    fn target_sets(&self) -> u32 {
        self.slot().target_sets + self.extra[self.exercise_index]
    }

    fn is_exercise_done(&self) -> bool {
        self.logged[self.exercise_index] >= self.target_sets()
    }

    /// The set to show on entering the current exercise. A finished one stays on its last set.
    fn entry_set_number(&self) -> u32 {
        (self.logged[self.exercise_index] + 1).min(self.target_sets().max(1))
    }

    fn snapshot(&self, phase: SessionPhase, paused_from: Option<SessionPhase>) -> WorkoutSnapshot {
        let slot = self.slot();
        let underlying = paused_from.unwrap_or(phase);

        WorkoutSnapshot {
            workout_name: self.definition.name.clone(),
            exercise_name: slot.exercise_name.clone(),
            exercise_index: self.exercise_index,
            exercise_count: self.definition.slots.len(),
            set_number: self.set_number,
            total_sets: self.target_sets(),
            exercise_complete: self.is_exercise_done(),
            target_weight: slot.target_weight,
            target_reps: slot.target_reps,
            phase,
            is_resting: underlying.rest_remaining().is_some(),
            rest_remaining: underlying.rest_remaining(),
            countdown_remaining: phase.countdown_remaining(),
            elapsed_seconds: self.elapsed,
            is_paused: phase == SessionPhase::Paused,
        }
    }
}

/// Haptic weight of a logged set: regular < exercise complete < personal record.
fn set_feedback(outcome: &RecordOutcome) -> Feedback {
    if outcome.is_personal_record() {
        Feedback::Success
    } else if outcome.is_last_set {
        Feedback::Heavy
    } else {
        Feedback::Light
    }
}

pub struct SessionController {
    store: Arc<dyn WorkoutStore>,
    recorder: SetRecorder,
    notifier: ProgressNotifier,
    scheduler: Box<dyn Scheduler>,
    health: Arc<dyn HealthSession>,
    achievements: Arc<dyn AchievementEvaluator>,
    timing: Timing,
    token: TimerToken,
    phase: SessionPhase,
    paused_from: Option<SessionPhase>,
    active: Option<ActiveWorkout>,
    last_session: Option<Session>,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn WorkoutStore>,
        collaborators: &Collaborators,
        scheduler: Box<dyn Scheduler>,
        timing: Timing,
    ) -> Self {
        Self {
            recorder: SetRecorder::new(store.clone()),
            store,
            notifier: ProgressNotifier::new(collaborators, timing.companion_elapsed_secs),
            scheduler,
            health: collaborators.health.clone(),
            achievements: collaborators.achievements.clone(),
            timing,
            token: TimerToken::default(),
            phase: SessionPhase::Idle,
            paused_from: None,
            active: None,
            last_session: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The running session, or the one that most recently ended.
    pub fn session(&self) -> Option<&Session> {
        self.active
            .as_ref()
            .map(|a| &a.session)
            .or(self.last_session.as_ref())
    }

    pub fn exercise_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.exercise_index)
    }

    pub fn set_number(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.set_number)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.elapsed)
    }

    pub fn set_draft(&self) -> Option<SetDraft> {
        self.active.as_ref().and_then(|a| a.draft)
    }

    pub fn suggested_weight(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.suggested_weight)
    }

    /// A logged set is waiting for its feedback delay before the phase moves on.
    pub fn has_pending_advance(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.pending.is_some())
    }

    pub fn timer_token(&self) -> TimerToken {
        self.token
    }

    pub fn snapshot(&self) -> Option<WorkoutSnapshot> {
        self.active
            .as_ref()
            .map(|a| a.snapshot(self.phase, self.paused_from))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WorkoutSnapshot>> {
        self.notifier.subscribe()
    }

    pub fn events(&self) -> broadcast::Sender<WorkoutEvent> {
        self.notifier.events()
    }

    //
    // Commands
    //

    pub async fn start(&mut self, definition: WorkoutDefinition) -> Result<(), ControllerError> {
        self.require("start", matches!(self.phase, SessionPhase::Idle | SessionPhase::Completed))?;
        if definition.slots.is_empty() {
            return Err(ControllerError::EmptyWorkout(definition.name));
        }

        let session = Session::begin(&definition);
        let logged = vec![0; definition.slots.len()];
        self.launch(definition, session, 0, logged, true).await;
        Ok(())
    }

    /// Reopens a session that was saved mid-way, at its recorded resumption point.
    pub async fn resume_saved(&mut self, session_id: Uuid) -> Result<(), ControllerError> {
        self.require(
            "resume saved session",
            matches!(self.phase, SessionPhase::Idle | SessionPhase::Completed),
        )?;

        let not_resumable = |why: String| ControllerError::NotResumable(why);

        let mut session = self
            .store
            .find_session(session_id)
            .await
            .map_err(|e| not_resumable(e.to_string()))?
            .ok_or_else(|| not_resumable(format!("no session {session_id}")))?;

        if session.status != SessionStatus::SavedMidSession {
            return Err(not_resumable(format!("session is {}", session.status)));
        }

        let point = session
            .notes
            .as_deref()
            .and_then(ResumePoint::from_note)
            .ok_or_else(|| not_resumable("missing resumption note".into()))?;

        let definition = self
            .store
            .definition(session.workout_id)
            .await
            .map_err(|e| not_resumable(e.to_string()))?
            .ok_or_else(|| not_resumable(format!("workout `{}` no longer exists", session.workout_name)))?;

        if definition.slots.is_empty() {
            return Err(ControllerError::EmptyWorkout(definition.name));
        }

        let sets = self
            .store
            .sets_for_session(session.id)
            .await
            .map_err(|e| not_resumable(e.to_string()))?;
        let counts = sets.iter().counts_by(|s| s.slot_id);
        let logged: Vec<u32> = definition
            .slots
            .iter()
            .map(|slot| counts.get(&slot.id).copied().unwrap_or(0) as u32)
            .collect();

        let start = point.exercise_index.min(definition.slots.len() - 1);
        let unfinished = |i: &usize| logged[*i] < definition.slots[*i].target_sets;
        let index = (start..definition.slots.len())
            .find(unfinished)
            .or_else(|| (0..start).find(unfinished));

        session.status = SessionStatus::NotStarted;
        session.completed_at = None;
        session.notes = None;

        let Some(index) = index else {
            info!(session = %session.id, "every exercise already logged, completing saved workout");
            let last = definition.slots.len() - 1;
            self.launch(definition, session, last, logged, false).await;
            self.finish_workout().await;
            return Ok(());
        };

        info!(session = %session.id, resume = %point.summary, "resuming saved workout");
        self.launch(definition, session, index, logged, false).await;
        Ok(())
    }

    pub fn open_set_logger(&mut self) -> Result<(), ControllerError> {
        self.require("open set logger", self.phase == SessionPhase::Exercising)?;
        self.require_open_set()?;

        if let Some(a) = self.active.as_mut() {
            let weight = if a.set_number >= 2 {
                a.last_logged_weight.unwrap_or(a.suggested_weight)
            } else {
                a.suggested_weight
            };
            a.draft = Some(SetDraft {
                reps: a.slot().target_reps,
                weight,
            });
        }

        self.phase = SessionPhase::LoggingSet;
        self.publish();
        Ok(())
    }

    pub fn dismiss_set_logger(&mut self) -> Result<(), ControllerError> {
        self.require("dismiss set logger", self.phase == SessionPhase::LoggingSet)?;
        if self.has_pending_advance() {
            return Err(ControllerError::FeedbackPending);
        }

        if let Some(a) = self.active.as_mut() {
            a.draft = None;
        }
        self.phase = SessionPhase::Exercising;
        self.publish();
        Ok(())
    }

    pub async fn submit_set(&mut self, entry: SetEntry) -> Result<RecordOutcome, ControllerError> {
        self.require("submit set", self.phase == SessionPhase::LoggingSet)?;
        if self.has_pending_advance() {
            return Err(ControllerError::FeedbackPending);
        }
        entry.validate()?;
        self.require_open_set()?;

        let Some(a) = self.active.as_ref() else {
            return Err(self.invalid("submit set"));
        };
        let position = SetPosition {
            slot: a.slot(),
            set_number: a.set_number,
            target_sets: a.target_sets(),
            exercise_index: a.exercise_index,
            exercise_count: a.definition.slots.len(),
        };
        let outcome = self.recorder.record_set(a.session.id, position, entry).await;

        if !outcome.saved {
            self.persistence_failed("save set");
        }

        let is_record = outcome.is_personal_record();
        let advance = match (outcome.is_last_set, outcome.is_last_exercise) {
            (false, _) => Advance::Rest,
            (true, false) => Advance::NextExercise,
            (true, true) => Advance::Finish,
        };
        let delay = if is_record {
            self.timing.personal_record
        } else if outcome.is_last_set {
            self.timing.exercise_complete
        } else {
            self.timing.set_feedback
        };

        let exercise_name = outcome.set.exercise_name.clone();
        if let Some(a) = self.active.as_mut() {
            let idx = a.exercise_index;
            a.logged[idx] += 1;
            a.last_logged_weight = Some(entry.weight);
            a.suggested_weight = entry.weight;
            a.draft = None;
            a.pending = Some(PendingAdvance { advance, delay });
        }

        self.notifier.feedback(set_feedback(&outcome));
        self.notifier.emit(WorkoutEvent::SetLogged {
            exercise_name: exercise_name.clone(),
            set_number: outcome.set.set_number,
            reps: entry.reps,
            weight: entry.weight,
        });
        if let Some(pr) = &outcome.record {
            self.notifier.emit(WorkoutEvent::PersonalRecord {
                exercise_name: pr.exercise_name.clone(),
                weight: pr.weight,
                reps: pr.reps,
            });
        }
        if outcome.is_last_set {
            self.phase = SessionPhase::BetweenExercises;
            self.notifier
                .emit(WorkoutEvent::ExerciseCompleted { exercise_name });
        }

        self.scheduler
            .schedule(self.token, delay, DeferredTask::AdvanceAfterSet);

        debug!(
            set = outcome.set.set_number,
            record = is_record,
            last_set = outcome.is_last_set,
            "set submitted"
        );
        self.publish();
        Ok(outcome)
    }

    pub fn skip_rest(&mut self) -> Result<(), ControllerError> {
        self.require("skip rest", matches!(self.phase, SessionPhase::Resting { .. }))?;
        self.advance_set();
        self.publish();
        Ok(())
    }

    pub fn extend_rest(&mut self, seconds: u32) -> Result<(), ControllerError> {
        let SessionPhase::Resting { remaining } = self.phase else {
            return Err(self.invalid("extend rest"));
        };
        self.phase = SessionPhase::Resting {
            remaining: remaining.saturating_add(seconds),
        };
        self.publish();
        Ok(())
    }

    /// Allows one more set than the slot targets, for this session only.
    pub fn add_set(&mut self) -> Result<(), ControllerError> {
        self.require(
            "add set",
            matches!(self.phase, SessionPhase::Exercising | SessionPhase::Resting { .. }),
        )?;
        let exercising = self.phase == SessionPhase::Exercising;
        if let Some(a) = self.active.as_mut() {
            let idx = a.exercise_index;
            a.extra[idx] += 1;
            // Reopens a finished exercise on the new set.
            if exercising {
                a.set_number = a.logged[idx] + 1;
            }
        }
        self.publish();
        Ok(())
    }

    /// Past the last exercise this completes the workout.
    pub async fn next_exercise(&mut self) -> Result<(), ControllerError> {
        self.require(
            "next exercise",
            matches!(self.phase, SessionPhase::Exercising | SessionPhase::Resting { .. }),
        )?;
        let Some(a) = self.active.as_ref() else {
            return Err(self.invalid("next exercise"));
        };

        let next = a.exercise_index + 1;
        if next >= a.definition.slots.len() {
            self.finish_workout().await;
        } else {
            self.enter_exercise(next).await;
            self.publish();
        }
        Ok(())
    }

    /// No-op on the first exercise.
    pub async fn previous_exercise(&mut self) -> Result<(), ControllerError> {
        self.require(
            "previous exercise",
            matches!(self.phase, SessionPhase::Exercising | SessionPhase::Resting { .. }),
        )?;
        let Some(index) = self.exercise_index() else {
            return Err(self.invalid("previous exercise"));
        };

        if index > 0 {
            self.enter_exercise(index - 1).await;
            self.publish();
        }
        Ok(())
    }

    pub async fn pause_workout(&mut self) -> Result<(), ControllerError> {
        self.require("pause", self.phase.can_pause())?;

        self.stop_timers();
        self.paused_from = Some(self.phase);
        self.phase = SessionPhase::Paused;

        if let Some(a) = self.active.as_mut() {
            a.session.status = SessionStatus::Paused;
            a.session.elapsed_seconds = a.elapsed;
        }
        self.persist_session("pause").await;

        info!(elapsed = self.elapsed_seconds(), "workout paused");
        self.notifier.feedback(Feedback::Light);
        self.publish();
        Ok(())
    }

    pub async fn resume_workout(&mut self) -> Result<(), ControllerError> {
        self.require("resume", self.phase == SessionPhase::Paused)?;

        self.phase = self.paused_from.take().unwrap_or(SessionPhase::Exercising);
        if let Some(a) = self.active.as_mut() {
            a.session.status = SessionStatus::InProgress;
        }
        self.persist_session("resume").await;

        self.scheduler.start_ticker(self.token);
        // A set submitted just before pausing still owes its advance.
        if let Some(pending) = self.active.as_ref().and_then(|a| a.pending) {
            self.scheduler
                .schedule(self.token, pending.delay, DeferredTask::AdvanceAfterSet);
        }

        info!(phase = %self.phase, "workout resumed");
        self.notifier.feedback(Feedback::Light);
        self.publish();
        Ok(())
    }

    pub async fn complete_workout(&mut self) -> Result<(), ControllerError> {
        self.require(
            "complete workout",
            self.phase.is_active() && !matches!(self.phase, SessionPhase::Countdown { .. }),
        )?;
        self.finish_workout().await;
        Ok(())
    }

    /// Abandons the workout. Sets already logged stay in the store.
    pub async fn cancel_workout(&mut self) -> Result<(), ControllerError> {
        self.require("cancel", self.phase.is_active())?;
        self.stop_timers();

        let Some(mut active) = self.active.take() else {
            return Err(self.invalid("cancel"));
        };
        active.session.status = SessionStatus::Cancelled;

        info!(session = %active.session.id, "workout cancelled");
        self.close(active, WorkoutEvent::WorkoutCancelled).await;
        Ok(())
    }

    /// Ends the workout for now, recording where to pick it up again.
    pub async fn save_and_cancel_workout(&mut self) -> Result<(), ControllerError> {
        self.require("save and exit", self.phase.is_active())?;
        self.stop_timers();

        let Some(mut active) = self.active.take() else {
            return Err(self.invalid("save and exit"));
        };

        let point = ResumePoint::new(
            active.exercise_index,
            active.definition.slots.len(),
            active.logged[active.exercise_index],
        );
        let note = point.to_note().unwrap_or_else(|e| {
            warn!(error = %e, "could not encode resumption note");
            point.summary.clone()
        });

        active.session.completed_at = Some(Local::now());
        active.session.elapsed_seconds = active.elapsed;
        active.session.status = SessionStatus::SavedMidSession;
        active.session.notes = Some(note);

        info!(session = %active.session.id, resume = %point.summary, "workout saved for later");
        self.close(active, WorkoutEvent::WorkoutSaved { resume: point }).await;
        Ok(())
    }

    /// Leaves the completed screen.
    pub fn reset(&mut self) -> Result<(), ControllerError> {
        self.require("reset", self.phase == SessionPhase::Completed)?;
        self.active = None;
        self.phase = SessionPhase::Idle;
        self.notifier.finish();
        Ok(())
    }

    pub async fn handle_companion(&mut self, action: CompanionAction) -> Result<(), ControllerError> {
        debug!(?action, "companion action");
        match action {
            CompanionAction::SkipRest => self.skip_rest(),
            CompanionAction::ExtendRest { seconds } => self.extend_rest(seconds),
            CompanionAction::Pause => self.pause_workout().await,
            CompanionAction::Resume => self.resume_workout().await,
            CompanionAction::SkipExercise => self.next_exercise().await,
            CompanionAction::EndWorkout => self.complete_workout().await,
            CompanionAction::Resync => {
                let snapshot = self.snapshot();
                self.notifier.resync(snapshot);
                Ok(())
            }
        }
    }

    //
    // Timer entry points
    //

    /// One second passed. Ticks from an old token are ignored.
    pub async fn tick(&mut self, token: TimerToken) {
        if token != self.token || self.active.is_none() {
            debug!(?token, current = ?self.token, "stale tick ignored");
            return;
        }

        match self.phase {
            SessionPhase::Countdown { remaining } if remaining > 1 => {
                self.phase = SessionPhase::Countdown {
                    remaining: remaining - 1,
                };
                self.notifier.feedback(Feedback::Light);
            }
            SessionPhase::Countdown { .. } => self.begin().await,
            phase if phase.counts_elapsed() => {
                if let Some(a) = self.active.as_mut() {
                    a.elapsed += 1;
                }
                if let SessionPhase::Resting { remaining } = phase {
                    if remaining > 1 {
                        self.phase = SessionPhase::Resting {
                            remaining: remaining - 1,
                        };
                    } else {
                        self.notifier.feedback(Feedback::Medium);
                        self.advance_set();
                    }
                }
            }
            _ => return,
        }

        if let Some(snapshot) = self.snapshot() {
            self.notifier.tick(snapshot);
        }
    }

    /// A feedback delay elapsed.
    pub async fn run_deferred(&mut self, token: TimerToken, task: DeferredTask) {
        if token != self.token || !self.phase.is_active() || self.phase == SessionPhase::Paused {
            debug!(?task, "stale deferred task ignored");
            return;
        }
        let Some(pending) = self.active.as_mut().and_then(|a| a.pending.take()) else {
            return;
        };

        match pending.advance {
            Advance::Rest => {
                let rest = self.active.as_ref().map_or(0, |a| a.slot().rest_seconds);
                if rest == 0 {
                    self.advance_set();
                } else {
                    self.phase = SessionPhase::Resting { remaining: rest };
                }
            }
            Advance::NextExercise => {
                if let Some(index) = self.exercise_index() {
                    self.enter_exercise(index + 1).await;
                }
            }
            Advance::Finish => {
                self.finish_workout().await;
                return;
            }
        }
        self.publish();
    }

    //
    // Internals
    //

    async fn launch(
        &mut self,
        definition: WorkoutDefinition,
        session: Session,
        exercise_index: usize,
        logged: Vec<u32>,
        is_new: bool,
    ) {
        self.stop_timers();
        self.notifier.finish();
        self.paused_from = None;
        self.last_session = None;

        let saved = if is_new {
            self.store.insert_session(&session).await
        } else {
            self.store.update_session(&session).await
        };
        if let Err(e) = saved {
            warn!(session = %session.id, error = %e, "failed to persist session start");
            self.persistence_failed("start session");
        }
        if let Err(e) = self
            .store
            .set_workout_state(definition.id, WorkoutState::Active)
            .await
        {
            warn!(workout = %definition.name, error = %e, "failed to mark workout active");
        }
        if let Err(e) = self.health.start_session(ActivityKind::StrengthTraining) {
            warn!(error = %e, "health session did not start");
        }

        let suggested = self.suggest_weight(&definition.slots[exercise_index]).await;
        let slots = definition.slots.len();

        info!(workout = %definition.name, session = %session.id, "workout starting");
        let mut active = ActiveWorkout {
            set_number: 1,
            elapsed: session.elapsed_seconds,
            definition,
            session,
            exercise_index,
            logged,
            extra: vec![0; slots],
            suggested_weight: suggested,
            last_logged_weight: None,
            draft: None,
            pending: None,
        };
        active.set_number = active.entry_set_number();
        self.active = Some(active);
        self.phase = SessionPhase::Countdown {
            remaining: self.timing.countdown_ticks.max(1),
        };

        self.scheduler.start_ticker(self.token);
        self.notifier.feedback(Feedback::Light);
        self.publish();
    }

    /// Countdown finished.
    async fn begin(&mut self) {
        self.phase = SessionPhase::Exercising;
        let Some(a) = self.active.as_mut() else {
            return;
        };
        a.session.status = SessionStatus::InProgress;
        let workout_name = a.definition.name.clone();
        self.persist_session("begin").await;

        self.notifier.feedback(Feedback::Heavy);
        if let Some(snapshot) = self.snapshot() {
            self.notifier.start_live(&snapshot);
        }
        self.notifier
            .emit(WorkoutEvent::WorkoutStarted { workout_name });
    }

    fn advance_set(&mut self) {
        let Some(a) = self.active.as_mut() else {
            return;
        };
        a.set_number += 1;
        a.draft = None;
        let event = WorkoutEvent::SetAdvanced {
            exercise_index: a.exercise_index,
            set_number: a.set_number,
        };
        self.phase = SessionPhase::Exercising;
        self.notifier.emit(event);
    }

    async fn enter_exercise(&mut self, index: usize) {
        let Some(slot) = self
            .active
            .as_ref()
            .and_then(|a| a.definition.slot(index).cloned())
        else {
            return;
        };
        let suggested = self.suggest_weight(&slot).await;

        let Some(a) = self.active.as_mut() else {
            return;
        };
        a.exercise_index = index;
        a.set_number = a.entry_set_number();
        a.suggested_weight = suggested;
        a.last_logged_weight = None;
        a.draft = None;
        a.pending = None;
        let event = WorkoutEvent::SetAdvanced {
            exercise_index: index,
            set_number: a.set_number,
        };

        self.phase = SessionPhase::Exercising;
        self.notifier.feedback(Feedback::Medium);
        self.notifier.emit(event);
    }

    async fn finish_workout(&mut self) {
        self.stop_timers();
        self.paused_from = None;

        let Some(a) = self.active.as_mut() else {
            return;
        };
        a.pending = None;
        a.draft = None;
        a.session.completed_at = Some(Local::now());
        a.session.elapsed_seconds = a.elapsed;
        a.session.status = SessionStatus::Completed;
        let session = a.session.clone();
        let workout_id = a.definition.id;

        self.phase = SessionPhase::Completed;
        self.persist_session("complete").await;
        if let Err(e) = self
            .store
            .set_workout_state(workout_id, WorkoutState::Completed)
            .await
        {
            warn!(error = %e, "failed to mark workout completed");
        }
        if let Err(e) = self.health.end_session() {
            warn!(error = %e, "health session did not end cleanly");
        }

        info!(session = %session.id, elapsed = session.elapsed_seconds, "workout completed");
        self.notifier.feedback(Feedback::Success);
        self.notifier.emit(WorkoutEvent::WorkoutCompleted {
            elapsed_seconds: session.elapsed_seconds,
        });
        self.publish();
        self.notifier.end_live();

        match self.store.completed_sessions().await {
            Ok(done) => self.achievements.evaluate(&done),
            Err(e) => warn!(error = %e, "skipping achievement evaluation"),
        }
        self.last_session = Some(session);
    }

    /// Shared tail of cancel and save-and-exit: persist, notify, back to idle.
    async fn close(&mut self, active: ActiveWorkout, event: WorkoutEvent) {
        self.phase = SessionPhase::Idle;
        self.paused_from = None;

        if let Err(e) = self.store.update_session(&active.session).await {
            warn!(session = %active.session.id, error = %e, "failed to persist session end");
            self.persistence_failed("end session");
        }
        if let Err(e) = self
            .store
            .set_workout_state(active.definition.id, WorkoutState::Inactive)
            .await
        {
            warn!(error = %e, "failed to reset workout state");
        }
        if let Err(e) = self.health.end_session() {
            warn!(error = %e, "health session did not end cleanly");
        }

        self.notifier.feedback(Feedback::Warning);
        self.notifier.emit(event);
        self.notifier.finish();
        self.last_session = Some(active.session);
    }

    /// Last weight logged for the exercise anywhere, else the slot target, else zero.
    async fn suggest_weight(&self, slot: &ExerciseSlot) -> f64 {
        let fallback = slot.target_weight.unwrap_or(0.0);
        match self.store.last_weight(&slot.exercise_name).await {
            Ok(Some(w)) => w,
            Ok(None) => fallback,
            Err(e) => {
                warn!(exercise = %slot.exercise_name, error = %e, "could not read weight history");
                fallback
            }
        }
    }

    async fn persist_session(&mut self, operation: &str) {
        let Some(session) = self.active.as_ref().map(|a| a.session.clone()) else {
            return;
        };
        if let Err(e) = self.store.update_session(&session).await {
            warn!(session = %session.id, operation, error = %e, "failed to persist session");
            self.persistence_failed(operation);
        }
    }

    fn persistence_failed(&self, operation: &str) {
        self.notifier.emit(WorkoutEvent::PersistenceFailed {
            operation: operation.to_string(),
        });
    }

    /// Stops every timer and invalidates anything already in flight.
    fn stop_timers(&mut self) {
        self.scheduler.stop_ticker();
        self.scheduler.cancel_pending();
        self.token = self.token.next();
    }

    fn publish(&mut self) {
        if let Some(snapshot) = self.snapshot() {
            self.notifier.publish(snapshot);
        }
    }

    fn invalid(&self, command: &'static str) -> ControllerError {
        ControllerError::InvalidPhase {
            command,
            phase: self.phase,
        }
    }

    fn require_open_set(&self) -> Result<(), ControllerError> {
        match self.active.as_ref() {
            Some(a) if a.is_exercise_done() || a.set_number > a.target_sets() => {
                Err(ControllerError::ExerciseComplete {
                    exercise: a.slot().exercise_name.clone(),
                    sets: a.target_sets(),
                })
            }
            _ => Ok(()),
        }
    }

    fn require(&self, command: &'static str, allowed: bool) -> Result<(), ControllerError> {
        if allowed { Ok(()) } else { Err(self.invalid(command)) }
    }
}
