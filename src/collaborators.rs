//! Capabilities the workout core consumes but does not own.
//!
//! The composition root constructs these and hands `Arc`s to the controller.
//! None of them may block, and none of their failures abort a workout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::CollaboratorError;
use crate::models::Session;
use crate::session::WorkoutSnapshot;

/// Control action sent by the companion device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum CompanionAction {
    SkipRest,
    ExtendRest { seconds: u32 },
    Pause,
    Resume,
    SkipExercise,
    EndWorkout,
    /// The companion app relaunched and needs the current state again.
    Resync,
}

pub type InboundHandler = Arc<dyn Fn(CompanionAction) + Send + Sync>;

/// Best-effort link to the paired device. Delivery is never acknowledged.
pub trait CompanionChannel: Send + Sync {
    fn send_snapshot(&self, snapshot: &WorkoutSnapshot);

    fn send_event(&self, name: &str, payload: Value);

    fn register_inbound(&self, handler: InboundHandler);
}

/// Push-only progress display outside the app (lock screen and the like).
pub trait LiveStatus: Send + Sync {
    fn start(&self, snapshot: &WorkoutSnapshot);

    fn update(&self, snapshot: &WorkoutSnapshot);

    fn end(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feedback {
    Light,
    Medium,
    Heavy,
    Success,
    Warning,
    Error,
}

/// Haptic and sound feedback. The implementation owns the user's on/off preference.
pub trait Haptics: Send + Sync {
    fn feedback(&self, kind: Feedback);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    StrengthTraining,
}

/// Wearable workout session (auto-launches the companion app).
pub trait HealthSession: Send + Sync {
    fn start_session(&self, kind: ActivityKind) -> Result<(), CollaboratorError>;

    fn end_session(&self) -> Result<(), CollaboratorError>;
}

/// Evaluates unlocked achievements after a workout completes.
pub trait AchievementEvaluator: Send + Sync {
    fn evaluate(&self, completed: &[Session]);
}

/// The full set of collaborators a controller needs.
#[derive(Clone)]
pub struct Collaborators {
    pub companion: Arc<dyn CompanionChannel>,
    pub live_status: Arc<dyn LiveStatus>,
    pub haptics: Arc<dyn Haptics>,
    pub health: Arc<dyn HealthSession>,
    pub achievements: Arc<dyn AchievementEvaluator>,
}

impl Collaborators {
    /// Every collaborator set to [`Noop`].
    pub fn noop() -> Self {
        let noop = Arc::new(Noop);
        Self {
            companion: noop.clone(),
            live_status: noop.clone(),
            haptics: noop.clone(),
            health: noop.clone(),
            achievements: noop,
        }
    }
}

/// Stand-in for hosts without a companion device, live status or wearable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl CompanionChannel for Noop {
    fn send_snapshot(&self, _snapshot: &WorkoutSnapshot) {}

    fn send_event(&self, name: &str, _payload: Value) {
        debug!(event = name, "no companion paired");
    }

    fn register_inbound(&self, _handler: InboundHandler) {}
}

impl LiveStatus for Noop {
    fn start(&self, _snapshot: &WorkoutSnapshot) {}

    fn update(&self, _snapshot: &WorkoutSnapshot) {}

    fn end(&self) {}
}

impl Haptics for Noop {
    fn feedback(&self, _kind: Feedback) {}
}

impl HealthSession for Noop {
    fn start_session(&self, _kind: ActivityKind) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn end_session(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

impl AchievementEvaluator for Noop {
    fn evaluate(&self, completed: &[Session]) {
        debug!(sessions = completed.len(), "achievement evaluation skipped");
    }
}
