//! The workout execution core: phase machine, set recording and progress fan-out.

pub mod controller;
pub mod notifier;
pub mod phase;
pub mod recorder;
pub mod runtime;
pub mod timer;

pub use controller::{SessionController, SetDraft, Timing};
pub use notifier::{ProgressNotifier, WorkoutEvent};
pub use phase::{ResumePoint, SessionPhase, WorkoutSnapshot};
pub use recorder::{RecordOutcome, SetEntry, SetRecorder};
pub use runtime::{Command, SessionHandle, spawn};
pub use timer::{DeferredTask, ManualScheduler, Scheduler, TimerEvent, TimerToken, TokioScheduler};
