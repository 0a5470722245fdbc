//! Runs a [`SessionController`] on its own task.
//!
//! The task owns the controller outright. Commands arrive over an mpsc
//! channel, timer events over another, and a single `select!` loop applies
//! them one at a time, so no two transitions ever interleave.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{CompanionAction, Collaborators};
use crate::error::{ControllerError, SessionError};
use crate::models::WorkoutDefinition;
use crate::session::controller::{SessionController, Timing};
use crate::session::notifier::WorkoutEvent;
use crate::session::recorder::SetEntry;
use crate::session::timer::{TimerEvent, TokioScheduler};
use crate::session::WorkoutSnapshot;
use crate::storage::WorkoutStore;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(WorkoutDefinition),
    ResumeSaved(Uuid),
    OpenSetLogger,
    DismissSetLogger,
    SubmitSet(SetEntry),
    SkipRest,
    ExtendRest(u32),
    AddSet,
    NextExercise,
    PreviousExercise,
    Pause,
    Resume,
    Complete,
    Cancel,
    SaveAndExit,
    Reset,
    Companion(CompanionAction),
}

struct Message {
    command: Command,
    reply: Option<oneshot::Sender<Result<(), ControllerError>>>,
}

/// Cheap, cloneable access to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Message>,
    snapshots: watch::Receiver<Option<WorkoutSnapshot>>,
    events: broadcast::Sender<WorkoutEvent>,
}

impl SessionHandle {
    /// Applies `command` and waits for the controller's verdict.
    pub async fn execute(&self, command: Command) -> Result<(), SessionError> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(Message {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| SessionError::Closed)?;

        verdict.await.map_err(|_| SessionError::Closed)?.map_err(SessionError::from)
    }

    /// Queues `command` without waiting. Rejections are only logged.
    pub fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .try_send(Message {
                command,
                reply: None,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionError::Busy,
                TrySendError::Closed(_) => SessionError::Closed,
            })
    }

    pub fn snapshots(&self) -> watch::Receiver<Option<WorkoutSnapshot>> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> Option<WorkoutSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn events(&self) -> broadcast::Receiver<WorkoutEvent> {
        self.events.subscribe()
    }
}

/// Starts the session task and wires companion actions into it.
pub fn spawn(
    store: Arc<dyn WorkoutStore>,
    collaborators: Collaborators,
    timing: Timing,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let controller = SessionController::new(
        store,
        &collaborators,
        Box::new(TokioScheduler::new(timer_tx)),
        timing,
    );

    let handle = SessionHandle {
        commands: commands_tx,
        snapshots: controller.subscribe(),
        events: controller.events(),
    };

    let inbound = handle.clone();
    collaborators
        .companion
        .register_inbound(Arc::new(move |action| {
            match inbound.send(Command::Companion(action)) {
                Ok(()) => {}
                Err(SessionError::Busy) => {
                    warn!(?action, "command queue full, dropping companion action")
                }
                Err(_) => debug!(?action, "session task gone, dropping companion action"),
            }
        }));

    let task = tokio::spawn(run(controller, commands_rx, timer_rx));
    (handle, task)
}

async fn run(
    mut controller: SessionController,
    mut commands: mpsc::Receiver<Message>,
    mut timers: mpsc::UnboundedReceiver<TimerEvent>,
) {
    loop {
        tokio::select! {
            message = commands.recv() => {
                let Some(Message { command, reply }) = message else {
                    break;
                };
                let result = dispatch(&mut controller, command).await;
                if let Err(e) = &result {
                    debug!(error = %e, "command rejected");
                }
                if let Some(reply) = reply {
                    // The caller may have given up waiting.
                    let _ = reply.send(result);
                }
            }
            Some(event) = timers.recv() => match event {
                TimerEvent::Tick(token) => controller.tick(token).await,
                TimerEvent::Deferred(token, task) => controller.run_deferred(token, task).await,
            },
        }
    }

    info!("session task stopped");
}

async fn dispatch(
    controller: &mut SessionController,
    command: Command,
) -> Result<(), ControllerError> {
    match command {
        Command::Start(definition) => controller.start(definition).await,
        Command::ResumeSaved(id) => controller.resume_saved(id).await,
        Command::OpenSetLogger => controller.open_set_logger(),
        Command::DismissSetLogger => controller.dismiss_set_logger(),
        Command::SubmitSet(entry) => controller.submit_set(entry).await.map(|_| ()),
        Command::SkipRest => controller.skip_rest(),
        Command::ExtendRest(seconds) => controller.extend_rest(seconds),
        Command::AddSet => controller.add_set(),
        Command::NextExercise => controller.next_exercise().await,
        Command::PreviousExercise => controller.previous_exercise().await,
        Command::Pause => controller.pause_workout().await,
        Command::Resume => controller.resume_workout().await,
        Command::Complete => controller.complete_workout().await,
        Command::Cancel => controller.cancel_workout().await,
        Command::SaveAndExit => controller.save_and_cancel_workout().await,
        Command::Reset => controller.reset(),
        Command::Companion(action) => controller.handle_companion(action).await,
    }
}
