//! Timer plumbing for the session controller.
//!
//! The controller never sleeps. It asks a [`Scheduler`] for a one-second
//! ticker and for one-shot deferred tasks, and receives them back through
//! [`SessionController::tick`](super::SessionController::tick) and
//! [`SessionController::run_deferred`](super::SessionController::run_deferred).
//! Every request carries the [`TimerToken`] current at the time of the request,
//! so anything delivered after the token moved on is ignored.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

/// Monotonic generation of the controller's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// One-shot work the controller defers until a feedback delay has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Move on after a logged set: rest, next exercise, or finish.
    AdvanceAfterSet,
}

/// Timer event delivered back into the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick(TimerToken),
    Deferred(TimerToken, DeferredTask),
}

pub trait Scheduler: Send + Sync {
    /// Starts (or restarts) the one-second ticker. Any previous ticker stops.
    fn start_ticker(&mut self, token: TimerToken);

    fn stop_ticker(&mut self);

    fn schedule(&mut self, token: TimerToken, delay: Duration, task: DeferredTask);

    /// Drops every deferred task that has not fired yet.
    fn cancel_pending(&mut self);
}

const TICK: Duration = Duration::from_secs(1);

/// Scheduler backed by tokio tasks that post [`TimerEvent`]s into a channel.
pub struct TokioScheduler {
    events: UnboundedSender<TimerEvent>,
    ticker: Option<JoinHandle<()>>,
    pending: Vec<JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: UnboundedSender<TimerEvent>) -> Self {
        Self {
            events,
            ticker: None,
            pending: Vec::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start_ticker(&mut self, token: TimerToken) {
        self.stop_ticker();

        let events = self.events.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + TICK, TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if events.send(TimerEvent::Tick(token)).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn schedule(&mut self, token: TimerToken, delay: Duration, task: DeferredTask) {
        self.pending.retain(|h| !h.is_finished());

        let events = self.events.clone();
        self.pending.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop may already be gone; nothing left to do then.
            let _ = events.send(TimerEvent::Deferred(token, task));
        }));
    }

    fn cancel_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "cancelling deferred tasks");
        }
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.stop_ticker();
        self.cancel_pending();
    }
}

/// A deferred task recorded by [`ManualScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub token: TimerToken,
    pub delay: Duration,
    pub task: DeferredTask,
}

#[derive(Debug, Default)]
struct ManualState {
    ticker: Option<TimerToken>,
    pending: Vec<ScheduledTask>,
}

/// Scheduler that only records requests; the caller drives time by hand.
/// Clones share the same state, so a test can keep one clone and give the
/// other to the controller.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the running ticker, if any.
    pub fn ticker(&self) -> Option<TimerToken> {
        self.lock().ticker
    }

    pub fn pending(&self) -> Vec<ScheduledTask> {
        self.lock().pending.clone()
    }

    /// Removes and returns the pending tasks, as if their delays had elapsed.
    pub fn take_pending(&self) -> Vec<ScheduledTask> {
        std::mem::take(&mut self.lock().pending)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn start_ticker(&mut self, token: TimerToken) {
        self.lock().ticker = Some(token);
    }

    fn stop_ticker(&mut self) {
        self.lock().ticker = None;
    }

    fn schedule(&mut self, token: TimerToken, delay: Duration, task: DeferredTask) {
        self.lock().pending.push(ScheduledTask { token, delay, task });
    }

    fn cancel_pending(&mut self) {
        self.lock().pending.clear();
    }
}
