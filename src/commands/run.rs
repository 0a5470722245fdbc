use std::io::Write;
use std::mem::discriminant;
use std::sync::Arc;

use anyhow::{Result, bail};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use uuid::Uuid;

use repline::collaborators::{AchievementEvaluator, Collaborators, Feedback, Haptics, LiveStatus};
use repline::config::Config;
use repline::error::SessionError;
use repline::models::{Session, SessionStatus};
use repline::session::{self, Command, SessionHandle, SessionPhase, SetEntry, WorkoutEvent, WorkoutSnapshot};
use repline::storage::WorkoutStore;
use repline::utils::{format_duration, format_weight};

use crate::commands::program;

const HELP: &str = "\
  <reps> <weight> [effort]  log a set
  l  open the set logger     d  dismiss it
  s  skip rest               +N extend rest by N seconds
  a  add a set               n / b  next / previous exercise
  p  pause                   r  resume
  f  finish workout          c  cancel
  x  save and exit           ?  this help";

/// Rings the terminal bell for the heavier feedback kinds.
struct TerminalHaptics {
    enabled: bool,
}

impl Haptics for TerminalHaptics {
    fn feedback(&self, kind: Feedback) {
        debug!(?kind, "feedback");
        if self.enabled && matches!(kind, Feedback::Heavy | Feedback::Success | Feedback::Error) {
            eprint!("\x07");
        }
    }
}

/// Mirrors progress into the terminal window title.
struct TitleStatus;

impl TitleStatus {
    fn set_title(title: &str) {
        let mut err = std::io::stderr();
        let _ = write!(err, "\x1b]0;{title}\x07");
        let _ = err.flush();
    }
}

impl LiveStatus for TitleStatus {
    fn start(&self, snapshot: &WorkoutSnapshot) {
        Self::set_title(&snapshot.workout_name);
    }

    fn update(&self, snapshot: &WorkoutSnapshot) {
        Self::set_title(&format!(
            "{} · {} {}/{} · {}",
            snapshot.workout_name,
            snapshot.exercise_name,
            snapshot.set_number,
            snapshot.total_sets,
            format_duration(snapshot.elapsed_seconds)
        ));
    }

    fn end(&self) {
        Self::set_title("repline");
    }
}

/// Announces round-number workout counts.
struct Milestones;

impl AchievementEvaluator for Milestones {
    fn evaluate(&self, completed: &[Session]) {
        let n = completed.len();
        if n == 1 || n % 10 == 0 {
            println!("{} workout #{} in the books", "achievement:".magenta().bold(), n);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Input {
    Log(SetEntry),
    Open,
    Dismiss,
    SkipRest,
    ExtendRest(u32),
    AddSet,
    Next,
    Previous,
    Pause,
    Resume,
    Finish,
    Cancel,
    SaveAndExit,
    Help,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let input = match line {
        "l" => Input::Open,
        "d" => Input::Dismiss,
        "s" => Input::SkipRest,
        "a" => Input::AddSet,
        "n" => Input::Next,
        "b" => Input::Previous,
        "p" => Input::Pause,
        "r" => Input::Resume,
        "f" => Input::Finish,
        "c" => Input::Cancel,
        "x" => Input::SaveAndExit,
        "?" | "h" | "help" => Input::Help,
        _ if line.starts_with('+') => Input::ExtendRest(
            line[1..]
                .parse()
                .map_err(|_| format!("`{line}` is not a number of seconds"))?,
        ),
        _ => {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let (reps, weight, effort) = match parts.as_slice() {
                [reps, weight] => (reps, weight, None),
                [reps, weight, effort] => (reps, weight, Some(effort)),
                _ => return Err(format!("unrecognised input `{line}` (? for help)")),
            };
            let reps = reps.parse().map_err(|_| format!("bad reps `{reps}`"))?;
            let weight = weight
                .trim_end_matches("kg")
                .parse()
                .map_err(|_| format!("bad weight `{weight}`"))?;
            let mut entry = SetEntry::new(reps, weight);
            if let Some(e) = effort {
                entry = entry.with_effort(e.parse().map_err(|_| format!("bad effort `{e}`"))?);
            }
            Input::Log(entry)
        }
    };
    Ok(input)
}

fn to_command(input: Input) -> Option<Command> {
    Some(match input {
        Input::Log(entry) => Command::SubmitSet(entry),
        Input::Open => Command::OpenSetLogger,
        Input::Dismiss => Command::DismissSetLogger,
        Input::SkipRest => Command::SkipRest,
        Input::ExtendRest(s) => Command::ExtendRest(s),
        Input::AddSet => Command::AddSet,
        Input::Next => Command::NextExercise,
        Input::Previous => Command::PreviousExercise,
        Input::Pause => Command::Pause,
        Input::Resume => Command::Resume,
        Input::Finish => Command::Complete,
        Input::Cancel => Command::Cancel,
        Input::SaveAndExit => Command::SaveAndExit,
        Input::Help => return None,
    })
}

fn render(s: &WorkoutSnapshot) -> String {
    let progress = format!("[{}/{}]", s.exercise_index + 1, s.exercise_count).dimmed();
    match s.phase {
        SessionPhase::Countdown { remaining } => {
            format!("{} starting in {}…", s.workout_name.bold(), remaining)
        }
        SessionPhase::Exercising if s.exercise_complete => format!(
            "{} {} – all {} sets done (a: add a set, n/b: move on)",
            progress,
            s.exercise_name.green(),
            s.total_sets
        ),
        SessionPhase::Exercising => {
            let weight = s.target_weight.map(format_weight).unwrap_or_else(|| "-".into());
            format!(
                "{} {} – set {}/{} • {} x {}",
                progress,
                s.exercise_name.bold(),
                s.set_number,
                s.total_sets,
                s.target_reps,
                weight
            )
        }
        SessionPhase::LoggingSet => format!("{} log set {}: <reps> <weight> [effort]", progress, s.set_number),
        SessionPhase::Resting { remaining } => format!("{} rest {}s", progress, remaining.to_string().cyan()),
        SessionPhase::BetweenExercises => format!("{} {} done", progress, s.exercise_name.green()),
        SessionPhase::Paused => format!("{} (r to resume)", "paused".yellow().bold()),
        SessionPhase::Completed => format!(
            "{} {} in {}",
            "done:".green().bold(),
            s.workout_name,
            format_duration(s.elapsed_seconds)
        ),
        SessionPhase::Idle => String::new(),
    }
}

/// Skips per-second noise: elapsed ticks and most rest seconds.
fn worth_printing(prev: Option<&WorkoutSnapshot>, next: &WorkoutSnapshot) -> bool {
    let Some(prev) = prev else {
        return true;
    };
    if discriminant(&prev.phase) != discriminant(&next.phase)
        || prev.exercise_index != next.exercise_index
        || prev.set_number != next.set_number
        || prev.total_sets != next.total_sets
        || prev.exercise_complete != next.exercise_complete
    {
        return true;
    }
    match next.phase {
        SessionPhase::Countdown { .. } => prev.phase != next.phase,
        SessionPhase::Resting { remaining } => {
            prev.phase != next.phase && (remaining % 15 == 0 || remaining <= 3)
        }
        _ => false,
    }
}

fn print_event(event: &WorkoutEvent) {
    match event {
        WorkoutEvent::SetLogged { set_number, reps, weight, .. } => {
            println!("  set {} logged: {} x {}", set_number, reps, format_weight(*weight));
        }
        WorkoutEvent::PersonalRecord { exercise_name, weight, reps } => println!(
            "{} {} {} x {}",
            "new PR:".yellow().bold(),
            exercise_name,
            format_weight(*weight),
            reps
        ),
        WorkoutEvent::WorkoutSaved { resume } => {
            println!("{} saved at {}", "info:".blue().bold(), resume.summary);
        }
        WorkoutEvent::WorkoutCancelled => println!("{} workout cancelled", "info:".blue().bold()),
        WorkoutEvent::PersistenceFailed { operation } => println!(
            "{} could not save ({}), continuing",
            "warning:".yellow().bold(),
            operation
        ),
        _ => {}
    }
}

pub async fn start(store: Arc<dyn WorkoutStore>, config: &Config, program: &str) -> Result<()> {
    let Some(def) = program::resolve(store.as_ref(), program).await? else {
        bail!("no program `{program}`");
    };
    drive(store, config, Command::Start(def)).await
}

pub async fn resume(store: Arc<dyn WorkoutStore>, config: &Config, session: &str) -> Result<()> {
    let id = Uuid::parse_str(session)?;
    drive(store.clone(), config, Command::ResumeSaved(id)).await?;

    if let Some(s) = store.find_session(id).await? {
        if s.status == SessionStatus::Completed {
            println!("{} resumed session finished", "ok:".green().bold());
        }
    }
    Ok(())
}

async fn drive(store: Arc<dyn WorkoutStore>, config: &Config, first: Command) -> Result<()> {
    let collaborators = Collaborators {
        live_status: Arc::new(TitleStatus),
        haptics: Arc::new(TerminalHaptics {
            enabled: config.haptics,
        }),
        achievements: Arc::new(Milestones),
        ..Collaborators::noop()
    };
    let (handle, task) = session::spawn(store, collaborators, config.timing());

    let mut events = handle.events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    handle.execute(first).await?;
    println!("{}", "? for help".dimmed());

    let result = interact(&handle).await;

    task.abort();
    printer.abort();
    result
}

async fn interact(handle: &SessionHandle) -> Result<()> {
    let mut snapshots = handle.snapshots();
    let mut shown: Option<WorkoutSnapshot> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = snapshots.borrow_and_update().clone();
                let Some(snapshot) = current else {
                    // Cancelled or saved.
                    return Ok(());
                };
                if worth_printing(shown.as_ref(), &snapshot) {
                    println!("{}", render(&snapshot));
                }
                let done = snapshot.phase == SessionPhase::Completed;
                shown = Some(snapshot);
                if done {
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // Keep the work on EOF rather than dropping it.
                    let _ = handle.execute(Command::SaveAndExit).await;
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                let input = match parse_input(&line) {
                    Ok(input) => input,
                    Err(msg) => {
                        println!("{} {}", "error:".red().bold(), msg);
                        continue;
                    }
                };
                let Some(command) = to_command(input) else {
                    println!("{HELP}");
                    continue;
                };
                if let Err(e) = submit(handle, command).await {
                    println!("{} {}", "error:".red().bold(), e);
                }
            }
        }
    }
}

/// Typing a set straight from the exercise screen opens the logger first.
async fn submit(handle: &SessionHandle, command: Command) -> Result<(), SessionError> {
    let exercising = handle
        .current()
        .is_some_and(|s| s.phase == SessionPhase::Exercising);
    if exercising && matches!(command, Command::SubmitSet(_)) {
        handle.execute(Command::OpenSetLogger).await?;
    }
    handle.execute(command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_entries() {
        assert_eq!(parse_input("5 100").unwrap(), Input::Log(SetEntry::new(5, 100.0)));
        assert_eq!(
            parse_input(" 3 82.5kg 9 ").unwrap(),
            Input::Log(SetEntry::new(3, 82.5).with_effort(9))
        );
        assert!(parse_input("five 100").is_err());
        assert!(parse_input("5").is_err());
    }

    #[test]
    fn test_parse_short_commands() {
        assert_eq!(parse_input("s").unwrap(), Input::SkipRest);
        assert_eq!(parse_input("+30").unwrap(), Input::ExtendRest(30));
        assert_eq!(parse_input("x").unwrap(), Input::SaveAndExit);
        assert!(parse_input("+abc").is_err());
        assert_eq!(to_command(Input::Help), None);
    }

    fn snap(phase: SessionPhase) -> WorkoutSnapshot {
        WorkoutSnapshot {
            workout_name: "Legs".into(),
            exercise_name: "Squat".into(),
            exercise_index: 0,
            exercise_count: 2,
            set_number: 1,
            total_sets: 3,
            exercise_complete: false,
            target_weight: Some(100.0),
            target_reps: 5,
            phase,
            is_resting: phase.rest_remaining().is_some(),
            rest_remaining: phase.rest_remaining(),
            countdown_remaining: phase.countdown_remaining(),
            elapsed_seconds: 0,
            is_paused: false,
        }
    }

    #[test]
    fn test_only_meaningful_changes_print() {
        let ex = snap(SessionPhase::Exercising);
        let mut later = ex.clone();
        later.elapsed_seconds = 9;
        assert!(!worth_printing(Some(&ex), &later));

        let r44 = snap(SessionPhase::Resting { remaining: 44 });
        let r45 = snap(SessionPhase::Resting { remaining: 45 });
        let r3 = snap(SessionPhase::Resting { remaining: 3 });
        assert!(worth_printing(Some(&ex), &r45));
        assert!(!worth_printing(Some(&r45), &r44));
        assert!(worth_printing(Some(&r44), &r3));
    }

    #[test]
    fn test_finished_exercise_offers_a_way_on() {
        let mut done = snap(SessionPhase::Exercising);
        done.set_number = 3;
        done.exercise_complete = true;

        let line = render(&done);
        assert!(line.contains("all 3 sets done"));
        assert!(worth_printing(Some(&snap(SessionPhase::Exercising)), &done));
    }
}
