mod common;

use common::{Harness, three_by_three};
use repline::collaborators::{CompanionAction, Feedback};
use repline::error::ControllerError;
use repline::models::{CompletedSet, SessionStatus, WorkoutDefinition, WorkoutState};
use repline::session::{ResumePoint, SessionPhase, SetEntry};
use repline::storage::{MemoryStore, WorkoutStore};

use chrono::Local;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_full_workout_runs_to_completion() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;

    h.controller.start(def.clone()).await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Countdown { remaining: 3 });
    assert_eq!(h.controller.session().unwrap().status, SessionStatus::NotStarted);

    h.tick(3).await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.session().unwrap().status, SessionStatus::InProgress);
    assert_eq!(h.controller.elapsed_seconds(), 0);

    for exercise in 0..3 {
        for set in 1..=3 {
            assert_eq!(h.controller.exercise_index(), Some(exercise));
            assert_eq!(h.controller.set_number(), Some(set));
            h.controller.open_set_logger().unwrap();
            h.controller.submit_set(SetEntry::new(5, 50.0)).await.unwrap();
            h.fire_deferred().await;

            if set < 3 {
                assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 45 });
                h.tick(45).await;
                assert_eq!(h.controller.phase(), SessionPhase::Exercising);
            }
        }
    }

    assert_eq!(h.controller.phase(), SessionPhase::Completed);
    let session = h.controller.session().unwrap().clone();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());
    // Six rests of 45 seconds.
    assert_eq!(session.elapsed_seconds, 270);

    let stored = h.store.session(session.id).unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(h.store.sets().len(), 9);
    assert_eq!(h.store.workout_state(def.id), Some(WorkoutState::Completed));

    assert_eq!(*h.fakes.live.starts.lock().unwrap(), 1);
    assert_eq!(*h.fakes.live.ends.lock().unwrap(), 1);
    assert_eq!(*h.fakes.health.starts.lock().unwrap(), 1);
    assert_eq!(*h.fakes.health.ends.lock().unwrap(), 1);
    assert_eq!(*h.fakes.achievements.calls.lock().unwrap(), vec![1]);
    assert!(h.fakes.companion.event_names().contains(&"workoutCompleted".to_string()));
}

#[tokio::test]
async fn test_personal_record_only_when_strictly_heavier() {
    let def = three_by_three();
    let store = Arc::new(MemoryStore::new());
    let earlier = CompletedSet {
        id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
        slot_id: def.slots[0].id,
        exercise_name: "Squat".into(),
        set_number: 1,
        reps: 5,
        weight: 100.0,
        effort: None,
        completed_at: Local::now() - chrono::Duration::days(3),
    };
    store.save_set(&earlier, None).await.unwrap();

    let mut h = Harness::with_store(&def, store).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    let tie = h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    assert!(!tie.is_personal_record());
    h.fire_deferred().await;
    h.controller.skip_rest().unwrap();

    h.controller.open_set_logger().unwrap();
    let heavier = h.controller.submit_set(SetEntry::new(3, 105.0)).await.unwrap();
    assert!(heavier.is_personal_record());
    assert_eq!(h.fakes.haptics.last(), Some(Feedback::Success));

    let pr = h.store.record("Squat").unwrap();
    assert_eq!(pr.weight, 105.0);
    assert_eq!(pr.reps, 3);
    assert!(h.fakes.companion.event_names().contains(&"personalRecord".to_string()));
}

#[tokio::test]
async fn test_pause_during_rest_keeps_remaining_seconds() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.log_set(5, 100.0).await;
    h.tick(15).await;
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 30 });
    let elapsed = h.controller.elapsed_seconds();
    let before_pause = h.controller.timer_token();

    h.controller.pause_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Paused);
    assert_eq!(h.controller.session().unwrap().status, SessionStatus::Paused);
    assert_eq!(h.scheduler.ticker(), None);

    let snap = h.controller.snapshot().unwrap();
    assert!(snap.is_paused);
    assert_eq!(snap.rest_remaining, Some(30));

    // A tick already in flight when pausing must not count.
    h.controller.tick(before_pause).await;
    assert_eq!(h.controller.elapsed_seconds(), elapsed);

    h.controller.resume_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 30 });
    assert_eq!(h.controller.session().unwrap().status, SessionStatus::InProgress);

    h.tick(30).await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.set_number(), Some(2));
    assert_eq!(h.controller.elapsed_seconds(), elapsed + 30);
}

#[tokio::test]
async fn test_pause_while_feedback_pending_defers_the_advance() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    let stale = h.scheduler.pending();
    assert_eq!(stale.len(), 1);

    h.controller.pause_workout().await.unwrap();
    assert!(h.scheduler.pending().is_empty());
    h.controller.run_deferred(stale[0].token, stale[0].task).await;
    assert_eq!(h.controller.phase(), SessionPhase::Paused);

    h.controller.resume_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::LoggingSet);
    assert!(h.controller.has_pending_advance());
    assert_eq!(h.scheduler.pending().len(), 1);

    h.fire_deferred().await;
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 45 });
}

#[tokio::test]
async fn test_cancel_keeps_logged_sets_and_drops_timers() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.log_and_skip_rest(5, 100.0).await;
    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    let stale = h.scheduler.pending();

    h.controller.cancel_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(h.scheduler.ticker(), None);
    assert!(h.scheduler.pending().is_empty());
    assert!(h.controller.snapshot().is_none());

    // The advance that was pending must not resurrect the workout.
    h.controller.run_deferred(stale[0].token, stale[0].task).await;
    assert_eq!(h.controller.phase(), SessionPhase::Idle);

    let session = h.controller.session().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(h.store.session(session.id).unwrap().status, SessionStatus::Cancelled);
    assert_eq!(h.store.sets().len(), 2);
    assert_eq!(h.store.workout_state(def.id), Some(WorkoutState::Inactive));
    assert_eq!(*h.fakes.health.ends.lock().unwrap(), 1);
    assert!(h.fakes.companion.event_names().contains(&"workoutCancelled".to_string()));
}

#[tokio::test]
async fn test_save_and_resume_picks_up_where_it_left_off() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    for _ in 0..3 {
        h.log_and_skip_rest(5, 100.0).await;
    }
    assert_eq!(h.controller.exercise_index(), Some(1));
    h.log_and_skip_rest(5, 80.0).await;
    h.log_and_skip_rest(5, 80.0).await;
    assert_eq!(h.controller.set_number(), Some(3));

    h.controller.save_and_cancel_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);

    let id = h.controller.session().unwrap().id;
    let saved = h.store.session(id).unwrap();
    assert_eq!(saved.status, SessionStatus::SavedMidSession);
    assert!(saved.completed_at.is_some());
    let point = ResumePoint::from_note(saved.notes.as_deref().unwrap()).unwrap();
    assert_eq!(point.summary, "exercise 2 of 3, set 2");
    assert!(h.fakes.companion.event_names().contains(&"workoutSaved".to_string()));

    h.controller.resume_saved(id).await.unwrap();
    assert!(matches!(h.controller.phase(), SessionPhase::Countdown { .. }));
    h.tick(3).await;

    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.exercise_index(), Some(1));
    assert_eq!(h.controller.set_number(), Some(3));
    let resumed = h.store.session(id).unwrap();
    assert_eq!(resumed.status, SessionStatus::InProgress);
    assert_eq!(resumed.completed_at, None);

    h.log_set(5, 80.0).await;
    assert_eq!(h.controller.exercise_index(), Some(2));
    assert_eq!(h.controller.set_number(), Some(1));
}

#[tokio::test]
async fn test_only_saved_sessions_can_be_resumed() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;
    h.controller.cancel_workout().await.unwrap();
    let id = h.controller.session().unwrap().id;

    assert!(matches!(
        h.controller.resume_saved(id).await,
        Err(ControllerError::NotResumable(_))
    ));
    assert!(matches!(
        h.controller.resume_saved(Uuid::new_v4()).await,
        Err(ControllerError::NotResumable(_))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_commands_in_the_wrong_phase_change_nothing() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;

    assert!(matches!(
        h.controller.submit_set(SetEntry::new(5, 100.0)).await,
        Err(ControllerError::InvalidPhase { .. })
    ));

    h.controller.start(def.clone()).await.unwrap();
    assert!(h.controller.start(def.clone()).await.is_err());
    assert!(h.controller.complete_workout().await.is_err());
    assert!(h.controller.pause_workout().await.is_err());
    assert!(h.controller.skip_rest().is_err());

    h.tick(3).await;
    let snaps = h.fakes.companion.snapshot_count();
    assert!(h.controller.resume_workout().await.is_err());
    assert!(h.controller.extend_rest(10).is_err());
    assert!(h.controller.dismiss_set_logger().is_err());
    assert_eq!(h.fakes.companion.snapshot_count(), snaps);
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
}

#[tokio::test]
async fn test_empty_workout_is_rejected() {
    let def = WorkoutDefinition::new("Nothing", vec![]);
    let mut h = Harness::new(&def).await;

    assert_eq!(
        h.controller.start(def).await,
        Err(ControllerError::EmptyWorkout("Nothing".into()))
    );
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(h.scheduler.ticker(), None);
}

#[tokio::test]
async fn test_second_submit_while_feedback_pending_is_refused() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    assert_eq!(
        h.controller.submit_set(SetEntry::new(5, 100.0)).await,
        Err(ControllerError::FeedbackPending)
    );
    assert_eq!(h.controller.dismiss_set_logger(), Err(ControllerError::FeedbackPending));
    assert_eq!(h.store.sets().len(), 1);
}

#[tokio::test]
async fn test_invalid_entry_is_rejected_before_recording() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    assert!(matches!(
        h.controller.submit_set(SetEntry::new(0, 100.0)).await,
        Err(ControllerError::InvalidEntry(_))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::LoggingSet);
    assert!(h.store.sets().is_empty());
}

#[tokio::test]
async fn test_set_logger_prefills_weight() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    let draft = h.controller.set_draft().unwrap();
    assert_eq!(draft.weight, 100.0);
    assert_eq!(draft.reps, 5);

    h.controller.submit_set(SetEntry::new(5, 102.5)).await.unwrap();
    h.fire_deferred().await;
    h.controller.skip_rest().unwrap();

    h.controller.open_set_logger().unwrap();
    assert_eq!(h.controller.set_draft().unwrap().weight, 102.5);
    h.controller.dismiss_set_logger().unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.set_draft(), None);
}

#[tokio::test]
async fn test_weight_suggestion_comes_from_history() {
    let def = three_by_three();
    let store = Arc::new(MemoryStore::new());
    store
        .save_set(
            &CompletedSet {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                slot_id: Uuid::new_v4(),
                exercise_name: "Squat".into(),
                set_number: 1,
                reps: 5,
                weight: 92.5,
                effort: None,
                completed_at: Local::now(),
            },
            None,
        )
        .await
        .unwrap();

    let mut h = Harness::with_store(&def, store).await;
    h.start_exercising(def.clone()).await;
    assert_eq!(h.controller.suggested_weight(), Some(92.5));

    // No history for Row and no target: zero.
    h.controller.next_exercise().await.unwrap();
    h.controller.next_exercise().await.unwrap();
    assert_eq!(h.controller.suggested_weight(), Some(0.0));
}

#[tokio::test]
async fn test_zero_rest_goes_straight_to_next_set() {
    let def = WorkoutDefinition::new(
        "Circuit",
        vec![repline::models::ExerciseSlot::new(0, "Push-up", 2, 20, None, 0)],
    );
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.log_set(20, 0.0).await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.set_number(), Some(2));

    h.log_set(20, 0.0).await;
    assert_eq!(h.controller.phase(), SessionPhase::Completed);
    assert!(h.store.record("Push-up").is_none());
}

#[tokio::test]
async fn test_last_set_waits_between_exercises() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.log_and_skip_rest(5, 100.0).await;
    h.log_and_skip_rest(5, 100.0).await;
    h.controller.open_set_logger().unwrap();
    let outcome = h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();

    assert!(outcome.is_last_set);
    assert_eq!(h.controller.phase(), SessionPhase::BetweenExercises);
    assert_eq!(h.fakes.haptics.last(), Some(Feedback::Heavy));
    assert_eq!(h.scheduler.pending()[0].delay, std::time::Duration::from_millis(2_000));

    h.fire_deferred().await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.exercise_index(), Some(1));
}

#[tokio::test]
async fn test_feedback_delays_scale_with_significance() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    assert_eq!(h.scheduler.pending()[0].delay, std::time::Duration::from_millis(3_000));
    h.fire_deferred().await;
    h.controller.skip_rest().unwrap();

    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(5, 90.0)).await.unwrap();
    assert_eq!(h.scheduler.pending()[0].delay, std::time::Duration::from_millis(1_200));
    assert_eq!(h.fakes.haptics.last(), Some(Feedback::Light));
}

#[tokio::test]
async fn test_rest_controls() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;
    h.log_set(5, 100.0).await;

    h.controller.extend_rest(30).unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 75 });

    let snaps = h.fakes.companion.snapshot_count();
    h.controller.extend_rest(0).unwrap();
    assert_eq!(h.fakes.companion.snapshot_count(), snaps);

    h.controller.add_set().unwrap();
    assert_eq!(h.controller.snapshot().unwrap().total_sets, 4);

    h.controller.skip_rest().unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.set_number(), Some(2));
}

#[tokio::test]
async fn test_exercise_navigation() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.previous_exercise().await.unwrap();
    assert_eq!(h.controller.exercise_index(), Some(0));

    h.log_and_skip_rest(5, 100.0).await;
    h.controller.next_exercise().await.unwrap();
    assert_eq!(h.controller.exercise_index(), Some(1));
    assert_eq!(h.controller.set_number(), Some(1));

    // Coming back resumes after the sets already logged.
    h.controller.previous_exercise().await.unwrap();
    assert_eq!(h.controller.exercise_index(), Some(0));
    assert_eq!(h.controller.set_number(), Some(2));

    h.controller.next_exercise().await.unwrap();
    h.controller.next_exercise().await.unwrap();
    h.controller.next_exercise().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn test_cancel_and_save_allowed_during_countdown() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;

    h.controller.start(def.clone()).await.unwrap();
    h.controller.cancel_workout().await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);

    h.controller.start(def.clone()).await.unwrap();
    h.tick(1).await;
    h.controller.save_and_cancel_workout().await.unwrap();
    let saved = h.controller.session().unwrap();
    assert_eq!(saved.status, SessionStatus::SavedMidSession);
    // Countdown is not workout time.
    assert_eq!(saved.elapsed_seconds, 0);
}

#[tokio::test]
async fn test_paused_workout_can_be_completed() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;
    h.tick(7).await;

    h.controller.pause_workout().await.unwrap();
    h.controller.complete_workout().await.unwrap();

    assert_eq!(h.controller.phase(), SessionPhase::Completed);
    assert_eq!(h.controller.session().unwrap().elapsed_seconds, 7);

    let snapshot = h.controller.snapshot().unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Completed);
    assert!(!snapshot.is_paused);

    h.controller.reset().unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.controller.snapshot().is_none());
}

#[tokio::test]
async fn test_store_failures_do_not_stop_the_workout() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;
    h.store.set_fail_writes(true);

    h.controller.open_set_logger().unwrap();
    let outcome = h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    assert!(!outcome.saved);
    h.fire_deferred().await;

    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 45 });
    assert!(h.store.sets().is_empty());
    assert!(
        h.fakes
            .companion
            .event_names()
            .contains(&"persistenceFailed".to_string())
    );
}

#[tokio::test]
async fn test_companion_actions_drive_the_controller() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;
    h.log_set(5, 100.0).await;

    h.controller
        .handle_companion(CompanionAction::ExtendRest { seconds: 15 })
        .await
        .unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 60 });

    h.controller.handle_companion(CompanionAction::SkipRest).await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);

    let snaps = h.fakes.companion.snapshot_count();
    h.controller.handle_companion(CompanionAction::Resync).await.unwrap();
    assert_eq!(h.fakes.companion.snapshot_count(), snaps + 1);

    h.controller.handle_companion(CompanionAction::SkipExercise).await.unwrap();
    assert_eq!(h.controller.exercise_index(), Some(1));

    h.controller.handle_companion(CompanionAction::EndWorkout).await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Completed);
}

#[tokio::test]
async fn test_companion_gets_elapsed_updates_every_five_seconds() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.tick(11).await;
    let elapsed_events = h
        .fakes
        .companion
        .event_names()
        .iter()
        .filter(|n| *n == "elapsed")
        .count();
    assert_eq!(elapsed_events, 2);
    assert_eq!(h.fakes.companion.last_snapshot().unwrap().elapsed_seconds, 11);
}

#[tokio::test]
async fn test_snapshot_watchers_follow_the_phase() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    let rx = h.controller.subscribe();
    assert!(rx.borrow().is_none());

    h.start_exercising(def.clone()).await;
    assert_eq!(rx.borrow().as_ref().unwrap().phase, SessionPhase::Exercising);

    h.controller.open_set_logger().unwrap();
    assert_eq!(rx.borrow().as_ref().unwrap().phase, SessionPhase::LoggingSet);

    h.controller.cancel_workout().await.unwrap();
    assert!(rx.borrow().is_none());
}

#[tokio::test]
async fn test_health_failure_does_not_block_start() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    let failing = Arc::new(common::RecordingHealth {
        fail: true,
        ..Default::default()
    });
    let collaborators = repline::collaborators::Collaborators {
        health: failing.clone(),
        ..h.fakes.collaborators()
    };
    h.controller = repline::session::SessionController::new(
        h.store.clone(),
        &collaborators,
        Box::new(h.scheduler.clone()),
        repline::session::Timing::default(),
    );

    h.start_exercising(def).await;
    assert_eq!(*failing.starts.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_first_set_without_history_is_a_record_then_rest_runs_out() {
    let def = WorkoutDefinition::new(
        "Upper",
        (0..3)
            .map(|i| repline::models::ExerciseSlot::new(i, format!("Lift {i}"), 3, 5, None, 60))
            .collect(),
    );
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.open_set_logger().unwrap();
    let outcome = h.controller.submit_set(SetEntry::new(5, 100.0)).await.unwrap();
    assert!(outcome.is_personal_record());
    h.fire_deferred().await;
    assert_eq!(h.controller.phase(), SessionPhase::Resting { remaining: 60 });

    h.tick(60).await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.set_number(), Some(2));
}

#[tokio::test]
async fn test_light_final_set_finishes_without_record() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    for _ in 0..8 {
        h.log_and_skip_rest(5, 100.0).await;
    }
    assert_eq!(h.controller.exercise_index(), Some(2));
    assert_eq!(h.controller.set_number(), Some(3));

    h.controller.open_set_logger().unwrap();
    let outcome = h.controller.submit_set(SetEntry::new(8, 60.0)).await.unwrap();
    assert!(!outcome.is_personal_record());
    assert!(outcome.is_last_set && outcome.is_last_exercise);

    h.fire_deferred().await;
    assert_eq!(h.controller.phase(), SessionPhase::Completed);
    assert_eq!(h.controller.session().unwrap().status, SessionStatus::Completed);

    // Set numbers per slot run 1, 2, 3.
    let sets = h.store.sets();
    for slot in &def.slots {
        let numbers: Vec<u32> = sets
            .iter()
            .filter(|s| s.slot_id == slot.id)
            .map(|s| s.set_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_tick_from_before_cancel_is_ignored() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;

    h.controller.start(def.clone()).await.unwrap();
    let countdown_token = h.scheduler.ticker().unwrap();
    h.tick(3).await;

    h.controller.pause_workout().await.unwrap();
    h.controller.cancel_workout().await.unwrap();
    let session = h.controller.session().unwrap().clone();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.notes, None);

    h.controller.tick(countdown_token).await;
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.controller.snapshot().is_none());
}

fn set_numbers(sets: &[CompletedSet], slot: Uuid) -> Vec<u32> {
    sets.iter()
        .filter(|s| s.slot_id == slot)
        .map(|s| s.set_number)
        .collect()
}

#[tokio::test]
async fn test_going_back_to_a_finished_exercise_opens_no_extra_set() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    for _ in 0..3 {
        h.log_and_skip_rest(5, 100.0).await;
    }
    assert_eq!(h.controller.exercise_index(), Some(1));

    h.controller.previous_exercise().await.unwrap();
    assert_eq!(h.controller.exercise_index(), Some(0));
    assert_eq!(h.controller.set_number(), Some(3));
    let snapshot = h.controller.snapshot().unwrap();
    assert!(snapshot.exercise_complete);
    assert_eq!(snapshot.total_sets, 3);

    assert_eq!(
        h.controller.open_set_logger(),
        Err(ControllerError::ExerciseComplete {
            exercise: "Squat".into(),
            sets: 3,
        })
    );
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(set_numbers(&h.store.sets(), def.slots[0].id), vec![1, 2, 3]);

    // An explicit extra set reopens it, once.
    h.controller.add_set().unwrap();
    assert_eq!(h.controller.set_number(), Some(4));
    assert!(!h.controller.snapshot().unwrap().exercise_complete);
    h.log_set(5, 100.0).await;
    assert_eq!(h.controller.exercise_index(), Some(1));
    assert_eq!(set_numbers(&h.store.sets(), def.slots[0].id), vec![1, 2, 3, 4]);

    h.controller.previous_exercise().await.unwrap();
    assert_eq!(h.controller.set_number(), Some(4));
    assert!(h.controller.open_set_logger().is_err());
}

#[tokio::test]
async fn test_resuming_after_the_final_set_completes_the_workout() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    for _ in 0..8 {
        h.log_and_skip_rest(5, 60.0).await;
    }
    assert_eq!(h.controller.exercise_index(), Some(2));
    assert_eq!(h.controller.set_number(), Some(3));
    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(8, 60.0)).await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::BetweenExercises);

    h.controller.save_and_cancel_workout().await.unwrap();
    let id = h.controller.session().unwrap().id;
    let point = ResumePoint::from_note(h.store.session(id).unwrap().notes.as_deref().unwrap()).unwrap();
    assert_eq!(point.summary, "exercise 3 of 3, set 3");

    h.controller.resume_saved(id).await.unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Completed);
    assert_eq!(h.store.session(id).unwrap().status, SessionStatus::Completed);
    assert_eq!(h.store.workout_state(def.id), Some(WorkoutState::Completed));
    assert!(h.fakes.companion.event_names().contains(&"workoutCompleted".to_string()));

    let sets = h.store.sets();
    assert_eq!(sets.len(), 9);
    for slot in &def.slots {
        assert_eq!(set_numbers(&sets, slot.id), vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_resume_wraps_to_an_earlier_unfinished_exercise() {
    let def = three_by_three();
    let mut h = Harness::new(&def).await;
    h.start_exercising(def.clone()).await;

    h.controller.next_exercise().await.unwrap();
    h.controller.next_exercise().await.unwrap();
    h.log_and_skip_rest(8, 0.0).await;
    h.log_and_skip_rest(8, 0.0).await;
    h.controller.open_set_logger().unwrap();
    h.controller.submit_set(SetEntry::new(8, 0.0)).await.unwrap();
    h.controller.save_and_cancel_workout().await.unwrap();
    let id = h.controller.session().unwrap().id;

    h.controller.resume_saved(id).await.unwrap();
    h.tick(3).await;
    assert_eq!(h.controller.phase(), SessionPhase::Exercising);
    assert_eq!(h.controller.exercise_index(), Some(0));
    assert_eq!(h.controller.set_number(), Some(1));
    assert!(!h.controller.snapshot().unwrap().exercise_complete);
}
