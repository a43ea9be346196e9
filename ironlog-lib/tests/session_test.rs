use anyhow::Result;
use chrono::{Duration, Utc};
use ironlog_lib::{
    CancelOutcome, Category, CompletionOutcome, Entity, ExerciseDetails, ExerciseRecord,
    ExerciseTemplate, ObjectId, ObjectStore, RestoreOutcome, SessionError, SessionManager,
    SessionOptions, SessionPointer, SetShape, SqliteStore, WorkoutRecord, WorkoutTemplate,
    DEFAULT_POINTER_FILE_NAME,
};
use tempfile::TempDir;

fn pointer_in(dir: &TempDir) -> SessionPointer {
    SessionPointer::new(dir.path().join(DEFAULT_POINTER_FILE_NAME))
}

fn options(restore: bool) -> SessionOptions {
    SessionOptions {
        restore,
        ..SessionOptions::default()
    }
}

// Manager over a fresh in-memory store with restore suppressed
fn idle_manager(dir: &TempDir) -> Result<SessionManager<SqliteStore>> {
    let store = SqliteStore::open_in_memory()?;
    Ok(SessionManager::new(store, pointer_in(dir), options(false)))
}

fn add_details(
    manager: &mut SessionManager<SqliteStore>,
    name: &str,
    category: Category,
) -> Result<ExerciseDetails> {
    let store = manager.store_mut();
    let details = store.insert_details(name, category)?;
    store.save()?;
    Ok(details)
}

// Adds the exercise with one set holding the given weight and reps
fn log_weighted_set(
    manager: &mut SessionManager<SqliteStore>,
    details: &ExerciseDetails,
    weight: f64,
    reps: u32,
    complete: bool,
) -> Result<ObjectId> {
    let exercise_id = manager.add_exercise(details)?;
    let index = manager.add_set(&exercise_id)?;
    let set = &mut manager.exercise_mut(&exercise_id)?.sets[index];
    set.set_weight(Some(weight))?;
    set.set_reps(Some(reps))?;
    if complete {
        assert!(set.set_complete(true));
    }
    Ok(exercise_id)
}

#[test]
fn test_fresh_manager_is_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let manager = idle_manager(&dir)?;

    assert!(manager.current_workout().is_none());
    assert!(manager.current_workout_id().is_none());
    assert!(manager.started_at().is_none());
    assert_eq!(manager.restore_outcome(), RestoreOutcome::Suppressed);
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    Ok(())
}

#[test]
fn test_fresh_manager_without_pointer_stays_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let manager = SessionManager::new(SqliteStore::open_in_memory()?, pointer_in(&dir), options(true));

    assert_eq!(manager.restore_outcome(), RestoreOutcome::NoPointer);
    assert!(manager.current_workout_id().is_none());
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    Ok(())
}

#[test]
fn test_start_creates_workout_and_pointer() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;

    let id = manager.start_new_workout()?;

    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 1);
    assert_eq!(manager.current_workout_id(), Some(id));
    let workout = manager.current_workout().expect("workout in progress");
    assert_eq!(workout.id, Some(id));
    assert_eq!(workout.name, ironlog_lib::DEFAULT_WORKOUT_NAME);
    assert!(manager.pointer().exists());
    assert_eq!(manager.pointer().read()?, Some(id));
    assert!(!manager.store().has_unsaved_changes());
    Ok(())
}

#[test]
fn test_start_while_active_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let id = manager.start_new_workout()?;

    let err = manager.start_new_workout().unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive(active) if active == id));
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 1);
    Ok(())
}

#[test]
fn test_restore_round_trip_on_same_store() -> Result<()> {
    let dir = TempDir::new()?;
    let mut first = idle_manager(&dir)?;
    let id = first.start_new_workout()?;

    let store = first.into_store();
    let second = SessionManager::new(store, pointer_in(&dir), options(true));

    assert_eq!(second.restore_outcome(), RestoreOutcome::Restored(id));
    assert_eq!(second.current_workout_id(), Some(id));
    assert_eq!(second.store().count(Entity::WorkoutRecord)?, 1);
    Ok(())
}

#[test]
fn test_restore_after_reopening_database() -> Result<()> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("ironlog.sqlite");

    let (id, exercise_id) = {
        let mut manager = SessionManager::new(SqliteStore::open(&db_path)?, pointer_in(&dir), options(false));
        let squat = add_details(&mut manager, "Squat", Category::WeightAndReps)?;
        let id = manager.start_new_workout()?;
        let exercise_id = log_weighted_set(&mut manager, &squat, 120.0, 5, true)?;
        manager.save_progress()?;
        (id, exercise_id)
    };

    let manager = SessionManager::new(SqliteStore::open(&db_path)?, pointer_in(&dir), options(true));
    assert_eq!(manager.current_workout_id(), Some(id));
    let workout = manager.current_workout().expect("restored workout");
    let exercise = workout.exercise(&exercise_id).expect("restored exercise");
    assert_eq!(exercise.sets.len(), 1);
    assert!(exercise.sets[0].is_complete());
    assert_eq!(exercise.sets[0].values().weight(), Some(120.0));
    Ok(())
}

#[test]
fn test_restore_suppressed_by_options() -> Result<()> {
    let dir = TempDir::new()?;
    let mut first = idle_manager(&dir)?;
    first.start_new_workout()?;

    let second = SessionManager::new(first.into_store(), pointer_in(&dir), options(false));
    assert_eq!(second.restore_outcome(), RestoreOutcome::Suppressed);
    assert!(second.current_workout().is_none());
    Ok(())
}

#[test]
fn test_stale_pointer_leaves_manager_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let mut first = idle_manager(&dir)?;
    let id = first.start_new_workout()?;

    // Workout disappears without going through the manager
    let mut store = first.into_store();
    store.transaction(|s| s.delete(&id))?;

    let second = SessionManager::new(store, pointer_in(&dir), options(true));
    assert_eq!(second.restore_outcome(), RestoreOutcome::Stale(id));
    assert!(second.current_workout_id().is_none());
    assert!(second.pointer().exists());
    Ok(())
}

#[test]
fn test_pointer_from_another_store_is_stale() -> Result<()> {
    let dir = TempDir::new()?;
    let mut first = idle_manager(&dir)?;
    let id = first.start_new_workout()?;

    let second = SessionManager::new(SqliteStore::open_in_memory()?, pointer_in(&dir), options(true));
    assert_eq!(second.restore_outcome(), RestoreOutcome::Stale(id));
    assert_eq!(second.store().count(Entity::WorkoutRecord)?, 0);
    Ok(())
}

#[test]
fn test_unreadable_pointer_leaves_manager_idle() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join(DEFAULT_POINTER_FILE_NAME), "{ not an id")?;

    let manager = SessionManager::new(SqliteStore::open_in_memory()?, pointer_in(&dir), options(true));
    assert_eq!(manager.restore_outcome(), RestoreOutcome::Unreadable);
    assert!(manager.current_workout().is_none());
    Ok(())
}

#[test]
fn test_cancel_discards_workout_and_exercises() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let bench = add_details(&mut manager, "Bench Press", Category::WeightAndReps)?;
    let plank = add_details(&mut manager, "Plank", Category::Duration)?;

    manager.start_new_workout()?;
    log_weighted_set(&mut manager, &bench, 80.0, 8, true)?;
    manager.add_exercise(&plank)?;
    manager.save_progress()?;
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 2);

    let outcome = manager.cancel()?;

    assert_eq!(outcome, CancelOutcome::Discarded { exercises: 2 });
    assert!(manager.current_workout().is_none());
    assert!(manager.current_workout_id().is_none());
    assert!(!manager.pointer().exists());
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 0);
    // Catalog is untouched
    assert_eq!(manager.store().count(Entity::ExerciseDetails)?, 2);
    Ok(())
}

#[test]
fn test_cancel_when_idle_is_noop() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;

    assert_eq!(manager.cancel()?, CancelOutcome::Idle);
    assert_eq!(manager.cancel()?, CancelOutcome::Idle);
    assert_eq!(manager.complete()?, CompletionOutcome::NothingToComplete);
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    assert!(!manager.store().has_unsaved_changes());
    Ok(())
}

#[test]
fn test_cancel_after_pointer_removed_externally() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    manager.start_new_workout()?;
    std::fs::remove_file(manager.pointer().path())?;

    assert_eq!(manager.cancel()?, CancelOutcome::Discarded { exercises: 0 });
    assert!(manager.current_workout().is_none());
    Ok(())
}

#[test]
fn test_complete_with_valid_set_persists_and_updates_latest() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let pullups = add_details(&mut manager, "Pullups", Category::WeightAndReps)?;

    let id = manager.start_new_workout()?;
    let exercise_id = log_weighted_set(&mut manager, &pullups, 10.0, 8, true)?;

    let outcome = manager.complete()?;

    assert_eq!(
        outcome,
        CompletionOutcome::Saved {
            workout: id,
            exercises: 1,
            sets: 1,
            pruned_sets: 0
        }
    );
    assert!(manager.current_workout().is_none());
    assert!(!manager.pointer().exists());
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 1);
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 1);
    let details = manager
        .store()
        .resolve_details(&pullups.id)?
        .expect("details still exist");
    assert_eq!(details.latest_completed_record, Some(exercise_id));
    Ok(())
}

#[test]
fn test_complete_without_exercises_discards_workout() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    manager.start_new_workout()?;

    assert_eq!(
        manager.complete()?,
        CompletionOutcome::Discarded { pruned_sets: 0 }
    );
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    assert!(!manager.pointer().exists());
    Ok(())
}

#[test]
fn test_complete_with_only_incomplete_sets_discards_workout() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let row = add_details(&mut manager, "Farmer Carry", Category::DistanceAndWeight)?;

    manager.start_new_workout()?;
    let exercise_id = manager.add_exercise(&row)?;
    manager.add_set(&exercise_id)?;
    let set = &mut manager.exercise_mut(&exercise_id)?.sets[0];
    set.set_weight(Some(40.0))?;
    // Distance missing, so completion is refused
    assert!(!set.set_complete(true));
    manager.save_progress()?;

    assert_eq!(
        manager.complete()?,
        CompletionOutcome::Discarded { pruned_sets: 1 }
    );
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 0);
    let details = manager.store().resolve_details(&row.id)?.expect("details");
    assert_eq!(details.latest_completed_record, None);
    Ok(())
}

#[test]
fn test_complete_prunes_incomplete_sets_and_empty_exercises() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let squat = add_details(&mut manager, "Squat", Category::WeightAndReps)?;
    let curl = add_details(&mut manager, "Curl", Category::WeightAndReps)?;

    let id = manager.start_new_workout()?;
    let squat_id = log_weighted_set(&mut manager, &squat, 140.0, 3, true)?;
    // Second squat set filled but never ticked off
    let index = manager.add_set(&squat_id)?;
    manager.exercise_mut(&squat_id)?.sets[index].set_reps(Some(3))?;
    let curl_id = log_weighted_set(&mut manager, &curl, 15.0, 12, false)?;
    manager.save_progress()?;

    let outcome = manager.complete()?;
    assert_eq!(
        outcome,
        CompletionOutcome::Saved {
            workout: id,
            exercises: 1,
            sets: 1,
            pruned_sets: 2
        }
    );

    let stored: WorkoutRecord = manager.store().resolve_workout(&id)?.expect("saved workout");
    assert_eq!(stored.exercises.len(), 1);
    assert_eq!(stored.exercises[0].id, Some(squat_id));
    assert!(stored.exercises[0].sets.iter().all(|s| s.is_complete()));
    assert!(manager.store().resolve_exercise::<ironlog_lib::SetRecord>(&curl_id)?.is_none());
    Ok(())
}

#[test]
fn test_complete_deletes_stored_exercise_dropped_from_memory() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let squat = add_details(&mut manager, "Squat", Category::WeightAndReps)?;
    let curl = add_details(&mut manager, "Curl", Category::WeightAndReps)?;

    let id = manager.start_new_workout()?;
    let squat_id = log_weighted_set(&mut manager, &squat, 100.0, 5, true)?;
    let curl_id = manager.add_exercise(&curl)?;
    manager.add_set(&curl_id)?;
    manager.save_progress()?;

    // Dropped through direct editing, so its row is still stored
    manager
        .current_workout_mut()
        .expect("workout in progress")
        .exercises
        .retain(|e| e.id != Some(curl_id));

    let outcome = manager.complete()?;
    assert_eq!(
        outcome,
        CompletionOutcome::Saved {
            workout: id,
            exercises: 1,
            sets: 1,
            pruned_sets: 0
        }
    );
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 1);
    assert!(manager
        .store()
        .resolve_exercise::<ironlog_lib::SetRecord>(&curl_id)?
        .is_none());

    let stored: WorkoutRecord = manager.store().resolve_workout(&id)?.expect("saved workout");
    assert_eq!(stored.exercises.len(), 1);
    assert_eq!(stored.exercises[0].id, Some(squat_id));
    Ok(())
}

#[test]
fn test_uncompleting_set_before_finish_discards_it() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let bench = add_details(&mut manager, "Bench Press", Category::WeightAndReps)?;

    manager.start_new_workout()?;
    let exercise_id = log_weighted_set(&mut manager, &bench, 60.0, 10, true)?;
    // Clearing a required field drops the completion
    manager.exercise_mut(&exercise_id)?.sets[0].set_reps(None)?;
    assert!(!manager.exercise_mut(&exercise_id)?.sets[0].is_complete());

    assert_eq!(
        manager.complete()?,
        CompletionOutcome::Discarded { pruned_sets: 1 }
    );
    Ok(())
}

#[test]
fn test_failed_completion_keeps_session_active() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let dips = add_details(&mut manager, "Dips", Category::Reps)?;

    let id = manager.start_new_workout()?;
    let exercise_id = manager.add_exercise(&dips)?;
    manager.add_set(&exercise_id)?;
    let set = &mut manager.exercise_mut(&exercise_id)?.sets[0];
    set.set_reps(Some(12))?;
    set.set_complete(true);

    // Catalog entry removed underneath the session takes its record with it
    manager.store_mut().transaction(|s| s.delete(&dips.id))?;

    assert!(matches!(manager.complete(), Err(SessionError::Store(_))));
    assert_eq!(manager.current_workout_id(), Some(id));
    assert_eq!(manager.exercise_mut(&exercise_id)?.sets.len(), 1);
    assert!(manager.pointer().exists());

    assert_eq!(manager.cancel()?, CancelOutcome::Discarded { exercises: 0 });
    assert_eq!(manager.store().count(Entity::WorkoutRecord)?, 0);
    Ok(())
}

#[test]
fn test_start_from_template_copies_plan() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let deadlift = add_details(&mut manager, "Deadlift", Category::WeightAndReps)?;
    let plank = add_details(&mut manager, "Plank", Category::Duration)?;

    let mut template = WorkoutTemplate::new("Pull Day");
    let mut first = ExerciseTemplate::new(Some(deadlift.clone()));
    first.add_set()?.values.set_weight(Some(180.0))?;
    first.add_set()?;
    let mut second = ExerciseTemplate::new(Some(plank));
    second.created_at = first.created_at + Duration::seconds(1);
    second.add_set()?;
    template.exercises = vec![second, first];
    manager
        .store_mut()
        .transaction(|s| s.insert_workout(&mut template))?;

    let id = manager.start_from_template(&template)?;

    let workout = manager.current_workout().expect("workout in progress");
    assert_eq!(workout.name, "Pull Day");
    let ordered = workout.ordered_exercises();
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].details.as_ref().map(|d| d.id), Some(deadlift.id));
    assert_eq!(ordered[0].sets.len(), 2);
    assert_eq!(ordered[0].sets[0].values().weight(), Some(180.0));
    assert!(ordered.iter().flat_map(|e| &e.sets).all(|s| !s.is_complete()));
    assert!(ordered.iter().all(|e| e.id.is_some()));
    assert_eq!(manager.pointer().read()?, Some(id));

    assert_eq!(manager.store().count(Entity::WorkoutTemplate)?, 1);
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 2);
    Ok(())
}

#[test]
fn test_previous_set_comes_from_latest_record() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let press = add_details(&mut manager, "Overhead Press", Category::WeightAndReps)?;

    manager.start_new_workout()?;
    log_weighted_set(&mut manager, &press, 50.0, 5, true)?;
    manager.complete()?;

    manager.start_new_workout()?;
    let exercise_id = manager.add_exercise(&press)?;
    let previous = manager.previous_set(&exercise_id, 0)?.expect("set from last time");
    assert_eq!(previous.values().weight(), Some(50.0));
    assert_eq!(previous.values().reps(), Some(5));
    assert!(manager.previous_set(&exercise_id, 1)?.is_none());
    Ok(())
}

#[test]
fn test_latest_record_is_not_regressed_by_older_record() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let bench = add_details(&mut manager, "Bench Press", Category::WeightAndReps)?;

    manager.start_new_workout()?;
    let newest = log_weighted_set(&mut manager, &bench, 100.0, 5, true)?;
    manager.complete()?;

    // A record logged for an earlier day arrives afterwards
    let yesterday = Utc::now() - Duration::days(1);
    let mut older = WorkoutRecord::new("Backfilled");
    older.created_at = yesterday;
    let mut exercise = ExerciseRecord::new(Some(bench.clone()));
    exercise.created_at = yesterday;
    older.exercises.push(exercise);
    let store = manager.store_mut();
    store.transaction(|s| s.insert_workout(&mut older))?;
    let older_exercise = older.exercises[0].id.expect("stored exercise");

    let moved = store.transaction(|s| s.set_latest_record(&bench.id, &older_exercise))?;
    assert!(!moved);
    let details = store.resolve_details(&bench.id)?.expect("details");
    assert_eq!(details.latest_completed_record, Some(newest));
    Ok(())
}

#[test]
fn test_remove_and_rename_inside_session() -> Result<()> {
    let dir = TempDir::new()?;
    let mut manager = idle_manager(&dir)?;
    let lunge = add_details(&mut manager, "Lunge", Category::WeightAndReps)?;

    assert!(matches!(manager.rename("Legs"), Err(SessionError::NoActiveSession)));

    let id = manager.start_new_workout()?;
    manager.rename("Leg Day")?;
    let exercise_id = manager.add_exercise(&lunge)?;
    let removed = manager.remove_exercise(&exercise_id)?;
    assert_eq!(removed.id, Some(exercise_id));
    assert!(matches!(
        manager.remove_exercise(&exercise_id),
        Err(SessionError::ExerciseNotInSession(_))
    ));
    assert_eq!(manager.store().count(Entity::ExerciseRecord)?, 0);

    let stored: WorkoutRecord = manager.store().resolve_workout(&id)?.expect("workout");
    assert_eq!(stored.name, "Leg Day");
    Ok(())
}
