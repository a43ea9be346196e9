// Runs as its own test binary so the environment change stays out of the
// other restore tests.
use anyhow::Result;
use ironlog_lib::{
    Entity, ObjectStore, RestoreOutcome, SessionManager, SessionOptions, SessionPointer,
    SqliteStore, DEFAULT_POINTER_FILE_NAME, SKIP_RESTORE_ENV_VAR,
};
use tempfile::TempDir;

#[test]
fn test_skip_restore_env_var_keeps_manager_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let pointer_path = dir.path().join(DEFAULT_POINTER_FILE_NAME);
    let restore = SessionOptions {
        restore: true,
        ..SessionOptions::default()
    };

    std::env::remove_var(SKIP_RESTORE_ENV_VAR);
    let mut first = SessionManager::new(
        SqliteStore::open_in_memory()?,
        SessionPointer::new(pointer_path.clone()),
        restore.clone(),
    );
    assert_eq!(first.restore_outcome(), RestoreOutcome::NoPointer);
    first.start_new_workout()?;
    let store = first.into_store();

    std::env::set_var(SKIP_RESTORE_ENV_VAR, "1");
    let second = SessionManager::new(store, SessionPointer::new(pointer_path.clone()), restore);
    std::env::remove_var(SKIP_RESTORE_ENV_VAR);

    assert_eq!(second.restore_outcome(), RestoreOutcome::Suppressed);
    assert_eq!(second.current_workout_id(), None);
    // The pointer and the workout are left for a later launch
    assert!(second.pointer().exists());
    assert_eq!(second.store().count(Entity::WorkoutRecord)?, 1);
    Ok(())
}
