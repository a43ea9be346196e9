//src/session.rs
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_WORKOUT_NAME};
use crate::model::{
    ExerciseDetails, ExerciseRecord, ModelError, SetRecord, WorkoutRecord, WorkoutTemplate,
};
use crate::pointer::SessionPointer;
use crate::store::{ObjectId, ObjectStore, StoreError};

/// Set to `1` or `true` to skip restoring the in-progress workout.
pub const SKIP_RESTORE_ENV_VAR: &str = "IRONLOG_SKIP_RESTORE";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A workout is already in progress ({0}). Finish or cancel it first.")]
    AlreadyActive(ObjectId),
    #[error("No workout is in progress.")]
    NoActiveSession,
    #[error("Exercise {0} is not part of the current workout")]
    ExerciseNotInSession(ObjectId),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Interprets the value of [`SKIP_RESTORE_ENV_VAR`].
#[must_use]
pub fn restore_suppressed(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        v == "1" || v.eq_ignore_ascii_case("true")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Resume the workout named by the pointer file on construction.
    pub restore: bool,
    pub default_workout_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            restore: true,
            default_workout_name: DEFAULT_WORKOUT_NAME.to_string(),
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            restore: config.restore_on_launch,
            default_workout_name: config.default_workout_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Restore was switched off by options or environment.
    Suppressed,
    NoPointer,
    /// The pointer file exists but could not be read or decoded.
    Unreadable,
    /// The pointer names a workout the store no longer has.
    Stale(ObjectId),
    Restored(ObjectId),
    AlreadyActive(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Idle,
    Discarded { exercises: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    NothingToComplete,
    /// No set was completed, so the workout was deleted.
    Discarded { pruned_sets: usize },
    Saved {
        workout: ObjectId,
        exercises: usize,
        sets: usize,
        pruned_sets: usize,
    },
}

#[derive(Debug)]
struct ActiveSession {
    id: ObjectId,
    workout: WorkoutRecord,
    started_at: DateTime<Utc>,
}

/// Owns the single in-progress workout and keeps the pointer file in step
/// with it, so the session survives a restart.
///
/// Store failures are returned to the caller and leave the session as it
/// was. Pointer file failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct SessionManager<S: ObjectStore> {
    store: S,
    pointer: SessionPointer,
    options: SessionOptions,
    active: Option<ActiveSession>,
    restore_outcome: RestoreOutcome,
}

impl<S: ObjectStore> SessionManager<S> {
    /// Builds the manager and, unless suppressed, resumes the workout named
    /// by the pointer file.
    pub fn new(store: S, pointer: SessionPointer, options: SessionOptions) -> Self {
        let env_value = std::env::var(SKIP_RESTORE_ENV_VAR).ok();
        let suppressed = !options.restore || restore_suppressed(env_value.as_deref());
        let mut manager = Self {
            store,
            pointer,
            options,
            active: None,
            restore_outcome: RestoreOutcome::Suppressed,
        };
        if suppressed {
            debug!("Session restore suppressed");
        } else {
            manager.restore_outcome = manager.restore_from_disk();
        }
        manager
    }

    /// Resumes the workout named by the pointer file. Never fails: an
    /// unreadable or stale pointer leaves the manager idle.
    pub fn restore_from_disk(&mut self) -> RestoreOutcome {
        if let Some(active) = &self.active {
            return RestoreOutcome::AlreadyActive(active.id);
        }

        let id = match self.pointer.read() {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("No session pointer at {}", self.pointer.path().display());
                return RestoreOutcome::NoPointer;
            }
            Err(e) => {
                warn!("Ignoring session pointer: {}", e);
                return RestoreOutcome::Unreadable;
            }
        };

        match self.store.resolve_workout::<SetRecord>(&id) {
            Ok(Some(workout)) => {
                info!(
                    "Restored workout '{}' ({}) with {} exercises",
                    workout.name,
                    id,
                    workout.exercises.len()
                );
                self.active = Some(ActiveSession {
                    id,
                    started_at: workout.created_at,
                    workout,
                });
                RestoreOutcome::Restored(id)
            }
            Ok(None) => {
                warn!("Session pointer {} no longer resolves to a workout", id);
                RestoreOutcome::Stale(id)
            }
            Err(e) => {
                warn!("Failed to resolve session pointer {}: {}", id, e);
                RestoreOutcome::Stale(id)
            }
        }
    }

    /// # Errors
    /// `SessionError::AlreadyActive` while a workout is in progress,
    /// `SessionError::Store` if the workout cannot be saved.
    pub fn start_new_workout(&mut self) -> Result<ObjectId, SessionError> {
        self.ensure_idle()?;
        let workout = WorkoutRecord::new(&self.options.default_workout_name);
        self.begin(workout)
    }

    /// Starts a workout seeded with the template's exercises and planned sets.
    /// # Errors
    /// As [`Self::start_new_workout`].
    pub fn start_from_template(&mut self, template: &WorkoutTemplate) -> Result<ObjectId, SessionError> {
        self.ensure_idle()?;
        let workout = template.instantiate(&template.name);
        self.begin(workout)
    }

    /// Discards the current workout and every exercise recorded in it.
    /// # Errors
    /// `SessionError::Store` if the deletion fails; the session stays active.
    pub fn cancel(&mut self) -> Result<CancelOutcome, SessionError> {
        let Some(active) = &self.active else {
            debug!("Cancel with no workout in progress");
            return Ok(CancelOutcome::Idle);
        };
        let id = active.id;

        let exercises = self
            .store
            .transaction(|store| -> Result<usize, StoreError> {
                // Children go first so nothing depends on cascade timing
                let stored = store.resolve_workout::<SetRecord>(&id)?;
                let mut removed = 0;
                for exercise_id in stored.iter().flat_map(|w| &w.exercises).filter_map(|e| e.id) {
                    if store.delete(&exercise_id)? {
                        removed += 1;
                    }
                }
                store.delete(&id)?;
                Ok(removed)
            })
            .map_err(|e| {
                error!("Failed to discard workout {}: {}", id, e);
                e
            })?;

        info!("Cancelled workout {} ({} exercises discarded)", id, exercises);
        self.clear_current();
        Ok(CancelOutcome::Discarded { exercises })
    }

    /// Keeps only completed sets, drops exercises left empty and saves the
    /// rest. A workout with nothing completed is deleted.
    /// # Errors
    /// `SessionError::Store` if the commit fails; the session stays active
    /// and unpruned.
    pub fn complete(&mut self) -> Result<CompletionOutcome, SessionError> {
        let Some(active) = &self.active else {
            debug!("Complete with no workout in progress");
            return Ok(CompletionOutcome::NothingToComplete);
        };
        let id = active.id;
        let mut workout = active.workout.clone();

        let pruned_sets: usize = workout
            .exercises
            .iter_mut()
            .map(ExerciseRecord::prune_incomplete)
            .sum();
        workout
            .exercises
            .retain(|e| e.is_persistable() && !e.sets.is_empty());
        let kept: Vec<ObjectId> = workout.exercises.iter().filter_map(|e| e.id).collect();

        let outcome = self
            .store
            .transaction(|store| -> Result<CompletionOutcome, StoreError> {
                // Stored rows may include exercises dropped from memory without a delete
                let stored = store.resolve_workout::<SetRecord>(&id)?;
                for exercise_id in stored
                    .iter()
                    .flat_map(|w| &w.exercises)
                    .filter_map(|e| e.id)
                    .filter(|exercise_id| !kept.contains(exercise_id))
                {
                    store.delete(&exercise_id)?;
                }
                if workout.exercises.is_empty() {
                    store.delete(&id)?;
                    return Ok(CompletionOutcome::Discarded { pruned_sets });
                }
                store.update_workout(&mut workout)?;
                for exercise in &workout.exercises {
                    if let (Some(record), Some(details)) = (&exercise.id, &exercise.details) {
                        store.set_latest_record(&details.id, record)?;
                    }
                }
                Ok(CompletionOutcome::Saved {
                    workout: id,
                    exercises: workout.exercises.len(),
                    sets: workout.set_count(),
                    pruned_sets,
                })
            })
            .map_err(|e| {
                error!("Failed to complete workout {}: {}", id, e);
                e
            })?;

        match outcome {
            CompletionOutcome::Saved { exercises, sets, .. } => info!(
                "Completed workout '{}' ({}): {} exercises, {} sets",
                workout.name, id, exercises, sets
            ),
            _ => info!("Discarded workout {} with no completed sets", id),
        }
        self.clear_current();
        Ok(outcome)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn current_workout(&self) -> Option<&WorkoutRecord> {
        self.active.as_ref().map(|a| &a.workout)
    }

    /// Direct access for editing. Call [`Self::save_progress`] afterwards.
    pub fn current_workout_mut(&mut self) -> Option<&mut WorkoutRecord> {
        self.active.as_mut().map(|a| &mut a.workout)
    }

    #[must_use]
    pub fn current_workout_id(&self) -> Option<ObjectId> {
        self.active.as_ref().map(|a| a.id)
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at().map(|start| Utc::now() - start)
    }

    #[must_use]
    pub const fn restore_outcome(&self) -> RestoreOutcome {
        self.restore_outcome
    }

    #[must_use]
    pub const fn pointer(&self) -> &SessionPointer {
        &self.pointer
    }

    /// # Errors
    /// `SessionError::NoActiveSession` or a store failure.
    pub fn rename(&mut self, name: &str) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let previous = std::mem::replace(&mut active.workout.name, name.to_string());
        if let Err(e) = self.store.transaction(|store| store.update_workout(&mut active.workout)) {
            active.workout.name = previous;
            return Err(e.into());
        }
        Ok(())
    }

    /// Adds an exercise to the current workout and stores it straight away.
    /// # Errors
    /// `SessionError::NoActiveSession` or a store failure.
    pub fn add_exercise(&mut self, details: &ExerciseDetails) -> Result<ObjectId, SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let mut exercise = ExerciseRecord::new(Some(details.clone()));
        if let Some(last) = active.workout.exercises.iter().map(|e| e.created_at).max() {
            // Keep insertion order even when the clock has not moved
            if exercise.created_at <= last {
                exercise.created_at = last + Duration::microseconds(1);
            }
        }
        let workout_id = active.id;
        let id = self
            .store
            .transaction(|store| store.insert_exercise(&workout_id, &mut exercise))?;
        debug!("Added '{}' to workout {} as {}", details.name, workout_id, id);
        active.workout.exercises.push(exercise);
        Ok(id)
    }

    /// # Errors
    /// `SessionError::ExerciseNotInSession` or a store failure.
    pub fn remove_exercise(&mut self, exercise: &ObjectId) -> Result<ExerciseRecord, SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let position = active
            .workout
            .exercises
            .iter()
            .position(|e| e.id.as_ref() == Some(exercise))
            .ok_or(SessionError::ExerciseNotInSession(*exercise))?;
        self.store.transaction(|store| store.delete(exercise))?;
        Ok(active.workout.exercises.remove(position))
    }

    /// # Errors
    /// `SessionError::NoActiveSession` or `SessionError::ExerciseNotInSession`.
    pub fn exercise_mut(&mut self, exercise: &ObjectId) -> Result<&mut ExerciseRecord, SessionError> {
        self.active
            .as_mut()
            .ok_or(SessionError::NoActiveSession)?
            .workout
            .exercise_mut(exercise)
            .ok_or(SessionError::ExerciseNotInSession(*exercise))
    }

    /// Appends an empty set to the exercise and returns its index.
    /// # Errors
    /// As [`Self::exercise_mut`], or `ModelError::MissingDetails`.
    pub fn add_set(&mut self, exercise: &ObjectId) -> Result<usize, SessionError> {
        let entry = self.exercise_mut(exercise)?;
        entry.add_set()?;
        Ok(entry.sets.len() - 1)
    }

    /// The set at `index` in the most recently completed record of the same
    /// exercise, used to prefill what was lifted last time.
    /// # Errors
    /// As [`Self::exercise_mut`], or a store failure.
    pub fn previous_set(&self, exercise: &ObjectId, index: usize) -> Result<Option<SetRecord>, SessionError> {
        let entry = self
            .current_workout()
            .ok_or(SessionError::NoActiveSession)?
            .exercise(exercise)
            .ok_or(SessionError::ExerciseNotInSession(*exercise))?;
        let Some(details) = &entry.details else {
            return Ok(None);
        };
        let Some(latest) = self
            .store
            .resolve_details(&details.id)?
            .and_then(|d| d.latest_completed_record)
        else {
            return Ok(None);
        };
        Ok(self
            .store
            .resolve_exercise::<SetRecord>(&latest)?
            .and_then(|record| record.sets.get(index).cloned()))
    }

    /// Writes the in-memory workout to the store.
    /// # Errors
    /// `SessionError::NoActiveSession` or a store failure.
    pub fn save_progress(&mut self) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        self.store
            .transaction(|store| store.update_workout(&mut active.workout))?;
        debug!("Saved progress on workout {}", active.id);
        Ok(())
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match &self.active {
            Some(active) => Err(SessionError::AlreadyActive(active.id)),
            None => Ok(()),
        }
    }

    fn begin(&mut self, mut workout: WorkoutRecord) -> Result<ObjectId, SessionError> {
        // Saved before the pointer is written so the id always resolves
        let id = self
            .store
            .transaction(|store| store.insert_workout(&mut workout))
            .map_err(|e| {
                error!("Failed to store new workout: {}", e);
                e
            })?;

        if let Err(e) = self.pointer.write(&id) {
            warn!("Workout {} will not be restored after a restart: {}", id, e);
        }
        info!("Started workout '{}' ({})", workout.name, id);
        self.active = Some(ActiveSession {
            id,
            started_at: workout.created_at,
            workout,
        });
        Ok(id)
    }

    fn clear_current(&mut self) {
        self.active = None;
        if let Err(e) = self.pointer.remove() {
            warn!("Failed to remove session pointer: {}", e);
        }
    }
}
