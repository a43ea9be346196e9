// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::path::{Path, PathBuf};

// --- Declare modules ---
mod config;
pub mod db;
pub mod model;
pub mod pointer;
pub mod session;
pub mod store;

// --- Expose public types ---
pub use config::{
    get_config_path as get_config_path_util, get_data_dir as get_data_dir_util,
    load as load_config_util, save as save_config_util, Config, ConfigError, Units,
    DEFAULT_POINTER_FILE_NAME, DEFAULT_WORKOUT_NAME,
};
pub use db::DbError;
pub use model::{
    Category, EntryKind, ExerciseDetails, ExerciseRecord, ExerciseTemplate, ModelError, SetField,
    SetRecord, SetShape, SetTemplate, SetValues, WorkoutRecord, WorkoutTemplate,
};
pub use pointer::{PointerError, SessionPointer};
pub use session::{
    CancelOutcome, CompletionOutcome, RestoreOutcome, SessionError, SessionManager,
    SessionOptions, SKIP_RESTORE_ENV_VAR,
};
pub use store::{Entity, ObjectId, ObjectStore, SqliteStore, StoreError};

/// Values entered for a set, in the user's units. `None` leaves a field as is.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SetInput {
    pub weight: Option<f64>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub duration_seconds: Option<u32>,
    pub distance: Option<f64>,
    /// Start from the values of the same set last time.
    pub from_previous: bool,
    pub complete: bool,
}

impl SetInput {
    fn is_empty(&self) -> bool {
        self.weight.is_none()
            && self.reps.is_none()
            && self.rpe.is_none()
            && self.duration_seconds.is_none()
            && self.distance.is_none()
    }
}

pub struct AppService {
    pub config: Config,
    pub session: SessionManager<SqliteStore>,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppService {
    /// Initializes the application service and resumes any in-progress workout.
    /// # Errors
    /// Returns `anyhow::Error` if config/data path determination, loading, or store initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let data_dir = config::get_data_dir().context("Failed to determine data directory")?;
        let db_path = db::get_db_path(&data_dir).context("Failed to determine database path")?;
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let pointer = SessionPointer::new(data_dir.join(&config.pointer_file_name))
            .with_write_attempts(config.pointer_write_attempts);

        Ok(Self::from_parts(config, store, pointer, db_path, config_path))
    }

    /// Wires the service from already opened parts.
    #[must_use]
    pub fn from_parts(
        config: Config,
        store: SqliteStore,
        pointer: SessionPointer,
        db_path: PathBuf,
        config_path: PathBuf,
    ) -> Self {
        let session = SessionManager::new(store, pointer, SessionOptions::from_config(&config));
        Self {
            config,
            session,
            db_path,
            config_path,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn set_units(&mut self, units: Units) -> Result<(), ConfigError> {
        self.config.units = units;
        self.save_config()
    }

    // --- Exercise catalog ---

    /// # Errors
    /// Fails on an empty or already used name.
    pub fn create_exercise(&mut self, name: &str, category: Category) -> Result<ExerciseDetails> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        self.session
            .store_mut()
            .transaction(|store| store.insert_details(trimmed_name, category))
            .with_context(|| format!("Failed to create exercise '{trimmed_name}'"))
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_exercises(&self) -> Result<Vec<ExerciseDetails>> {
        self.session
            .store()
            .list_details()
            .context("Failed to list exercises")
    }

    /// Case-insensitive lookup by name.
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_exercise(&self, name: &str) -> Result<Option<ExerciseDetails>> {
        self.session
            .store()
            .find_details_by_name(name.trim())
            .with_context(|| format!("Failed to look up exercise '{name}'"))
    }

    fn require_exercise(&self, name: &str) -> Result<ExerciseDetails> {
        match self.get_exercise(name)? {
            Some(details) => Ok(details),
            None => bail!("Exercise '{}' not found.", name.trim()),
        }
    }

    /// # Errors
    /// Fails if the exercise is unknown or the new name is taken.
    pub fn rename_exercise(&mut self, name: &str, new_name: &str) -> Result<ExerciseDetails> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            bail!("New exercise name cannot be empty.");
        }
        let mut details = self.require_exercise(name)?;
        self.session
            .store_mut()
            .transaction(|store| store.rename_details(&details.id, new_name))
            .with_context(|| format!("Failed to rename exercise '{}'", details.name))?;
        details.name = new_name.to_string();

        if let Some(workout) = self.session.current_workout_mut() {
            for exercise_details in workout
                .exercises
                .iter_mut()
                .filter_map(|e| e.details.as_mut())
                .filter(|d| d.id == details.id)
            {
                exercise_details.name = details.name.clone();
            }
        }
        Ok(details)
    }

    /// Deletes the exercise and every record of it.
    /// # Errors
    /// Refused while the exercise is part of the workout in progress.
    pub fn delete_exercise(&mut self, name: &str) -> Result<()> {
        let details = self.require_exercise(name)?;
        let in_use = self.session.current_workout().is_some_and(|w| {
            w.exercises
                .iter()
                .any(|e| e.details.as_ref().is_some_and(|d| d.id == details.id))
        });
        if in_use {
            bail!(
                "Exercise '{}' is part of the workout in progress. Remove it from the workout first.",
                details.name
            );
        }
        self.session
            .store_mut()
            .transaction(|store| store.delete(&details.id))
            .with_context(|| format!("Failed to delete exercise '{}'", details.name))?;
        Ok(())
    }

    // --- Templates ---

    /// # Errors
    /// Fails on an empty name or a store failure.
    pub fn create_template(&mut self, name: &str) -> Result<WorkoutTemplate> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            bail!("Template name cannot be empty.");
        }
        if self.find_template(trimmed_name)?.is_some() {
            bail!("A template named '{trimmed_name}' already exists.");
        }
        let mut template = WorkoutTemplate::new(trimmed_name);
        self.session
            .store_mut()
            .transaction(|store| store.insert_workout(&mut template))
            .with_context(|| format!("Failed to create template '{trimmed_name}'"))?;
        Ok(template)
    }

    /// Appends an exercise with `sets` blank planned sets.
    /// # Errors
    /// Fails if the template or exercise is unknown.
    pub fn add_template_exercise(
        &mut self,
        template_name: &str,
        exercise_name: &str,
        sets: usize,
    ) -> Result<ExerciseTemplate> {
        let template = self.require_template(template_name)?;
        let template_id = template
            .id
            .context("Stored template is missing its identifier")?;
        let details = self.require_exercise(exercise_name)?;

        let mut exercise = ExerciseTemplate::new(Some(details));
        if let Some(last) = template.exercises.iter().map(|e| e.created_at).max() {
            if exercise.created_at <= last {
                exercise.created_at = last + Duration::microseconds(1);
            }
        }
        for _ in 0..sets {
            exercise.add_set()?;
        }
        self.session
            .store_mut()
            .transaction(|store| store.insert_exercise(&template_id, &mut exercise))
            .with_context(|| format!("Failed to add exercise to template '{}'", template.name))?;
        Ok(exercise)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_templates(&self) -> Result<Vec<WorkoutTemplate>> {
        let mut templates: Vec<WorkoutTemplate> = self
            .session
            .store()
            .list_workouts(None)
            .context("Failed to list templates")?;
        templates.sort_by_key(|t| t.name.to_lowercase());
        Ok(templates)
    }

    /// Case-insensitive lookup by name.
    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_template(&self, name: &str) -> Result<Option<WorkoutTemplate>> {
        let name = name.trim();
        Ok(self
            .list_templates()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    fn require_template(&self, name: &str) -> Result<WorkoutTemplate> {
        match self.find_template(name)? {
            Some(template) => Ok(template),
            None => bail!("Template '{}' not found.", name.trim()),
        }
    }

    /// # Errors
    /// Fails if the template is unknown or the store fails.
    pub fn delete_template(&mut self, name: &str) -> Result<()> {
        let template = self.require_template(name)?;
        let template_id = template
            .id
            .context("Stored template is missing its identifier")?;
        self.session
            .store_mut()
            .transaction(|store| -> Result<(), StoreError> {
                for exercise_id in template.exercises.iter().filter_map(|e| e.id) {
                    store.delete(&exercise_id)?;
                }
                store.delete(&template_id)?;
                Ok(())
            })
            .with_context(|| format!("Failed to delete template '{}'", template.name))
    }

    // --- Workout session ---

    /// # Errors
    /// Fails while another workout is in progress or if the store fails.
    pub fn start_workout(&mut self) -> Result<ObjectId> {
        self.session
            .start_new_workout()
            .context("Failed to start workout")
    }

    /// # Errors
    /// Fails if the template is unknown, a workout is in progress, or the store fails.
    pub fn start_from_template(&mut self, name: &str) -> Result<ObjectId> {
        let template = self.require_template(name)?;
        self.session
            .start_from_template(&template)
            .with_context(|| format!("Failed to start workout from template '{}'", template.name))
    }

    /// Adds a catalog exercise to the workout in progress.
    /// # Errors
    /// Fails if no workout is in progress or the exercise is unknown.
    pub fn add_exercise_to_workout(&mut self, exercise_name: &str) -> Result<ObjectId> {
        let details = self.require_exercise(exercise_name)?;
        self.session
            .add_exercise(&details)
            .with_context(|| format!("Failed to add '{}' to the workout", details.name))
    }

    /// Identifier of the exercise at 1-based `position` in display order.
    /// # Errors
    /// Fails if no workout is in progress or the position is out of range.
    pub fn exercise_id_at(&self, position: usize) -> Result<ObjectId> {
        let workout = self
            .session
            .current_workout()
            .ok_or(SessionError::NoActiveSession)?;
        let ordered = workout.ordered_exercises();
        let Some(exercise) = position.checked_sub(1).and_then(|idx| ordered.get(idx)) else {
            bail!(
                "No exercise at position {position}. The workout has {} exercises.",
                ordered.len()
            );
        };
        exercise
            .id
            .context("Exercise has not been stored yet")
    }

    /// # Errors
    /// Fails if the position is invalid or the store fails.
    pub fn remove_exercise_from_workout(&mut self, position: usize) -> Result<ExerciseRecord> {
        let id = self.exercise_id_at(position)?;
        self.session
            .remove_exercise(&id)
            .context("Failed to remove exercise from the workout")
    }

    /// Adds a blank set to the exercise at `position`. Returns its 1-based number.
    /// # Errors
    /// Fails if the position is invalid or the store fails.
    pub fn add_set(&mut self, position: usize) -> Result<usize> {
        let id = self.exercise_id_at(position)?;
        let index = self.session.add_set(&id)?;
        self.session
            .save_progress()
            .context("Failed to save the new set")?;
        Ok(index + 1)
    }

    /// Fills in a set of the exercise at `position`. Without `set_number` a
    /// new set is appended. Returns the 1-based set number and its values.
    /// # Errors
    /// Fails on invalid positions, fields the exercise does not carry, or a
    /// completion request while required fields are empty.
    pub fn log_set(
        &mut self,
        position: usize,
        set_number: Option<usize>,
        input: &SetInput,
    ) -> Result<(usize, SetRecord)> {
        let id = self.exercise_id_at(position)?;
        let units = self.config.units;

        let (index, mut set) = {
            let exercise = self.session.exercise_mut(&id)?;
            match set_number {
                Some(number) => {
                    let Some(set) = number.checked_sub(1).and_then(|idx| exercise.sets.get(idx)) else {
                        bail!("Set {number} does not exist. The exercise has {} sets.", exercise.sets.len());
                    };
                    (number - 1, set.clone())
                }
                None => {
                    let category = exercise
                        .category()
                        .ok_or(ModelError::MissingDetails)?;
                    (exercise.sets.len(), SetRecord::new(category))
                }
            }
        };

        if input.from_previous {
            match self.session.previous_set(&id, index)? {
                Some(previous) => set.copy_values_from(previous.values())?,
                None => tracing::debug!("No previous set {} to copy", index + 1),
            }
        }
        apply_input(&mut set, input, units)?;
        if input.complete && !set.set_complete(true) {
            let missing: Vec<String> = set
                .values()
                .missing_fields()
                .iter()
                .map(ToString::to_string)
                .collect();
            bail!("Set cannot be completed, missing: {}", missing.join(", "));
        }
        if !input.complete && input.is_empty() && !input.from_previous {
            bail!("Nothing to log. Provide at least one value.");
        }

        let exercise = self.session.exercise_mut(&id)?;
        if index < exercise.sets.len() {
            exercise.sets[index] = set.clone();
        } else {
            exercise.sets.push(set.clone());
        }
        self.session
            .save_progress()
            .context("Failed to save the set")?;
        Ok((index + 1, set))
    }

    /// Flips the completion flag of a set. Returns the new state.
    /// # Errors
    /// Fails on invalid positions or when required fields are empty.
    pub fn toggle_set_complete(&mut self, position: usize, set_number: usize) -> Result<bool> {
        let id = self.exercise_id_at(position)?;
        let exercise = self.session.exercise_mut(&id)?;
        let set_count = exercise.sets.len();
        let Some(set) = set_number
            .checked_sub(1)
            .and_then(|idx| exercise.sets.get_mut(idx))
        else {
            bail!("Set {set_number} does not exist. The exercise has {set_count} sets.");
        };
        let complete = set.toggle_complete();
        if !complete && !set.values().is_filled() {
            let missing: Vec<String> = set
                .values()
                .missing_fields()
                .iter()
                .map(ToString::to_string)
                .collect();
            bail!("Set cannot be completed, missing: {}", missing.join(", "));
        }
        self.session
            .save_progress()
            .context("Failed to save the set")?;
        Ok(complete)
    }

    /// # Errors
    /// Fails if no workout is in progress or the store fails.
    pub fn rename_workout(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Workout name cannot be empty.");
        }
        self.session.rename(name).context("Failed to rename workout")
    }

    /// # Errors
    /// Returns an error if the discard fails; the workout stays in progress.
    pub fn cancel_workout(&mut self) -> Result<CancelOutcome> {
        self.session.cancel().context("Failed to cancel workout")
    }

    /// # Errors
    /// Returns an error if the commit fails; the workout stays in progress.
    pub fn finish_workout(&mut self) -> Result<CompletionOutcome> {
        self.session.complete().context("Failed to finish workout")
    }

    // --- History ---

    /// Completed workouts, most recent first. The workout in progress is excluded.
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_workouts(&self, limit: Option<u32>) -> Result<Vec<WorkoutRecord>> {
        let current = self.session.current_workout_id();
        let fetch_limit = match (limit, current) {
            (Some(limit), Some(_)) => Some(limit.saturating_add(1)),
            (limit, _) => limit,
        };
        let mut workouts: Vec<WorkoutRecord> = self
            .session
            .store()
            .list_workouts(fetch_limit)
            .context("Failed to list workouts")?;
        workouts.retain(|w| current.is_none() || w.id != current);
        if let Some(limit) = limit {
            workouts.truncate(limit as usize);
        }
        Ok(workouts)
    }

    /// Deletes every completed workout. Returns how many were removed.
    /// # Errors
    /// Refused while a workout is in progress.
    pub fn clear_history(&mut self) -> Result<usize> {
        if let Some(id) = self.session.current_workout_id() {
            return Err(SessionError::AlreadyActive(id))
                .context("Cannot clear history while a workout is in progress");
        }
        self.session
            .store_mut()
            .transaction(|store| -> Result<usize, StoreError> {
                store.delete_all(Entity::ExerciseRecord)?;
                store.delete_all(Entity::WorkoutRecord)
            })
            .context("Failed to clear workout history")
    }
}

fn apply_input(set: &mut SetRecord, input: &SetInput, units: Units) -> Result<(), ModelError> {
    if let Some(weight) = input.weight {
        set.set_weight(Some(units.weight_from_input(weight)))?;
    }
    if let Some(reps) = input.reps {
        set.set_reps(Some(reps))?;
    }
    if let Some(rpe) = input.rpe {
        set.set_rpe(Some(rpe))?;
    }
    if let Some(duration) = input.duration_seconds {
        set.set_duration_seconds(Some(duration))?;
    }
    if let Some(distance) = input.distance {
        set.set_distance(Some(units.distance_from_input(distance)))?;
    }
    Ok(())
}
