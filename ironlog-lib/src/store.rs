//src/store.rs
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{self, DbError};
use crate::model::{Category, EntryKind, ExerciseDetails, ExerciseEntry, SetShape, WorkoutEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Store transaction failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode or decode sets: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Identifier refers to a {found}, expected a {expected}")]
    WrongEntity { expected: Entity, found: Entity },
    #[error("Object has not been inserted into the store yet")]
    UnsavedObject,
    #[error("Object is already stored as {0}")]
    AlreadyInserted(ObjectId),
    #[error("Exercise has no details and cannot be stored")]
    MissingDetails,
    #[error("No object found for {0}")]
    NotFound(ObjectId),
}

/// Kinds of object the store hands out identifiers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Entity {
    ExerciseDetails,
    WorkoutRecord,
    ExerciseRecord,
    WorkoutTemplate,
    ExerciseTemplate,
}

impl Entity {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::ExerciseDetails => "exercise_details",
            Self::WorkoutRecord | Self::WorkoutTemplate => "workouts",
            Self::ExerciseRecord | Self::ExerciseTemplate => "exercises",
        }
    }

    #[must_use]
    pub const fn kind(self) -> Option<EntryKind> {
        match self {
            Self::ExerciseDetails => None,
            Self::WorkoutRecord | Self::ExerciseRecord => Some(EntryKind::Record),
            Self::WorkoutTemplate | Self::ExerciseTemplate => Some(EntryKind::Template),
        }
    }

    #[must_use]
    pub const fn for_workout(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Record => Self::WorkoutRecord,
            EntryKind::Template => Self::WorkoutTemplate,
        }
    }

    #[must_use]
    pub const fn for_exercise(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Record => Self::ExerciseRecord,
            EntryKind::Template => Self::ExerciseTemplate,
        }
    }
}

/// Stable, serialisable handle to a stored object. Only meaningful to the
/// store that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    store: Uuid,
    entity: Entity,
    row: i64,
}

impl ObjectId {
    pub(crate) const fn new(store: Uuid, entity: Entity, row: i64) -> Self {
        Self { store, entity, row }
    }

    #[must_use]
    pub const fn entity(&self) -> Entity {
        self.entity
    }

    #[must_use]
    pub const fn store(&self) -> Uuid {
        self.store
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.row)
    }
}

/// Object-graph persistence used by the session manager.
///
/// Mutations are visible to later reads on the same store immediately but
/// only become durable after [`ObjectStore::save`]. Resolving an identifier
/// that no longer points at a live object (or was minted by another store)
/// yields `Ok(None)`.
pub trait ObjectStore {
    fn store_id(&self) -> Uuid;

    fn insert_details(&mut self, name: &str, category: Category) -> Result<ExerciseDetails, StoreError>;

    /// Inserts the workout and every exercise that has details, assigning ids.
    fn insert_workout<S: SetShape>(&mut self, workout: &mut WorkoutEntry<S>) -> Result<ObjectId, StoreError>;

    fn insert_exercise<S: SetShape>(
        &mut self,
        workout: &ObjectId,
        exercise: &mut ExerciseEntry<S>,
    ) -> Result<ObjectId, StoreError>;

    /// Writes the name and every exercise's sets, inserting exercises that
    /// have gained details since the last write.
    fn update_workout<S: SetShape>(&mut self, workout: &mut WorkoutEntry<S>) -> Result<(), StoreError>;

    fn update_exercise_sets<S: SetShape>(&mut self, exercise: &ExerciseEntry<S>) -> Result<(), StoreError>;

    fn rename_details(&mut self, id: &ObjectId, name: &str) -> Result<(), StoreError>;

    /// Returns whether the details now point at `record`.
    fn set_latest_record(&mut self, details: &ObjectId, record: &ObjectId) -> Result<bool, StoreError>;

    /// Returns whether an object was removed.
    fn delete(&mut self, id: &ObjectId) -> Result<bool, StoreError>;

    fn delete_all(&mut self, entity: Entity) -> Result<usize, StoreError>;

    fn save(&mut self) -> Result<(), StoreError>;

    /// Runs `block` atomically. Saves when it succeeds, rolls back its
    /// changes when it fails.
    fn transaction<T, E, F>(&mut self, block: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>;

    fn resolve_workout<S: SetShape>(&self, id: &ObjectId) -> Result<Option<WorkoutEntry<S>>, StoreError>;

    fn resolve_exercise<S: SetShape>(&self, id: &ObjectId) -> Result<Option<ExerciseEntry<S>>, StoreError>;

    fn resolve_details(&self, id: &ObjectId) -> Result<Option<ExerciseDetails>, StoreError>;

    fn find_details_by_name(&self, name: &str) -> Result<Option<ExerciseDetails>, StoreError>;

    fn list_details(&self) -> Result<Vec<ExerciseDetails>, StoreError>;

    /// Most recent first.
    fn list_workouts<S: SetShape>(&self, limit: Option<u32>) -> Result<Vec<WorkoutEntry<S>>, StoreError>;

    fn count(&self, entity: Entity) -> Result<usize, StoreError>;
}

/// SQLite-backed object store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    store_id: Uuid,
    tx_depth: u32,
}

impl SqliteStore {
    /// # Errors
    /// Returns `StoreError` if the database cannot be opened or initialised.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open_db(path)?;
        Self::from_connection(conn)
    }

    /// # Errors
    /// Returns `StoreError` if the database cannot be initialised.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = db::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        db::init_db(&conn)?;
        let store_id = db::store_uuid(&conn)?;
        debug!(%store_id, "Opened store");
        Ok(Self {
            conn,
            store_id,
            tx_depth: 0,
        })
    }

    /// True while mutations are pending a `save`.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN DEFERRED")?;
        }
        Ok(())
    }

    fn id(&self, entity: Entity, row: i64) -> ObjectId {
        ObjectId::new(self.store_id, entity, row)
    }

    /// Local row for `id`, or `None` when it belongs to another store.
    fn local_row(&self, id: &ObjectId, expected: Entity) -> Result<Option<i64>, StoreError> {
        if id.store != self.store_id {
            return Ok(None);
        }
        if id.entity != expected {
            return Err(StoreError::WrongEntity {
                expected,
                found: id.entity,
            });
        }
        Ok(Some(id.row))
    }

    fn owned_row(&self, id: &ObjectId, expected: Entity) -> Result<i64, StoreError> {
        self.local_row(id, expected)?.ok_or(StoreError::NotFound(*id))
    }

    fn details_from_row(&self, row: db::DetailsRow) -> ExerciseDetails {
        ExerciseDetails {
            id: self.id(Entity::ExerciseDetails, row.id),
            name: row.name,
            category: row.category,
            latest_completed_record: row
                .latest_record_id
                .map(|record| self.id(Entity::ExerciseRecord, record)),
        }
    }

    fn exercise_from_row<S: SetShape>(&self, row: db::ExerciseRow) -> Result<ExerciseEntry<S>, StoreError> {
        let details = match row.details_id {
            Some(details_id) => db::get_details(&self.conn, details_id)?.map(|d| self.details_from_row(d)),
            None => None,
        };
        Ok(ExerciseEntry {
            id: Some(self.id(Entity::for_exercise(S::KIND), row.id)),
            created_at: row.created_at,
            details,
            sets: serde_json::from_str(&row.sets_json)?,
        })
    }

    fn workout_from_row<S: SetShape>(&self, row: db::WorkoutRow) -> Result<WorkoutEntry<S>, StoreError> {
        let exercises = db::list_exercises_for_workout(&self.conn, row.id)?
            .into_iter()
            .map(|exercise| self.exercise_from_row(exercise))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkoutEntry {
            id: Some(self.id(Entity::for_workout(S::KIND), row.id)),
            name: row.name,
            created_at: row.created_at,
            exercises,
        })
    }

    fn insert_exercise_row<S: SetShape>(
        &self,
        workout_row: i64,
        exercise: &mut ExerciseEntry<S>,
    ) -> Result<ObjectId, StoreError> {
        if let Some(existing) = exercise.id {
            return Err(StoreError::AlreadyInserted(existing));
        }
        let details = exercise.details.as_ref().ok_or(StoreError::MissingDetails)?;
        let details_row = self.owned_row(&details.id, Entity::ExerciseDetails)?;
        let sets_json = serde_json::to_string(&exercise.sets)?;
        let row = db::insert_exercise(
            &self.conn,
            S::KIND,
            workout_row,
            Some(details_row),
            exercise.created_at,
            &sets_json,
        )?;
        let id = self.id(Entity::for_exercise(S::KIND), row);
        exercise.id = Some(id);
        Ok(id)
    }
}

impl ObjectStore for SqliteStore {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn insert_details(&mut self, name: &str, category: Category) -> Result<ExerciseDetails, StoreError> {
        self.begin_if_needed()?;
        let row = db::insert_details(&self.conn, name, category)?;
        Ok(ExerciseDetails {
            id: self.id(Entity::ExerciseDetails, row),
            name: name.to_string(),
            category,
            latest_completed_record: None,
        })
    }

    fn insert_workout<S: SetShape>(&mut self, workout: &mut WorkoutEntry<S>) -> Result<ObjectId, StoreError> {
        if let Some(existing) = workout.id {
            return Err(StoreError::AlreadyInserted(existing));
        }
        self.begin_if_needed()?;
        let row = db::insert_workout(&self.conn, S::KIND, &workout.name, workout.created_at)?;
        for exercise in workout.exercises.iter_mut().filter(|e| e.is_persistable()) {
            self.insert_exercise_row(row, exercise)?;
        }
        let id = self.id(Entity::for_workout(S::KIND), row);
        workout.id = Some(id);
        debug!(%id, exercises = workout.exercises.len(), "Inserted workout");
        Ok(id)
    }

    fn insert_exercise<S: SetShape>(
        &mut self,
        workout: &ObjectId,
        exercise: &mut ExerciseEntry<S>,
    ) -> Result<ObjectId, StoreError> {
        let workout_row = self.owned_row(workout, Entity::for_workout(S::KIND))?;
        self.begin_if_needed()?;
        self.insert_exercise_row(workout_row, exercise)
    }

    fn update_workout<S: SetShape>(&mut self, workout: &mut WorkoutEntry<S>) -> Result<(), StoreError> {
        let id = workout.id.ok_or(StoreError::UnsavedObject)?;
        let row = self.owned_row(&id, Entity::for_workout(S::KIND))?;
        self.begin_if_needed()?;
        if db::update_workout_name(&self.conn, row, &workout.name)? == 0 {
            return Err(StoreError::NotFound(id));
        }
        for exercise in workout.exercises.iter_mut().filter(|e| e.is_persistable()) {
            if exercise.id.is_some() {
                self.update_exercise_sets(exercise)?;
            } else {
                self.insert_exercise_row(row, exercise)?;
            }
        }
        Ok(())
    }

    fn update_exercise_sets<S: SetShape>(&mut self, exercise: &ExerciseEntry<S>) -> Result<(), StoreError> {
        let id = exercise.id.ok_or(StoreError::UnsavedObject)?;
        let row = self.owned_row(&id, Entity::for_exercise(S::KIND))?;
        self.begin_if_needed()?;
        let sets_json = serde_json::to_string(&exercise.sets)?;
        if db::update_exercise_sets(&self.conn, row, &sets_json)? == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn rename_details(&mut self, id: &ObjectId, name: &str) -> Result<(), StoreError> {
        let row = self.owned_row(id, Entity::ExerciseDetails)?;
        self.begin_if_needed()?;
        if db::rename_details(&self.conn, row, name)? == 0 {
            return Err(StoreError::NotFound(*id));
        }
        Ok(())
    }

    fn set_latest_record(&mut self, details: &ObjectId, record: &ObjectId) -> Result<bool, StoreError> {
        let (Some(details_row), Some(record_row)) = (
            self.local_row(details, Entity::ExerciseDetails)?,
            self.local_row(record, Entity::ExerciseRecord)?,
        ) else {
            return Ok(false);
        };
        self.begin_if_needed()?;
        let moved = db::set_latest_record(&self.conn, details_row, record_row)?;
        if !moved {
            debug!(%details, %record, "Kept newer latest record");
        }
        Ok(moved)
    }

    fn delete(&mut self, id: &ObjectId) -> Result<bool, StoreError> {
        let Some(row) = self.local_row(id, id.entity)? else {
            return Ok(false);
        };
        self.begin_if_needed()?;
        let removed = db::delete_row(&self.conn, id.entity.table(), id.entity.kind(), row)?;
        Ok(removed > 0)
    }

    fn delete_all(&mut self, entity: Entity) -> Result<usize, StoreError> {
        self.begin_if_needed()?;
        let removed = db::delete_all(&self.conn, entity.table(), entity.kind())?;
        debug!(%entity, removed, "Bulk delete");
        Ok(removed)
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if self.tx_depth > 0 || self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT")?;
        debug!(store_id = %self.store_id, "Saved store");
        Ok(())
    }

    fn transaction<T, E, F>(&mut self, block: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.begin_if_needed()?;
        let savepoint = format!("ironlog_tx_{}", self.tx_depth);
        self.conn
            .execute_batch(&format!("SAVEPOINT {savepoint}"))
            .map_err(StoreError::from)?;
        self.tx_depth += 1;
        let result = block(self);
        self.tx_depth -= 1;

        match result {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {savepoint}"))
                    .map_err(StoreError::from)?;
                self.save()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {savepoint}; RELEASE {savepoint}"))
                {
                    warn!("Failed to roll back {savepoint}: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    fn resolve_workout<S: SetShape>(&self, id: &ObjectId) -> Result<Option<WorkoutEntry<S>>, StoreError> {
        let Some(row) = self.local_row(id, Entity::for_workout(S::KIND))? else {
            return Ok(None);
        };
        db::get_workout(&self.conn, S::KIND, row)?
            .map(|workout| self.workout_from_row(workout))
            .transpose()
    }

    fn resolve_exercise<S: SetShape>(&self, id: &ObjectId) -> Result<Option<ExerciseEntry<S>>, StoreError> {
        let Some(row) = self.local_row(id, Entity::for_exercise(S::KIND))? else {
            return Ok(None);
        };
        db::get_exercise(&self.conn, S::KIND, row)?
            .map(|exercise| self.exercise_from_row(exercise))
            .transpose()
    }

    fn resolve_details(&self, id: &ObjectId) -> Result<Option<ExerciseDetails>, StoreError> {
        let Some(row) = self.local_row(id, Entity::ExerciseDetails)? else {
            return Ok(None);
        };
        Ok(db::get_details(&self.conn, row)?.map(|d| self.details_from_row(d)))
    }

    fn find_details_by_name(&self, name: &str) -> Result<Option<ExerciseDetails>, StoreError> {
        Ok(db::get_details_by_name(&self.conn, name)?.map(|d| self.details_from_row(d)))
    }

    fn list_details(&self) -> Result<Vec<ExerciseDetails>, StoreError> {
        Ok(db::list_details(&self.conn)?
            .into_iter()
            .map(|d| self.details_from_row(d))
            .collect())
    }

    fn list_workouts<S: SetShape>(&self, limit: Option<u32>) -> Result<Vec<WorkoutEntry<S>>, StoreError> {
        db::list_workouts(&self.conn, S::KIND, limit)?
            .into_iter()
            .map(|row| self.workout_from_row(row))
            .collect()
    }

    fn count(&self, entity: Entity) -> Result<usize, StoreError> {
        Ok(db::count_rows(&self.conn, entity.table(), entity.kind())?)
    }
}
