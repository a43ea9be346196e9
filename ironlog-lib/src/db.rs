//src/db.rs
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Category, EntryKind};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database update failed: {0}")]
    UpdateFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Exercise name must be unique (case-insensitive): '{0}' already exists.")]
    ExerciseNameNotUnique(String),
    #[error("Store identity is corrupt: {0}")]
    CorruptStoreId(String),
}

const DB_FILE_NAME: &str = "ironlog.sqlite";
const STORE_ID_KEY: &str = "store_id";

/// Path to the SQLite database inside the given data directory.
pub fn get_db_path(data_dir: &Path) -> Result<PathBuf, DbError> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)?;
    }
    Ok(data_dir.join(DB_FILE_NAME))
}

/// Opens a connection with foreign keys enforced.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, DbError> {
    let conn = Connection::open(path).map_err(DbError::Connection)?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory().map_err(DbError::Connection)?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exercise_details (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            category TEXT NOT NULL,
            -- weak reference: cleared when the record goes away
            latest_record_id INTEGER REFERENCES exercises(id) ON DELETE SET NULL
        );

        CREATE TABLE IF NOT EXISTS workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('record', 'template')),
            name TEXT NOT NULL,
            created_at TEXT NOT NULL -- RFC3339, UTC, microseconds
        );

        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('record', 'template')),
            workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            details_id INTEGER REFERENCES exercise_details(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            sets TEXT NOT NULL DEFAULT '[]' -- JSON array of embedded sets
        );

        CREATE INDEX IF NOT EXISTS idx_workouts_kind_created ON workouts(kind, created_at);
        CREATE INDEX IF NOT EXISTS idx_exercises_workout ON exercises(workout_id);
        CREATE INDEX IF NOT EXISTS idx_exercises_details ON exercises(details_id);",
    )
    .map_err(DbError::Connection)?;
    Ok(())
}

/// Returns the store's identity, minting one on first use.
pub fn store_uuid(conn: &Connection) -> Result<Uuid, DbError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![STORE_ID_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::QueryFailed)?;

    if let Some(value) = existing {
        return Uuid::parse_str(&value).map_err(|_| DbError::CorruptStoreId(value));
    }

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)",
        params![STORE_ID_KEY, id.to_string()],
    )
    .map_err(DbError::InsertFailed)?;
    Ok(id)
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Fixed-width so lexical order matches chronological order in SQL
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

// ---- Exercise Details ----

#[derive(Debug, Clone, PartialEq)]
pub struct DetailsRow {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub latest_record_id: Option<i64>,
}

fn map_row_to_details(row: &Row) -> Result<DetailsRow, rusqlite::Error> {
    let category_str: String = row.get(2)?;
    let category = category_str.parse::<Category>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DetailsRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category,
        latest_record_id: row.get(3)?,
    })
}

/// Creates a catalog exercise. Returns its row id.
pub fn insert_details(conn: &Connection, name: &str, category: Category) -> Result<i64, DbError> {
    match conn.execute(
        "INSERT INTO exercise_details (name, category) VALUES (?1, ?2)",
        params![name, category.as_ref()],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_constraint_violation(&e) => Err(DbError::ExerciseNameNotUnique(name.to_string())),
        Err(e) => Err(DbError::InsertFailed(e)),
    }
}

pub fn get_details(conn: &Connection, id: i64) -> Result<Option<DetailsRow>, DbError> {
    conn.query_row(
        "SELECT id, name, category, latest_record_id FROM exercise_details WHERE id = ?1",
        params![id],
        map_row_to_details,
    )
    .optional()
    .map_err(DbError::QueryFailed)
}

/// Case-insensitive lookup by name.
pub fn get_details_by_name(conn: &Connection, name: &str) -> Result<Option<DetailsRow>, DbError> {
    conn.query_row(
        "SELECT id, name, category, latest_record_id FROM exercise_details WHERE name = ?1 COLLATE NOCASE",
        params![name],
        map_row_to_details,
    )
    .optional()
    .map_err(DbError::QueryFailed)
}

pub fn list_details(conn: &Connection) -> Result<Vec<DetailsRow>, DbError> {
    let mut stmt = conn
        .prepare("SELECT id, name, category, latest_record_id FROM exercise_details ORDER BY name ASC")
        .map_err(DbError::QueryFailed)?;
    let rows = stmt
        .query_map([], map_row_to_details)
        .map_err(DbError::QueryFailed)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

pub fn rename_details(conn: &Connection, id: i64, new_name: &str) -> Result<usize, DbError> {
    match conn.execute(
        "UPDATE exercise_details SET name = ?1 WHERE id = ?2",
        params![new_name, id],
    ) {
        Ok(rows) => Ok(rows),
        Err(e) if is_constraint_violation(&e) => {
            Err(DbError::ExerciseNameNotUnique(new_name.to_string()))
        }
        Err(e) => Err(DbError::UpdateFailed(e)),
    }
}

/// Points `details_id` at `record_id` unless the current latest record
/// was created after it. Returns whether the pointer moved.
pub fn set_latest_record(conn: &Connection, details_id: i64, record_id: i64) -> Result<bool, DbError> {
    let rows = conn
        .execute(
            "UPDATE exercise_details SET latest_record_id = :record
             WHERE id = :details
               AND (latest_record_id IS NULL
                    OR latest_record_id = :record
                    OR NOT EXISTS (SELECT 1 FROM exercises WHERE id = latest_record_id)
                    OR (SELECT created_at FROM exercises WHERE id = latest_record_id)
                       <= (SELECT created_at FROM exercises WHERE id = :record))",
            named_params! { ":record": record_id, ":details": details_id },
        )
        .map_err(DbError::UpdateFailed)?;
    Ok(rows > 0)
}

// ---- Workouts ----

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn map_row_to_workout(row: &Row) -> Result<WorkoutRow, rusqlite::Error> {
    let created_at_str: String = row.get(2)?;
    Ok(WorkoutRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_timestamp(2, &created_at_str)?,
    })
}

pub fn insert_workout(
    conn: &Connection,
    kind: EntryKind,
    name: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO workouts (kind, name, created_at) VALUES (:kind, :name, :created_at)",
        named_params! {
            ":kind": kind.as_ref(),
            ":name": name,
            ":created_at": format_timestamp(created_at),
        },
    )
    .map_err(DbError::InsertFailed)?;
    Ok(conn.last_insert_rowid())
}

pub fn update_workout_name(conn: &Connection, id: i64, name: &str) -> Result<usize, DbError> {
    conn.execute(
        "UPDATE workouts SET name = ?1 WHERE id = ?2",
        params![name, id],
    )
    .map_err(DbError::UpdateFailed)
}

pub fn get_workout(conn: &Connection, kind: EntryKind, id: i64) -> Result<Option<WorkoutRow>, DbError> {
    conn.query_row(
        "SELECT id, name, created_at FROM workouts WHERE id = ?1 AND kind = ?2",
        params![id, kind.as_ref()],
        map_row_to_workout,
    )
    .optional()
    .map_err(DbError::QueryFailed)
}

/// Most recent first.
pub fn list_workouts(
    conn: &Connection,
    kind: EntryKind,
    limit: Option<u32>,
) -> Result<Vec<WorkoutRow>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, created_at FROM workouts WHERE kind = :kind
             ORDER BY created_at DESC, id DESC LIMIT :limit",
        )
        .map_err(DbError::QueryFailed)?;
    // SQLite treats a negative LIMIT as unbounded
    let limit = limit.map_or(-1, i64::from);
    let rows = stmt
        .query_map(
            named_params! { ":kind": kind.as_ref(), ":limit": limit },
            map_row_to_workout,
        )
        .map_err(DbError::QueryFailed)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

// ---- Exercises ----

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseRow {
    pub id: i64,
    pub workout_id: i64,
    pub details_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub sets_json: String,
}

fn map_row_to_exercise(row: &Row) -> Result<ExerciseRow, rusqlite::Error> {
    let created_at_str: String = row.get(3)?;
    Ok(ExerciseRow {
        id: row.get(0)?,
        workout_id: row.get(1)?,
        details_id: row.get(2)?,
        created_at: parse_timestamp(3, &created_at_str)?,
        sets_json: row.get(4)?,
    })
}

pub fn insert_exercise(
    conn: &Connection,
    kind: EntryKind,
    workout_id: i64,
    details_id: Option<i64>,
    created_at: DateTime<Utc>,
    sets_json: &str,
) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO exercises (kind, workout_id, details_id, created_at, sets)
         VALUES (:kind, :workout, :details, :created_at, :sets)",
        named_params! {
            ":kind": kind.as_ref(),
            ":workout": workout_id,
            ":details": details_id,
            ":created_at": format_timestamp(created_at),
            ":sets": sets_json,
        },
    )
    .map_err(DbError::InsertFailed)?;
    Ok(conn.last_insert_rowid())
}

pub fn update_exercise_sets(conn: &Connection, id: i64, sets_json: &str) -> Result<usize, DbError> {
    conn.execute(
        "UPDATE exercises SET sets = ?1 WHERE id = ?2",
        params![sets_json, id],
    )
    .map_err(DbError::UpdateFailed)
}

pub fn get_exercise(conn: &Connection, kind: EntryKind, id: i64) -> Result<Option<ExerciseRow>, DbError> {
    conn.query_row(
        "SELECT id, workout_id, details_id, created_at, sets FROM exercises WHERE id = ?1 AND kind = ?2",
        params![id, kind.as_ref()],
        map_row_to_exercise,
    )
    .optional()
    .map_err(DbError::QueryFailed)
}

pub fn list_exercises_for_workout(conn: &Connection, workout_id: i64) -> Result<Vec<ExerciseRow>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, workout_id, details_id, created_at, sets FROM exercises
             WHERE workout_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .map_err(DbError::QueryFailed)?;
    let rows = stmt
        .query_map(params![workout_id], map_row_to_exercise)
        .map_err(DbError::QueryFailed)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

// ---- Generic row operations ----
// `table` always comes from `Entity::table`, never from user input.

pub fn delete_row(
    conn: &Connection,
    table: &str,
    kind: Option<EntryKind>,
    id: i64,
) -> Result<usize, DbError> {
    match kind {
        Some(kind) => conn.execute(
            &format!("DELETE FROM {table} WHERE id = ?1 AND kind = ?2"),
            params![id, kind.as_ref()],
        ),
        None => conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id]),
    }
    .map_err(DbError::DeleteFailed)
}

pub fn delete_all(conn: &Connection, table: &str, kind: Option<EntryKind>) -> Result<usize, DbError> {
    match kind {
        Some(kind) => conn.execute(
            &format!("DELETE FROM {table} WHERE kind = ?1"),
            params![kind.as_ref()],
        ),
        None => conn.execute(&format!("DELETE FROM {table}"), []),
    }
    .map_err(DbError::DeleteFailed)
}

pub fn count_rows(conn: &Connection, table: &str, kind: Option<EntryKind>) -> Result<usize, DbError> {
    let count: i64 = match kind {
        Some(kind) => conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE kind = ?1"),
            params![kind.as_ref()],
            |row| row.get(0),
        ),
        None => conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)),
    }
    .map_err(DbError::QueryFailed)?;
    Ok(usize::try_from(count).unwrap_or_default())
}
