//src/db.rs
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{named_params, params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DB_FILE_NAME: &str = "liftbook.sqlite";
const APP_DATA_DIR: &str = "liftbook";
const DB_PATH_ENV_VAR: &str = "LIFTBOOK_DB_PATH";

// Custom Error type for DB operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
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
    #[error("Workout name must be unique: '{0}' already exists.")]
    WorkoutNameNotUnique(String),
    #[error("Exercise {exercise_id} is already part of workout {workout_id}")]
    ExerciseAlreadyInWorkout { workout_id: i64, exercise_id: i64 },
    #[error("Exercise {0} is still referenced by a workout or logged sets")]
    ExerciseInUse(i64),
    #[error("Referenced row does not exist")]
    MissingReference(rusqlite::Error),
    #[error("Database transaction failed: {0}")]
    Transaction(rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A workout template. Stored in the `workouts` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutTemplate {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One membership row of a template, joined with its exercise name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExerciseRow {
    pub id: i64,
    pub workout_id: i64,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutSession {
    pub id: i64,
    pub workout_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The singleton `current_workout` row, LEFT JOINed with its session.
/// `started_at` is `None` when the pointer references a session that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePointer {
    pub id: i64,
    pub session_id: i64,
    pub active_exercise_id: Option<i64>,
    pub last_updated_at: DateTime<Utc>,
    pub workout_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ActivePointer {
    pub const fn is_stale(&self) -> bool {
        self.started_at.is_none()
    }
}

/// A logged set joined with its exercise name and the completion time of its session.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRow {
    pub id: i64,
    pub session_id: i64,
    pub workout_exercise_id: Option<i64>,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub set_number: Option<i64>, // Normalized, None if storage held garbage
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub logged_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A completed session with its template name (None when the template was deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSessionRow {
    pub id: i64,
    pub workout_id: Option<i64>,
    pub workout_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSummaryRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub sessions_count: i64,
}

pub struct NewSetData {
    pub session_id: i64,
    pub workout_exercise_id: i64,
    pub exercise_id: i64,
    pub set_number: i64,
    pub reps: i64,
    pub weight: f64,
    pub logged_at: DateTime<Utc>,
}

/// Gets the path to the SQLite database file within the app's data directory.
/// Exposed at crate root as get_db_path_util
pub fn get_db_path() -> Result<PathBuf, Error> {
    if let Ok(path) = std::env::var(DB_PATH_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let conn = Connection::open(path).map_err(Error::Connection)?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
/// Foreign keys are per-connection in SQLite, so this also switches them on.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(Error::Connection)?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workout_exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE RESTRICT,
            "order" INTEGER NOT NULL,
            UNIQUE (workout_id, exercise_id)
        );

        CREATE TABLE IF NOT EXISTS workout_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER REFERENCES workouts(id) ON DELETE SET NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS exercise_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE,
            workout_exercise_id INTEGER REFERENCES workout_exercises(id) ON DELETE SET NULL,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE RESTRICT,
            set_number INTEGER NOT NULL,
            reps INTEGER,
            weight REAL,
            logged_at TEXT NOT NULL
        );

        -- Highest set number ever handed out per (session, template exercise).
        -- Survives set deletion so numbers are never reused.
        CREATE TABLE IF NOT EXISTS set_sequences (
            session_id INTEGER NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE,
            workout_exercise_id INTEGER NOT NULL REFERENCES workout_exercises(id) ON DELETE CASCADE,
            last_set_number INTEGER NOT NULL,
            PRIMARY KEY (session_id, workout_exercise_id)
        );

        -- Singleton. At most one row, enforced by the session engine.
        CREATE TABLE IF NOT EXISTS current_workout (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE,
            active_exercise_id INTEGER REFERENCES exercises(id) ON DELETE SET NULL,
            last_updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workout_exercises_workout ON workout_exercises(workout_id);
        CREATE INDEX IF NOT EXISTS idx_exercise_sets_session ON exercise_sets(session_id);
        CREATE INDEX IF NOT EXISTS idx_exercise_sets_exercise ON exercise_sets(exercise_id);
        CREATE INDEX IF NOT EXISTS idx_workout_sessions_completed ON workout_sessions(completed_at);
        "#,
    )
    .map_err(Error::Connection)?;

    Ok(())
}

// --- Timestamps & Normalization ---

/// Fixed-width RFC 3339 (microseconds, `Z`), so string order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_timestamp(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

fn read_optional_timestamp(
    row: &Row,
    idx: usize,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

/// Coerces a stored value into a finite number.
///
/// Integers and reals pass through, text is parsed, and anything that does not
/// yield a finite number (NULL, blobs, garbage text, NaN, infinities) becomes `None`.
pub fn normalize_number(value: ValueRef<'_>) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let number = match value {
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(r) => r,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse::<f64>().ok()?,
        ValueRef::Null | ValueRef::Blob(_) => return None,
    };
    number.is_finite().then_some(number)
}

/// Same as [`normalize_number`] but only accepts whole numbers.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_integer(value: ValueRef<'_>) -> Option<i64> {
    normalize_number(value)
        .filter(|n| n.fract() == 0.0)
        .map(|n| n as i64)
}

fn read_number(row: &Row, idx: usize) -> Result<Option<f64>, rusqlite::Error> {
    Ok(normalize_number(row.get_ref(idx)?))
}

fn read_integer(row: &Row, idx: usize) -> Result<Option<i64>, rusqlite::Error> {
    Ok(normalize_integer(row.get_ref(idx)?))
}

fn is_constraint(e: &rusqlite::Error, extended: i32) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.extended_code == extended)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    is_constraint(e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

/// ON DELETE RESTRICT reports as a trigger constraint, not a foreign key one.
fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    is_constraint(e, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
        || is_constraint(e, rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER)
}

// --- Exercise Functions ---

fn map_row_to_exercise(row: &Row) -> Result<Exercise, rusqlite::Error> {
    Ok(Exercise {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: read_timestamp(row, 2)?,
    })
}

/// Inserts a new exercise. Returns the stored row.
pub fn insert_exercise(
    conn: &Connection,
    name: &str,
    created_at: DateTime<Utc>,
) -> Result<Exercise, Error> {
    conn.execute(
        "INSERT INTO exercises (name, created_at) VALUES (?1, ?2)",
        params![name, format_timestamp(created_at)],
    )
    .map_err(Error::InsertFailed)?;
    Ok(Exercise {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        created_at,
    })
}

pub fn get_exercise_by_id(conn: &Connection, id: i64) -> Result<Option<Exercise>, Error> {
    conn.query_row(
        "SELECT id, name, created_at FROM exercises WHERE id = ?1",
        params![id],
        map_row_to_exercise,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Lists exercises alphabetically.
pub fn list_exercises(conn: &Connection) -> Result<Vec<Exercise>, Error> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at FROM exercises ORDER BY name ASC, id ASC")
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], map_row_to_exercise)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Lists exercises newest first.
pub fn list_exercises_by_recency(conn: &Connection) -> Result<Vec<Exercise>, Error> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at FROM exercises ORDER BY created_at DESC, id DESC")
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], map_row_to_exercise)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Whether any template row or logged set still references the exercise.
pub fn exercise_in_use(conn: &Connection, id: i64) -> Result<bool, Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM workout_exercises WHERE exercise_id = ?1)
             OR EXISTS(SELECT 1 FROM exercise_sets WHERE exercise_id = ?1)",
        params![id],
        |row| row.get(0),
    )
    .map_err(Error::QueryFailed)
}

/// Deletes an exercise. Storage refuses while template rows or sets reference it.
/// Returns the number of deleted rows (0 when the id does not exist).
pub fn delete_exercise(conn: &Connection, id: i64) -> Result<usize, Error> {
    conn.execute("DELETE FROM exercises WHERE id = ?1", params![id])
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::ExerciseInUse(id)
            } else {
                Error::DeleteFailed(e)
            }
        })
}

// --- Workout Template Functions ---

fn map_row_to_template(row: &Row) -> Result<WorkoutTemplate, rusqlite::Error> {
    Ok(WorkoutTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: read_timestamp(row, 2)?,
    })
}

/// Inserts a new template. Handles the UNIQUE constraint on the name.
pub fn insert_workout(
    conn: &Connection,
    name: &str,
    created_at: DateTime<Utc>,
) -> Result<WorkoutTemplate, Error> {
    conn.execute(
        "INSERT INTO workouts (name, created_at) VALUES (?1, ?2)",
        params![name, format_timestamp(created_at)],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::WorkoutNameNotUnique(name.to_string())
        } else {
            Error::InsertFailed(e)
        }
    })?;
    Ok(WorkoutTemplate {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        created_at,
    })
}

pub fn get_workout_by_id(conn: &Connection, id: i64) -> Result<Option<WorkoutTemplate>, Error> {
    conn.query_row(
        "SELECT id, name, created_at FROM workouts WHERE id = ?1",
        params![id],
        map_row_to_template,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

pub fn get_workout_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<WorkoutTemplate>, Error> {
    conn.query_row(
        "SELECT id, name, created_at FROM workouts WHERE name = ?1",
        params![name],
        map_row_to_template,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Lists templates newest first.
pub fn list_workouts(conn: &Connection) -> Result<Vec<WorkoutTemplate>, Error> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at FROM workouts ORDER BY created_at DESC, id DESC")
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], map_row_to_template)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Deletes a template; membership rows cascade and sessions keep a NULL workout_id.
pub fn delete_workout(conn: &Connection, id: i64) -> Result<usize, Error> {
    conn.execute("DELETE FROM workouts WHERE id = ?1", params![id])
        .map_err(Error::DeleteFailed)
}

// --- Template Membership Functions ---

fn map_row_to_template_exercise(row: &Row) -> Result<TemplateExerciseRow, rusqlite::Error> {
    Ok(TemplateExerciseRow {
        id: row.get(0)?,
        workout_id: row.get(1)?,
        exercise_id: row.get(2)?,
        exercise_name: row.get(3)?,
        order: read_integer(row, 4)?.unwrap_or(0),
    })
}

const TEMPLATE_EXERCISE_SELECT: &str = r#"
    SELECT we.id, we.workout_id, we.exercise_id, e.name, we."order"
    FROM workout_exercises we
    JOIN exercises e ON e.id = we.exercise_id"#;

pub fn workout_has_exercise(
    conn: &Connection,
    workout_id: i64,
    exercise_id: i64,
) -> Result<bool, Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM workout_exercises WHERE workout_id = ?1 AND exercise_id = ?2)",
        params![workout_id, exercise_id],
        |row| row.get(0),
    )
    .map_err(Error::QueryFailed)
}

/// Next 1-based position in a template: `max(order) + 1`.
pub fn next_exercise_order(conn: &Connection, workout_id: i64) -> Result<i64, Error> {
    let max_order = conn
        .query_row(
            r#"SELECT MAX("order") FROM workout_exercises WHERE workout_id = ?1"#,
            params![workout_id],
            |row| read_integer(row, 0),
        )
        .map_err(Error::QueryFailed)?;
    Ok(max_order.unwrap_or(0) + 1)
}

pub fn insert_workout_exercise(
    conn: &Connection,
    workout_id: i64,
    exercise_id: i64,
    order: i64,
) -> Result<i64, Error> {
    conn.execute(
        r#"INSERT INTO workout_exercises (workout_id, exercise_id, "order") VALUES (?1, ?2, ?3)"#,
        params![workout_id, exercise_id, order],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::ExerciseAlreadyInWorkout {
                workout_id,
                exercise_id,
            }
        } else if is_foreign_key_violation(&e) {
            Error::MissingReference(e)
        } else {
            Error::InsertFailed(e)
        }
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn get_workout_exercise(
    conn: &Connection,
    id: i64,
) -> Result<Option<TemplateExerciseRow>, Error> {
    let sql = format!("{TEMPLATE_EXERCISE_SELECT} WHERE we.id = ?1");
    conn.query_row(&sql, params![id], map_row_to_template_exercise)
        .optional()
        .map_err(Error::QueryFailed)
}

/// Membership rows of one template, by position then exercise name.
pub fn list_workout_exercises(
    conn: &Connection,
    workout_id: i64,
) -> Result<Vec<TemplateExerciseRow>, Error> {
    let sql = format!(
        r#"{TEMPLATE_EXERCISE_SELECT} WHERE we.workout_id = ?1 ORDER BY we."order" ASC, e.name ASC, we.id ASC"#
    );
    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params![workout_id], map_row_to_template_exercise)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Membership rows of every template, grouped by template and ordered within it.
pub fn list_all_workout_exercises(conn: &Connection) -> Result<Vec<TemplateExerciseRow>, Error> {
    let sql = format!(
        r#"{TEMPLATE_EXERCISE_SELECT} ORDER BY we.workout_id ASC, we."order" ASC, e.name ASC, we.id ASC"#
    );
    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], map_row_to_template_exercise)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// First exercise of a template by ascending order, ties broken by insertion.
pub fn first_exercise_of_workout(
    conn: &Connection,
    workout_id: i64,
) -> Result<Option<i64>, Error> {
    conn.query_row(
        r#"SELECT exercise_id FROM workout_exercises
           WHERE workout_id = ?1 ORDER BY "order" ASC, id ASC LIMIT 1"#,
        params![workout_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Error::QueryFailed)
}

pub fn delete_workout_exercise(conn: &Connection, id: i64) -> Result<usize, Error> {
    conn.execute("DELETE FROM workout_exercises WHERE id = ?1", params![id])
        .map_err(Error::DeleteFailed)
}

// --- Session Functions ---

fn map_row_to_session(row: &Row) -> Result<WorkoutSession, rusqlite::Error> {
    Ok(WorkoutSession {
        id: row.get(0)?,
        workout_id: row.get(1)?,
        started_at: read_timestamp(row, 2)?,
        completed_at: read_optional_timestamp(row, 3)?,
    })
}

pub fn insert_session(
    conn: &Connection,
    workout_id: i64,
    started_at: DateTime<Utc>,
) -> Result<i64, Error> {
    conn.execute(
        "INSERT INTO workout_sessions (workout_id, started_at, completed_at) VALUES (?1, ?2, NULL)",
        params![workout_id, format_timestamp(started_at)],
    )
    .map_err(Error::InsertFailed)?;
    Ok(conn.last_insert_rowid())
}

pub fn get_session(conn: &Connection, id: i64) -> Result<Option<WorkoutSession>, Error> {
    conn.query_row(
        "SELECT id, workout_id, started_at, completed_at FROM workout_sessions WHERE id = ?1",
        params![id],
        map_row_to_session,
    )
    .optional()
    .map_err(Error::QueryFailed)
}

/// Stamps `completed_at`, overwriting an earlier stamp. Returns the session's workout_id,
/// or `None` if no such session row exists.
pub fn complete_session(
    conn: &Connection,
    id: i64,
    completed_at: DateTime<Utc>,
) -> Result<Option<Option<i64>>, Error> {
    conn.query_row(
        "UPDATE workout_sessions SET completed_at = :completed_at
         WHERE id = :id RETURNING workout_id",
        named_params! { ":completed_at": format_timestamp(completed_at), ":id": id },
        |row| row.get::<_, Option<i64>>(0),
    )
    .optional()
    .map_err(Error::UpdateFailed)
}

// --- Active Pointer Functions ---

pub fn get_active_pointer(conn: &Connection) -> Result<Option<ActivePointer>, Error> {
    conn.query_row(
        "SELECT cw.id, cw.session_id, cw.active_exercise_id, cw.last_updated_at,
                ws.workout_id, ws.started_at
         FROM current_workout cw
         LEFT JOIN workout_sessions ws ON ws.id = cw.session_id
         ORDER BY cw.id DESC LIMIT 1",
        [],
        |row| {
            Ok(ActivePointer {
                id: row.get(0)?,
                session_id: row.get(1)?,
                active_exercise_id: row.get(2)?,
                last_updated_at: read_timestamp(row, 3)?,
                workout_id: row.get(4)?,
                started_at: read_optional_timestamp(row, 5)?,
            })
        },
    )
    .optional()
    .map_err(Error::QueryFailed)
}

pub fn count_active_pointers(conn: &Connection) -> Result<i64, Error> {
    conn.query_row("SELECT COUNT(*) FROM current_workout", [], |row| row.get(0))
        .map_err(Error::QueryFailed)
}

pub fn clear_active_pointers(conn: &Connection) -> Result<usize, Error> {
    conn.execute("DELETE FROM current_workout", [])
        .map_err(Error::DeleteFailed)
}

pub fn delete_active_pointer_for_session(conn: &Connection, session_id: i64) -> Result<usize, Error> {
    conn.execute(
        "DELETE FROM current_workout WHERE session_id = ?1",
        params![session_id],
    )
    .map_err(Error::DeleteFailed)
}

pub fn insert_active_pointer(
    conn: &Connection,
    session_id: i64,
    active_exercise_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<i64, Error> {
    conn.execute(
        "INSERT INTO current_workout (session_id, active_exercise_id, last_updated_at)
         VALUES (?1, ?2, ?3)",
        params![session_id, active_exercise_id, format_timestamp(now)],
    )
    .map_err(Error::InsertFailed)?;
    Ok(conn.last_insert_rowid())
}

/// Moves the pointer of `session_id` to another exercise. Returns affected rows.
pub fn update_active_exercise(
    conn: &Connection,
    session_id: i64,
    exercise_id: i64,
    now: DateTime<Utc>,
) -> Result<usize, Error> {
    conn.execute(
        "UPDATE current_workout SET active_exercise_id = :exercise_id, last_updated_at = :now
         WHERE session_id = :session_id",
        named_params! {
            ":exercise_id": exercise_id,
            ":now": format_timestamp(now),
            ":session_id": session_id,
        },
    )
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            Error::MissingReference(e)
        } else {
            Error::UpdateFailed(e)
        }
    })
}

// --- Set Functions ---

/// Next set number for a (session, template exercise) pair.
///
/// Takes the larger of the current maximum and the recorded high-water mark, so a
/// number handed out once is never handed out again even after its row is deleted.
pub fn next_set_number(
    conn: &Connection,
    session_id: i64,
    workout_exercise_id: i64,
) -> Result<i64, Error> {
    let current_max = conn
        .query_row(
            "SELECT MAX(set_number) FROM exercise_sets
             WHERE session_id = ?1 AND workout_exercise_id = ?2",
            params![session_id, workout_exercise_id],
            |row| read_integer(row, 0),
        )
        .map_err(Error::QueryFailed)?;
    let high_water = conn
        .query_row(
            "SELECT last_set_number FROM set_sequences
             WHERE session_id = ?1 AND workout_exercise_id = ?2",
            params![session_id, workout_exercise_id],
            |row| read_integer(row, 0),
        )
        .optional()
        .map_err(Error::QueryFailed)?
        .flatten();
    Ok(current_max.unwrap_or(0).max(high_water.unwrap_or(0)) + 1)
}

pub fn insert_set(conn: &Connection, data: &NewSetData) -> Result<i64, Error> {
    conn.execute(
        "INSERT INTO exercise_sets
            (session_id, workout_exercise_id, exercise_id, set_number, reps, weight, logged_at)
         VALUES (:session_id, :workout_exercise_id, :exercise_id, :set_number, :reps, :weight, :logged_at)",
        named_params! {
            ":session_id": data.session_id,
            ":workout_exercise_id": data.workout_exercise_id,
            ":exercise_id": data.exercise_id,
            ":set_number": data.set_number,
            ":reps": data.reps,
            ":weight": data.weight,
            ":logged_at": format_timestamp(data.logged_at),
        },
    )
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            Error::MissingReference(e)
        } else {
            Error::InsertFailed(e)
        }
    })?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO set_sequences (session_id, workout_exercise_id, last_set_number)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (session_id, workout_exercise_id)
         DO UPDATE SET last_set_number = MAX(last_set_number, excluded.last_set_number)",
        params![data.session_id, data.workout_exercise_id, data.set_number],
    )
    .map_err(Error::InsertFailed)?;

    Ok(id)
}

pub fn delete_set(conn: &Connection, id: i64) -> Result<usize, Error> {
    conn.execute("DELETE FROM exercise_sets WHERE id = ?1", params![id])
        .map_err(Error::DeleteFailed)
}

const SET_SELECT: &str = "
    SELECT s.id, s.session_id, s.workout_exercise_id, s.exercise_id, e.name,
           s.set_number, s.reps, s.weight, s.logged_at, ws.completed_at
    FROM exercise_sets s
    JOIN exercises e ON e.id = s.exercise_id
    JOIN workout_sessions ws ON ws.id = s.session_id";

fn map_row_to_set(row: &Row) -> Result<SetRow, rusqlite::Error> {
    Ok(SetRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        workout_exercise_id: row.get(2)?,
        exercise_id: row.get(3)?,
        exercise_name: row.get(4)?,
        set_number: read_integer(row, 5)?,
        reps: read_integer(row, 6)?,
        weight: read_number(row, 7)?,
        logged_at: read_timestamp(row, 8)?,
        completed_at: read_optional_timestamp(row, 9)?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// All sets of the given sessions, in insertion order.
pub fn list_sets_for_sessions(
    conn: &Connection,
    session_ids: &[i64],
) -> Result<Vec<SetRow>, Error> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "{SET_SELECT} WHERE s.session_id IN ({}) ORDER BY s.session_id ASC, s.id ASC",
        placeholders(session_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params_from_iter(session_ids.iter()), map_row_to_set)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Sets of the given exercises that belong to completed sessions, most recently
/// completed session first. Within a session, sets come in set-number order.
pub fn list_completed_sets_for_exercises(
    conn: &Connection,
    exercise_ids: &[i64],
) -> Result<Vec<SetRow>, Error> {
    if exercise_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "{SET_SELECT}
         WHERE s.exercise_id IN ({}) AND ws.completed_at IS NOT NULL
         ORDER BY s.exercise_id ASC, ws.completed_at DESC, s.session_id DESC,
                  s.set_number ASC, s.id ASC",
        placeholders(exercise_ids.len())
    );
    debug!("Looking up previous performance for {} exercise(s)", exercise_ids.len());
    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params_from_iter(exercise_ids.iter()), map_row_to_set)
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

// --- History Functions ---

/// Completed sessions, newest first.
pub fn list_completed_sessions(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<CompletedSessionRow>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT ws.id, ws.workout_id, w.name, ws.started_at, ws.completed_at
             FROM workout_sessions ws
             LEFT JOIN workouts w ON w.id = ws.workout_id
             WHERE ws.completed_at IS NOT NULL
             ORDER BY ws.completed_at DESC, ws.started_at DESC, ws.id DESC
             LIMIT ?1",
        )
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params![limit], |row| {
            Ok(CompletedSessionRow {
                id: row.get(0)?,
                workout_id: row.get(1)?,
                workout_name: row.get(2)?,
                started_at: read_timestamp(row, 3)?,
                completed_at: read_timestamp(row, 4)?,
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Per-template aggregate over sessions. Templates without sessions yield NULL / 0.
pub fn list_template_summaries(conn: &Connection) -> Result<Vec<TemplateSummaryRow>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT w.id, w.name, w.created_at, MAX(ws.completed_at), COUNT(ws.id)
             FROM workouts w
             LEFT JOIN workout_sessions ws ON ws.workout_id = w.id
             GROUP BY w.id
             ORDER BY w.created_at DESC, w.id DESC",
        )
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], |row| {
            Ok(TemplateSummaryRow {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: read_timestamp(row, 2)?,
                last_completed_at: read_optional_timestamp(row, 3)?,
                sessions_count: read_integer(row, 4)?.unwrap_or(0),
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_numeric_storage_values() {
        assert_eq!(normalize_number(ValueRef::Integer(225)), Some(225.0));
        assert_eq!(normalize_number(ValueRef::Real(135.5)), Some(135.5));
        assert_eq!(normalize_number(ValueRef::Text(b" 225 ")), Some(225.0));
        assert_eq!(normalize_number(ValueRef::Text(b"heavy")), None);
        assert_eq!(normalize_number(ValueRef::Text(b"NaN")), None);
        assert_eq!(normalize_number(ValueRef::Real(f64::NAN)), None);
        assert_eq!(normalize_number(ValueRef::Null), None);
        assert_eq!(normalize_integer(ValueRef::Text(b"5")), Some(5));
        assert_eq!(normalize_integer(ValueRef::Real(5.5)), None);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2024-05-01T10:00:00.000000Z");
    }
}
