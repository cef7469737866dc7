//src/history.rs
//! Completed sessions and "previous performance" lookups.

use chrono::{DateTime, Utc};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::db::{self, SetRow, TemplateSummaryRow};
use crate::error::{require_id, Error, Result};
use crate::AppService;

/// Label shown for sessions whose template was deleted.
pub const DEFAULT_WORKOUT_LABEL: &str = "Workout";

#[derive(Debug, Clone, PartialEq)]
pub struct SetView {
    pub id: i64,
    pub set_number: i64,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseHistory {
    pub exercise_id: i64,
    pub exercise_name: String,
    pub sets: Vec<SetView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub session_id: i64,
    pub workout_id: Option<i64>,
    pub workout_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub exercises: Vec<ExerciseHistory>,
}

/// What was done for an exercise in the most recently completed session that logged it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousPerformance {
    pub exercise_id: i64,
    pub session_id: i64,
    pub completed_at: DateTime<Utc>,
    pub sets: Vec<SetView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSummary {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub sessions_count: i64,
}

impl From<TemplateSummaryRow> for TemplateSummary {
    fn from(row: TemplateSummaryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            last_completed_at: row.last_completed_at,
            sessions_count: row.sessions_count,
        }
    }
}

/// Whole minutes between start and completion, rounded, never below 1.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn duration_minutes(
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Option<i64> {
    let (start, end) = (started_at?, completed_at?);
    let minutes = ((end - start).num_milliseconds() as f64 / 60_000.0).round();
    Some((minutes as i64).max(1))
}

/// Sorts templates least recently completed first (never-used ones on top), then by name.
pub fn sort_template_summaries_for_display(summaries: &mut [TemplateSummary]) {
    summaries.sort_by(|a, b| {
        a.last_completed_at
            .cmp(&b.last_completed_at)
            .then_with(|| compare_names(&a.name, &b.name))
    });
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Turns rows of one group into views sorted by set number.
/// A set number that did not survive normalization falls back to its position.
pub(crate) fn to_set_views(rows: Vec<SetRow>) -> Vec<SetView> {
    let mut views: Vec<SetView> = rows
        .into_iter()
        .enumerate()
        .map(|(position, row)| SetView {
            id: row.id,
            set_number: row
                .set_number
                .filter(|&n| n != 0)
                .unwrap_or(position as i64 + 1),
            reps: row.reps,
            weight: row.weight,
        })
        .collect();
    views.sort_by(|a, b| a.set_number.cmp(&b.set_number).then(a.id.cmp(&b.id)));
    views
}

/// Groups sets by exercise. Groups keep the order in which their first set was logged.
pub(crate) fn group_sets_by_exercise(rows: Vec<SetRow>) -> Vec<ExerciseHistory> {
    let mut order: Vec<(i64, String)> = Vec::new();
    let mut grouped: HashMap<i64, Vec<SetRow>> = HashMap::new();
    for row in rows {
        if !grouped.contains_key(&row.exercise_id) {
            order.push((row.exercise_id, row.exercise_name.clone()));
        }
        grouped.entry(row.exercise_id).or_default().push(row);
    }

    order
        .into_iter()
        .map(|(exercise_id, exercise_name)| ExerciseHistory {
            exercise_id,
            exercise_name,
            sets: to_set_views(grouped.remove(&exercise_id).unwrap_or_default()),
        })
        .collect()
}

/// Keeps, per exercise, only the sets of the first session seen.
/// Expects rows ordered most recently completed session first.
fn latest_session_per_exercise(rows: Vec<SetRow>) -> HashMap<i64, PreviousPerformance> {
    let mut picked: HashMap<i64, (i64, DateTime<Utc>, Vec<SetRow>)> = HashMap::new();
    for row in rows {
        let Some(completed_at) = row.completed_at else {
            continue;
        };
        let entry = picked
            .entry(row.exercise_id)
            .or_insert_with(|| (row.session_id, completed_at, Vec::new()));
        if entry.0 == row.session_id {
            entry.2.push(row);
        }
    }

    picked
        .into_iter()
        .map(|(exercise_id, (session_id, completed_at, rows))| {
            (
                exercise_id,
                PreviousPerformance {
                    exercise_id,
                    session_id,
                    completed_at,
                    sets: to_set_views(rows),
                },
            )
        })
        .collect()
}

impl AppService {
    /// Completed sessions, newest first, each with its sets grouped by exercise.
    /// `None` uses the configured history limit.
    /// # Errors
    /// - `TrackerError::Validation` if `limit` is zero.
    /// - `TrackerError::Storage` if a query fails.
    pub fn list_history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(self.config.history_limit);
        if limit == 0 {
            return Err(Error::validation("History limit must be a positive number."));
        }

        let sessions = db::list_completed_sessions(&self.conn, limit)?;
        let session_ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        let mut sets_by_session: HashMap<i64, Vec<SetRow>> = HashMap::new();
        for row in db::list_sets_for_sessions(&self.conn, &session_ids)? {
            sets_by_session.entry(row.session_id).or_default().push(row);
        }
        debug!("Loaded {} completed session(s) for history", sessions.len());

        Ok(sessions
            .into_iter()
            .map(|session| HistoryEntry {
                session_id: session.id,
                workout_id: session.workout_id,
                workout_name: session
                    .workout_name
                    .unwrap_or_else(|| DEFAULT_WORKOUT_LABEL.to_string()),
                duration_minutes: duration_minutes(
                    Some(session.started_at),
                    Some(session.completed_at),
                ),
                started_at: session.started_at,
                completed_at: session.completed_at,
                exercises: group_sets_by_exercise(
                    sets_by_session.remove(&session.id).unwrap_or_default(),
                ),
            })
            .collect())
    }

    /// Sets from the most recently completed session that logged `exercise_id`.
    /// # Errors
    /// - `TrackerError::Validation` for a non-positive id.
    /// - `TrackerError::Storage` if the query fails.
    pub fn previous_performance(&self, exercise_id: i64) -> Result<Option<PreviousPerformance>> {
        let exercise_id = require_id(exercise_id, "Invalid exercise.")?;
        Ok(self
            .previous_performance_batch(&[exercise_id])?
            .remove(&exercise_id))
    }

    /// Previous performance for several exercises with a single query.
    /// Exercises never logged in a completed session are absent from the map.
    /// # Errors
    /// Returns `TrackerError::Storage` if the query fails.
    pub fn previous_performance_batch(
        &self,
        exercise_ids: &[i64],
    ) -> Result<HashMap<i64, PreviousPerformance>> {
        let rows = db::list_completed_sets_for_exercises(&self.conn, exercise_ids)?;
        Ok(latest_session_per_exercise(rows))
    }

    /// Per template: last completion time and number of sessions, newest template first.
    /// Use [`sort_template_summaries_for_display`] for the picker order.
    /// # Errors
    /// Returns `TrackerError::Storage` if the query fails.
    pub fn list_template_summaries(&self) -> Result<Vec<TemplateSummary>> {
        Ok(db::list_template_summaries(&self.conn)?
            .into_iter()
            .map(TemplateSummary::from)
            .collect())
    }
}
