//src/session.rs
//! The active-session state machine.
//!
//! A session is `NotStarted` (no rows), `Active` (pointer row exists, `completed_at`
//! is NULL) or `Completed` (`completed_at` set, pointer removed). The single row in
//! `current_workout` is the only source of truth for "is a workout running".
//! Every operation that touches that row runs in one transaction.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::db::{self, ActivePointer, NewSetData, SetRow};
use crate::error::{require_id, Error, Result};
use crate::history::{to_set_views, PreviousPerformance, SetView};
use crate::AppService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub session_id: i64,
    pub workout_id: i64,
    pub active_exercise_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    /// In-progress session whose pointer was replaced. It stays incomplete forever.
    pub abandoned_session_id: Option<i64>,
}

/// Raw input for logging a set, as a form would submit it.
#[derive(Debug, Clone, Copy)]
pub struct LogSetParams<'a> {
    pub session_id: i64,
    pub workout_exercise_id: i64,
    pub exercise_id: i64,
    pub reps: i64,
    /// Required; must parse to a finite number.
    pub weight: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedSet {
    pub id: i64,
    pub session_id: i64,
    /// Template of the session; its view is the one to refresh.
    pub workout_id: Option<i64>,
    pub workout_exercise_id: i64,
    pub exercise_id: i64,
    pub set_number: i64,
    pub reps: i64,
    pub weight: f64,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveExerciseView {
    pub ref_id: i64,
    pub exercise_id: i64,
    pub name: String,
    pub order: i64,
    /// Sets logged for this template exercise in the active session.
    pub sets: Vec<SetView>,
    pub previous: Option<PreviousPerformance>,
}

/// Everything the active-session screen shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetail {
    pub pointer: ActivePointer,
    /// `None` if the template was deleted or the pointer is stale.
    pub workout_name: Option<String>,
    pub exercises: Vec<ActiveExerciseView>,
}

impl SessionDetail {
    pub fn active_exercise(&self) -> Option<&ActiveExerciseView> {
        let active_id = self.pointer.active_exercise_id?;
        self.exercises.iter().find(|e| e.exercise_id == active_id)
    }
}

fn parse_weight(raw: &str) -> Result<f64> {
    let weight: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::validation("Weight must be a number."))?;
    if weight.is_finite() {
        Ok(weight)
    } else {
        Err(Error::validation("Weight must be a number."))
    }
}

impl AppService {
    /// Whether a session is currently in progress. Lets callers warn before
    /// `start_session` silently abandons it.
    /// # Errors
    /// Returns `TrackerError::Storage` if the query fails.
    pub fn has_active_session(&self) -> Result<bool> {
        Ok(db::get_active_pointer(&self.conn)?.is_some())
    }

    /// The active pointer, if any. A pointer to a vanished session is returned as
    /// stale (`started_at == None`) rather than treated as an error.
    /// # Errors
    /// Returns `TrackerError::Storage` if the query fails.
    pub fn active_session(&self) -> Result<Option<ActivePointer>> {
        let pointer = db::get_active_pointer(&self.conn)?;
        if let Some(p) = pointer.as_ref().filter(|p| p.is_stale()) {
            warn!("Active pointer references missing session {}", p.session_id);
        }
        Ok(pointer)
    }

    /// Starts a new session of a template now. See [`AppService::start_session_at`].
    /// # Errors
    /// See [`AppService::start_session_at`].
    pub fn start_session(&mut self, template_id: i64) -> Result<StartedSession> {
        self.start_session_at(template_id, Utc::now())
    }

    /// Starts a new session of a template and points the singleton at it, with the
    /// template's first exercise active. Any previous pointer is replaced.
    /// # Errors
    /// - `TrackerError::Validation` if the id is not positive or the template does not exist.
    /// - `TrackerError::Storage` if the transaction fails.
    pub fn start_session_at(
        &mut self,
        template_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<StartedSession> {
        let template_id = require_id(template_id, "Invalid workout.")?;

        let tx = self.conn.transaction()?;
        if db::get_workout_by_id(&tx, template_id)?.is_none() {
            return Err(Error::validation("Unable to start workout."));
        }

        let previous = db::get_active_pointer(&tx)?;
        let session_id = db::insert_session(&tx, template_id, started_at)?;
        let active_exercise_id = db::first_exercise_of_workout(&tx, template_id)?;

        db::clear_active_pointers(&tx)?;
        db::insert_active_pointer(&tx, session_id, active_exercise_id, started_at)?;
        tx.commit()?;

        let abandoned_session_id = previous.map(|p| p.session_id);
        if let Some(abandoned) = abandoned_session_id {
            warn!("Starting session {session_id} abandons in-progress session {abandoned}");
        }
        info!("Started session {session_id} for workout {template_id}");

        Ok(StartedSession {
            session_id,
            workout_id: template_id,
            active_exercise_id,
            started_at,
            abandoned_session_id,
        })
    }

    /// Completes a session now. See [`AppService::end_session_at`].
    /// # Errors
    /// See [`AppService::end_session_at`].
    pub fn end_session(&mut self, session_id: i64) -> Result<Option<i64>> {
        self.end_session_at(session_id, Utc::now())
    }

    /// Marks a session completed and removes the pointer if it refers to it.
    /// Ending an already completed session succeeds and moves its completion time.
    /// Returns the session's template id so the caller can refresh that view.
    /// # Errors
    /// - `TrackerError::Validation` if the id is not positive.
    /// - `TrackerError::NotFound` if the session does not exist.
    pub fn end_session_at(
        &mut self,
        session_id: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let session_id = require_id(session_id, "Invalid workout session.")?;

        let tx = self.conn.transaction()?;
        let workout_id = db::complete_session(&tx, session_id, completed_at)?
            .ok_or_else(|| Error::not_found("Active workout session not found."))?;
        // Only the pointer of this session goes; an unrelated active pointer stays.
        let removed = db::delete_active_pointer_for_session(&tx, session_id)?;
        tx.commit()?;

        if removed == 0 {
            debug!("Session {session_id} was not the active session");
        }
        info!("Ended session {session_id}");
        Ok(workout_id)
    }

    /// Switches the active exercise of the active session.
    /// # Errors
    /// - `TrackerError::Validation` for non-positive ids.
    /// - `TrackerError::NotFound` if `session_id` is not the active session or the
    ///   exercise does not exist.
    pub fn set_active_exercise(&mut self, session_id: i64, exercise_id: i64) -> Result<()> {
        let session_id = require_id(session_id, "Invalid workout session.")?;
        let exercise_id = require_id(exercise_id, "Invalid exercise.")?;

        let tx = self.conn.transaction()?;
        let updated = db::update_active_exercise(&tx, session_id, exercise_id, Utc::now())
            .map_err(|e| match e {
                db::Error::MissingReference(_) => Error::not_found("Exercise not found."),
                other => other.into(),
            })?;
        if updated == 0 {
            return Err(Error::not_found("Unable to set active exercise."));
        }
        tx.commit()?;

        debug!("Session {session_id} switched to exercise {exercise_id}");
        Ok(())
    }

    /// Logs a set now. See [`AppService::log_set_at`].
    /// # Errors
    /// See [`AppService::log_set_at`].
    pub fn log_set(&mut self, params: LogSetParams<'_>) -> Result<LoggedSet> {
        self.log_set_at(params, Utc::now())
    }

    /// Logs one set with the next set number for its (session, template exercise) pair.
    /// # Errors
    /// - `TrackerError::Validation` if weight is blank or not a finite number, reps is
    ///   not positive, an id is not positive, or the ids do not belong together.
    /// - `TrackerError::NotFound` if the session or template exercise does not exist.
    pub fn log_set_at(
        &mut self,
        params: LogSetParams<'_>,
        logged_at: DateTime<Utc>,
    ) -> Result<LoggedSet> {
        if params.weight.trim().is_empty() {
            return Err(Error::validation("Weight must be provided."));
        }
        if params.session_id <= 0 || params.workout_exercise_id <= 0 || params.exercise_id <= 0 {
            return Err(Error::validation("Invalid workout context."));
        }
        if params.reps <= 0 {
            return Err(Error::validation("Reps must be a positive number."));
        }
        let weight = parse_weight(params.weight)?;

        let tx = self.conn.transaction()?;
        let session = db::get_session(&tx, params.session_id)?
            .ok_or_else(|| Error::not_found("Workout session not found."))?;
        let template_exercise = db::get_workout_exercise(&tx, params.workout_exercise_id)?
            .ok_or_else(|| Error::not_found("Exercise not found in workout."))?;
        if template_exercise.exercise_id != params.exercise_id
            || session.workout_id != Some(template_exercise.workout_id)
        {
            return Err(Error::validation("Invalid workout context."));
        }

        let set_number =
            db::next_set_number(&tx, params.session_id, params.workout_exercise_id)?;
        let data = NewSetData {
            session_id: params.session_id,
            workout_exercise_id: params.workout_exercise_id,
            exercise_id: params.exercise_id,
            set_number,
            reps: params.reps,
            weight,
            logged_at,
        };
        let id = db::insert_set(&tx, &data).map_err(|e| match e {
            db::Error::MissingReference(_) => Error::not_found("Workout session not found."),
            other => other.into(),
        })?;
        tx.commit()?;

        debug!(
            "Logged set #{set_number} ({} x {weight}) in session {}; refresh workout {:?}",
            params.reps, params.session_id, session.workout_id
        );
        Ok(LoggedSet {
            id,
            session_id: params.session_id,
            workout_id: session.workout_id,
            workout_exercise_id: params.workout_exercise_id,
            exercise_id: params.exercise_id,
            set_number,
            reps: params.reps,
            weight,
            logged_at,
        })
    }

    /// Deletes a logged set. Remaining sets keep their numbers.
    /// # Errors
    /// - `TrackerError::Validation` for a non-positive id.
    /// - `TrackerError::NotFound` if the set does not exist.
    pub fn delete_set(&self, set_id: i64) -> Result<()> {
        let set_id = require_id(set_id, "Invalid set.")?;
        if db::delete_set(&self.conn, set_id)? == 0 {
            return Err(Error::not_found("Set not found."));
        }
        debug!("Deleted set {set_id}");
        Ok(())
    }

    /// The active session with its template exercises, the sets logged so far and
    /// each exercise's previous performance. `None` when no session is active.
    /// # Errors
    /// Returns `TrackerError::Storage` if a query fails.
    pub fn current_session_detail(&self) -> Result<Option<SessionDetail>> {
        let Some(pointer) = self.active_session()? else {
            return Ok(None);
        };

        let template = match pointer.workout_id {
            Some(workout_id) if !pointer.is_stale() => db::get_workout_by_id(&self.conn, workout_id)?,
            _ => None,
        };
        let Some(template) = template else {
            return Ok(Some(SessionDetail {
                pointer,
                workout_name: None,
                exercises: Vec::new(),
            }));
        };

        let members = db::list_workout_exercises(&self.conn, template.id)?;
        let mut sets_by_ref: HashMap<i64, Vec<SetRow>> = HashMap::new();
        for row in db::list_sets_for_sessions(&self.conn, &[pointer.session_id])? {
            if let Some(ref_id) = row.workout_exercise_id {
                sets_by_ref.entry(ref_id).or_default().push(row);
            }
        }
        let exercise_ids: Vec<i64> = members.iter().map(|m| m.exercise_id).collect();
        let previous = self.previous_performance_batch(&exercise_ids)?;

        let exercises = members
            .into_iter()
            .map(|member| ActiveExerciseView {
                sets: to_set_views(sets_by_ref.remove(&member.id).unwrap_or_default()),
                previous: previous.get(&member.exercise_id).cloned(),
                ref_id: member.id,
                exercise_id: member.exercise_id,
                name: member.exercise_name,
                order: member.order,
            })
            .collect();

        Ok(Some(SessionDetail {
            pointer,
            workout_name: Some(template.name),
            exercises,
        }))
    }
}
