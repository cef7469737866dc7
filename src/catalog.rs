//src/catalog.rs
//! Exercises and workout templates.

use chrono::Utc;
use log::{debug, info};
use std::collections::HashMap;

use crate::db::{self, Exercise, TemplateExerciseRow, WorkoutTemplate};
use crate::error::{require_id, Error, Result};
use crate::history::SetView;
use crate::AppService;

/// An exercise as it appears inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExercise {
    /// Id of the membership row (`workout_exercises.id`).
    pub ref_id: i64,
    pub exercise_id: i64,
    pub name: String,
    pub order: i64,
}

impl From<TemplateExerciseRow> for TemplateExercise {
    fn from(row: TemplateExerciseRow) -> Self {
        Self {
            ref_id: row.id,
            exercise_id: row.exercise_id,
            name: row.exercise_name,
            order: row.order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateWithExercises {
    pub template: WorkoutTemplate,
    pub exercises: Vec<TemplateExercise>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseWithRecentSets {
    pub exercise: Exercise,
    /// Sets from the most recent completed session that logged this exercise.
    pub recent_sets: Vec<SetView>,
}

impl AppService {
    /// Creates a new exercise.
    /// # Errors
    /// - `TrackerError::Validation` if the trimmed name is empty.
    /// - `TrackerError::Storage` if the insert fails.
    pub fn create_exercise(&self, name: &str) -> Result<Exercise> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(Error::validation("Name is required."));
        }
        let exercise = db::insert_exercise(&self.conn, trimmed_name, Utc::now())?;
        info!("Created exercise '{}' (ID {})", exercise.name, exercise.id);
        Ok(exercise)
    }

    /// Deletes an exercise that nothing references.
    /// # Errors
    /// - `TrackerError::NotFound` if the exercise does not exist.
    /// - `TrackerError::Conflict` if a template or logged set still references it.
    pub fn delete_exercise(&mut self, id: i64) -> Result<()> {
        let id = require_id(id, "Invalid exercise.")?;
        let in_use = || Error::conflict("This exercise is used by a workout or has logged sets.");

        let tx = self.conn.transaction()?;
        if db::get_exercise_by_id(&tx, id)?.is_none() {
            return Err(Error::not_found("Exercise not found."));
        }
        if db::exercise_in_use(&tx, id)? {
            return Err(in_use());
        }
        // The RESTRICT rules still catch a reference added by another connection.
        db::delete_exercise(&tx, id).map_err(|e| match e {
            db::Error::ExerciseInUse(_) => in_use(),
            other => other.into(),
        })?;
        tx.commit()?;

        info!("Deleted exercise {id}");
        Ok(())
    }

    /// Lists all exercises alphabetically.
    /// # Errors
    /// Returns `TrackerError::Storage` if the query fails.
    pub fn list_exercises(&self) -> Result<Vec<Exercise>> {
        Ok(db::list_exercises(&self.conn)?)
    }

    /// Lists exercises newest first, each with the sets from its most recent
    /// completed session.
    /// # Errors
    /// Returns `TrackerError::Storage` if a query fails.
    pub fn list_exercises_with_recent_sets(&self) -> Result<Vec<ExerciseWithRecentSets>> {
        let exercises = db::list_exercises_by_recency(&self.conn)?;
        let ids: Vec<i64> = exercises.iter().map(|e| e.id).collect();
        let mut previous = self.previous_performance_batch(&ids)?;

        Ok(exercises
            .into_iter()
            .map(|exercise| {
                let recent_sets = previous
                    .remove(&exercise.id)
                    .map(|p| p.sets)
                    .unwrap_or_default();
                ExerciseWithRecentSets {
                    exercise,
                    recent_sets,
                }
            })
            .collect())
    }

    /// Creates a new workout template with a unique name.
    /// # Errors
    /// - `TrackerError::Validation` if the trimmed name is empty.
    /// - `TrackerError::Conflict` if a template with that name exists.
    pub fn create_workout_template(&self, name: &str) -> Result<WorkoutTemplate> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(Error::validation("Workout name is required."));
        }
        if db::get_workout_by_name(&self.conn, trimmed_name)?.is_some() {
            return Err(Error::conflict("You already have a workout with that name."));
        }
        // The UNIQUE index still guards against a concurrent insert of the same name.
        let template = db::insert_workout(&self.conn, trimmed_name, Utc::now()).map_err(
            |e| match e {
                db::Error::WorkoutNameNotUnique(_) => {
                    Error::conflict("You already have a workout with that name.")
                }
                other => other.into(),
            },
        )?;
        info!("Created workout '{}' (ID {})", template.name, template.id);
        Ok(template)
    }

    /// Appends an exercise to a template at `max(order) + 1`.
    /// # Errors
    /// - `TrackerError::Validation` for non-positive ids.
    /// - `TrackerError::NotFound` if the template or exercise does not exist.
    /// - `TrackerError::Conflict` if the exercise is already in the template.
    pub fn add_exercise_to_template(
        &mut self,
        template_id: i64,
        exercise_id: i64,
    ) -> Result<TemplateExercise> {
        let template_id = require_id(template_id, "Invalid workout.")?;
        let exercise_id = require_id(exercise_id, "Select an exercise to add.")?;

        let tx = self.conn.transaction()?;
        if db::get_workout_by_id(&tx, template_id)?.is_none() {
            return Err(Error::not_found("Workout not found."));
        }
        let exercise = db::get_exercise_by_id(&tx, exercise_id)?
            .ok_or_else(|| Error::not_found("Exercise not found."))?;
        if db::workout_has_exercise(&tx, template_id, exercise_id)? {
            return Err(Error::conflict("That exercise is already in this workout."));
        }

        let order = db::next_exercise_order(&tx, template_id)?;
        let ref_id = db::insert_workout_exercise(&tx, template_id, exercise_id, order).map_err(
            |e| match e {
                db::Error::ExerciseAlreadyInWorkout { .. } => {
                    Error::conflict("That exercise is already in this workout.")
                }
                other => other.into(),
            },
        )?;
        tx.commit()?;

        debug!("Added exercise {exercise_id} to workout {template_id} at position {order}");
        Ok(TemplateExercise {
            ref_id,
            exercise_id: exercise.id,
            name: exercise.name,
            order,
        })
    }

    /// Removes one membership row from a template. Positions of the others are kept.
    /// # Errors
    /// - `TrackerError::NotFound` if the row does not exist.
    pub fn remove_template_exercise_ref(&self, ref_id: i64) -> Result<()> {
        let ref_id = require_id(ref_id, "Invalid workout exercise.")?;
        if db::delete_workout_exercise(&self.conn, ref_id)? == 0 {
            return Err(Error::not_found("Exercise not found in workout."));
        }
        Ok(())
    }

    /// Deletes a template. Its membership rows go with it; past sessions stay in
    /// history without a template.
    /// # Errors
    /// - `TrackerError::NotFound` if the template does not exist.
    pub fn delete_workout_template(&self, id: i64) -> Result<()> {
        let id = require_id(id, "Invalid workout.")?;
        if db::delete_workout(&self.conn, id)? == 0 {
            return Err(Error::not_found("Workout not found."));
        }
        info!("Deleted workout {id}");
        Ok(())
    }

    /// Lists templates newest first with their exercises in template order.
    /// # Errors
    /// Returns `TrackerError::Storage` if a query fails.
    pub fn list_templates_with_exercises(&self) -> Result<Vec<TemplateWithExercises>> {
        let templates = db::list_workouts(&self.conn)?;
        let mut members: HashMap<i64, Vec<TemplateExercise>> = HashMap::new();
        for row in db::list_all_workout_exercises(&self.conn)? {
            members
                .entry(row.workout_id)
                .or_default()
                .push(TemplateExercise::from(row));
        }

        Ok(templates
            .into_iter()
            .map(|template| {
                let exercises = members.remove(&template.id).unwrap_or_default();
                TemplateWithExercises {
                    template,
                    exercises,
                }
            })
            .collect())
    }

    /// Exercises of one template in template order.
    /// # Errors
    /// - `TrackerError::NotFound` if the template does not exist.
    pub fn template_exercises(&self, template_id: i64) -> Result<Vec<TemplateExercise>> {
        let template_id = require_id(template_id, "Invalid workout.")?;
        if db::get_workout_by_id(&self.conn, template_id)?.is_none() {
            return Err(Error::not_found("Workout not found."));
        }
        Ok(db::list_workout_exercises(&self.conn, template_id)?
            .into_iter()
            .map(TemplateExercise::from)
            .collect())
    }
}
