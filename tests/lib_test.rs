use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use liftbook::{
    AppService, Config, ConfigError, DbError, LogSetParams, TrackerError, Units, DEFAULT_WORKOUT_LABEL,
};
use rusqlite::params;

// Helper function to create a test service with in-memory database
fn create_test_service() -> Result<AppService> {
    let conn = rusqlite::Connection::open_in_memory()?;
    let config = Config {
        units: Units::Imperial,
        ..Default::default()
    };
    Ok(AppService::with_connection(
        conn,
        config,
        ":memory:".into(),
        "test_config.toml".into(),
    )?)
}

/// A fixed point in the past so `*_at` calls can be ordered explicitly.
fn base_time() -> DateTime<Utc> {
    Utc::now() - Duration::days(7)
}

/// Creates "Leg Day" with Squat (and optionally more) and returns (template_id, exercise_ids).
fn leg_day(service: &mut AppService, extra: &[&str]) -> Result<(i64, Vec<i64>)> {
    let template = service.create_workout_template("Leg Day")?;
    let mut ids = Vec::new();
    for name in std::iter::once(&"Squat").chain(extra) {
        let exercise = service.create_exercise(name)?;
        service.add_exercise_to_template(template.id, exercise.id)?;
        ids.push(exercise.id);
    }
    Ok((template.id, ids))
}

fn ref_id_for(service: &AppService, template_id: i64, exercise_id: i64) -> Result<i64> {
    let members = service.template_exercises(template_id)?;
    let member = members
        .iter()
        .find(|m| m.exercise_id == exercise_id)
        .expect("exercise should be in template");
    Ok(member.ref_id)
}

fn log(
    service: &mut AppService,
    session_id: i64,
    ref_id: i64,
    exercise_id: i64,
    reps: i64,
    weight: &str,
    at: DateTime<Utc>,
) -> Result<liftbook::LoggedSet, TrackerError> {
    service.log_set_at(
        LogSetParams {
            session_id,
            workout_exercise_id: ref_id,
            exercise_id,
            reps,
            weight,
        },
        at,
    )
}

#[test]
fn test_create_exercise_trims_and_requires_name() -> Result<()> {
    let service = create_test_service()?;
    let exercise = service.create_exercise("  Squat  ")?;
    assert_eq!(exercise.name, "Squat");

    let result = service.create_exercise("   ");
    assert!(matches!(result, Err(TrackerError::Validation(ref m)) if m == "Name is required."));

    // Names are not unique for exercises.
    service.create_exercise("Squat")?;
    assert_eq!(service.list_exercises()?.len(), 2);
    Ok(())
}

#[test]
fn test_workout_template_names_are_unique() -> Result<()> {
    let service = create_test_service()?;
    service.create_workout_template("Leg Day")?;

    let duplicate = service.create_workout_template(" Leg Day ");
    assert!(matches!(duplicate, Err(TrackerError::Conflict(_))));
    assert_eq!(
        duplicate.unwrap_err().to_string(),
        "You already have a workout with that name."
    );

    let blank = service.create_workout_template("");
    assert!(matches!(blank, Err(TrackerError::Validation(_))));
    Ok(())
}

#[test]
fn test_add_exercise_to_template_orders_and_rejects_duplicates() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &["Lunge", "Calf Raise"])?;

    let orders: Vec<i64> = service
        .template_exercises(template_id)?
        .iter()
        .map(|m| m.order)
        .collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let again = service.add_exercise_to_template(template_id, ids[0]);
    assert!(matches!(again, Err(TrackerError::Conflict(_))));

    assert!(matches!(
        service.add_exercise_to_template(template_id, 9999),
        Err(TrackerError::NotFound(_))
    ));
    assert!(matches!(
        service.add_exercise_to_template(9999, ids[0]),
        Err(TrackerError::NotFound(_))
    ));
    assert!(matches!(
        service.add_exercise_to_template(template_id, 0),
        Err(TrackerError::Validation(ref m)) if m == "Select an exercise to add."
    ));

    // Removing keeps the remaining positions; the next add goes after the max.
    let lunge_ref = ref_id_for(&service, template_id, ids[1])?;
    service.remove_template_exercise_ref(lunge_ref)?;
    let added = service.add_exercise_to_template(template_id, ids[1])?;
    assert_eq!(added.order, 4);
    assert!(matches!(
        service.remove_template_exercise_ref(lunge_ref),
        Err(TrackerError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn test_leg_day_scenario() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat = ids[0];
    let squat_ref = ref_id_for(&service, template_id, squat)?;
    let t0 = base_time();

    let started = service.start_session_at(template_id, t0)?;
    assert_eq!(started.active_exercise_id, Some(squat));
    assert_eq!(started.abandoned_session_id, None);
    assert!(service.has_active_session()?);

    let first = log(&mut service, started.session_id, squat_ref, squat, 5, "135", t0 + Duration::minutes(1))?;
    assert_eq!(first.set_number, 1);
    assert_eq!(first.weight, 135.0);
    assert_eq!(first.workout_id, Some(template_id));

    let second = log(&mut service, started.session_id, squat_ref, squat, 5, "145.5", t0 + Duration::minutes(3))?;
    assert_eq!(second.set_number, 2);

    let detail = service.current_session_detail()?.expect("session should be active");
    assert_eq!(detail.workout_name.as_deref(), Some("Leg Day"));
    let active = detail.active_exercise().expect("squat should be active");
    assert_eq!(active.sets.len(), 2);
    assert!(active.previous.is_none());

    let workout_id = service.end_session_at(started.session_id, t0 + Duration::minutes(45))?;
    assert_eq!(workout_id, Some(template_id));
    assert!(!service.has_active_session()?);
    assert!(service.current_session_detail()?.is_none());

    let history = service.list_history(None)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].workout_name, "Leg Day");
    assert_eq!(history[0].duration_minutes, Some(45));
    assert_eq!(history[0].exercises.len(), 1);
    assert_eq!(history[0].exercises[0].exercise_name, "Squat");
    let numbers: Vec<i64> = history[0].exercises[0].sets.iter().map(|s| s.set_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let summaries = service.list_template_summaries()?;
    assert_eq!(summaries[0].sessions_count, 1);
    assert_eq!(
        summaries[0].last_completed_at,
        Some(history[0].completed_at)
    );
    Ok(())
}

#[test]
fn test_set_numbers_are_not_reused_after_delete() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &["Lunge"])?;
    let squat_ref = ref_id_for(&service, template_id, ids[0])?;
    let lunge_ref = ref_id_for(&service, template_id, ids[1])?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;

    let first = log(&mut service, session, squat_ref, ids[0], 5, "100", t0)?;
    service.delete_set(first.id)?;
    let next = log(&mut service, session, squat_ref, ids[0], 5, "100", t0)?;
    assert_eq!(next.set_number, 2);

    // Numbering is per template exercise.
    let lunge = log(&mut service, session, lunge_ref, ids[1], 8, "40", t0)?;
    assert_eq!(lunge.set_number, 1);

    // Deleting a middle set leaves the others alone.
    let third = log(&mut service, session, squat_ref, ids[0], 5, "100", t0)?;
    assert_eq!(third.set_number, 3);
    service.delete_set(next.id)?;
    let detail = service.current_session_detail()?.expect("active");
    let squat_sets: Vec<i64> = detail.exercises[0].sets.iter().map(|s| s.set_number).collect();
    assert_eq!(squat_sets, vec![3]);

    assert!(matches!(service.delete_set(next.id), Err(TrackerError::NotFound(_))));
    assert!(matches!(service.delete_set(0), Err(TrackerError::Validation(_))));
    Ok(())
}

#[test]
fn test_single_active_pointer() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, _) = leg_day(&mut service, &[])?;
    let t0 = base_time();

    let first = service.start_session_at(template_id, t0)?;
    let second = service.start_session_at(template_id, t0 + Duration::minutes(5))?;
    assert_eq!(second.abandoned_session_id, Some(first.session_id));
    assert_eq!(liftbook::db::count_active_pointers(&service.conn)?, 1);

    let pointer = service.active_session()?.expect("pointer");
    assert_eq!(pointer.session_id, second.session_id);

    // Ending the abandoned session does not touch the pointer of the running one.
    service.end_session_at(first.session_id, t0 + Duration::minutes(10))?;
    let pointer = service.active_session()?.expect("pointer");
    assert_eq!(pointer.session_id, second.session_id);

    service.end_session_at(second.session_id, t0 + Duration::minutes(20))?;
    assert_eq!(liftbook::db::count_active_pointers(&service.conn)?, 0);
    Ok(())
}

#[test]
fn test_start_session_errors() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(matches!(
        service.start_session(0),
        Err(TrackerError::Validation(ref m)) if m == "Invalid workout."
    ));
    assert!(matches!(
        service.start_session(42),
        Err(TrackerError::Validation(ref m)) if m == "Unable to start workout."
    ));
    assert!(!service.has_active_session()?);

    // An empty template starts without an active exercise.
    let empty = service.create_workout_template("Empty")?;
    let started = service.start_session(empty.id)?;
    assert_eq!(started.active_exercise_id, None);
    Ok(())
}

#[test]
fn test_end_session_again_restamps_and_checks_existence() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, _) = leg_day(&mut service, &[])?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;

    service.end_session_at(session, t0 + Duration::minutes(30))?;
    assert_eq!(service.list_history(None)?[0].duration_minutes, Some(30));
    // Ending again succeeds and the latest stamp wins.
    service.end_session_at(session, t0 + Duration::minutes(90))?;
    let history = service.list_history(None)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].duration_minutes, Some(90));

    assert!(matches!(
        service.end_session(9999),
        Err(TrackerError::NotFound(ref m)) if m == "Active workout session not found."
    ));
    assert!(matches!(service.end_session(-1), Err(TrackerError::Validation(_))));
    Ok(())
}

#[test]
fn test_set_active_exercise() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &["Lunge"])?;
    let session = service.start_session(template_id)?.session_id;

    service.set_active_exercise(session, ids[1])?;
    let pointer = service.active_session()?.expect("pointer");
    assert_eq!(pointer.active_exercise_id, Some(ids[1]));

    assert!(matches!(
        service.set_active_exercise(session + 1, ids[0]),
        Err(TrackerError::NotFound(ref m)) if m == "Unable to set active exercise."
    ));
    assert!(matches!(
        service.set_active_exercise(session, 9999),
        Err(TrackerError::NotFound(ref m)) if m == "Exercise not found."
    ));
    assert!(matches!(
        service.set_active_exercise(session, 0),
        Err(TrackerError::Validation(_))
    ));
    Ok(())
}

#[test]
fn test_log_set_validation() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &["Lunge"])?;
    let squat_ref = ref_id_for(&service, template_id, ids[0])?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;

    let expect_validation = |result: Result<liftbook::LoggedSet, TrackerError>, message: &str| {
        match result {
            Err(TrackerError::Validation(m)) => assert_eq!(m, message),
            other => panic!("expected validation error '{message}', got {other:?}"),
        }
    };

    expect_validation(log(&mut service, session, squat_ref, ids[0], 5, "  ", t0), "Weight must be provided.");
    expect_validation(log(&mut service, session, squat_ref, ids[0], 0, "135", t0), "Reps must be a positive number.");
    expect_validation(log(&mut service, session, squat_ref, ids[0], 5, "heavy", t0), "Weight must be a number.");
    expect_validation(log(&mut service, session, squat_ref, ids[0], 5, "NaN", t0), "Weight must be a number.");
    expect_validation(log(&mut service, 0, squat_ref, ids[0], 5, "135", t0), "Invalid workout context.");
    // Blank weight is reported before the context check.
    expect_validation(log(&mut service, 0, squat_ref, ids[0], 5, "", t0), "Weight must be provided.");
    // Ref and exercise must agree.
    expect_validation(log(&mut service, session, squat_ref, ids[1], 5, "135", t0), "Invalid workout context.");

    assert!(matches!(
        log(&mut service, session + 100, squat_ref, ids[0], 5, "135", t0),
        Err(TrackerError::NotFound(_))
    ));
    assert!(matches!(
        log(&mut service, session, squat_ref + 100, ids[0], 5, "135", t0),
        Err(TrackerError::NotFound(_))
    ));

    let ok = log(&mut service, session, squat_ref, ids[0], 5, "135", t0)?;
    assert_eq!(ok.set_number, 1);
    // Bodyweight work logs a zero weight.
    let zero = log(&mut service, session, squat_ref, ids[0], 12, "0", t0)?;
    assert_eq!(zero.weight, 0.0);
    Ok(())
}

#[test]
fn test_previous_performance_tracks_latest_completed_session() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat = ids[0];
    let squat_ref = ref_id_for(&service, template_id, squat)?;
    let t0 = base_time();

    assert!(service.previous_performance(squat)?.is_none());

    let first = service.start_session_at(template_id, t0)?.session_id;
    log(&mut service, first, squat_ref, squat, 5, "135", t0)?;
    // Sets of a running session are not "previous".
    assert!(service.previous_performance(squat)?.is_none());
    service.end_session_at(first, t0 + Duration::minutes(40))?;

    let previous = service.previous_performance(squat)?.expect("previous");
    assert_eq!(previous.session_id, first);
    assert_eq!(previous.sets.len(), 1);
    assert_eq!(previous.sets[0].weight, Some(135.0));

    let second = service.start_session_at(template_id, t0 + Duration::days(2))?.session_id;
    log(&mut service, second, squat_ref, squat, 3, "155", t0 + Duration::days(2))?;
    log(&mut service, second, squat_ref, squat, 3, "160", t0 + Duration::days(2))?;
    let detail = service.current_session_detail()?.expect("active");
    assert_eq!(
        detail.exercises[0].previous.as_ref().map(|p| p.session_id),
        Some(first)
    );
    service.end_session_at(second, t0 + Duration::days(2) + Duration::minutes(30))?;

    let previous = service.previous_performance(squat)?.expect("previous");
    assert_eq!(previous.session_id, second);
    assert_eq!(previous.sets.len(), 2);

    let listed = service.list_exercises_with_recent_sets()?;
    assert_eq!(listed[0].recent_sets.len(), 2);

    assert!(matches!(service.previous_performance(0), Err(TrackerError::Validation(_))));
    Ok(())
}

#[test]
fn test_history_duration_rounding() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, _) = leg_day(&mut service, &[])?;
    let t0 = base_time();

    let short = service.start_session_at(template_id, t0)?.session_id;
    service.end_session_at(short, t0 + Duration::seconds(10))?;
    let longer = service.start_session_at(template_id, t0 + Duration::hours(1))?.session_id;
    service.end_session_at(longer, t0 + Duration::hours(1) + Duration::seconds(90))?;

    let history = service.list_history(None)?;
    assert_eq!(history.len(), 2);
    // Newest first.
    assert_eq!(history[0].session_id, longer);
    assert_eq!(history[0].duration_minutes, Some(2));
    assert_eq!(history[1].session_id, short);
    assert_eq!(history[1].duration_minutes, Some(1));

    assert_eq!(service.list_history(Some(1))?.len(), 1);
    assert!(matches!(service.list_history(Some(0)), Err(TrackerError::Validation(_))));
    Ok(())
}

#[test]
fn test_deleted_template_keeps_history() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat_ref = ref_id_for(&service, template_id, ids[0])?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;
    log(&mut service, session, squat_ref, ids[0], 5, "135", t0)?;
    service.end_session_at(session, t0 + Duration::minutes(20))?;

    service.delete_workout_template(template_id)?;
    assert!(service.list_templates_with_exercises()?.is_empty());
    assert!(matches!(
        service.delete_workout_template(template_id),
        Err(TrackerError::NotFound(_))
    ));

    let history = service.list_history(None)?;
    assert_eq!(history[0].workout_id, None);
    assert_eq!(history[0].workout_name, DEFAULT_WORKOUT_LABEL);
    assert_eq!(history[0].exercises[0].sets.len(), 1);

    // The exercise is still referenced by its logged set.
    assert!(matches!(service.delete_exercise(ids[0]), Err(TrackerError::Conflict(_))));
    Ok(())
}

#[test]
fn test_delete_exercise_restrictions() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat = ids[0];

    assert!(matches!(service.delete_exercise(squat), Err(TrackerError::Conflict(_))));

    service.remove_template_exercise_ref(ref_id_for(&service, template_id, squat)?)?;
    service.delete_exercise(squat)?;
    assert!(service.list_exercises()?.is_empty());

    assert!(matches!(service.delete_exercise(squat), Err(TrackerError::NotFound(_))));
    Ok(())
}

#[test]
fn test_delete_exercise_with_logged_sets_is_a_conflict() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat = ids[0];
    let squat_ref = ref_id_for(&service, template_id, squat)?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;
    log(&mut service, session, squat_ref, squat, 5, "135", t0)?;

    // Only the logged set references Squat now.
    service.remove_template_exercise_ref(squat_ref)?;
    let err = service.delete_exercise(squat).expect_err("set still references squat");
    assert!(matches!(err, TrackerError::Conflict(_)));
    assert_eq!(err.to_string(), "This exercise is used by a workout or has logged sets.");
    assert_eq!(service.list_exercises()?.len(), 1);
    Ok(())
}

#[test]
fn test_restrict_violation_maps_to_exercise_in_use() -> Result<()> {
    let mut service = create_test_service()?;
    let (_, ids) = leg_day(&mut service, &[])?;

    // Storage alone refuses the delete with a domain-level error.
    let result = liftbook::db::delete_exercise(&service.conn, ids[0]);
    assert!(matches!(result, Err(DbError::ExerciseInUse(id)) if id == ids[0]));
    Ok(())
}

#[test]
fn test_list_templates_with_exercises_content_and_order() -> Result<()> {
    let mut service = create_test_service()?;
    let (leg_id, ids) = leg_day(&mut service, &["Lunge", "Calf Raise"])?;
    let push = service.create_workout_template("Push")?;
    let bench = service.create_exercise("Bench Press")?;
    service.add_exercise_to_template(push.id, bench.id)?;
    service.create_workout_template("Rest")?;

    let templates = service.list_templates_with_exercises()?;
    let names: Vec<&str> = templates.iter().map(|t| t.template.name.as_str()).collect();
    assert_eq!(names, vec!["Rest", "Push", "Leg Day"]);
    assert!(templates[0].exercises.is_empty());
    assert_eq!(templates[1].exercises.len(), 1);
    assert_eq!(templates[1].exercises[0].exercise_id, bench.id);
    assert_eq!(templates[1].exercises[0].name, "Bench Press");

    let leg = &templates[2];
    assert_eq!(leg.template.id, leg_id);
    let listed: Vec<(i64, &str, i64)> = leg
        .exercises
        .iter()
        .map(|e| (e.exercise_id, e.name.as_str(), e.order))
        .collect();
    assert_eq!(
        listed,
        vec![(ids[0], "Squat", 1), (ids[1], "Lunge", 2), (ids[2], "Calf Raise", 3)]
    );
    let lunge_ref = ref_id_for(&service, leg_id, ids[1])?;
    assert_eq!(leg.exercises[1].ref_id, lunge_ref);

    // Equal positions fall back to exercise name.
    service.conn.execute(
        r#"UPDATE workout_exercises SET "order" = 1 WHERE id = ?1"#,
        params![lunge_ref],
    )?;
    let templates = service.list_templates_with_exercises()?;
    let leg_names: Vec<&str> = templates[2].exercises.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(leg_names, vec!["Lunge", "Squat", "Calf Raise"]);
    Ok(())
}

#[test]
fn test_corrupt_values_read_as_missing() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, ids) = leg_day(&mut service, &[])?;
    let squat_ref = ref_id_for(&service, template_id, ids[0])?;
    let t0 = base_time();
    let session = service.start_session_at(template_id, t0)?.session_id;
    let set = log(&mut service, session, squat_ref, ids[0], 5, "135", t0)?;
    service.end_session_at(session, t0 + Duration::minutes(10))?;

    service.conn.execute(
        "UPDATE exercise_sets SET weight = 'heavy', reps = '5.5', set_number = 'first' WHERE id = ?1",
        params![set.id],
    )?;

    let history = service.list_history(None)?;
    let view = &history[0].exercises[0].sets[0];
    assert_eq!(view.weight, None);
    assert_eq!(view.reps, None);
    assert_eq!(view.set_number, 1); // Position fallback

    // Numeric text is accepted.
    service.conn.execute(
        "UPDATE exercise_sets SET weight = '140.5', reps = '6' WHERE id = ?1",
        params![set.id],
    )?;
    let previous = service.previous_performance(ids[0])?.expect("previous");
    assert_eq!(previous.sets[0].weight, Some(140.5));
    assert_eq!(previous.sets[0].reps, Some(6));
    Ok(())
}

#[test]
fn test_stale_pointer_is_reported_not_fatal() -> Result<()> {
    let mut service = create_test_service()?;
    let (template_id, _) = leg_day(&mut service, &[])?;
    let session = service.start_session(template_id)?.session_id;

    service.conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    service
        .conn
        .execute("DELETE FROM workout_sessions WHERE id = ?1", params![session])?;
    service.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let pointer = service.active_session()?.expect("pointer row still exists");
    assert!(pointer.is_stale());
    let detail = service.current_session_detail()?.expect("detail");
    assert!(detail.workout_name.is_none());
    assert!(detail.exercises.is_empty());

    // Starting again replaces the stale pointer.
    let started = service.start_session(template_id)?;
    assert_eq!(started.abandoned_session_id, Some(session));
    assert!(!service.active_session()?.expect("pointer").is_stale());
    Ok(())
}

#[test]
fn test_template_summaries_display_order() -> Result<()> {
    let mut service = create_test_service()?;
    let push = service.create_workout_template("Push")?;
    let pull = service.create_workout_template("pull")?;
    let arms = service.create_workout_template("Arms")?;
    let t0 = base_time();

    let s = service.start_session_at(push.id, t0)?.session_id;
    service.end_session_at(s, t0 + Duration::minutes(30))?;
    let s = service.start_session_at(push.id, t0 + Duration::days(1))?.session_id;
    service.end_session_at(s, t0 + Duration::days(1) + Duration::minutes(30))?;
    let s = service.start_session_at(pull.id, t0 + Duration::hours(3))?.session_id;
    service.end_session_at(s, t0 + Duration::hours(4))?;
    // A running session counts but has no completion time.
    service.start_session_at(arms.id, t0 + Duration::days(2))?;

    let mut summaries = service.list_template_summaries()?;
    liftbook::sort_template_summaries_for_display(&mut summaries);
    let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Arms", "pull", "Push"]);
    assert_eq!(summaries[0].sessions_count, 1);
    assert!(summaries[0].last_completed_at.is_none());
    assert_eq!(summaries[2].sessions_count, 2);
    Ok(())
}

#[test]
fn test_config_round_trip_and_limits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");

    // A missing file is created with defaults.
    let config = liftbook::load_config_util(&path)?;
    assert_eq!(config, Config::default());
    assert!(path.exists());

    let conn = rusqlite::Connection::open_in_memory()?;
    let mut service = AppService::with_connection(conn, config, ":memory:".into(), path.clone())?;
    service.set_units(Units::Imperial)?;
    service.set_history_limit(5)?;
    assert!(matches!(
        service.set_history_limit(0),
        Err(ConfigError::InvalidHistoryLimit)
    ));

    let reloaded = liftbook::load_config_util(&path)?;
    assert_eq!(reloaded.units, Units::Imperial);
    assert_eq!(reloaded.history_limit, 5);

    // Missing keys take defaults.
    std::fs::write(&path, "units = \"metric\"\n")?;
    let partial = liftbook::load_config_util(&path)?;
    assert_eq!(partial.units, Units::Metric);
    assert_eq!(partial.history_limit, liftbook::DEFAULT_HISTORY_LIMIT);
    assert_eq!(partial.theme.header_color, "Green");
    Ok(())
}

#[test]
fn test_storage_errors_use_generic_message() -> Result<()> {
    let service = create_test_service()?;
    service.conn.execute_batch("DROP TABLE exercises;")?;
    let result = service.list_exercises();
    let err = result.expect_err("query should fail");
    assert!(matches!(err, TrackerError::Storage(_)));
    assert_eq!(err.to_string(), "Something went wrong. Please try again.");
    Ok(())
}
