//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use log::LevelFilter;
use std::io::{self, stdout, Write};

use liftbook::{
    duration_minutes, sort_template_summaries_for_display, AppService, ExerciseWithRecentSets,
    HistoryEntry, LogSetParams, SessionDetail, SetView, TemplateSummary, TemplateWithExercises,
    TrackerError, Units,
};

fn main() -> Result<()> {
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let rust_log = std::env::var("RUST_LOG").ok();
    init_logger(rust_log.as_deref());

    let config_path =
        liftbook::get_config_path_util().context("Failed to determine configuration file path")?;
    let config = liftbook::load_config_util(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    if rust_log.is_none() {
        log::set_max_level(configured_level(&config.log_level));
    }

    let mut service = AppService::initialize_with_config(config, config_path)
        .context("Failed to initialize application service")?;

    let header_color = liftbook::parse_color(&service.config.theme.header_color)
        .map(Color::from)
        .unwrap_or(Color::Green); // Fallback
    let units = service.config.units;

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        // --- Catalog Commands ---
        cli::Commands::CreateExercise { name } => match service.create_exercise(&name) {
            Ok(exercise) => println!(
                "Successfully created exercise '{}' (ID: {})",
                exercise.name, exercise.id
            ),
            Err(e) => bail!("Error creating exercise: {e}"),
        },
        cli::Commands::DeleteExercise { id } => match service.delete_exercise(id) {
            Ok(()) => println!("Successfully deleted exercise {id}."),
            Err(e) => bail!("Error deleting exercise: {e}"),
        },
        cli::Commands::ListExercises => match service.list_exercises_with_recent_sets() {
            Ok(exercises) if exercises.is_empty() && !export_csv => {
                println!("No exercises yet. Create one with `create-exercise`.");
            }
            Ok(exercises) => {
                if export_csv {
                    print_exercise_csv(&exercises, units)?;
                } else {
                    print_exercise_table(&exercises, header_color, units);
                }
            }
            Err(e) => bail!("Error listing exercises: {e}"),
        },
        cli::Commands::CreateWorkout { name } => match service.create_workout_template(&name) {
            Ok(template) => println!(
                "Successfully created workout '{}' (ID: {})",
                template.name, template.id
            ),
            Err(e) => bail!("Error creating workout: {e}"),
        },
        cli::Commands::DeleteWorkout { id } => match service.delete_workout_template(id) {
            Ok(()) => println!("Successfully deleted workout {id}. Its sessions remain in history."),
            Err(e) => bail!("Error deleting workout: {e}"),
        },
        cli::Commands::AddToWorkout {
            workout_id,
            exercise_id,
        } => match service.add_exercise_to_template(workout_id, exercise_id) {
            Ok(member) => println!(
                "Added '{}' to workout {workout_id} at position {} (membership ID: {})",
                member.name, member.order, member.ref_id
            ),
            Err(e) => bail!("Error adding exercise to workout: {e}"),
        },
        cli::Commands::RemoveFromWorkout { ref_id } => {
            match service.remove_template_exercise_ref(ref_id) {
                Ok(()) => println!("Removed membership {ref_id} from its workout."),
                Err(e) => bail!("Error removing exercise from workout: {e}"),
            }
        }
        cli::Commands::ListWorkouts => match service.list_templates_with_exercises() {
            Ok(templates) => {
                if export_csv {
                    print_workouts_csv(&templates)?;
                } else if templates.is_empty() {
                    println!("No workouts yet. Create one with `create-workout`.");
                } else {
                    print_workouts_table(&templates, header_color);
                }
            }
            Err(e) => bail!("Error listing workouts: {e}"),
        },
        cli::Commands::Summaries => match service.list_template_summaries() {
            Ok(mut summaries) => {
                sort_template_summaries_for_display(&mut summaries);
                if export_csv {
                    print_summaries_csv(&summaries)?;
                } else {
                    print_summaries_table(&summaries, header_color);
                }
            }
            Err(e) => bail!("Error listing workout summaries: {e}"),
        },

        // --- Session Commands ---
        cli::Commands::Start { workout_id, force } => {
            if !force && service.has_active_session()? {
                bail!("A workout is already in progress. Finish it with `end`, or pass --force to abandon it.");
            }
            match service.start_session(workout_id) {
                Ok(started) => {
                    if let Some(abandoned) = started.abandoned_session_id {
                        println!("Abandoned session {abandoned}.");
                    }
                    println!(
                        "Started session {} at {}.",
                        started.session_id,
                        format_local(started.started_at)
                    );
                }
                Err(e) => bail!("Error starting workout: {e}"),
            }
        }
        cli::Commands::End { session_id } => {
            let session_id = match session_id {
                Some(id) => id,
                None => match service.active_session()? {
                    Some(pointer) => pointer.session_id,
                    None => bail!("No workout in progress."),
                },
            };
            match service.end_session(session_id) {
                Ok(_) => println!("Finished session {session_id}."),
                Err(e) => bail!("Error finishing workout: {e}"),
            }
        }
        cli::Commands::Switch { exercise_id } => {
            let Some(pointer) = service.active_session()? else {
                bail!("No workout in progress.");
            };
            match service.set_active_exercise(pointer.session_id, exercise_id) {
                Ok(()) => println!("Active exercise is now {exercise_id}."),
                Err(e) => bail!("Error switching exercise: {e}"),
            }
        }
        cli::Commands::Log {
            reps,
            weight,
            exercise,
        } => {
            let Some(detail) = service.current_session_detail()? else {
                bail!("No workout in progress. Start one with `start`.");
            };
            let target = match exercise {
                Some(id) => detail.exercises.iter().find(|e| e.exercise_id == id),
                None => detail.active_exercise(),
            };
            let Some(target) = target else {
                bail!("That exercise is not part of the running workout.");
            };
            let params = LogSetParams {
                session_id: detail.pointer.session_id,
                workout_exercise_id: target.ref_id,
                exercise_id: target.exercise_id,
                reps,
                weight: &weight,
            };
            let name = target.name.clone();
            match service.log_set(params) {
                Ok(set) => println!(
                    "Logged {name} set #{}: {} x {} {}",
                    set.set_number,
                    set.reps,
                    set.weight,
                    units.weight_label()
                ),
                Err(e) => bail!("Error logging set: {e}"),
            }
        }
        cli::Commands::DeleteSet { id } => match service.delete_set(id) {
            Ok(()) => println!("Deleted set {id}."),
            Err(e) => bail!("Error deleting set: {e}"),
        },
        cli::Commands::Status => match service.current_session_detail()? {
            None => println!("No workout in progress."),
            Some(detail) => print_session_detail(&detail, header_color, units),
        },

        // --- History Commands ---
        cli::Commands::History { limit } => match service.list_history(limit) {
            Ok(entries) => {
                if export_csv {
                    print_history_csv(&entries, units)?;
                } else if entries.is_empty() {
                    println!("No completed workouts yet.");
                } else {
                    print_history_table(&entries, header_color, units);
                }
            }
            Err(e) => bail!("Error loading history: {e}"),
        },
        cli::Commands::Previous { exercise_id } => {
            match service.previous_performance(exercise_id) {
                Ok(None) => println!("No previous sets for exercise {exercise_id}."),
                Ok(Some(previous)) => println!(
                    "Last done {}: {}",
                    format_local(previous.completed_at),
                    format_sets(&previous.sets, units)
                ),
                Err(TrackerError::Validation(msg)) => bail!("{msg}"),
                Err(e) => bail!("Error loading previous performance: {e}"),
            }
        }

        // --- Config Commands ---
        cli::Commands::SetUnits { units } => {
            let units = match units {
                cli::UnitsCli::Metric => Units::Metric,
                cli::UnitsCli::Imperial => Units::Imperial,
            };
            service
                .set_units(units)
                .context("Failed to save units setting")?;
            println!("Units set to {units:?} ({}).", units.weight_label());
        }
        cli::Commands::SetHistoryLimit { limit } => {
            service
                .set_history_limit(limit)
                .context("Failed to save history limit")?;
            println!("History limit set to {limit}.");
        }
        cli::Commands::ConfigPath => {
            println!("{}", service.get_config_path().display());
        }
        cli::Commands::DbPath => {
            println!("{}", service.get_db_path().display());
        }
    }

    Ok(())
}

/// With `RUST_LOG` set it decides the filter. Otherwise everything passes the
/// logger and `log::set_max_level` gates records: `warn` until the config is read.
fn init_logger(rust_log: Option<&str>) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(buf, "{}: {} - {}", record.level(), record.target(), record.args())
        })
        .target(env_logger::Target::Stderr);
    match rust_log {
        Some(filters) => {
            builder.parse_filters(filters);
        }
        None => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    let _ = builder.try_init();
    if rust_log.is_none() {
        log::set_max_level(LevelFilter::Warn);
    }
}

/// Level named by config `log_level`; unknown names fall back to `warn`.
fn configured_level(name: &str) -> LevelFilter {
    match name.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_weight(weight: Option<f64>) -> String {
    weight.map_or("-".to_string(), |w| format!("{w}"))
}

/// "135 x 5, 145 x 3 lbs"
fn format_sets(sets: &[SetView], units: Units) -> String {
    if sets.is_empty() {
        return "-".to_string();
    }
    let joined = sets
        .iter()
        .map(|s| {
            format!(
                "{} x {}",
                format_weight(s.weight),
                s.reps.map_or("-".to_string(), |r| r.to_string())
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{joined} {}", units.weight_label())
}

fn print_exercise_table(exercises: &[ExerciseWithRecentSets], header_color: Color, units: Units) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Created").fg(header_color),
            Cell::new("Last Sets").fg(header_color),
        ]);

    for item in exercises {
        table.add_row(vec![
            Cell::new(item.exercise.id.to_string()),
            Cell::new(&item.exercise.name),
            Cell::new(format_local(item.exercise.created_at)),
            Cell::new(format_sets(&item.recent_sets, units)),
        ]);
    }
    println!("{table}");
}

fn print_exercise_csv(exercises: &[ExerciseWithRecentSets], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["ID", "Name", "Created_Local", "Last_Sets"])?;
    for item in exercises {
        writer.write_record([
            item.exercise.id.to_string(),
            item.exercise.name.clone(),
            item.exercise.created_at.with_timezone(&Local).to_rfc3339(),
            format_sets(&item.recent_sets, units),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_workouts_table(templates: &[TemplateWithExercises], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Exercises (membership ID: name)").fg(header_color),
        ]);

    for item in templates {
        let exercises = if item.exercises.is_empty() {
            "-".to_string()
        } else {
            item.exercises
                .iter()
                .map(|e| format!("{}: {}", e.ref_id, e.name))
                .collect::<Vec<_>>()
                .join("\n")
        };
        table.add_row(vec![
            Cell::new(item.template.id.to_string()),
            Cell::new(&item.template.name),
            Cell::new(exercises),
        ]);
    }
    println!("{table}");
}

fn print_workouts_csv(templates: &[TemplateWithExercises]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Workout_ID", "Workout", "Order", "Membership_ID", "Exercise_ID", "Exercise"])?;
    for item in templates {
        for e in &item.exercises {
            writer.write_record([
                item.template.id.to_string(),
                item.template.name.clone(),
                e.order.to_string(),
                e.ref_id.to_string(),
                e.exercise_id.to_string(),
                e.name.clone(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_summaries_table(summaries: &[TemplateSummary], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Last Completed").fg(header_color),
            Cell::new("Sessions").fg(header_color),
        ]);

    for summary in summaries {
        table.add_row(vec![
            Cell::new(summary.id.to_string()),
            Cell::new(&summary.name),
            Cell::new(summary.last_completed_at.map_or("Never".to_string(), format_local)),
            Cell::new(summary.sessions_count.to_string()),
        ]);
    }
    println!("{table}");
}

fn print_summaries_csv(summaries: &[TemplateSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["ID", "Name", "Last_Completed_Local", "Sessions"])?;
    for summary in summaries {
        writer.write_record([
            summary.id.to_string(),
            summary.name.clone(),
            summary
                .last_completed_at
                .map_or(String::new(), |ts| ts.with_timezone(&Local).to_rfc3339()),
            summary.sessions_count.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_session_detail(detail: &SessionDetail, header_color: Color, units: Units) {
    let Some(started_at) = detail.pointer.started_at else {
        println!(
            "The active pointer refers to session {}, which no longer exists. Start a new workout.",
            detail.pointer.session_id
        );
        return;
    };
    let name = detail.workout_name.as_deref().unwrap_or(liftbook::DEFAULT_WORKOUT_LABEL);
    let elapsed = duration_minutes(Some(started_at), Some(Utc::now())).unwrap_or(1);
    println!(
        "{name} (session {}), started {} ({elapsed} min ago)",
        detail.pointer.session_id,
        format_local(started_at)
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("").fg(header_color),
            Cell::new("Exercise ID").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Sets (ID #n: weight x reps)").fg(header_color),
            Cell::new("Last Time").fg(header_color),
        ]);

    let active = detail.pointer.active_exercise_id;
    for exercise in &detail.exercises {
        let sets = exercise
            .sets
            .iter()
            .map(|s| {
                format!(
                    "{} #{}: {} x {}",
                    s.id,
                    s.set_number,
                    format_weight(s.weight),
                    s.reps.map_or("-".to_string(), |r| r.to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let previous = exercise
            .previous
            .as_ref()
            .map_or("-".to_string(), |p| format_sets(&p.sets, units));
        table.add_row(vec![
            Cell::new(if active == Some(exercise.exercise_id) { ">" } else { "" }),
            Cell::new(exercise.exercise_id.to_string()),
            Cell::new(&exercise.name),
            Cell::new(if sets.is_empty() { "-".to_string() } else { sets }),
            Cell::new(previous),
        ]);
    }
    println!("{table}");
}

fn print_history_table(entries: &[HistoryEntry], header_color: Color, units: Units) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Session").fg(header_color),
            Cell::new("Workout").fg(header_color),
            Cell::new("Completed (Local)").fg(header_color),
            Cell::new("Duration (min)").fg(header_color),
            Cell::new("Exercises").fg(header_color),
        ]);

    for entry in entries {
        let exercises = entry
            .exercises
            .iter()
            .map(|e| format!("{}: {}", e.exercise_name, format_sets(&e.sets, units)))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(entry.session_id.to_string()),
            Cell::new(&entry.workout_name),
            Cell::new(format_local(entry.completed_at)),
            Cell::new(entry.duration_minutes.map_or("-".to_string(), |m| m.to_string())),
            Cell::new(if exercises.is_empty() { "-".to_string() } else { exercises }),
        ]);
    }
    println!("{table}");
}

fn print_history_csv(entries: &[HistoryEntry], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    let weight_header = format!("Weight_{}", units.weight_label());
    writer.write_record([
        "Session_ID",
        "Workout",
        "Started_Local",
        "Completed_Local",
        "Duration_min",
        "Exercise",
        "Set",
        "Reps",
        weight_header.as_str(),
    ])?;
    for entry in entries {
        for exercise in &entry.exercises {
            for set in &exercise.sets {
                writer.write_record([
                    entry.session_id.to_string(),
                    entry.workout_name.clone(),
                    entry.started_at.with_timezone(&Local).to_rfc3339(),
                    entry.completed_at.with_timezone(&Local).to_rfc3339(),
                    entry.duration_minutes.map_or(String::new(), |m| m.to_string()),
                    exercise.exercise_name.clone(),
                    set.set_number.to_string(),
                    set.reps.map_or(String::new(), |r| r.to_string()),
                    set.weight.map_or(String::new(), |w| w.to_string()),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
