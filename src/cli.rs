// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "A CLI tool to log strength workouts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print list output as CSV instead of a table
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsCli {
    Metric,
    Imperial,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add an exercise to the catalog
    CreateExercise {
        /// Name of the exercise (e.g., "Squat")
        name: String,
    },
    /// Delete an exercise that no workout or logged set uses
    DeleteExercise { id: i64 },
    /// List exercises with the sets from their last completed session
    ListExercises,
    /// Create a workout template
    CreateWorkout {
        /// Unique name of the workout (e.g., "Leg Day")
        name: String,
    },
    /// Delete a workout template. Past sessions stay in history.
    DeleteWorkout { id: i64 },
    /// Append an exercise to a workout template
    AddToWorkout {
        /// ID of the workout template
        workout_id: i64,
        /// ID of the exercise
        exercise_id: i64,
    },
    /// Remove an exercise from a workout template by its membership ID
    RemoveFromWorkout { ref_id: i64 },
    /// List workout templates with their exercises
    ListWorkouts,
    /// List workout templates in picker order (never done first, then least recent)
    Summaries,
    /// Start a session of a workout template
    Start {
        workout_id: i64,
        /// Abandon the session currently in progress
        #[arg(short, long)]
        force: bool,
    },
    /// Finish a session (defaults to the active one)
    End { session_id: Option<i64> },
    /// Switch the active exercise of the running session
    Switch { exercise_id: i64 },
    /// Log a set for the active exercise (or another exercise of the session)
    Log {
        #[arg(short, long)]
        reps: i64,
        /// Weight lifted, in the configured units
        #[arg(short, long, allow_hyphen_values = true)]
        weight: String,
        /// Exercise ID; defaults to the active exercise
        #[arg(short, long)]
        exercise: Option<i64>,
    },
    /// Delete a logged set
    DeleteSet { id: i64 },
    /// Show the running session
    Status,
    /// Show completed sessions, newest first
    History {
        /// Show only the last N sessions (defaults to the configured limit)
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show the sets from the last completed session that logged an exercise
    Previous { exercise_id: i64 },
    /// Set the weight units label
    SetUnits {
        #[arg(value_enum)]
        units: UnitsCli,
    },
    /// Set how many sessions `history` shows by default
    SetHistoryLimit { limit: u32 },
    /// Show the path to the config file
    ConfigPath,
    /// Show the path to the database file
    DbPath,
    /// Generate a shell completion script
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
