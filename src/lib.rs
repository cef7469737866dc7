// src/lib.rs
use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

// --- Declare modules ---
mod catalog;
mod config;
pub mod db;
mod error;
mod history;
mod session;

// --- Expose public types ---
pub use catalog::{ExerciseWithRecentSets, TemplateExercise, TemplateWithExercises};
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, Config, Error as ConfigError, StandardColor, Theme, Units,
    DEFAULT_HISTORY_LIMIT,
};
pub use db::{
    get_db_path as get_db_path_util, ActivePointer, Error as DbError, Exercise, WorkoutSession,
    WorkoutTemplate,
};
pub use error::{Error as TrackerError, Result as TrackerResult};
pub use history::{
    duration_minutes, sort_template_summaries_for_display, ExerciseHistory, HistoryEntry,
    PreviousPerformance, SetView, TemplateSummary, DEFAULT_WORKOUT_LABEL,
};
pub use session::{
    ActiveExerciseView, LogSetParams, LoggedSet, SessionDetail, StartedSession,
};

pub struct AppService {
    pub config: Config,
    pub conn: Connection,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;
        Self::initialize_with_config(config, config_path)
    }

    /// Opens the database for an already loaded configuration.
    /// # Errors
    /// Returns `anyhow::Error` if the database path cannot be determined, opened, or initialized.
    pub fn initialize_with_config(config: Config, config_path: PathBuf) -> Result<Self> {
        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let conn = db::open_db(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        db::init_db(&conn).context("Failed to initialize database schema")?;
        info!("Opened database at {}", db_path.display());

        Ok(Self {
            config,
            conn,
            db_path,
            config_path,
        })
    }

    /// Builds a service around an already opened connection, initializing the schema.
    /// # Errors
    /// Returns `DbError` if the schema cannot be created.
    pub fn with_connection(
        conn: Connection,
        config: Config,
        db_path: PathBuf,
        config_path: PathBuf,
    ) -> Result<Self, DbError> {
        db::init_db(&conn)?;
        Ok(Self {
            config,
            conn,
            db_path,
            config_path,
        })
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

    /// Sets the weight units label.
    /// # Errors
    /// Returns `ConfigError` variants if saving fails.
    pub fn set_units(&mut self, units: Units) -> Result<(), ConfigError> {
        self.config.units = units;
        self.save_config()
    }

    /// Sets how many sessions `list_history` returns by default.
    /// # Errors
    /// - `ConfigError::InvalidHistoryLimit` if `limit` is 0.
    /// - `ConfigError` variants if saving fails.
    pub fn set_history_limit(&mut self, limit: u32) -> Result<(), ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidHistoryLimit);
        }
        self.config.history_limit = limit;
        self.save_config()
    }
}
