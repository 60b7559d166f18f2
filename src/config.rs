use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GuardError;

pub const DEFAULT_CONFIG_FILE: &str = "migration-guard.json";
const DEFAULT_DATABASE: &str = "app.db";
const DEFAULT_BACKUP_DIR: &str = "db_backups";
const DEFAULT_TOOL: &str = "sqlx";

/// Command run once a backup exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FinalStep {
    /// `database reset -y`: drop, recreate, apply everything.
    Reset,
    /// `database setup`: create if missing and apply pending migrations.
    Setup,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub backup_dir: PathBuf,
    pub tool: String,
    pub final_step: FinalStep,
    pub keep_backups: Option<usize>,
    pub lock: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            tool: DEFAULT_TOOL.to_string(),
            final_step: FinalStep::Reset,
            keep_backups: None,
            lock: true,
        }
    }
}

/// Flag values that win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub tool: Option<String>,
    pub final_step: Option<FinalStep>,
    pub keep_backups: Option<usize>,
    pub no_lock: bool,
}

impl Config {
    /// Loads `explicit` (relative to the invocation directory) if given,
    /// else `migration-guard.json` in `workdir` when present, else defaults.
    /// An explicit path that does not exist is an error.
    pub fn load(workdir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => crate::paths::absolutize(Some(path))?,
            None => {
                let candidate = workdir.join(DEFAULT_CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Config::default());
                }
                candidate
            }
        };
        let data = fs::read_to_string(&path).map_err(|e| {
            GuardError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&data).map_err(|e| {
            GuardError::Config(format!("{}: {e}", path.display()))
        })?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(database) = overrides.database {
            self.database = database;
        }
        if let Some(backup_dir) = overrides.backup_dir {
            self.backup_dir = backup_dir;
        }
        if let Some(tool) = overrides.tool {
            self.tool = tool;
        }
        if let Some(final_step) = overrides.final_step {
            self.final_step = final_step;
        }
        if overrides.keep_backups.is_some() {
            self.keep_backups = overrides.keep_backups;
        }
        if overrides.no_lock {
            self.lock = false;
        }
        self
    }

    pub fn validate(&self) -> Result<(), GuardError> {
        if self.database.as_os_str().is_empty() {
            return Err(GuardError::Config("database path cannot be empty".into()));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(GuardError::Config("backup directory cannot be empty".into()));
        }
        if self.tool.trim().is_empty() {
            return Err(GuardError::Config("tool cannot be empty".into()));
        }
        if self.tool.contains('\0') {
            return Err(GuardError::Config("tool cannot contain null bytes".into()));
        }
        if self.keep_backups == Some(0) {
            return Err(GuardError::Config(
                "keep_backups must be at least 1 (omit it to keep every backup)".into(),
            ));
        }
        Ok(())
    }
}
