use std::path::PathBuf;

use crate::backup::{Backup, BackupManager};
use crate::config::{Config, FinalStep};
use crate::error::GuardError;
use crate::lock::GuardLock;
use crate::logger;
use crate::paths::GuardPaths;
use crate::runner::CommandRunner;
use crate::status::MigrationReport;
use crate::tool::MigrationTool;

/// How a successful run ended.
#[derive(Debug)]
pub enum Outcome {
    /// No database existed; the tool created it.
    Created,
    /// Nothing pending; the database was not touched.
    UpToDate,
    Migrated {
        backup: Backup,
        pending: usize,
        pruned: Vec<PathBuf>,
    },
}

/// Read-only answer from `check`.
#[derive(Debug)]
pub enum CheckOutcome {
    MissingDatabase,
    UpToDate,
    Pending(usize),
}

/// Backs the database up whenever the tool reports pending migrations, then
/// lets the tool rebuild it. Every step runs once, in order, and the first
/// failure ends the run.
pub struct MigrationGuard<R: CommandRunner> {
    tool: MigrationTool<R>,
    paths: GuardPaths,
    backups: BackupManager,
    final_step: FinalStep,
    keep_backups: Option<usize>,
    lock: bool,
}

impl<R: CommandRunner> MigrationGuard<R> {
    pub fn new(runner: R, config: &Config, paths: GuardPaths) -> Self {
        let tool = MigrationTool::new(runner, config.tool.clone(), paths.workdir.clone());
        let backups = BackupManager::new(paths.backup_dir.clone());
        Self {
            tool,
            paths,
            backups,
            final_step: config.final_step,
            keep_backups: config.keep_backups,
            lock: config.lock,
        }
    }

    pub fn run(&self) -> Result<Outcome, GuardError> {
        let version = self.tool.probe_version()?;
        logger::debug(&format!("using {version}"));

        let _lock = if self.lock {
            Some(GuardLock::acquire(&self.paths.lock_path)?)
        } else {
            None
        };

        if !self.paths.db_path.exists() {
            logger::info(&format!(
                "No database found at {}. Creating it and applying all migrations.",
                self.paths.db_path.display()
            ));
            self.tool.database_setup()?;
            logger::info("Database created.");
            return Ok(Outcome::Created);
        }

        let report = self.status()?;
        if !report.has_pending() {
            logger::info("No migrations pending. Keeping current database.");
            return Ok(Outcome::UpToDate);
        }

        logger::info(
            "There is at least one pending migration. Backing up the current database and running the migration(s).",
        );
        let backup = self.backups.create_backup(&self.paths.db_path)?;
        logger::info(&format!("Backup written to {}", backup.path.display()));

        match self.final_step {
            FinalStep::Reset => self.tool.database_reset()?,
            FinalStep::Setup => self.tool.database_setup()?,
        }
        logger::info("Migrations applied. New database ready.");

        let pruned = match self.keep_backups {
            Some(keep) => self.backups.prune(keep, &backup.path)?,
            None => Vec::new(),
        };
        for path in &pruned {
            logger::info(&format!("Removed old backup {}", path.display()));
        }

        Ok(Outcome::Migrated {
            backup,
            pending: report.pending_count(),
            pruned,
        })
    }

    /// Steps one to four without side effects.
    pub fn check(&self) -> Result<CheckOutcome, GuardError> {
        let version = self.tool.probe_version()?;
        logger::debug(&format!("using {version}"));

        if !self.paths.db_path.exists() {
            return Ok(CheckOutcome::MissingDatabase);
        }
        let report = self.status()?;
        if report.has_pending() {
            Ok(CheckOutcome::Pending(report.pending_count()))
        } else {
            Ok(CheckOutcome::UpToDate)
        }
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    fn status(&self) -> Result<MigrationReport, GuardError> {
        let report = MigrationReport::parse(self.tool.migrate_info()?);
        logger::debug(&format!("migrate info:\n{}", report.raw().trim_end()));
        Ok(report)
    }

    #[cfg(test)]
    fn runner(&self) -> &R {
        self.tool.runner()
    }
}
