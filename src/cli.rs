use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{FinalStep, Overrides};

#[derive(Parser)]
#[command(
    name = "migration-guard",
    version,
    about = "Back up the local database before applying pending migrations."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Default)]
pub struct GlobalArgs {
    /// Database file (default: app.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Where timestamped copies go (default: db_backups)
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Migration tool name or path (default: sqlx)
    #[arg(long, global = true, value_name = "PROGRAM")]
    pub tool: Option<String>,

    /// Directory the tool runs in and relative paths resolve against
    #[arg(long, global = true, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// JSON config file (default: ./migration-guard.json if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Command run after the backup
    #[arg(long, global = true, value_enum)]
    pub final_step: Option<FinalStep>,

    /// Keep only the newest N backups after a successful migration
    #[arg(long, global = true, value_name = "N")]
    pub keep_backups: Option<usize>,

    /// Skip the lock file next to the database
    #[arg(long, global = true)]
    pub no_lock: bool,

    /// Print debug diagnostics to stderr
    #[arg(
        long,
        global = true,
        env = "MIGRATION_GUARD_DEBUG",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub debug: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            database: self.database.clone(),
            backup_dir: self.backup_dir.clone(),
            tool: self.tool.clone(),
            final_step: self.final_step,
            keep_backups: self.keep_backups,
            no_lock: self.no_lock,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up and migrate if anything is pending (default)
    Run,
    /// Report pending migrations without changing anything
    Check(CheckArgs),
    /// Inspect existing backups
    Backups(BackupsArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Exit with status 10 when migrations are pending
    #[arg(long)]
    pub exit_code: bool,
}

#[derive(Args)]
pub struct BackupsArgs {
    #[command(subcommand)]
    pub command: BackupsCommands,
}

#[derive(Subcommand)]
pub enum BackupsCommands {
    List,
    Verify { path: PathBuf },
}
