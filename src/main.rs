mod backup;
mod cli;
mod config;
mod error;
mod formatting;
mod guard;
mod lock;
mod logger;
mod paths;
mod runner;
mod sanitize;
mod status;
mod tool;

use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

use crate::backup::ChecksumState;
use crate::cli::{BackupsCommands, Cli, Commands};
use crate::config::Config;
use crate::error::GuardError;
use crate::guard::{CheckOutcome, MigrationGuard, Outcome};
use crate::paths::GuardPaths;
use crate::runner::SystemRunner;

const EXIT_PENDING: i32 = 10;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            logger::error(&format!("{err:#}"));
            let code = match err.downcast_ref::<GuardError>() {
                Some(guard_err) => {
                    if let Some(hint) = guard_err.hint() {
                        eprintln!("hint: {hint}");
                    }
                    guard_err.exit_code()
                }
                None => 1,
            };
            std::process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logger::set_debug(cli.global.debug);

    let workdir = paths::resolve_workdir(cli.global.workdir.as_deref())?;
    let config = Config::load(&workdir, cli.global.config.as_deref())?
        .apply(cli.global.overrides());
    config.validate()?;
    let paths = GuardPaths::new(Some(&workdir), &config)?;
    logger::debug(&format!(
        "database {}, backups {}, tool {}, final step {:?}",
        paths.db_path.display(),
        paths.backup_dir.display(),
        config.tool,
        config.final_step
    ));

    let guard = MigrationGuard::new(SystemRunner, &config, paths);

    match cli.command {
        None | Some(Commands::Run) => cmd_run(&guard),
        Some(Commands::Check(args)) => cmd_check(&guard, args.exit_code),
        Some(Commands::Backups(args)) => match args.command {
            BackupsCommands::List => cmd_backups_list(&guard),
            BackupsCommands::Verify { path } => cmd_backups_verify(&guard, &workdir, path),
        },
    }
}

fn cmd_run(guard: &MigrationGuard<SystemRunner>) -> Result<i32> {
    match guard.run()? {
        Outcome::Created | Outcome::UpToDate => {}
        Outcome::Migrated {
            backup,
            pending,
            pruned,
        } => {
            logger::debug(&format!(
                "{pending} pending line(s); backup {} ({}); {} old backup(s) pruned",
                backup.file_name(),
                formatting::human_size(backup.size),
                pruned.len()
            ));
        }
    }
    Ok(0)
}

fn cmd_check(guard: &MigrationGuard<SystemRunner>, exit_code: bool) -> Result<i32> {
    match guard.check()? {
        CheckOutcome::MissingDatabase => {
            println!("No database yet. `run` would create it.");
            Ok(0)
        }
        CheckOutcome::UpToDate => {
            println!("No migrations pending.");
            Ok(0)
        }
        CheckOutcome::Pending(count) => {
            println!("{count} pending migration(s). `run` would back up and migrate.");
            Ok(if exit_code { EXIT_PENDING } else { 0 })
        }
    }
}

fn cmd_backups_list(guard: &MigrationGuard<SystemRunner>) -> Result<i32> {
    let manager = guard.backups();
    let backups = manager.list_backups()?;
    let mut rows = Vec::with_capacity(backups.len());
    for backup in backups {
        let state = manager.verify_backup(&backup.path)?;
        rows.push((backup, state));
    }
    println!("Backups in {}:", manager.backup_dir().display());
    println!("{}", formatting::format_backups_table(&rows));
    Ok(0)
}

fn cmd_backups_verify(
    guard: &MigrationGuard<SystemRunner>,
    workdir: &std::path::Path,
    path: PathBuf,
) -> Result<i32> {
    let path = paths::resolve(workdir, &path);
    if !path.is_file() {
        return Err(anyhow!("Backup not found at {}", path.display()));
    }
    match guard.backups().verify_backup(&path)? {
        ChecksumState::Valid => {
            println!("{}: checksum ok", path.display());
            Ok(0)
        }
        ChecksumState::Missing => Err(anyhow!(
            "No checksum recorded for {}",
            path.display()
        )),
        ChecksumState::Mismatch => Err(anyhow!(
            "{} does not match its recorded checksum",
            path.display()
        )),
    }
}
