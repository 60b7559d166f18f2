use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::GuardError;

/// Absolute locations the guard touches, resolved against one working
/// directory so nothing depends on the process cwd afterwards.
#[derive(Debug, Clone)]
pub struct GuardPaths {
    pub workdir: PathBuf,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub lock_path: PathBuf,
}

impl GuardPaths {
    pub fn new(workdir: Option<&Path>, config: &Config) -> Result<Self> {
        let workdir = resolve_workdir(workdir)?;
        let db_path = resolve(&workdir, &config.database);
        let backup_dir = resolve(&workdir, &config.backup_dir);
        let lock_path = lock_path_for(&db_path);
        Ok(Self {
            workdir,
            db_path,
            backup_dir,
            lock_path,
        })
    }
}

/// Absolute form of `workdir` (or the process cwd). It must be an existing
/// directory: every subprocess is started inside it.
pub fn resolve_workdir(workdir: Option<&Path>) -> Result<PathBuf> {
    let resolved = absolutize(workdir)?;
    if !resolved.is_dir() {
        return Err(GuardError::Config(format!(
            "working directory {} does not exist or is not a directory",
            resolved.display()
        ))
        .into());
    }
    Ok(resolved)
}

/// Resolves against the invocation directory without touching the disk.
pub fn absolutize(path: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Unable to resolve current directory")?;
    Ok(match path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd,
    })
}

pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "database".into());
    name.push(".migration-guard.lock");
    db_path.with_file_name(name)
}
