use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::GuardError;
use crate::logger;

/// Colon-free UTC stamp, e.g. `20241019T181502.031Z`.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";
const BACKUP_EXTENSION: &str = "db";
const CHECKSUM_EXTENSION: &str = "sha256";

#[derive(Debug, Clone)]
pub struct Backup {
    pub path: PathBuf,
    pub size: u64,
    /// Parsed from the file name; `None` for files the guard did not write.
    pub created_at: Option<DateTime<Utc>>,
    seq: u32,
}

impl Backup {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn checksum_path(&self) -> PathBuf {
        checksum_path(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumState {
    Valid,
    Mismatch,
    Missing,
}

/// Timestamped copies of the database file in one flat directory.
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: PathBuf) -> Self {
        Self { backup_dir }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn create_backup(&self, db_path: &Path) -> Result<Backup, GuardError> {
        self.create_backup_at(db_path, Utc::now())
    }

    /// Copies `db_path` byte for byte to `<dir>/<stamp>.db` and writes a
    /// SHA256 sidecar. Never overwrites: a taken name gets `-1`, `-2`, ...
    pub fn create_backup_at(
        &self,
        db_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<Backup, GuardError> {
        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            GuardError::fs(
                format!(
                    "Failed to create backup directory {}",
                    self.backup_dir.display()
                ),
                e,
            )
        })?;

        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut seq = 0u32;
        let (mut dest, path) = loop {
            let path = self.backup_dir.join(backup_file_name(&stamp, seq));
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(e) => {
                    return Err(GuardError::fs(
                        format!("Failed to create backup {}", path.display()),
                        e,
                    ));
                }
            }
        };

        let copied = copy_into(db_path, &mut dest).map_err(|e| {
            let _ = fs::remove_file(&path);
            GuardError::fs(
                format!(
                    "Failed to copy {} to {}",
                    db_path.display(),
                    path.display()
                ),
                e,
            )
        })?;
        drop(dest);

        let digest = file_checksum(&path)
            .map_err(|e| GuardError::fs(format!("Failed to hash {}", path.display()), e))?;
        let sidecar = checksum_path(&path);
        fs::write(&sidecar, &digest).map_err(|e| {
            GuardError::fs(format!("Failed to write {}", sidecar.display()), e)
        })?;

        logger::debug(&format!(
            "backup {} ({} bytes, sha256 {})",
            path.display(),
            copied,
            digest
        ));

        Ok(Backup {
            path,
            size: copied,
            created_at: Some(now),
            seq,
        })
    }

    /// Newest first. Files the guard did not name sort last.
    pub fn list_backups(&self) -> Result<Vec<Backup>, GuardError> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.backup_dir).map_err(|e| {
            GuardError::fs(format!("Failed to read {}", self.backup_dir.display()), e)
        })?;

        let mut backups: Vec<Backup> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(BACKUP_EXTENSION))
            .map(|path| {
                let size = path.metadata().map(|m| m.len()).unwrap_or(0);
                let (created_at, seq) = parse_backup_name(&path);
                Backup {
                    path,
                    size,
                    created_at,
                    seq,
                }
            })
            .collect();

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(backups)
    }

    pub fn verify_backup(&self, backup_path: &Path) -> Result<ChecksumState, GuardError> {
        let sidecar = checksum_path(backup_path);
        if !sidecar.exists() {
            return Ok(ChecksumState::Missing);
        }
        let stored = fs::read_to_string(&sidecar)
            .map_err(|e| GuardError::fs(format!("Failed to read {}", sidecar.display()), e))?;
        let computed = file_checksum(backup_path).map_err(|e| {
            GuardError::fs(format!("Failed to hash {}", backup_path.display()), e)
        })?;
        if computed == stored.trim() {
            Ok(ChecksumState::Valid)
        } else {
            Ok(ChecksumState::Mismatch)
        }
    }

    /// Deletes the oldest guard-written backups so that at most `keep`
    /// remain, sidecars included. `current` always survives and counts
    /// towards `keep`, whatever its timestamp. Returns what was removed.
    pub fn prune(&self, keep: usize, current: &Path) -> Result<Vec<PathBuf>, GuardError> {
        let others: Vec<Backup> = self
            .list_backups()?
            .into_iter()
            .filter(|b| b.created_at.is_some() && b.path != current)
            .collect();

        let mut removed = Vec::new();
        for backup in others.into_iter().skip(keep.saturating_sub(1)) {
            fs::remove_file(&backup.path).map_err(|e| {
                GuardError::fs(format!("Failed to remove {}", backup.path.display()), e)
            })?;
            let sidecar = backup.checksum_path();
            if sidecar.exists()
                && let Err(e) = fs::remove_file(&sidecar)
            {
                logger::debug(&format!(
                    "left checksum {} behind: {e}",
                    sidecar.display()
                ));
            }
            removed.push(backup.path);
        }
        Ok(removed)
    }
}

fn backup_file_name(stamp: &str, seq: u32) -> String {
    if seq == 0 {
        format!("{stamp}.{BACKUP_EXTENSION}")
    } else {
        format!("{stamp}-{seq}.{BACKUP_EXTENSION}")
    }
}

fn parse_backup_name(path: &Path) -> (Option<DateTime<Utc>>, u32) {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return (None, 0);
    };
    let (stamp, seq) = match stem.rsplit_once('-') {
        Some((stamp, seq)) if !seq.is_empty() && seq.chars().all(|c| c.is_ascii_digit()) => {
            (stamp, seq.parse().unwrap_or(0))
        }
        _ => (stem, 0),
    };
    match NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
        Ok(naive) => (Some(naive.and_utc()), seq),
        Err(_) => (None, 0),
    }
}

fn checksum_path(backup_path: &Path) -> PathBuf {
    backup_path.with_extension(CHECKSUM_EXTENSION)
}

fn copy_into(src: &Path, dest: &mut fs::File) -> io::Result<u64> {
    let mut source = fs::File::open(src)?;
    let copied = io::copy(&mut source, dest)?;
    dest.sync_all()?;
    Ok(copied)
}

fn file_checksum(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
