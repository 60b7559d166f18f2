use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::GuardError;
use crate::logger;

/// Exclusive marker file for one mutating run. Released on drop.
#[derive(Debug)]
pub struct GuardLock {
    path: PathBuf,
}

impl GuardLock {
    pub fn acquire(path: &Path) -> Result<Self, GuardError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GuardError::fs(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(GuardError::Locked {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(GuardError::fs(
                    format!("Failed to create lock {}", path.display()),
                    e,
                ));
            }
        };
        // The pid is informational; an empty lock file still counts as held.
        let _ = writeln!(file, "{}", std::process::id());
        logger::debug(&format!("acquired lock {}", path.display()));
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for GuardLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
