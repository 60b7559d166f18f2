use std::path::PathBuf;
use thiserror::Error;

pub const EXIT_TOOLING_MISSING: i32 = 127;
pub const EXIT_FILESYSTEM: i32 = 74;
pub const EXIT_LOCKED: i32 = 75;
pub const EXIT_CONFIG: i32 = 78;

/// Failures that end a guard run. Nothing is retried or rolled back.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("migration tool `{tool}` was not found or could not be started")]
    ToolingMissing { tool: String },

    #[error("`{step}` failed{}{}", exit_suffix(.code), stderr_suffix(.stderr))]
    ToolingInvocationFailed {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{context}")]
    FileSystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("another migration run holds the lock at {}", .path.display())]
    Locked { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),
}

impl GuardError {
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        GuardError::FileSystem {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this failure. A failed subprocess passes its
    /// own code through.
    pub fn exit_code(&self) -> i32 {
        match self {
            GuardError::ToolingMissing { .. } => EXIT_TOOLING_MISSING,
            GuardError::ToolingInvocationFailed { code, .. } => match code {
                Some(code) if *code != 0 => *code,
                _ => 1,
            },
            GuardError::FileSystem { .. } => EXIT_FILESYSTEM,
            GuardError::Locked { .. } => EXIT_LOCKED,
            GuardError::Config(_) => EXIT_CONFIG,
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            GuardError::ToolingMissing { tool } if is_sqlx(tool) => Some(
                "install it with `cargo install sqlx-cli` or pass --tool <path>".to_string(),
            ),
            GuardError::ToolingMissing { .. } => {
                Some("make sure the tool is on PATH or pass --tool <path>".to_string())
            }
            GuardError::Locked { path } => Some(format!(
                "if no other run is active, remove {} and retry",
                path.display()
            )),
            _ => None,
        }
    }
}

fn is_sqlx(tool: &str) -> bool {
    std::path::Path::new(tool)
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s == "sqlx")
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit status {code}"),
        None => " (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
