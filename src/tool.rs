use std::io;
use std::path::PathBuf;

use crate::error::GuardError;
use crate::logger;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// The external migration CLI, addressed by fixed argument lists.
pub struct MigrationTool<R: CommandRunner> {
    runner: R,
    program: String,
    cwd: PathBuf,
}

impl<R: CommandRunner> MigrationTool<R> {
    pub fn new(runner: R, program: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            runner,
            program: program.into(),
            cwd,
        }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `-V`. Any failure here means the tool is unusable.
    pub fn probe_version(&self) -> Result<String, GuardError> {
        let invocation = self.invocation(&["-V"], true);
        match self.runner.run(&invocation) {
            Ok(output) if output.success() => Ok(output.stdout.trim().to_string()),
            Ok(output) => {
                logger::debug(&format!(
                    "version probe exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ));
                Err(self.missing())
            }
            Err(err) => {
                logger::debug(&format!("version probe could not start: {err}"));
                Err(self.missing())
            }
        }
    }

    /// `migrate info`, stdout captured for scanning.
    pub fn migrate_info(&self) -> Result<String, GuardError> {
        let output = self.exec(&["migrate", "info"], true)?;
        Ok(output.stdout)
    }

    /// `database setup`: creates the database and applies every migration.
    pub fn database_setup(&self) -> Result<(), GuardError> {
        self.exec(&["database", "setup"], false).map(|_| ())
    }

    /// `database reset -y`: drops and recreates without prompting.
    pub fn database_reset(&self) -> Result<(), GuardError> {
        self.exec(&["database", "reset", "-y"], false).map(|_| ())
    }

    fn exec(&self, args: &[&str], capture: bool) -> Result<CommandOutput, GuardError> {
        let invocation = self.invocation(args, capture);
        logger::debug(&format!(
            "running `{}` in {}",
            invocation.display(),
            invocation.cwd.display()
        ));
        let output = self
            .runner
            .run(&invocation)
            .map_err(|err| self.spawn_failure(&invocation, err))?;
        if !output.success() {
            return Err(GuardError::ToolingInvocationFailed {
                step: invocation.display(),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    fn spawn_failure(&self, invocation: &Invocation, err: io::Error) -> GuardError {
        if err.kind() == io::ErrorKind::NotFound {
            return self.missing();
        }
        GuardError::ToolingInvocationFailed {
            step: invocation.display(),
            code: None,
            stderr: err.to_string(),
        }
    }

    fn missing(&self) -> GuardError {
        GuardError::ToolingMissing {
            tool: self.program.clone(),
        }
    }

    fn invocation(&self, args: &[&str], capture: bool) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: self.cwd.clone(),
            capture,
        }
    }
}
