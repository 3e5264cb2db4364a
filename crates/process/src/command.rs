//! One-shot commands with captured output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::ManagedApplication;
use crate::error::{Error, Result};

/// Captured result of a one-shot command.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    /// Exit status of the command.
    pub status: ExitStatus,

    /// Everything written to stdout, lossily decoded.
    pub stdout: String,

    /// Everything written to stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns the exit code, if the command was not killed by a signal.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Returns stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !combined.is_empty() && !self.stderr.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }

    /// Returns whether the command exited successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs the application to completion and captures its output.
///
/// Each output line is also passed to the application's line handlers. The
/// child is killed if `time_limit` elapses first.
///
/// # Errors
///
/// Returns an error if the command cannot be started or exceeds `time_limit`.
/// A non-zero exit is not an error; inspect [`CommandOutput::status`].
pub async fn run_to_completion<A: ManagedApplication>(
    application: &A,
    time_limit: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(application.executable());
    cmd.args(application.args());

    if let Some(working_dir) = application.working_dir() {
        cmd.current_dir(working_dir);
    }

    for (key, value) in application.env() {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    debug!("running {}: {:?}", application.name(), cmd);

    let output = tokio::time::timeout(time_limit, cmd.output())
        .await
        .map_err(|_| Error::TimedOut(application.name().to_string(), time_limit))?
        .map_err(|e| Error::Io("failed to run command", e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    for line in stdout.lines() {
        application.handle_stdout(line);
    }
    for line in stderr.lines() {
        application.handle_stderr(line);
    }

    Ok(CommandOutput {
        status: output.status,
        stdout,
        stderr,
    })
}
