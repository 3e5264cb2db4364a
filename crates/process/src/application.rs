use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tracing::{info, warn};

/// An external program that can be supervised by this crate.
///
/// Implementors describe how to launch the program and how to interpret its
/// output. The same trait is used for long-running servers (see
/// [`crate::spawn`]) and one-shot administrative commands (see
/// [`crate::run_to_completion`]).
#[async_trait]
pub trait ManagedApplication
where
    Self: Send + Sync + 'static,
{
    /// Arguments passed to the executable.
    fn args(&self) -> Vec<String>;

    /// Extra environment variables for the process.
    fn env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Path or name of the executable.
    fn executable(&self) -> &str;

    /// Called for every line the process writes to stdout.
    fn handle_stdout(&self, line: &str) {
        info!(app = self.name(), "{}", line);
    }

    /// Called for every line the process writes to stderr.
    fn handle_stderr(&self, line: &str) {
        warn!(app = self.name(), "{}", line);
    }

    /// Checks whether the process is ready to serve.
    ///
    /// The default implementation considers the process ready as soon as it
    /// has been spawned.
    async fn is_ready_check(&self) -> bool {
        true
    }

    /// Interval between readiness checks.
    fn is_ready_check_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Maximum number of readiness checks before giving up. `None` means
    /// keep checking for as long as the process is alive.
    fn is_ready_check_max(&self) -> Option<u32> {
        None
    }

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Signal sent to request a graceful shutdown.
    fn shutdown_signal(&self) -> Signal {
        Signal::SIGTERM
    }

    /// How long to wait after the shutdown signal before killing the process.
    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Working directory for the process.
    fn working_dir(&self) -> Option<PathBuf> {
        None
    }
}
