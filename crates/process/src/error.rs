//! Error types for process supervision.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while spawning or supervising a process.
#[derive(Debug, Error)]
pub enum Error {
    /// The process exited before its readiness check passed.
    #[error("{0} exited before becoming ready: {1}")]
    ExitedBeforeReady(String, ExitStatus),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// The spawned process has no PID (it exited immediately).
    #[error("no PID available for spawned process {0}")]
    NoPid(String),

    /// The readiness check never passed.
    #[error("{0} did not become ready after {1} checks")]
    NotReady(String, u32),

    /// Failed to deliver a signal.
    #[error("failed to signal process {0}: {1}")]
    Signal(u32, #[source] nix::Error),

    /// A one-shot command exceeded its time limit.
    #[error("{0} timed out after {1:?}")]
    TimedOut(String, Duration),
}
