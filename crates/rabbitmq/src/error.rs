use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// A required binary is neither in the configured directory nor on `PATH`.
    #[error("{0} binary not found")]
    BinaryNotFound(&'static str),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The broker process could not be supervised.
    #[error(transparent)]
    Process(#[from] warren_process::Error),
}
