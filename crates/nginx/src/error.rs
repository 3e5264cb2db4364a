use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A required binary is neither in the configured directory nor on `PATH`.
    #[error("{0} binary not found")]
    BinaryNotFound(&'static str),

    /// Certbot exited unsuccessfully.
    #[error("certbot failed: {0}")]
    CertbotFailed(String),

    /// Certbot succeeded but an expected file is missing.
    #[error("certificate file {0} not found")]
    CertificateMissing(PathBuf),

    /// The proxy configuration is invalid.
    #[error("invalid proxy configuration: {0}")]
    Config(String),

    /// A backend address is not `host:port`.
    #[error("invalid backend address {0:?}: expected host:port")]
    InvalidBackend(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A child process could not be run.
    #[error(transparent)]
    Process(#[from] warren_process::Error),

    /// `nginx -s reload` failed. The previous config was restored.
    #[error("nginx reload failed: {0}")]
    Reload(String),

    /// `nginx -t` rejected the config. The previous config was restored.
    #[error("nginx rejected the config: {0}")]
    Validation(String),
}
