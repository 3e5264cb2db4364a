use std::time::Duration;

use thiserror::Error;

use crate::admin::AdminError;

/// Result type for bootstrap operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while bootstrapping a node.
#[derive(Debug, Error)]
pub enum Error {
    /// The application layer could not be (re)started.
    #[error("application layer could not be started: {0}")]
    AppLayerDown(#[source] AdminError),

    /// Invalid or missing configuration. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The peer never accepted a connection.
    #[error("peer {peer} unreachable after {attempts} probes over {waited:?}")]
    PeerUnreachable {
        /// Address that was probed.
        peer: String,
        /// Number of probes made.
        attempts: u32,
        /// Time spent probing.
        waited: Duration,
    },

    /// A bootstrap record could not be encoded or decoded.
    #[error("invalid bootstrap record: {0}")]
    Record(#[from] serde_json::Error),

    /// The local cluster secret differs from the known-good one. Fatal.
    #[error("cluster secret mismatch: expected fingerprint {expected}, found {actual}")]
    SecretMismatch {
        /// Known-good fingerprint.
        expected: String,
        /// Fingerprint of the local secret.
        actual: String,
    },
}
