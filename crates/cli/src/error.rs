use thiserror::Error;

/// Errors surfaced by the `warren` binary.
#[derive(Debug, Error)]
pub enum Error {
    /// Bootstrap or health convergence failed.
    #[error(transparent)]
    Bootstrap(#[from] warren_bootstrap::Error),

    /// The broker stopped while the node was supposed to be running.
    #[error("rabbitmq exited unexpectedly")]
    BrokerExited,

    /// Invalid command-line input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The proxy or certificate could not be set up.
    #[error(transparent)]
    Nginx(#[from] warren_nginx::Error),

    /// Some nodes never became healthy.
    #[error(transparent)]
    PartialTimeout(#[from] warren_bootstrap::PartialTimeoutError),

    /// The broker could not be run.
    #[error(transparent)]
    RabbitMq(#[from] warren_rabbitmq::Error),

    /// The tracing subscriber could not be installed.
    #[error(transparent)]
    SetTracing(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
