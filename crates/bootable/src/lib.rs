//! Abstract interface for supervised services.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::process::ExitStatus;

use async_trait::async_trait;

/// A service whose process is owned and kept alive by the caller.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// Error returned by start and shutdown.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name of the service, for logs.
    fn bootable_name(&self) -> &str;

    /// Starts the service and returns once it is ready.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Stops the service.
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Waits for the service process to exit.
    ///
    /// Returns immediately with `None` if the service is not running.
    async fn wait(&self) -> Option<ExitStatus>;
}
