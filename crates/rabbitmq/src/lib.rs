//! Runs a RabbitMQ broker and exposes its CLI tools as the bootstrap admin
//! interface and health check.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod ctl;
mod error;
mod server;
mod status;

pub use ctl::{DEFAULT_COMMAND_TIME_LIMIT, RabbitMqCtl, RabbitMqCtlOptions, node_name};
pub use error::Error;
pub use server::{RabbitMqServer, RabbitMqServerOptions};
pub use status::{
    ClusterStatus, CtlCommand, EXIT_TEMPFAIL, EXIT_UNAVAILABLE, classify_failure,
};
