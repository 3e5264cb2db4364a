//! Cluster bootstrap for message-broker nodes.
//!
//! At startup every node decides whether it seeds the cluster or joins an
//! existing one. A joiner waits for its target to become reachable, checks
//! live membership, and only issues the stop/join/start sequence when it is
//! not already clustered. Every path ends with the node running: clustering
//! failures degrade to running standalone.
//!
//! [`HealthConvergence`] separately waits for a set of nodes to report
//! healthy, probing them concurrently.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod admin;
mod error;
mod health;
mod identity;
mod membership;
mod orchestrator;
mod policy;
mod probe;
mod record;
mod secret;
mod state;

pub use admin::{AdminError, AdminInterface};
pub use error::{Error, Result};
pub use health::{
    HealthCheck, HealthConvergence, HealthReport, HealthStatus, PartialTimeoutError, Unreachable,
    wait_all,
};
pub use identity::{
    DEFAULT_JOIN_TARGET_VAR, Environment, IdentityResolver, NodeIdentity, NodeRole,
    SystemEnvironment,
};
pub use membership::{ClusterMembership, MembershipClient};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use policy::{PollPolicy, Polled, RetryPolicy};
pub use probe::{DEFAULT_PROBE_PORT, Reachability, TcpReachability, probe_host, wait_reachable};
pub use record::BootstrapRecord;
pub use secret::{ClusterSecret, SECRET_FILE_MODE, fingerprint, normalize_permissions};
pub use state::{AttemptOutcome, BootstrapReport, BootstrapState, JoinAttempt, JoinFailure};
