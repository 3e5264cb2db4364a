//! Waiting for several nodes to report healthy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::policy::{PollPolicy, Polled};

/// Health of a single node during a wait cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    /// Not probed yet.
    Unknown,
    /// Probing has started.
    Starting,
    /// The node answered a ping.
    Healthy,
    /// The last ping failed; still polling.
    Unhealthy,
    /// The node never answered in time.
    TimedOut,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// A failed health ping.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{node} unreachable: {reason}")]
pub struct Unreachable {
    /// Node that was pinged.
    pub node: String,

    /// What went wrong.
    pub reason: String,
}

/// A broker health command.
#[async_trait]
pub trait HealthCheck
where
    Self: Send + Sync,
{
    /// Pings `node` once.
    async fn ping(&self, node: &str) -> Result<(), Unreachable>;
}

#[async_trait]
impl<T> HealthCheck for Arc<T>
where
    T: HealthCheck + ?Sized,
{
    async fn ping(&self, node: &str) -> Result<(), Unreachable> {
        (**self).ping(node).await
    }
}

/// Every node became healthy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    /// Final status per node.
    pub statuses: BTreeMap<String, HealthStatus>,

    /// Wall time the wait took.
    pub elapsed: Duration,
}

/// Some nodes did not become healthy.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("nodes not healthy after {elapsed:?}: {}", .timed_out.join(", "))]
pub struct PartialTimeoutError {
    /// Exactly the nodes that did not become healthy.
    pub timed_out: Vec<String>,

    /// Final status per node.
    pub statuses: BTreeMap<String, HealthStatus>,

    /// Wall time the wait took.
    pub elapsed: Duration,
}

/// Polls a set of nodes concurrently until all are healthy.
pub struct HealthConvergence<C> {
    check: C,
    policy: PollPolicy,
    statuses: Mutex<BTreeMap<String, HealthStatus>>,
}

impl<C> HealthConvergence<C>
where
    C: HealthCheck,
{
    /// Creates a waiter applying `policy` to every node independently.
    pub fn new(check: C, policy: PollPolicy) -> Self {
        Self {
            check,
            policy,
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current status of every node in the running (or last) cycle.
    pub fn snapshot(&self) -> BTreeMap<String, HealthStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits for every node in `nodes` to become healthy.
    ///
    /// Nodes are polled concurrently, so the wait is bounded by the policy
    /// timeout rather than growing with the node count. Duplicate names are
    /// polled once. If `deadline` passes first, outstanding probes are
    /// cancelled and their nodes reported as timed out.
    ///
    /// # Errors
    ///
    /// Returns [`PartialTimeoutError`] naming every node that did not become
    /// healthy.
    pub async fn wait_all(
        &self,
        nodes: &[String],
        deadline: Option<Instant>,
    ) -> Result<HealthReport, PartialTimeoutError> {
        let started = Instant::now();
        let nodes: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();

        *self.statuses.lock().unwrap_or_else(PoisonError::into_inner) = nodes
            .iter()
            .map(|node| ((*node).to_string(), HealthStatus::Unknown))
            .collect();

        info!("waiting for {} nodes to become healthy", nodes.len());

        let mut probes: FuturesUnordered<_> =
            nodes.iter().map(|node| self.wait_one(*node)).collect();

        let all_settled = async {
            while let Some((node, status)) = probes.next().await {
                self.set(node, status);
            }
        };

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, all_settled).await.is_err() {
                    warn!("deadline reached; cancelling outstanding health probes");
                }
            }
            None => all_settled.await,
        }

        drop(probes);

        let statuses = {
            let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
            for status in statuses.values_mut() {
                if *status != HealthStatus::Healthy {
                    *status = HealthStatus::TimedOut;
                }
            }
            statuses.clone()
        };

        let elapsed = started.elapsed();
        let timed_out: Vec<String> = statuses
            .iter()
            .filter(|(_, status)| **status == HealthStatus::TimedOut)
            .map(|(node, _)| node.clone())
            .collect();

        if timed_out.is_empty() {
            info!("all nodes healthy after {:?}", elapsed);
            Ok(HealthReport { statuses, elapsed })
        } else {
            Err(PartialTimeoutError {
                timed_out,
                statuses,
                elapsed,
            })
        }
    }

    async fn wait_one<'a>(&self, node: &'a str) -> (&'a str, HealthStatus) {
        self.set(node, HealthStatus::Starting);

        let polled = self
            .policy
            .poll(
                || self.check.ping(node),
                |attempt, e| {
                    debug!("ping {} failed (attempt {}): {}", node, attempt, e);
                    self.set(node, HealthStatus::Unhealthy);
                },
            )
            .await;

        match polled {
            Polled::Ready { attempts, .. } => {
                info!("{} healthy after {} pings", node, attempts);
                (node, HealthStatus::Healthy)
            }
            Polled::TimedOut { attempts, waited } => {
                warn!("{} not healthy after {} pings over {:?}", node, attempts, waited);
                (node, HealthStatus::TimedOut)
            }
        }
    }

    fn set(&self, node: &str, status: HealthStatus) {
        if let Some(entry) = self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(node)
        {
            *entry = status;
        }
    }
}

/// Waits for every node in `nodes` to become healthy under `policy`.
///
/// # Errors
///
/// See [`HealthConvergence::wait_all`].
pub async fn wait_all<C>(
    check: C,
    nodes: &[String],
    policy: PollPolicy,
    deadline: Option<Instant>,
) -> Result<HealthReport, PartialTimeoutError>
where
    C: HealthCheck,
{
    HealthConvergence::new(check, policy)
        .wait_all(nodes, deadline)
        .await
}
