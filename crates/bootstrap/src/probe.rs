//! Peer reachability probing.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::policy::{PollPolicy, Polled};

/// Default port probed on the peer (the Erlang port mapper).
pub const DEFAULT_PROBE_PORT: u16 = 4369;

/// A lightweight liveness probe against a peer.
#[async_trait]
pub trait Reachability
where
    Self: Send + Sync,
{
    /// Makes one probe. Connection refusal is an ordinary `Err`.
    async fn probe(&self, peer: &str) -> io::Result<()>;
}

#[async_trait]
impl<T> Reachability for Arc<T>
where
    T: Reachability + ?Sized,
{
    async fn probe(&self, peer: &str) -> io::Result<()> {
        (**self).probe(peer).await
    }
}

/// The host part of a join target.
///
/// Targets may name the broker node (`rabbit@host`) rather than the host;
/// only the part after the last `@` is resolvable.
#[must_use]
pub fn probe_host(target: &str) -> &str {
    target.rsplit_once('@').map_or(target, |(_, host)| host)
}

/// Probes by opening (and immediately closing) a TCP connection.
#[derive(Clone, Copy, Debug)]
pub struct TcpReachability {
    port: u16,
}

impl TcpReachability {
    /// Probes `port` on the peer.
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for TcpReachability {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_PORT)
    }
}

#[async_trait]
impl Reachability for TcpReachability {
    async fn probe(&self, peer: &str) -> io::Result<()> {
        // Dropped at the end of scope, closing the connection.
        let _stream = TcpStream::connect((probe_host(peer), self.port)).await?;
        Ok(())
    }
}

/// Waits until `peer` answers a probe.
///
/// Returns the number of probes made.
///
/// # Errors
///
/// Returns [`Error::PeerUnreachable`] if no probe succeeds within the
/// policy's timeout. Individual probe failures are not errors.
pub async fn wait_reachable<R>(reachability: &R, peer: &str, policy: PollPolicy) -> Result<u32>
where
    R: Reachability + ?Sized,
{
    debug!("waiting up to {:?} for {} to become reachable", policy.timeout, peer);

    let polled = policy
        .poll(
            || reachability.probe(peer),
            |attempt, e| debug!("{} not reachable yet (probe {}): {}", peer, attempt, e),
        )
        .await;

    match polled {
        Polled::Ready { attempts, .. } => {
            info!("{} reachable after {} probes", peer, attempts);
            Ok(attempts)
        }
        Polled::TimedOut { attempts, waited } => {
            warn!("{} unreachable after {} probes over {:?}", peer, attempts, waited);
            Err(Error::PeerUnreachable {
                peer: peer.to_string(),
                attempts,
                waited,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let attempts = wait_reachable(
            &TcpReachability::new(port),
            "127.0.0.1",
            PollPolicy::new(Duration::from_secs(5), Duration::from_millis(50)),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_tcp_probe_accepts_node_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let attempts = wait_reachable(
            &TcpReachability::new(port),
            "rabbit@127.0.0.1",
            PollPolicy::new(Duration::from_millis(500), Duration::from_millis(50)),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_probe_host() {
        assert_eq!(probe_host("rabbit-1"), "rabbit-1");
        assert_eq!(probe_host("rabbit@rabbit-1"), "rabbit-1");
        assert_eq!(probe_host("hare@10.0.0.7"), "10.0.0.7");
    }

    #[tokio::test]
    async fn test_tcp_probe_refused_times_out() {
        // Bind then drop to find a port nothing is listening on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = wait_reachable(
            &TcpReachability::new(port),
            "127.0.0.1",
            PollPolicy::new(Duration::from_millis(300), Duration::from_millis(50)),
        )
        .await;

        match result {
            Err(Error::PeerUnreachable { peer, attempts, .. }) => {
                assert_eq!(peer, "127.0.0.1");
                assert!(attempts > 1);
            }
            other => panic!("expected PeerUnreachable, got {other:?}"),
        }
    }
}
