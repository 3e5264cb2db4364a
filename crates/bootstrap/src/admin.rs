//! The local broker's administrative interface.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by the administrative interface.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    /// The peer refused the join for a reason other than the secret.
    #[error("join rejected: {0}")]
    JoinRejected(String),

    /// The peer rejected our cluster secret.
    #[error("cluster secret rejected: {0}")]
    SecretMismatch(String),

    /// The administrative interface itself could not be reached.
    ///
    /// This says nothing about membership and must never be read as
    /// "not yet joined".
    #[error("admin interface unavailable: {0}")]
    Unavailable(String),
}

impl AdminError {
    /// Whether the error is a transient failure to reach the interface.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Commands the bootstrap needs from the local broker.
#[async_trait]
pub trait AdminInterface
where
    Self: Send + Sync,
{
    /// Maps a peer host to the identity the broker uses in membership lists.
    fn peer_identity(&self, host: &str) -> String {
        host.to_string()
    }

    /// Lists the identities of all configured cluster members, including the
    /// local node.
    async fn list_members(&self) -> Result<BTreeSet<String>, AdminError>;

    /// Stops the application layer without stopping the process.
    async fn stop_app(&self) -> Result<(), AdminError>;

    /// Starts the application layer.
    async fn start_app(&self) -> Result<(), AdminError>;

    /// Joins the cluster that `peer` belongs to.
    async fn join_cluster(&self, peer: &str) -> Result<(), AdminError>;
}

#[async_trait]
impl<T> AdminInterface for Arc<T>
where
    T: AdminInterface + ?Sized,
{
    fn peer_identity(&self, host: &str) -> String {
        (**self).peer_identity(host)
    }

    async fn list_members(&self) -> Result<BTreeSet<String>, AdminError> {
        (**self).list_members().await
    }

    async fn stop_app(&self) -> Result<(), AdminError> {
        (**self).stop_app().await
    }

    async fn start_app(&self) -> Result<(), AdminError> {
        (**self).start_app().await
    }

    async fn join_cluster(&self, peer: &str) -> Result<(), AdminError> {
        (**self).join_cluster(peer).await
    }
}
