//! Live cluster membership queries.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::admin::{AdminError, AdminInterface};
use crate::policy::RetryPolicy;

/// Snapshot of the local node's view of cluster membership.
///
/// Never cached: every decision is made on a fresh query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterMembership {
    /// Every member the local node lists.
    pub members: BTreeSet<String>,

    /// The peer identity the snapshot was taken for.
    pub peer: String,
}

impl ClusterMembership {
    /// Whether the peer is listed as a member.
    #[must_use]
    pub fn is_member(&self) -> bool {
        self.members.contains(&self.peer)
    }
}

/// Asks the local admin interface whether it is clustered with a peer.
#[derive(Debug)]
pub struct MembershipClient<'a, A: ?Sized> {
    admin: &'a A,
}

impl<'a, A> MembershipClient<'a, A>
where
    A: AdminInterface + ?Sized,
{
    /// Creates a client over `admin`.
    #[must_use]
    pub const fn new(admin: &'a A) -> Self {
        Self { admin }
    }

    /// Queries membership for `peer`, matching by identity string.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Unavailable`] if the interface cannot be reached.
    /// That is distinct from `Ok` with `is_member() == false`.
    pub async fn is_clustered_with(&self, peer: &str) -> Result<ClusterMembership, AdminError> {
        let members = self.admin.list_members().await?;

        debug!("local node lists members: {:?}", members);

        Ok(ClusterMembership {
            members,
            peer: peer.to_string(),
        })
    }

    /// Like [`Self::is_clustered_with`], retrying while the interface is
    /// unavailable. Returns the last result and the number of attempts.
    pub async fn check_with_retry(
        &self,
        peer: &str,
        policy: &RetryPolicy,
    ) -> (Result<ClusterMembership, AdminError>, u32) {
        let (result, attempts) = policy
            .retry(|| self.is_clustered_with(peer), AdminError::is_unavailable)
            .await;

        if let Err(e) = &result {
            warn!("membership check failed after {} attempts: {}", attempts, e);
        }

        (result, attempts)
    }
}
