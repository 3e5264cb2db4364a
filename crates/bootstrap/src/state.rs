//! Bootstrap states and the report a run produces.

use std::fmt;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::identity::{NodeIdentity, NodeRole};

/// Why a join did not happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinFailure {
    /// The join target never answered a probe.
    PeerUnreachable,

    /// The local admin interface could not be reached.
    AdminUnavailable,

    /// The peer refused the join.
    JoinRejected,

    /// The cluster secret differs from the cluster's.
    SecretMismatch,
}

impl JoinFailure {
    /// Whether the failure must never be retried.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::SecretMismatch)
    }
}

impl fmt::Display for JoinFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerUnreachable => write!(f, "peer unreachable"),
            Self::AdminUnavailable => write!(f, "admin interface unavailable"),
            Self::JoinRejected => write!(f, "join rejected"),
            Self::SecretMismatch => write!(f, "cluster secret mismatch"),
        }
    }
}

/// A step of the bootstrap state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing decided yet.
    Init,
    /// The node's role is known.
    RoleDetermined(NodeRole),
    /// A seed has nothing to join.
    SeedReady,
    /// Probing the join target.
    AwaitingPeer,
    /// The join target answered a probe.
    PeerReachable,
    /// Local membership was listed.
    MembershipChecked {
        /// Whether the join target was already a member.
        is_member: bool,
    },
    /// Already clustered with the join target; nothing to do.
    AlreadyJoined,
    /// Issuing stop, join and start commands.
    Joining,
    /// The join succeeded.
    Joined,
    /// Clustering failed; the node continues standalone.
    JoinFailed(JoinFailure),
    /// Terminal. The application layer is active.
    Running,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::RoleDetermined(role) => write!(f, "role determined ({role})"),
            Self::SeedReady => write!(f, "seed ready"),
            Self::AwaitingPeer => write!(f, "awaiting peer"),
            Self::PeerReachable => write!(f, "peer reachable"),
            Self::MembershipChecked { is_member } => {
                write!(f, "membership checked (member: {is_member})")
            }
            Self::AlreadyJoined => write!(f, "already joined"),
            Self::Joining => write!(f, "joining"),
            Self::Joined => write!(f, "joined"),
            Self::JoinFailed(reason) => write!(f, "join failed ({reason})"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Outcome of a [`JoinAttempt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Still in progress.
    Pending,
    /// Joined the peer.
    Succeeded,
    /// Failed; a later bootstrap may succeed.
    FailedRetryable,
    /// Failed in a way a retry cannot fix.
    FailedFatal,
}

/// One attempt to join a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinAttempt {
    /// Identity of the peer being joined.
    pub peer: String,

    /// When the attempt began.
    pub started_at: Instant,

    /// Current outcome.
    pub outcome: AttemptOutcome,

    /// Admin commands issued as part of the attempt, counting retries.
    pub attempts: u32,
}

impl JoinAttempt {
    pub(crate) fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            started_at: Instant::now(),
            outcome: AttemptOutcome::Pending,
            attempts: 0,
        }
    }

    pub(crate) fn fail(&mut self, reason: JoinFailure) {
        self.outcome = if reason.is_fatal() {
            AttemptOutcome::FailedFatal
        } else {
            AttemptOutcome::FailedRetryable
        };
    }
}

/// Everything a bootstrap run did.
#[derive(Clone, Debug)]
pub struct BootstrapReport {
    /// Who ran the bootstrap.
    pub identity: NodeIdentity,

    /// Every state visited, in order, starting at [`BootstrapState::Init`].
    pub transitions: Vec<BootstrapState>,

    /// The join attempt, if the node tried to join.
    pub attempt: Option<JoinAttempt>,

    /// Why clustering failed, if it did.
    pub failure: Option<JoinFailure>,
}

impl BootstrapReport {
    pub(crate) fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            transitions: vec![BootstrapState::Init],
            attempt: None,
            failure: None,
        }
    }

    pub(crate) fn enter(&mut self, state: BootstrapState) {
        match state {
            BootstrapState::JoinFailed(reason) => {
                warn!(
                    "{}: {} (continuing standalone)",
                    self.identity.name(),
                    state
                );
                self.failure = Some(reason);
            }
            _ => info!("{}: {}", self.identity.name(), state),
        }

        self.transitions.push(state);
    }

    /// The last state entered.
    #[must_use]
    pub fn final_state(&self) -> BootstrapState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(BootstrapState::Init)
    }

    /// Whether the node ended up clustered with its join target.
    #[must_use]
    pub fn is_clustered(&self) -> bool {
        self.visited(BootstrapState::Joined) || self.visited(BootstrapState::AlreadyJoined)
    }

    /// Whether `state` was entered at any point.
    #[must_use]
    pub fn visited(&self, state: BootstrapState) -> bool {
        self.transitions.contains(&state)
    }
}
