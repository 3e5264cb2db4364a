//! Node identity and role resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::probe::probe_host;

/// Environment variable naming the peer a joiner should join.
pub const DEFAULT_JOIN_TARGET_VAR: &str = "WARREN_JOIN_TARGET";

/// Whether this node seeds the cluster or joins an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The node other nodes join to. Never issues a join command.
    Seed,

    /// A node configured with a peer to join.
    Joiner,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::Joiner => write!(f, "joiner"),
        }
    }
}

/// Who this process is within the cluster. Fixed for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    join_target: Option<String>,
    name: String,
    role: NodeRole,
}

impl NodeIdentity {
    /// Identity of a seed node.
    #[must_use]
    pub fn seed(name: impl Into<String>) -> Self {
        Self {
            join_target: None,
            name: name.into(),
            role: NodeRole::Seed,
        }
    }

    /// Identity of a node that joins `join_target`.
    #[must_use]
    pub fn joiner(name: impl Into<String>, join_target: impl Into<String>) -> Self {
        Self {
            join_target: Some(join_target.into()),
            name: name.into(),
            role: NodeRole::Joiner,
        }
    }

    /// The peer to join. Always `Some` for joiners and `None` for seeds.
    #[must_use]
    pub fn join_target(&self) -> Option<&str> {
        self.join_target.as_deref()
    }

    /// The local node name (hostname).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's role.
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }
}

/// Source of configuration values and the local hostname.
pub trait Environment {
    /// Returns the value of a configuration variable.
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the local hostname.
    fn hostname(&self) -> Option<String>;
}

/// The real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn hostname(&self) -> Option<String> {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.var("HOSTNAME"))
    }
}

/// Determines the node's identity and role from its environment.
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    join_target_var: String,
}

impl IdentityResolver {
    /// Creates a resolver reading the join target from `join_target_var`.
    #[must_use]
    pub fn new(join_target_var: impl Into<String>) -> Self {
        Self {
            join_target_var: join_target_var.into(),
        }
    }

    /// Resolves the identity.
    ///
    /// An empty or whitespace-only join target counts as absent. A join
    /// target naming this node itself makes it a seed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the hostname cannot be determined.
    pub fn resolve(&self, env: &impl Environment) -> Result<NodeIdentity> {
        let name = env
            .hostname()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Config("unable to determine local hostname".to_string()))?;

        let join_target = env
            .var(&self.join_target_var)
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty());

        let identity = match join_target {
            Some(target) if probe_host(&target) == name => {
                warn!(
                    "{} names this node ({}); starting as seed",
                    self.join_target_var, name
                );
                NodeIdentity::seed(name)
            }
            Some(target) => NodeIdentity::joiner(name, target),
            None => NodeIdentity::seed(name),
        };

        info!(
            "resolved identity {} with role {}",
            identity.name(),
            identity.role()
        );

        Ok(identity)
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_JOIN_TARGET_VAR)
    }
}
