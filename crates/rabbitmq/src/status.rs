//! Interpreting `rabbitmqctl` output.

use std::collections::BTreeSet;

use serde::Deserialize;
use warren_bootstrap::AdminError;

/// Exit code `rabbitmqctl` uses when the node cannot be reached (`EX_UNAVAILABLE`).
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Exit code `rabbitmqctl` uses for temporary failures (`EX_TEMPFAIL`).
pub const EXIT_TEMPFAIL: i32 = 75;

// Node-down diagnostics always mention the cookie among the likely causes,
// so only the handshake failures themselves count.
const SECRET_PATTERNS: &[&str] = &["authentication failed", "invalid challenge reply"];

const NODE_DOWN_PATTERNS: &[&str] = &[
    "nodedown",
    "unable to connect to node",
    "unable to perform an operation on node",
    "node is not running",
    "timed out",
];

/// The parts of `rabbitmqctl cluster_status --formatter json` we use.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ClusterStatus {
    /// Disc members of the cluster.
    #[serde(default)]
    pub disk_nodes: Vec<String>,

    /// RAM members of the cluster.
    #[serde(default)]
    pub ram_nodes: Vec<String>,

    /// Members that are currently running.
    #[serde(default)]
    pub running_nodes: Vec<String>,
}

impl ClusterStatus {
    /// Parses the JSON output of `cluster_status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is not the expected JSON document.
    pub fn parse(output: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(output.trim())
    }

    /// Every configured member, running or not.
    #[must_use]
    pub fn members(&self) -> BTreeSet<String> {
        self.disk_nodes
            .iter()
            .chain(&self.ram_nodes)
            .cloned()
            .collect()
    }
}

/// A `rabbitmqctl` subcommand, as far as failure handling is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtlCommand {
    /// `cluster_status`.
    ClusterStatus,
    /// `stop_app`.
    StopApp,
    /// `start_app`.
    StartApp,
    /// `join_cluster`.
    JoinCluster,
}

impl CtlCommand {
    /// The subcommand name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClusterStatus => "cluster_status",
            Self::StopApp => "stop_app",
            Self::StartApp => "start_app",
            Self::JoinCluster => "join_cluster",
        }
    }
}

/// Maps a failed `rabbitmqctl` run to an [`AdminError`].
///
/// A rejected handshake wins over everything else since it is reported with
/// exit code 69 as well. `code` is `None` if the command was killed.
#[must_use]
pub fn classify_failure(command: CtlCommand, code: Option<i32>, output: &str) -> AdminError {
    let lower = output.to_lowercase();
    let summary = summarize(command, code, output);

    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return AdminError::SecretMismatch(summary);
    }

    let unavailable = matches!(code, None | Some(EXIT_UNAVAILABLE | EXIT_TEMPFAIL))
        || NODE_DOWN_PATTERNS.iter().any(|pattern| lower.contains(pattern));

    match command {
        CtlCommand::JoinCluster if !unavailable => AdminError::JoinRejected(summary),
        _ => AdminError::Unavailable(summary),
    }
}

fn summarize(command: CtlCommand, code: Option<i32>, output: &str) -> String {
    let first_line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty());

    match (first_line, code) {
        (Some(line), _) => format!("{}: {}", command.as_str(), line),
        (None, Some(code)) => format!("{} exited with code {}", command.as_str(), code),
        (None, None) => format!("{} was killed", command.as_str()),
    }
}
