use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use warren_bootstrap::{AdminError, AdminInterface, HealthCheck, Unreachable};
use warren_process::{CommandOutput, ManagedApplication, run_to_completion};

use crate::error::Error;
use crate::status::{ClusterStatus, CtlCommand, classify_failure};

/// Default time limit for a single `rabbitmqctl` invocation.
pub const DEFAULT_COMMAND_TIME_LIMIT: Duration = Duration::from_secs(60);

/// A single invocation of one of the RabbitMQ CLI tools.
struct CliInvocation {
    args: Vec<String>,
    executable: String,
    name: &'static str,
}

#[async_trait]
impl ManagedApplication for CliInvocation {
    fn args(&self) -> Vec<String> {
        self.args.clone()
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    // Output is captured and interpreted by the caller.
    fn handle_stdout(&self, line: &str) {
        debug!(target: "rabbitmqctl", "{}", line);
    }

    fn handle_stderr(&self, line: &str) {
        debug!(target: "rabbitmqctl", "{}", line);
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Options for configuring [`RabbitMqCtl`].
#[derive(Clone, Debug)]
pub struct RabbitMqCtlOptions {
    /// Directory holding `rabbitmqctl` and `rabbitmq-diagnostics`. Looked up
    /// on `PATH` if `None`.
    pub bin_dir: Option<PathBuf>,

    /// Node to administer. The CLI default (`rabbit@<hostname>`) if `None`.
    pub node: Option<String>,

    /// Time limit for each invocation.
    pub time_limit: Duration,
}

impl Default for RabbitMqCtlOptions {
    fn default() -> Self {
        Self {
            bin_dir: None,
            node: None,
            time_limit: DEFAULT_COMMAND_TIME_LIMIT,
        }
    }
}

/// The local broker's admin interface, driven through `rabbitmqctl`.
#[derive(Clone, Debug)]
pub struct RabbitMqCtl {
    ctl_path: PathBuf,
    diagnostics_path: PathBuf,
    node: Option<String>,
    time_limit: Duration,
}

impl RabbitMqCtl {
    /// Creates a new instance of `RabbitMqCtl`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if either CLI tool cannot be located.
    pub fn new(
        RabbitMqCtlOptions {
            bin_dir,
            node,
            time_limit,
        }: RabbitMqCtlOptions,
    ) -> Result<Self, Error> {
        Ok(Self {
            ctl_path: locate(bin_dir.as_deref(), "rabbitmqctl")?,
            diagnostics_path: locate(bin_dir.as_deref(), "rabbitmq-diagnostics")?,
            node,
            time_limit,
        })
    }

    /// The node this instance administers, if set explicitly.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    async fn ctl(&self, command: CtlCommand, extra: &[&str]) -> Result<CommandOutput, AdminError> {
        let mut args = Vec::new();
        if let Some(node) = &self.node {
            args.extend(["-n".to_string(), node.clone()]);
        }
        args.push(command.as_str().to_string());
        args.extend(extra.iter().map(ToString::to_string));

        let invocation = CliInvocation {
            args,
            executable: self.ctl_path.to_string_lossy().to_string(),
            name: "rabbitmqctl",
        };

        let output = run_to_completion(&invocation, self.time_limit)
            .await
            .map_err(|e| AdminError::Unavailable(e.to_string()))?;

        if output.success() {
            Ok(output)
        } else {
            Err(classify_failure(command, output.code(), &output.combined()))
        }
    }
}

#[async_trait]
impl AdminInterface for RabbitMqCtl {
    fn peer_identity(&self, host: &str) -> String {
        node_name(host)
    }

    async fn list_members(&self) -> Result<BTreeSet<String>, AdminError> {
        let output = self
            .ctl(CtlCommand::ClusterStatus, &["--formatter", "json"])
            .await?;

        ClusterStatus::parse(&output.stdout)
            .map(|status| status.members())
            .map_err(|e| AdminError::Unavailable(format!("unexpected cluster_status output: {e}")))
    }

    async fn stop_app(&self) -> Result<(), AdminError> {
        self.ctl(CtlCommand::StopApp, &[]).await.map(|_| ())
    }

    async fn start_app(&self) -> Result<(), AdminError> {
        self.ctl(CtlCommand::StartApp, &[]).await.map(|_| ())
    }

    async fn join_cluster(&self, peer: &str) -> Result<(), AdminError> {
        self.ctl(CtlCommand::JoinCluster, &[peer]).await.map(|_| ())
    }
}

#[async_trait]
impl HealthCheck for RabbitMqCtl {
    async fn ping(&self, node: &str) -> Result<(), Unreachable> {
        let invocation = CliInvocation {
            args: vec![
                "-q".to_string(),
                "-n".to_string(),
                node_name(node),
                "ping".to_string(),
            ],
            executable: self.diagnostics_path.to_string_lossy().to_string(),
            name: "rabbitmq-diagnostics",
        };

        let unreachable = |reason: String| Unreachable {
            node: node.to_string(),
            reason,
        };

        let output = run_to_completion(&invocation, self.time_limit)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if output.success() {
            Ok(())
        } else {
            let reason = output
                .combined()
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map_or_else(
                    || format!("ping exited with {}", output.status),
                    ToString::to_string,
                );

            Err(unreachable(reason))
        }
    }
}

/// Qualifies a bare host as a RabbitMQ node name (`rabbit@host`).
#[must_use]
pub fn node_name(host: &str) -> String {
    if host.contains('@') {
        host.to_string()
    } else {
        format!("rabbit@{host}")
    }
}

pub(crate) fn locate(bin_dir: Option<&Path>, binary: &'static str) -> Result<PathBuf, Error> {
    match bin_dir {
        Some(dir) => {
            let path = dir.join(binary);
            if path.exists() {
                Ok(path)
            } else {
                Err(Error::BinaryNotFound(binary))
            }
        }
        None => which::which(binary).map_err(|_| Error::BinaryNotFound(binary)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name() {
        assert_eq!(node_name("rabbit-1"), "rabbit@rabbit-1");
        assert_eq!(node_name("hare@rabbit-1"), "hare@rabbit-1");
    }

    #[test]
    fn test_missing_bin_dir_binary() {
        let dir = tempfile::TempDir::new().unwrap();

        let result = RabbitMqCtl::new(RabbitMqCtlOptions {
            bin_dir: Some(dir.path().to_path_buf()),
            ..RabbitMqCtlOptions::default()
        });

        assert!(matches!(result, Err(Error::BinaryNotFound("rabbitmqctl"))));
    }
}
