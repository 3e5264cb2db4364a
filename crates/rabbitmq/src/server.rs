use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};
use warren_bootable::Bootable;
use warren_bootstrap::HealthCheck;
use warren_process::{ManagedApplication, ManagedProcess};

use crate::ctl::{RabbitMqCtl, RabbitMqCtlOptions, locate};
use crate::error::Error;

/// Regex pattern for matching RabbitMQ log lines
static LOG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+ \S+ \[(\w+)\] <[^>]+> (.*)$").expect("Invalid regex pattern")
});

/// Application struct for running the broker under supervision
struct RabbitMqApp {
    ctl: RabbitMqCtl,
    env: Vec<(String, String)>,
    executable: String,
    node_name: String,
    readiness_checks: u32,
}

#[async_trait]
impl ManagedApplication for RabbitMqApp {
    fn args(&self) -> Vec<String> {
        Vec::new()
    }

    fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![("RABBITMQ_NODENAME".to_string(), self.node_name.clone())];
        env.extend(self.env.iter().cloned());
        env
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    fn handle_stdout(&self, line: &str) {
        if let Some(caps) = LOG_REGEX.captures(line) {
            let level = caps.get(1).map_or("unknown", |m| m.as_str());
            let message = caps.get(2).map_or(line, |m| m.as_str());
            match level {
                "debug" => debug!(target: "rabbitmq", "{}", message),
                "info" | "notice" => info!(target: "rabbitmq", "{}", message),
                "warning" => warn!(target: "rabbitmq", "{}", message),
                "error" | "critical" | "alert" | "emergency" => {
                    error!(target: "rabbitmq", "{}", message);
                }
                _ => trace!(target: "rabbitmq", "{}", line),
            }
        } else if !line.trim().is_empty() {
            // Startup banner and continuation lines
            info!(target: "rabbitmq", "{}", line);
        }
    }

    fn handle_stderr(&self, line: &str) {
        self.handle_stdout(line);
    }

    async fn is_ready_check(&self) -> bool {
        match self.ctl.ping(&self.node_name).await {
            Ok(()) => true,
            Err(e) => {
                debug!("rabbitmq not ready yet: {}", e);
                false
            }
        }
    }

    fn is_ready_check_interval(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn is_ready_check_max(&self) -> Option<u32> {
        Some(self.readiness_checks)
    }

    fn name(&self) -> &str {
        "rabbitmq"
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Options for configuring a `RabbitMqServer`.
pub struct RabbitMqServerOptions {
    /// Directory holding the RabbitMQ scripts. Looked up on `PATH` if `None`.
    pub bin_dir: Option<PathBuf>,

    /// Extra environment passed to the broker.
    pub env: Vec<(String, String)>,

    /// The node name, e.g. `rabbit@rabbit-1`.
    pub node_name: String,

    /// How many readiness pings (two seconds apart) to allow during startup.
    pub readiness_checks: u32,
}

/// Runs a RabbitMQ broker as a supervised child process.
#[derive(Clone)]
pub struct RabbitMqServer {
    ctl: RabbitMqCtl,
    env: Vec<(String, String)>,
    executable: PathBuf,
    node_name: String,
    process: Arc<Mutex<Option<Arc<ManagedProcess>>>>,
    readiness_checks: u32,
}

impl RabbitMqServer {
    /// Creates a new instance of `RabbitMqServer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if the broker or its CLI tools cannot
    /// be located.
    pub fn new(
        RabbitMqServerOptions {
            bin_dir,
            env,
            node_name,
            readiness_checks,
        }: RabbitMqServerOptions,
    ) -> Result<Self, Error> {
        let executable = locate(bin_dir.as_deref(), "rabbitmq-server")?;
        let ctl = RabbitMqCtl::new(RabbitMqCtlOptions {
            bin_dir,
            node: Some(node_name.clone()),
            ..RabbitMqCtlOptions::default()
        })?;

        Ok(Self {
            ctl,
            env,
            executable,
            node_name,
            process: Arc::new(Mutex::new(None)),
            readiness_checks,
        })
    }

    /// The admin interface of this broker.
    #[must_use]
    pub fn ctl(&self) -> RabbitMqCtl {
        self.ctl.clone()
    }

    /// The broker's node name.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }
}

#[async_trait]
impl Bootable for RabbitMqServer {
    type Error = Error;

    fn bootable_name(&self) -> &str {
        "rabbitmq"
    }

    /// Starts the broker and returns once it answers pings.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker is already started, cannot be spawned,
    /// or never becomes ready.
    async fn start(&self) -> Result<(), Error> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Err(Error::AlreadyStarted);
        }

        info!("starting rabbitmq node {}...", self.node_name);

        let app = RabbitMqApp {
            ctl: self.ctl.clone(),
            env: self.env.clone(),
            executable: self.executable.to_string_lossy().to_string(),
            node_name: self.node_name.clone(),
            readiness_checks: self.readiness_checks,
        };

        process.replace(Arc::new(warren_process::spawn(app).await?));

        info!("rabbitmq node {} started", self.node_name);

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        let taken_process = self.process.lock().await.take();
        if let Some(process) = taken_process {
            let status = process.shutdown().await;
            info!("rabbitmq exited with {:?}", status);
        } else {
            debug!("no running rabbitmq node to shut down");
        }

        Ok(())
    }

    async fn wait(&self) -> Option<ExitStatus> {
        let process = self.process.lock().await.clone();

        match process {
            Some(process) => process.wait().await,
            None => None,
        }
    }
}
