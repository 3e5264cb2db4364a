use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};
use warren_process::{CommandOutput, ManagedApplication, run_to_completion};

use crate::config::StreamConfig;
use crate::error::Error;
use crate::locate;

/// Default location of the generated stream config.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nginx/warren-stream.conf";

const NGINX_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Application struct for one-shot nginx control commands
struct NginxCommand {
    args: Vec<String>,
    executable: String,
}

#[async_trait]
impl ManagedApplication for NginxCommand {
    fn args(&self) -> Vec<String> {
        self.args.clone()
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    // nginx -t reports success on stderr too
    fn handle_stderr(&self, line: &str) {
        debug!(target: "nginx", "{}", line);
    }

    fn handle_stdout(&self, line: &str) {
        debug!(target: "nginx", "{}", line);
    }

    fn name(&self) -> &str {
        "nginx"
    }
}

/// Options for configuring `NginxProxy`.
pub struct NginxProxyOptions {
    /// Directory holding `nginx`. Looked up on `PATH` if `None`.
    pub bin_dir: Option<PathBuf>,

    /// Where the generated stream config is written. Must be included at the
    /// top level of the main nginx config.
    pub config_path: PathBuf,
}

/// Manages the nginx stream config that load-balances the broker nodes.
pub struct NginxProxy {
    config_path: PathBuf,
    executable: PathBuf,
}

impl NginxProxy {
    /// Creates a new instance of `NginxProxy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BinaryNotFound`] if nginx cannot be located.
    pub fn new(
        NginxProxyOptions {
            bin_dir,
            config_path,
        }: NginxProxyOptions,
    ) -> Result<Self, Error> {
        Ok(Self {
            config_path,
            executable: locate(bin_dir.as_deref(), "nginx")?,
        })
    }

    /// Path of the generated config.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Writes `config`, validates it and reloads nginx.
    ///
    /// The change only counts as applied if both validation and reload
    /// succeed. Otherwise the previous file is put back (or removed if there
    /// was none) and nginx keeps running with its old config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] or [`Error::Reload`] if nginx refuses the
    /// change, and other errors if the config cannot be rendered or written.
    pub async fn apply(&self, config: &StreamConfig) -> Result<(), Error> {
        let rendered = config.render()?;

        let previous = match tokio::fs::read(&self.config_path).await {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Io("failed to read current proxy config", e)),
        };

        self.write(rendered.into_bytes()).await?;

        let validation = self.nginx(&["-t"]).await?;
        if !validation.success() {
            let reason = failure_reason(&validation);
            error!("nginx rejected the new config: {}", reason);
            self.restore(previous).await?;
            return Err(Error::Validation(reason));
        }

        let reload = self.nginx(&["-s", "reload"]).await?;
        if !reload.success() {
            let reason = failure_reason(&reload);
            error!("nginx reload failed: {}", reason);
            self.restore(previous).await?;
            return Err(Error::Reload(reason));
        }

        info!(
            "proxy config applied to {} ({} backends)",
            self.config_path.display(),
            config.backends.len()
        );

        Ok(())
    }

    async fn nginx(&self, args: &[&str]) -> Result<CommandOutput, Error> {
        let command = NginxCommand {
            args: args.iter().map(ToString::to_string).collect(),
            executable: self.executable.to_string_lossy().to_string(),
        };

        Ok(run_to_completion(&command, NGINX_TIME_LIMIT).await?)
    }

    async fn restore(&self, previous: Option<Vec<u8>>) -> Result<(), Error> {
        if let Some(contents) = previous {
            warn!("restoring previous proxy config");
            self.write(contents).await
        } else {
            warn!("removing rejected proxy config");
            tokio::fs::remove_file(&self.config_path)
                .await
                .map_err(|e| Error::Io("failed to remove rejected proxy config", e))
        }
    }

    /// Replaces the config file atomically.
    async fn write(&self, contents: Vec<u8>) -> Result<(), Error> {
        let config_path = self.config_path.clone();

        tokio::task::spawn_blocking(move || replace(&config_path, &contents))
            .await
            .map_err(|e| Error::Io("proxy config writer failed", std::io::Error::other(e)))?
    }
}

fn replace(config_path: &Path, contents: &[u8]) -> Result<(), Error> {
    let dir = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| Error::Io("failed to create temporary proxy config", e))?;
    file.write_all(contents)
        .map_err(|e| Error::Io("failed to write temporary proxy config", e))?;
    file.persist(config_path)
        .map_err(|e| Error::Io("failed to replace proxy config", e.error))?;

    Ok(())
}

fn failure_reason(output: &CommandOutput) -> String {
    let combined = output.combined();
    let lines: Vec<&str> = combined
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines
        .iter()
        .find(|line| line.contains("[emerg]") || line.contains("[error]"))
        .or_else(|| lines.last())
        .map_or_else(
            || format!("exited with {}", output.status),
            ToString::to_string,
        )
}
