//! Spawning and supervision of long-running processes.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::ManagedApplication;
use crate::error::{Error, Result};

/// A running, supervised process.
///
/// The process is owned by a background task which records its exit status.
/// Dropping the handle does not stop the process; call
/// [`ManagedProcess::shutdown`] for an orderly stop.
pub struct ManagedProcess {
    /// Exit status, set once the process has exited
    exit_status: watch::Receiver<Option<ExitStatus>>,

    /// Application name, for logs
    name: String,

    /// Process ID
    pid: u32,

    /// Shutdown token to request termination
    shutdown_token: CancellationToken,

    /// Tracks the stdout/stderr forwarding tasks
    task_tracker: TaskTracker,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("exit_status", &*self.exit_status.borrow())
            .finish_non_exhaustive()
    }
}

impl ManagedProcess {
    /// Returns the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the exit status if the process has already exited.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_status.borrow()
    }

    /// Returns whether the process is still alive.
    #[must_use]
    pub fn running(&self) -> bool {
        self.exit_status.borrow().is_none()
    }

    /// Waits for the process to exit.
    ///
    /// Returns `None` if the supervising task went away without observing an
    /// exit status.
    pub async fn wait(&self) -> Option<ExitStatus> {
        let mut exit_status = self.exit_status.clone();

        let observed = exit_status
            .wait_for(Option::is_some)
            .await
            .map(|status| *status);

        observed.unwrap_or_else(|_| *exit_status.borrow())
    }

    /// Sends a signal to the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal could not be delivered.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid::from_raw(self.pid as i32);

        signal::kill(pid, signal).map_err(|e| Error::Signal(self.pid, e))
    }

    /// Stops the process and waits for it and its output forwarders to finish.
    pub async fn shutdown(&self) -> Option<ExitStatus> {
        info!("shutting down {}", self.name);

        self.shutdown_token.cancel();
        let status = self.wait().await;
        self.task_tracker.wait().await;

        info!("{} shut down", self.name);

        status
    }
}

/// Spawns the application and waits until its readiness check passes.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned, exits before it is
/// ready, or exhausts its readiness checks. In the last case the process is
/// shut down before returning.
pub async fn spawn<A: ManagedApplication>(application: A) -> Result<ManagedProcess> {
    let application: Arc<dyn ManagedApplication> = Arc::new(application);
    let name = application.name().to_string();

    let mut cmd = Command::new(application.executable());
    cmd.args(application.args());

    if let Some(working_dir) = application.working_dir() {
        cmd.current_dir(working_dir);
    }

    for (key, value) in application.env() {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    debug!("spawning {}: {:?}", name, cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Io("failed to spawn process", e))?;

    let pid = child.id().ok_or_else(|| Error::NoPid(name.clone()))?;

    debug!("{} spawned with PID {}", name, pid);

    let task_tracker = TaskTracker::new();
    let shutdown_token = CancellationToken::new();

    if let Some(stdout) = child.stdout.take() {
        let application = Arc::clone(&application);
        task_tracker.spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                application.handle_stdout(&line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let application = Arc::clone(&application);
        task_tracker.spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                application.handle_stderr(&line);
            }
        });
    }

    task_tracker.close();

    let (exit_tx, exit_rx) = watch::channel(None);
    let shutdown_signal = application.shutdown_signal();
    let shutdown_timeout = application.shutdown_timeout();
    let cancelled = shutdown_token.clone();
    let monitor_name = name.clone();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            () = cancelled.cancelled() => {
                info!("shutdown requested, sending {} to {}", shutdown_signal, monitor_name);

                #[allow(clippy::cast_possible_wrap)]
                if let Err(err) = signal::kill(Pid::from_raw(pid as i32), shutdown_signal) {
                    error!("failed to signal {}: {}", monitor_name, err);
                }

                if let Ok(status) = tokio::time::timeout(shutdown_timeout, child.wait()).await {
                    status
                } else {
                    error!("timeout waiting for {} to exit, killing...", monitor_name);
                    if let Err(err) = child.kill().await {
                        error!("failed to kill {}: {}", monitor_name, err);
                    }
                    child.wait().await
                }
            }
        };

        match status {
            Ok(status) if status.success() => {
                info!("{} exited with status: {}", monitor_name, status);
                let _ = exit_tx.send(Some(status));
            }
            Ok(status) => {
                error!("{} exited with non-zero status: {}", monitor_name, status);
                let _ = exit_tx.send(Some(status));
            }
            Err(err) => {
                error!("failed to wait for {}: {}", monitor_name, err);
            }
        }
    });

    let process = ManagedProcess {
        exit_status: exit_rx,
        name,
        pid,
        shutdown_token,
        task_tracker,
    };

    wait_until_ready(application.as_ref(), &process).await?;

    Ok(process)
}

async fn wait_until_ready(
    application: &dyn ManagedApplication,
    process: &ManagedProcess,
) -> Result<()> {
    let interval = application.is_ready_check_interval();
    let mut checks = 0u32;

    loop {
        if let Some(status) = process.exit_status() {
            return Err(Error::ExitedBeforeReady(process.name.clone(), status));
        }

        if application.is_ready_check().await {
            debug!("{} is ready after {} checks", process.name, checks + 1);
            return Ok(());
        }

        checks += 1;

        if application.is_ready_check_max().is_some_and(|max| checks >= max) {
            warn!("{} not ready after {} checks", process.name, checks);
            process.shutdown().await;
            return Err(Error::NotReady(process.name.clone(), checks));
        }

        tokio::time::sleep(interval).await;
    }
}
