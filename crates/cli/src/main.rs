//! Bootstraps RabbitMQ cluster nodes and the proxy in front of them.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;

use error::{Error, Result};

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use warren_bootable::Bootable;
use warren_bootstrap::{
    ClusterSecret, DEFAULT_PROBE_PORT, HealthConvergence, IdentityResolver, Orchestrator,
    OrchestratorOptions, PollPolicy, RetryPolicy, SystemEnvironment, TcpReachability,
    normalize_permissions,
};
use warren_nginx::{
    Backend, Certbot, CertbotOptions, CertificatePaths, DEFAULT_CONFIG_PATH, LETSENCRYPT_LIVE_DIR,
    NginxProxy, NginxProxyOptions, StreamConfig,
};
use warren_rabbitmq::{RabbitMqCtl, RabbitMqCtlOptions, RabbitMqServer, RabbitMqServerOptions};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Maximum log level
    #[arg(long, default_value_t = Level::INFO, env = "WARREN_LOG_LEVEL", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the local broker, join the configured peer and stay in the foreground
    Node(NodeArgs),

    /// Wait for a set of broker nodes to answer pings
    WaitHealthy(WaitHealthyArgs),

    /// Write the proxy config for the given backends and reload nginx
    Proxy(ProxyArgs),

    /// Obtain a certificate for the proxy domain
    Certificate(CertificateArgs),
}

#[derive(Debug, ClapArgs)]
struct NodeArgs {
    /// Seconds between admin command retries
    #[arg(long, default_value_t = 2, env = "WARREN_ADMIN_BACKOFF")]
    admin_backoff: u64,

    /// Attempts for each admin command before giving up
    #[arg(long, default_value_t = 5, env = "WARREN_ADMIN_RETRIES")]
    admin_retries: u32,

    /// Directory holding the RabbitMQ scripts (looked up on PATH if unset)
    #[arg(long, env = "WARREN_RABBITMQ_BIN_DIR")]
    bin_dir: Option<PathBuf>,

    /// Known-good fingerprint of the cluster secret
    #[arg(long, env = "WARREN_SECRET_FINGERPRINT")]
    expected_secret_fingerprint: Option<String>,

    /// Seconds between reachability probes of the join target
    #[arg(long, default_value_t = 1, env = "WARREN_PEER_INTERVAL")]
    peer_interval: u64,

    /// Seconds to wait for the join target to become reachable
    #[arg(long, default_value_t = 30, env = "WARREN_PEER_TIMEOUT")]
    peer_timeout: u64,

    /// Port probed on the join target
    #[arg(long, default_value_t = DEFAULT_PROBE_PORT, env = "WARREN_PROBE_PORT")]
    probe_port: u16,

    /// Pings (two seconds apart) before the local broker counts as failed to start
    #[arg(long, default_value_t = 60, env = "WARREN_READINESS_CHECKS")]
    readiness_checks: u32,

    /// Bootstrap record shared between the seed and joiners
    #[arg(long, env = "WARREN_RECORD_PATH")]
    record_path: Option<PathBuf>,

    /// The Erlang cookie shared by all nodes
    #[arg(long, default_value = "/var/lib/rabbitmq/.erlang.cookie", env = "WARREN_SECRET_PATH")]
    secret_path: PathBuf,
}

#[derive(Debug, ClapArgs)]
struct WaitHealthyArgs {
    /// Directory holding the RabbitMQ scripts (looked up on PATH if unset)
    #[arg(long, env = "WARREN_RABBITMQ_BIN_DIR")]
    bin_dir: Option<PathBuf>,

    /// Overall deadline in seconds. Outstanding pings are cancelled when it passes.
    #[arg(long)]
    deadline: Option<u64>,

    /// Seconds between pings of an unhealthy node
    #[arg(long, default_value_t = 2)]
    interval: u64,

    /// Node to wait for (repeatable)
    #[arg(long = "node", required = true)]
    nodes: Vec<String>,

    /// Seconds each node has to become healthy
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[derive(Debug, ClapArgs)]
struct ProxyArgs {
    /// Broker node to forward to, as host:port (repeatable)
    #[arg(long = "backend", required = true, value_parser = parse_backend)]
    backends: Vec<Backend>,

    /// Directory holding nginx (looked up on PATH if unset)
    #[arg(long, env = "WARREN_NGINX_BIN_DIR")]
    bin_dir: Option<PathBuf>,

    /// Where the generated stream config is written
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "WARREN_PROXY_CONFIG")]
    config_path: PathBuf,

    /// Public domain of the cluster
    #[arg(long, env = "WARREN_DOMAIN")]
    domain: String,

    /// Port the proxy listens on
    #[arg(long, default_value_t = 5671)]
    listen_port: u16,

    /// Terminate TLS with the certbot certificate of the domain
    #[arg(long)]
    tls: bool,
}

#[derive(Debug, ClapArgs)]
struct CertificateArgs {
    /// Directory holding certbot (looked up on PATH if unset)
    #[arg(long, env = "WARREN_CERTBOT_BIN_DIR")]
    bin_dir: Option<PathBuf>,

    /// Domain to obtain a certificate for
    #[arg(long, env = "WARREN_DOMAIN")]
    domain: String,

    /// Contact email for the ACME account
    #[arg(long, env = "WARREN_EMAIL")]
    email: String,

    /// Seconds certbot may run
    #[arg(long, default_value_t = 300)]
    time_limit: u64,
}

#[tokio::main(worker_threads = 4)]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = install_tracing(args.log_level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown_token.clone()));

    let result = match args.command {
        Command::Node(args) => run_node(args, shutdown_token).await,
        Command::WaitHealthy(args) => wait_healthy(args).await,
        Command::Proxy(args) => apply_proxy(args).await,
        Command::Certificate(args) => obtain_certificate(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn install_tracing(level: Level) -> Result<()> {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(level).finish(),
    )?;

    Ok(())
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    value.parse().map_err(|e: warren_nginx::Error| e.to_string())
}

async fn forward_signals(shutdown_token: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("failed to install signal handlers: {}", e);
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    shutdown_token.cancel();
}

async fn run_node(args: NodeArgs, shutdown_token: CancellationToken) -> Result<()> {
    let identity = IdentityResolver::default().resolve(&SystemEnvironment)?;

    normalize_permissions(&args.secret_path).await;

    let server = RabbitMqServer::new(RabbitMqServerOptions {
        bin_dir: args.bin_dir,
        env: Vec::new(),
        node_name: warren_rabbitmq::node_name(identity.name()),
        readiness_checks: args.readiness_checks,
    })?;

    info!("starting {}", server.bootable_name());
    server.start().await?;

    // The broker writes a fresh cookie on first start.
    let secret = if tokio::fs::try_exists(&args.secret_path)
        .await
        .map_err(|e| Error::Io("failed to check for cluster secret", e))?
    {
        Some(ClusterSecret::load(&args.secret_path).await?)
    } else {
        warn!(
            "no cluster secret at {}; joins are not verified",
            args.secret_path.display()
        );
        None
    };

    let orchestrator = Orchestrator::new(OrchestratorOptions {
        admin: server.ctl(),
        admin_retry: RetryPolicy::new(args.admin_retries, Duration::from_secs(args.admin_backoff)),
        expected_secret_fingerprint: args.expected_secret_fingerprint,
        peer_poll: PollPolicy::new(
            Duration::from_secs(args.peer_timeout),
            Duration::from_secs(args.peer_interval),
        ),
        reachability: TcpReachability::new(args.probe_port),
        record_path: args.record_path,
        secret,
    });

    let report = match orchestrator.run(identity).await {
        Ok(report) => report,
        Err(e) => {
            server.shutdown().await?;
            return Err(e.into());
        }
    };

    if report.is_clustered() {
        info!("{} is clustered and running", report.identity.name());
    } else {
        info!("{} is running standalone", report.identity.name());
    }

    tokio::select! {
        () = shutdown_token.cancelled() => {
            info!("shutting down {}", server.bootable_name());
            server.shutdown().await?;
        }
        status = server.wait() => {
            error!("{} exited with {:?}", server.bootable_name(), status);
            return Err(Error::BrokerExited);
        }
    }

    Ok(())
}

async fn wait_healthy(args: WaitHealthyArgs) -> Result<()> {
    let ctl = RabbitMqCtl::new(RabbitMqCtlOptions {
        bin_dir: args.bin_dir,
        ..RabbitMqCtlOptions::default()
    })?;

    let convergence = HealthConvergence::new(
        ctl,
        PollPolicy::new(
            Duration::from_secs(args.timeout),
            Duration::from_secs(args.interval),
        ),
    );
    let deadline = args
        .deadline
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    let report = convergence.wait_all(&args.nodes, deadline).await?;

    info!(
        "{} nodes healthy after {:?}",
        report.statuses.len(),
        report.elapsed
    );

    Ok(())
}

async fn apply_proxy(args: ProxyArgs) -> Result<()> {
    let certificates = if args.tls {
        let certificates = CertificatePaths::letsencrypt(&args.domain);
        certificates.verify().await?;
        Some(certificates)
    } else {
        None
    };

    let proxy = NginxProxy::new(NginxProxyOptions {
        bin_dir: args.bin_dir,
        config_path: args.config_path,
    })?;

    proxy
        .apply(&StreamConfig {
            backends: args.backends,
            certificates,
            domain: args.domain,
            listen_port: args.listen_port,
        })
        .await?;

    Ok(())
}

async fn obtain_certificate(args: CertificateArgs) -> Result<()> {
    if args.time_limit == 0 {
        return Err(Error::InvalidArgument(
            "certbot time limit must be positive".to_string(),
        ));
    }

    let certbot = Certbot::new(CertbotOptions {
        bin_dir: args.bin_dir,
        domain: args.domain,
        email: args.email,
        live_dir: PathBuf::from(LETSENCRYPT_LIVE_DIR),
        time_limit: Duration::from_secs(args.time_limit),
    })?;

    let paths = certbot.obtain().await?;
    println!("{}", paths.certificate.display());
    println!("{}", paths.private_key.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_wait_healthy_args() {
        let args = Args::try_parse_from([
            "warren",
            "wait-healthy",
            "--node",
            "rabbit-1",
            "--node",
            "rabbit-2",
            "--deadline",
            "20",
        ])
        .unwrap();

        let Command::WaitHealthy(args) = args.command else {
            panic!("expected wait-healthy");
        };
        assert_eq!(args.nodes, vec!["rabbit-1".to_string(), "rabbit-2".to_string()]);
        assert_eq!(args.deadline, Some(20));
        assert_eq!(args.timeout, 60);
    }

    #[test]
    fn test_second_subscriber_is_rejected() {
        let _ = install_tracing(Level::INFO);

        assert!(matches!(
            install_tracing(Level::DEBUG),
            Err(Error::SetTracing(_))
        ));
    }

    #[test]
    fn test_wait_healthy_requires_nodes() {
        assert!(Args::try_parse_from(["warren", "wait-healthy"]).is_err());
    }

    #[test]
    fn test_proxy_parses_backends() {
        let args = Args::try_parse_from([
            "warren",
            "proxy",
            "--domain",
            "mq.example.com",
            "--backend",
            "rabbit-1:5672",
            "--backend",
            "rabbit-2:5672",
        ])
        .unwrap();

        let Command::Proxy(args) = args.command else {
            panic!("expected proxy");
        };
        assert_eq!(
            args.backends
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["rabbit-1:5672".to_string(), "rabbit-2:5672".to_string()]
        );
        assert_eq!(args.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!args.tls);
    }

    #[test]
    fn test_proxy_rejects_bad_backend() {
        assert!(
            Args::try_parse_from([
                "warren",
                "proxy",
                "--domain",
                "mq.example.com",
                "--backend",
                "rabbit-1",
            ])
            .is_err()
        );
    }
}
