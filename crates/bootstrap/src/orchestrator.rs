use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::admin::{AdminError, AdminInterface};
use crate::error::{Error, Result};
use crate::identity::{Environment, IdentityResolver, NodeIdentity};
use crate::membership::MembershipClient;
use crate::policy::{PollPolicy, RetryPolicy};
use crate::probe::{Reachability, probe_host, wait_reachable};
use crate::record::BootstrapRecord;
use crate::secret::ClusterSecret;
use crate::state::{AttemptOutcome, BootstrapReport, BootstrapState, JoinAttempt, JoinFailure};

/// Options for creating a new [`Orchestrator`].
pub struct OrchestratorOptions<A, R>
where
    A: AdminInterface,
    R: Reachability,
{
    /// The local broker's admin interface.
    pub admin: A,

    /// Retry policy for admin commands (membership listing and app restart).
    pub admin_retry: RetryPolicy,

    /// Known-good secret fingerprint. Takes precedence over the record.
    pub expected_secret_fingerprint: Option<String>,

    /// How long to wait for the join target to answer probes.
    pub peer_poll: PollPolicy,

    /// Probe used to wait for the join target.
    pub reachability: R,

    /// Where the seed writes its bootstrap record and joiners read it.
    pub record_path: Option<PathBuf>,

    /// The local cluster secret, if one was loaded.
    pub secret: Option<ClusterSecret>,
}

/// Drives a node from startup to `Running`, joining its target if needed.
pub struct Orchestrator<A, R>
where
    A: AdminInterface,
    R: Reachability,
{
    admin: A,
    admin_retry: RetryPolicy,
    expected_secret_fingerprint: Option<String>,
    peer_poll: PollPolicy,
    reachability: R,
    record_path: Option<PathBuf>,
    secret: Option<ClusterSecret>,
}

impl<A, R> Orchestrator<A, R>
where
    A: AdminInterface,
    R: Reachability,
{
    /// Creates a new orchestrator.
    pub fn new(
        OrchestratorOptions {
            admin,
            admin_retry,
            expected_secret_fingerprint,
            peer_poll,
            reachability,
            record_path,
            secret,
        }: OrchestratorOptions<A, R>,
    ) -> Self {
        Self {
            admin,
            admin_retry,
            expected_secret_fingerprint,
            peer_poll,
            reachability,
            record_path,
            secret,
        }
    }

    /// Resolves the node's identity from `env` and runs the bootstrap.
    ///
    /// # Errors
    ///
    /// See [`Self::run`]. Also fails if the identity cannot be resolved.
    pub async fn bootstrap(
        &self,
        resolver: &IdentityResolver,
        env: &(impl Environment + Sync),
    ) -> Result<BootstrapReport> {
        let identity = resolver.resolve(env)?;

        self.run(identity).await
    }

    /// Runs the bootstrap once.
    ///
    /// Clustering failures are not errors: they are recorded in the report
    /// and the node ends in [`BootstrapState::Running`] standalone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AppLayerDown`] if the application layer was stopped
    /// for a join and could not be started again.
    pub async fn run(&self, identity: NodeIdentity) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::new(identity.clone());
        report.enter(BootstrapState::RoleDetermined(identity.role()));

        if let Some(target) = identity.join_target() {
            self.join(target, &mut report).await?;
            report.enter(BootstrapState::Running);
        } else {
            report.enter(BootstrapState::SeedReady);
            report.enter(BootstrapState::Running);
            self.write_record(&identity).await;
        }

        Ok(report)
    }

    async fn join(&self, target: &str, report: &mut BootstrapReport) -> Result<()> {
        report.enter(BootstrapState::AwaitingPeer);

        let host = probe_host(target);
        if wait_reachable(&self.reachability, host, self.peer_poll)
            .await
            .is_err()
        {
            report.enter(BootstrapState::JoinFailed(JoinFailure::PeerUnreachable));
            return Ok(());
        }

        report.enter(BootstrapState::PeerReachable);

        let peer = self.admin.peer_identity(target);
        let (membership, _) = MembershipClient::new(&self.admin)
            .check_with_retry(&peer, &self.admin_retry)
            .await;

        let Ok(membership) = membership else {
            report.enter(BootstrapState::JoinFailed(JoinFailure::AdminUnavailable));
            return Ok(());
        };

        let is_member = membership.is_member();
        report.enter(BootstrapState::MembershipChecked { is_member });

        if is_member {
            report.enter(BootstrapState::AlreadyJoined);
            return Ok(());
        }

        let mut attempt = JoinAttempt::new(&peer);
        report.enter(BootstrapState::Joining);

        let failure = if let Err(e) = self.verify_secret(host).await {
            warn!("refusing to join {}: {}", peer, e);
            Some(JoinFailure::SecretMismatch)
        } else {
            let failure = self.stop_and_join(&peer, &mut attempt).await;
            attempt.attempts += self.ensure_app_running().await?;
            failure
        };

        if let Some(reason) = failure {
            attempt.fail(reason);
            report.attempt = Some(attempt);
            report.enter(BootstrapState::JoinFailed(reason));
        } else {
            attempt.outcome = AttemptOutcome::Succeeded;
            report.attempt = Some(attempt);
            report.enter(BootstrapState::Joined);
        }

        Ok(())
    }

    /// Stops the app layer and joins `peer`. The caller restarts the app
    /// layer whatever happens here.
    async fn stop_and_join(&self, peer: &str, attempt: &mut JoinAttempt) -> Option<JoinFailure> {
        attempt.attempts += 1;
        if let Err(e) = self.admin.stop_app().await {
            warn!("failed to stop application layer: {}", e);
            return Some(JoinFailure::AdminUnavailable);
        }

        attempt.attempts += 1;
        match self.admin.join_cluster(peer).await {
            Ok(()) => {
                info!("joined cluster of {}", peer);
                None
            }
            Err(AdminError::SecretMismatch(reason)) => {
                warn!("{} rejected our cluster secret: {}", peer, reason);
                Some(JoinFailure::SecretMismatch)
            }
            Err(e) => {
                warn!("failed to join {}: {}", peer, e);
                Some(JoinFailure::JoinRejected)
            }
        }
    }

    async fn ensure_app_running(&self) -> Result<u32> {
        let (result, attempts) = self
            .admin_retry
            .retry(|| self.admin.start_app(), |_| true)
            .await;

        result.map(|()| attempts).map_err(Error::AppLayerDown)
    }

    /// Checks the local secret against the one known for `host`.
    async fn verify_secret(&self, host: &str) -> Result<()> {
        let Some(secret) = &self.secret else {
            warn!("no cluster secret loaded; joining without verification");
            return Ok(());
        };

        match self.known_fingerprint(host).await {
            Some(expected) => secret.verify(&expected),
            None => {
                warn!(
                    "no known-good secret fingerprint for {}; joining without verification",
                    host
                );
                Ok(())
            }
        }
    }

    async fn known_fingerprint(&self, host: &str) -> Option<String> {
        if let Some(expected) = &self.expected_secret_fingerprint {
            return Some(expected.clone());
        }

        let path = self.record_path.as_ref()?;
        match BootstrapRecord::read(path).await {
            Ok(Some(record)) if record.identity == host => record.secret_fingerprint,
            Ok(Some(record)) => {
                debug!(
                    "bootstrap record at {} belongs to {}, not {}",
                    path.display(),
                    record.identity,
                    host
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("ignoring unreadable bootstrap record: {}", e);
                None
            }
        }
    }

    async fn write_record(&self, identity: &NodeIdentity) {
        let Some(path) = &self.record_path else {
            return;
        };

        let record = BootstrapRecord::new(
            identity.name(),
            identity.role(),
            self.secret
                .as_ref()
                .map(|secret| secret.fingerprint().to_string()),
        );

        if let Err(e) = record.write(path).await {
            warn!("failed to write bootstrap record: {}", e);
        }
    }
}
