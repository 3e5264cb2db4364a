//! Test doubles for the broker admin interface, reachability and health.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use warren_bootstrap::{AdminError, AdminInterface, HealthCheck, Reachability, Unreachable};

/// An admin command the orchestrator issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCall {
    ListMembers,
    StopApp,
    JoinCluster(String),
    StartApp,
}

impl AdminCall {
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::ListMembers)
    }
}

/// In-memory broker. The app layer starts out running.
pub struct MockAdmin {
    app_running: Mutex<bool>,
    calls: Mutex<Vec<AdminCall>>,
    join_error: Option<AdminError>,
    list_failures: Mutex<u32>,
    members: Mutex<BTreeSet<String>>,
    start_failures: Mutex<u32>,
    stop_fails: bool,
}

impl MockAdmin {
    pub fn new(local: &str) -> Self {
        Self {
            app_running: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
            join_error: None,
            list_failures: Mutex::new(0),
            members: Mutex::new(BTreeSet::from([format!("rabbit@{local}")])),
            start_failures: Mutex::new(0),
            stop_fails: false,
        }
    }

    pub fn with_member(self, host: &str) -> Self {
        self.members.lock().unwrap().insert(format!("rabbit@{host}"));
        self
    }

    /// `list_members` is unavailable for the first `times` calls.
    pub fn list_unavailable(self, times: u32) -> Self {
        *self.list_failures.lock().unwrap() = times;
        self
    }

    pub fn join_fails(mut self, error: AdminError) -> Self {
        self.join_error = Some(error);
        self
    }

    pub const fn stop_fails(mut self) -> Self {
        self.stop_fails = true;
        self
    }

    /// `start_app` fails for the first `times` calls.
    pub fn start_fails(self, times: u32) -> Self {
        *self.start_failures.lock().unwrap() = times;
        self
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<AdminCall> {
        self.calls()
            .into_iter()
            .filter(AdminCall::is_mutating)
            .collect()
    }

    pub fn app_running(&self) -> bool {
        *self.app_running.lock().unwrap()
    }

    pub fn members(&self) -> BTreeSet<String> {
        self.members.lock().unwrap().clone()
    }

    fn record(&self, call: AdminCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl AdminInterface for MockAdmin {
    fn peer_identity(&self, host: &str) -> String {
        if host.contains('@') {
            host.to_string()
        } else {
            format!("rabbit@{host}")
        }
    }

    async fn list_members(&self) -> Result<BTreeSet<String>, AdminError> {
        self.record(AdminCall::ListMembers);

        if Self::take_failure(&self.list_failures) {
            return Err(AdminError::Unavailable("nodedown".to_string()));
        }

        Ok(self.members())
    }

    async fn stop_app(&self) -> Result<(), AdminError> {
        self.record(AdminCall::StopApp);

        if self.stop_fails {
            return Err(AdminError::Unavailable("stop_app timed out".to_string()));
        }

        *self.app_running.lock().unwrap() = false;
        Ok(())
    }

    async fn start_app(&self) -> Result<(), AdminError> {
        self.record(AdminCall::StartApp);

        if Self::take_failure(&self.start_failures) {
            return Err(AdminError::Unavailable("start_app failed".to_string()));
        }

        *self.app_running.lock().unwrap() = true;
        Ok(())
    }

    async fn join_cluster(&self, peer: &str) -> Result<(), AdminError> {
        self.record(AdminCall::JoinCluster(peer.to_string()));

        assert!(
            !self.app_running(),
            "join_cluster issued while the app layer was running"
        );

        if let Some(error) = &self.join_error {
            return Err(error.clone());
        }

        self.members.lock().unwrap().insert(peer.to_string());
        Ok(())
    }
}

/// A peer that answers probes from the `n`th probe on, or never.
pub struct MockReachability {
    peers: Mutex<Vec<String>>,
    probes: Mutex<u32>,
    reachable_from: Option<u32>,
}

impl MockReachability {
    pub const fn reachable_after(probes: u32) -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
            reachable_from: Some(probes),
        }
    }

    pub const fn always() -> Self {
        Self::reachable_after(1)
    }

    pub const fn never() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
            reachable_from: None,
        }
    }

    pub fn probes(&self) -> u32 {
        *self.probes.lock().unwrap()
    }

    /// Every address probed, in order.
    pub fn peers(&self) -> Vec<String> {
        self.peers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reachability for MockReachability {
    async fn probe(&self, peer: &str) -> io::Result<()> {
        self.peers.lock().unwrap().push(peer.to_string());
        let mut probes = self.probes.lock().unwrap();
        *probes += 1;

        match self.reachable_from {
            Some(from) if *probes >= from => Ok(()),
            _ => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

/// Nodes that become healthy a fixed time after creation, or never.
pub struct MockHealth {
    created: Instant,
    healthy_after: BTreeMap<String, Duration>,
    pings: Mutex<BTreeMap<String, u32>>,
}

impl MockHealth {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            healthy_after: BTreeMap::new(),
            pings: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn healthy_after(mut self, node: &str, after: Duration) -> Self {
        self.healthy_after.insert(node.to_string(), after);
        self
    }

    pub fn pings(&self, node: &str) -> u32 {
        self.pings.lock().unwrap().get(node).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HealthCheck for MockHealth {
    async fn ping(&self, node: &str) -> Result<(), Unreachable> {
        *self
            .pings
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_insert(0) += 1;

        match self.healthy_after.get(node) {
            Some(after) if self.created.elapsed() >= *after => Ok(()),
            _ => Err(Unreachable {
                node: node.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

pub fn nodes(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}
