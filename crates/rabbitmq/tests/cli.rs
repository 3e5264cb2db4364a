use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use warren_bootable::Bootable;
use warren_bootstrap::{AdminError, AdminInterface, HealthCheck};
use warren_rabbitmq::{RabbitMqCtl, RabbitMqCtlOptions, RabbitMqServer, RabbitMqServerOptions};

fn fake_bin(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A bin dir whose `rabbitmqctl` logs its arguments and reports a two-node
/// cluster, and whose `rabbitmq-diagnostics` only answers for `rabbit@healthy`.
fn fake_tools(join_body: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let calls = dir.path().join("calls");

    fake_bin(
        dir.path(),
        "rabbitmqctl",
        &format!(
            r#"echo "$*" >> {calls}
case "$*" in
  *cluster_status*) echo '{{"disk_nodes":["rabbit@rabbit-1","rabbit@rabbit-2"],"ram_nodes":[]}}' ;;
  *join_cluster*) {join_body} ;;
esac"#,
            calls = calls.display(),
        ),
    );
    fake_bin(
        dir.path(),
        "rabbitmq-diagnostics",
        r#"case "$*" in
  *rabbit@healthy*) exit 0 ;;
  *) echo "Error: unable to connect to node $3: nodedown" >&2; exit 69 ;;
esac"#,
    );

    dir
}

fn ctl(dir: &TempDir) -> RabbitMqCtl {
    RabbitMqCtl::new(RabbitMqCtlOptions {
        bin_dir: Some(dir.path().to_path_buf()),
        node: Some("rabbit@rabbit-2".to_string()),
        time_limit: Duration::from_secs(10),
    })
    .unwrap()
}

fn calls(dir: &TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.path().join("calls"))
        .unwrap_or_default()
        .lines()
        .map(ToString::to_string)
        .collect()
}

#[tokio::test]
async fn test_list_members_from_cluster_status() {
    let dir = fake_tools("exit 0");
    let ctl = ctl(&dir);

    let members = ctl.list_members().await.unwrap();

    assert_eq!(
        members,
        BTreeSet::from(["rabbit@rabbit-1".to_string(), "rabbit@rabbit-2".to_string()])
    );
    assert_eq!(
        calls(&dir),
        vec!["-n rabbit@rabbit-2 cluster_status --formatter json".to_string()]
    );
}

#[tokio::test]
async fn test_join_sequence_arguments() {
    let dir = fake_tools("exit 0");
    let ctl = ctl(&dir);

    ctl.stop_app().await.unwrap();
    ctl.join_cluster(&ctl.peer_identity("rabbit-1")).await.unwrap();
    ctl.start_app().await.unwrap();

    assert_eq!(
        calls(&dir),
        vec![
            "-n rabbit@rabbit-2 stop_app".to_string(),
            "-n rabbit@rabbit-2 join_cluster rabbit@rabbit-1".to_string(),
            "-n rabbit@rabbit-2 start_app".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_join_with_wrong_cookie() {
    let dir = fake_tools(
        r#"echo "Authentication failed (rejected by the remote node), please check the Erlang cookie" >&2; exit 69"#,
    );

    let result = ctl(&dir).join_cluster("rabbit@rabbit-1").await;

    assert!(matches!(result, Err(AdminError::SecretMismatch(_))));
}

#[tokio::test]
async fn test_join_rejected() {
    let dir = fake_tools(r#"echo "Error: {:inconsistent_cluster, 'already clustered'}" >&2; exit 1"#);

    let result = ctl(&dir).join_cluster("rabbit@rabbit-1").await;

    assert!(matches!(result, Err(AdminError::JoinRejected(_))));
}

#[tokio::test]
async fn test_ping() {
    let dir = fake_tools("exit 0");
    let ctl = ctl(&dir);

    assert!(ctl.ping("healthy").await.is_ok());

    let error = ctl.ping("rabbit-3").await.unwrap_err();
    assert_eq!(error.node, "rabbit-3");
    assert!(error.reason.contains("nodedown"));
}

#[tokio::test]
async fn test_server_start_and_shutdown() {
    let dir = fake_tools("exit 0");
    fake_bin(dir.path(), "rabbitmq-server", "exec sleep 30");

    let server = RabbitMqServer::new(RabbitMqServerOptions {
        bin_dir: Some(dir.path().to_path_buf()),
        env: Vec::new(),
        node_name: "rabbit@healthy".to_string(),
        readiness_checks: 5,
    })
    .unwrap();
    assert_eq!(server.bootable_name(), "rabbitmq");

    server.start().await.unwrap();
    assert!(matches!(
        server.start().await,
        Err(warren_rabbitmq::Error::AlreadyStarted)
    ));

    server.shutdown().await.unwrap();
    assert!(server.wait().await.is_none());
}

#[tokio::test]
async fn test_server_never_ready() {
    let dir = fake_tools("exit 0");
    fake_bin(dir.path(), "rabbitmq-server", "exec sleep 30");

    let server = RabbitMqServer::new(RabbitMqServerOptions {
        bin_dir: Some(dir.path().to_path_buf()),
        env: Vec::new(),
        node_name: "rabbit@sick".to_string(),
        readiness_checks: 1,
    })
    .unwrap();

    assert!(matches!(
        server.start().await,
        Err(warren_rabbitmq::Error::Process(
            warren_process::Error::NotReady(_, 1)
        ))
    ));
}
