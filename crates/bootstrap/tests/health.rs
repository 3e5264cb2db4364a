mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockHealth, nodes};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use warren_bootstrap::{HealthConvergence, HealthStatus, PollPolicy, wait_all};

fn policy(timeout_secs: u64) -> PollPolicy {
    PollPolicy::new(Duration::from_secs(timeout_secs), Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_one_node_never_healthy() {
    let check = MockHealth::new()
        .healthy_after("rabbit-1", Duration::ZERO)
        .healthy_after("rabbit-2", Duration::from_secs(3));

    let error = wait_all(
        check,
        &nodes(&["rabbit-1", "rabbit-2", "rabbit-3"]),
        policy(10),
        None,
    )
    .await
    .unwrap_err();

    assert_eq!(error.timed_out, vec!["rabbit-3".to_string()]);
    assert_eq!(error.statuses["rabbit-1"], HealthStatus::Healthy);
    assert_eq!(error.statuses["rabbit-2"], HealthStatus::Healthy);
    assert_eq!(error.statuses["rabbit-3"], HealthStatus::TimedOut);
    assert!(error.elapsed >= Duration::from_secs(10));
    assert!(error.elapsed < Duration::from_secs(11));
    assert!(error.to_string().ends_with("rabbit-3"));
}

#[tokio::test(start_paused = true)]
async fn test_nodes_probed_concurrently() {
    let names: Vec<String> = (1..=8).map(|i| format!("rabbit-{i}")).collect();
    let check = names.iter().fold(MockHealth::new(), |check, name| {
        check.healthy_after(name, Duration::from_secs(8))
    });
    let started = Instant::now();

    let report = wait_all(check, &names, policy(10), None).await.unwrap();

    assert_eq!(report.statuses.len(), 8);
    assert!(
        report
            .statuses
            .values()
            .all(|status| *status == HealthStatus::Healthy)
    );
    assert!(started.elapsed() <= Duration::from_secs(9));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_nodes_probed_once() {
    let check = Arc::new(
        MockHealth::new()
            .healthy_after("rabbit-1", Duration::ZERO)
            .healthy_after("rabbit-2", Duration::ZERO),
    );

    let report = wait_all(
        check.clone(),
        &nodes(&["rabbit-1", "rabbit-1", "rabbit-2"]),
        policy(10),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.statuses.len(), 2);
    assert_eq!(check.pings("rabbit-1"), 1);
    assert_eq!(check.pings("rabbit-2"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_cancels_outstanding_probes() {
    let check = MockHealth::new().healthy_after("rabbit-1", Duration::ZERO);
    let started = Instant::now();

    let error = wait_all(
        check,
        &nodes(&["rabbit-1", "rabbit-2", "rabbit-3"]),
        policy(30),
        Some(started + Duration::from_secs(5)),
    )
    .await
    .unwrap_err();

    assert_eq!(
        error.timed_out,
        vec!["rabbit-2".to_string(), "rabbit-3".to_string()]
    );
    assert_eq!(error.elapsed, Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_after_wait() {
    let waiter = HealthConvergence::new(
        MockHealth::new().healthy_after("rabbit-1", Duration::from_secs(2)),
        policy(5),
    );

    let result = waiter
        .wait_all(&nodes(&["rabbit-1", "rabbit-2"]), None)
        .await;

    assert!(result.is_err());
    let snapshot = waiter.snapshot();
    assert_eq!(snapshot["rabbit-1"], HealthStatus::Healthy);
    assert_eq!(snapshot["rabbit-2"], HealthStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_empty_node_list_is_healthy() {
    let report = wait_all(MockHealth::new(), &[], policy(10), None)
        .await
        .unwrap();

    assert!(report.statuses.is_empty());
    assert_eq!(report.elapsed, Duration::ZERO);
}
