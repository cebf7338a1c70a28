mod common;

use common::{connect_with_retry, free_port};
use std::time::Duration;
use swarm_emulator::engine::group::run_group;
use swarm_emulator::engine::listener::{DrainOutcome, ListenerSettings};
use swarm_emulator::engine::planner::PortBucket;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn empty_bucket_returns_immediately() {
    let report = timeout(
        Duration::from_secs(1),
        run_group(
            &PortBucket::default(),
            ListenerSettings::default(),
            CancellationToken::new(),
        ),
    )
    .await
    .expect("empty bucket must not block");
    assert!(report.finished.is_empty());
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn every_port_in_the_bucket_is_served() {
    let ports = vec![free_port(), free_port(), free_port()];
    let bucket = PortBucket::new(10, ports.clone());
    let token = CancellationToken::new();
    let group = tokio::spawn({
        let token = token.clone();
        async move { run_group(&bucket, ListenerSettings::default(), token).await }
    });

    let mut clients = Vec::new();
    for port in &ports {
        let mut client = connect_with_retry(*port, WAIT).await;
        client.write_all(b"ping").await.unwrap();
        clients.push(client);
    }
    sleep(Duration::from_millis(100)).await;
    assert!(!group.is_finished());

    token.cancel();
    let report = timeout(WAIT, group).await.unwrap().unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.finished.len(), 3);
    for (r, port) in report.finished.iter().zip(&ports) {
        assert_eq!(r.port, *port);
        assert_eq!(r.connections, 1);
        assert_eq!(r.bytes_drained, 4);
    }
}

#[tokio::test]
async fn a_bind_conflict_does_not_stop_siblings() {
    let blocker = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let blocked = blocker.local_addr().unwrap().port();
    let free = free_port();

    let bucket = PortBucket::new(0, vec![blocked, free]);
    let token = CancellationToken::new();
    let group = tokio::spawn({
        let token = token.clone();
        async move { run_group(&bucket, ListenerSettings::default(), token).await }
    });

    let mut client = connect_with_retry(free, WAIT).await;
    client.write_all(b"still alive").await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(!group.is_finished(), "sibling listener must keep the group alive");

    token.cancel();
    let report = timeout(WAIT, group).await.unwrap().unwrap();
    assert_eq!(report.failed_ports(), vec![blocked]);
    assert_eq!(report.finished.len(), 1);
    assert_eq!(report.finished[0].port, free);
    assert_eq!(report.finished[0].bytes_drained, 11);
    assert_eq!(report.finished[0].outcome, DrainOutcome::Cancelled);
}

#[tokio::test]
async fn group_ends_once_all_clients_leave() {
    let ports = vec![free_port(), free_port()];
    let bucket = PortBucket::new(0, ports.clone());
    let group = tokio::spawn(async move {
        run_group(&bucket, ListenerSettings::default(), CancellationToken::new()).await
    });

    for port in &ports {
        let mut client = connect_with_retry(*port, WAIT).await;
        client.write_all(b"x").await.unwrap();
    }

    let report = timeout(WAIT, group).await.unwrap().unwrap();
    assert_eq!(report.finished.len(), 2);
    assert!(report
        .finished
        .iter()
        .all(|r| r.outcome == DrainOutcome::PeerClosed));
}
