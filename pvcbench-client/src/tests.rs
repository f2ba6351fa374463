use std::time::Duration;

use pvcbench_test::cluster::{ClusterBehavior, TestCluster};
use tokio_util::sync::CancellationToken;

use super::*;

async fn client_for(cluster: &TestCluster) -> Client {
    ClientBuilder::new("default")
        .cluster_url(cluster.url())
        .build()
        .await
        .unwrap()
}

fn quick_policy() -> WaitPolicy {
    WaitPolicy::new(Duration::from_millis(500), Duration::from_millis(20)).unwrap()
}

#[tokio::test]
async fn creates_and_binds_a_claim() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior::default());
    let client = client_for(&cluster).await;

    let claim = client
        .create_claim(ClaimSpec::new("fast").name_prefix("bench"))
        .await
        .unwrap();
    assert!(claim.name.starts_with("bench-"));
    assert_eq!(claim.namespace.as_deref(), Some("default"));

    let status = client
        .await_claim_bound(&claim.name, quick_policy(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(status.is_bound());
    assert_eq!(status.volume_name.as_deref(), Some(&*format!("pv-{}", claim.name)));

    let claims = client.list_claims().await.unwrap();
    assert!(claims.contains(&claim.name));
    let volumes = client.list_volumes().await.unwrap();
    assert!(volumes.contains(&format!("pv-{}", claim.name)));
}

#[tokio::test]
async fn lists_claims_across_namespaces() {
    let cluster = TestCluster::new(ClusterBehavior::default());
    let client = client_for(&cluster).await;
    assert_eq!(client.namespace(), "default");

    let claim = client.create_claim(ClaimSpec::new("fast")).await.unwrap();
    let all = client.list_all_claims().await.unwrap();
    assert!(all.contains(&claim.name));
}

#[tokio::test]
async fn creation_timeout_deletes_the_claim_once() {
    let cluster = TestCluster::new(ClusterBehavior {
        bind_after_polls: None,
        ..Default::default()
    });
    let client = client_for(&cluster).await;

    let claim = client.create_claim(ClaimSpec::new("fast")).await.unwrap();
    let policy = WaitPolicy::new(Duration::from_millis(200), Duration::from_millis(30)).unwrap();

    let outcome = client
        .await_claim_bound(&claim.name, policy, &CancellationToken::new())
        .await;

    match outcome.unwrap_err() {
        WaitError::TimedOut {
            last, compensation, ..
        } => {
            let last = last.present().unwrap();
            assert!(last.phase_is("pending"));
            assert!(compensation.is_none());
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    assert_eq!(cluster.delete_count(&claim.name), 1);
    assert!(!cluster.claim_exists(&claim.name));
}

#[tokio::test]
async fn deletion_waits_for_the_volume_to_vanish() {
    let cluster = TestCluster::new(ClusterBehavior {
        bind_after_polls: Some(1),
        release_after_polls: 2,
        ..Default::default()
    });
    let client = client_for(&cluster).await;

    let claim = client.create_claim(ClaimSpec::new("fast")).await.unwrap();
    let status = client
        .await_claim_bound(&claim.name, quick_policy(), &CancellationToken::new())
        .await
        .unwrap();
    let volume = status.volume_name.unwrap();

    client.delete_claim(&claim.name).await.unwrap();
    client
        .await_volume_absent(&volume, quick_policy(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!cluster.volume_exists(&volume));
    assert_eq!(
        client.volume_status(&volume).await.unwrap(),
        Observation::Absent
    );
}

#[tokio::test]
async fn deletion_wait_propagates_unexpected_errors() {
    let cluster = TestCluster::new(ClusterBehavior {
        fail_volume_reads: true,
        ..Default::default()
    });
    let client = client_for(&cluster).await;

    let outcome = client
        .await_volume_absent("pv-whatever", quick_policy(), &CancellationToken::new())
        .await;
    assert!(matches!(outcome.unwrap_err(), WaitError::Fetch(_)));
}

#[tokio::test]
async fn unbound_claims_are_awaited_directly() {
    let cluster = TestCluster::new(ClusterBehavior {
        bind_after_polls: None,
        ..Default::default()
    });
    let client = client_for(&cluster).await;

    let claim = client.create_claim(ClaimSpec::new("fast")).await.unwrap();
    client.delete_claim(&claim.name).await.unwrap();

    client
        .await_claim_absent(&claim.name, quick_policy(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn deleting_an_absent_claim_is_not_an_error() {
    let cluster = TestCluster::new(ClusterBehavior::default());
    let client = client_for(&cluster).await;

    client.delete_claim("never-created").await.unwrap();
    assert_eq!(
        client.claim_status("never-created").await.unwrap(),
        Observation::Absent
    );
}
