use std::time::Duration;

use pvcbench_client::{ClaimSpec, ClientBuilder, WaitPolicy};
use pvcbench_test::cluster::{ClusterBehavior, TestCluster};
use tokio_util::sync::CancellationToken;

use crate::scenario::{ScenarioError, Scenarios};
use crate::workload::Workload;

async fn scenarios_for(cluster: &TestCluster) -> Scenarios {
    let client = ClientBuilder::new("stress")
        .cluster_url(cluster.url())
        .build()
        .await
        .unwrap();
    let quick = WaitPolicy::new(Duration::from_millis(500), Duration::from_millis(20)).unwrap();
    Scenarios::new(client, quick, quick)
}

#[tokio::test]
async fn create_then_delete_runs_the_full_lifecycle() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior::default());
    let scenarios = scenarios_for(&cluster).await;

    let spec = ClaimSpec::new("standard").size_gib(2).name_prefix("churn");
    let name = scenarios.pvc_create(spec).await.unwrap();
    assert!(name.starts_with("churn-"));
    assert!(cluster.claim_exists(&name));

    let status = scenarios.pvc_get(&name).await.unwrap();
    assert!(status.present().unwrap().is_bound());
    assert_eq!(scenarios.pvc_list().await.unwrap(), 1);
    assert_eq!(scenarios.pv_list().await.unwrap(), 1);

    scenarios.pvc_delete(&name).await.unwrap();
    assert!(!cluster.claim_exists(&name));
    assert!(!cluster.volume_exists(&format!("pv-{name}")));
}

#[tokio::test]
async fn binding_timeout_surfaces_as_a_timeout() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior {
        bind_after_polls: None,
        ..Default::default()
    });
    let scenarios = scenarios_for(&cluster).await;

    let result = scenarios.pvc_create(ClaimSpec::new("standard")).await;
    assert!(matches!(result, Err(ScenarioError::Timeout(_))));
    // the claim created for the failed bind must not linger
    assert_eq!(cluster.claim_count(), 0);
}

#[tokio::test]
async fn reading_an_absent_claim_is_not_an_error() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior::default());
    let scenarios = scenarios_for(&cluster).await;

    let status = scenarios.pvc_get("no-such-claim").await.unwrap();
    assert!(status.is_absent());
}

#[tokio::test]
async fn cancelled_creation_does_not_leak_the_claim() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior {
        bind_after_polls: None,
        ..Default::default()
    });
    let scenarios = scenarios_for(&cluster).await;

    let cancel = CancellationToken::new();
    let scenarios = scenarios.with_cancel(cancel.clone());

    let create =
        tokio::spawn(async move { scenarios.pvc_create(ClaimSpec::new("standard")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = create.await.unwrap();
    assert!(matches!(result, Err(ScenarioError::Cancelled)));
    assert_eq!(cluster.claim_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_returns_at_the_deadline_without_runnable_actions() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior::default());
    let scenarios = scenarios_for(&cluster).await;

    // deletes need an existing claim, and this workload never creates one
    let workload = Workload::builder("drain")
        .concurrency(2)
        .seed(7)
        .action_weights(0, 1, 0, 0)
        .build()
        .unwrap();

    let run = crate::stresstest::run(scenarios, vec![workload], Duration::from_millis(100));
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("runner must stop at the deadline")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn run_cleans_up_all_claims_it_created() {
    pvcbench_test::tracing::init();
    let cluster = TestCluster::new(ClusterBehavior::default());
    let scenarios = scenarios_for(&cluster).await;

    let workload = Workload::builder("churn")
        .concurrency(4)
        .seed(17)
        .storage_class("standard")
        .action_weights(80, 0, 15, 5)
        .build()
        .unwrap();

    crate::stresstest::run(scenarios, vec![workload], Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(cluster.claim_count(), 0);
}
