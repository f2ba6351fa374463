use std::time::Duration;

use pvcbench_client::WaitPolicy;
use serde::Deserialize;

/// Stresstest configuration, loaded from a YAML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The namespace claims are created in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Explicit cluster URL; the ambient kubeconfig is used when absent.
    #[serde(default)]
    pub cluster_url: Option<String>,

    /// How long the workloads run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Wait tunables for claim binding and volume deletion.
    #[serde(default)]
    pub waits: Waits,

    /// The workloads to run concurrently.
    pub workloads: Vec<Workload>,
}

fn default_namespace() -> String {
    "default".to_owned()
}

/// Wait policies for the two lifecycle waits.
#[derive(Debug, Deserialize)]
pub struct Waits {
    /// Waiting for a created claim to reach `Bound`.
    pub creation: WaitPolicy,
    /// Waiting for a deleted claim's volume to vanish.
    pub deletion: WaitPolicy,
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            creation: WaitPolicy::new(Duration::from_secs(120), Duration::from_millis(1700))
                .unwrap(),
            deletion: WaitPolicy::new(Duration::from_secs(120), Duration::from_millis(1400))
                .unwrap(),
        }
    }
}

/// One workload of claim lifecycle actions.
#[derive(Debug, Deserialize)]
pub struct Workload {
    /// Name of the workload for identification in the report.
    pub name: String,
    /// The maximum number of concurrent operations within this workload.
    pub concurrency: usize,
    /// The storage class requested for created claims.
    pub storage_class: String,
    /// Requested claim size in Gi.
    #[serde(default = "default_size_gib")]
    pub size_gib: u64,
    /// Prefix for generated claim names.
    #[serde(default)]
    pub name_prefix: Option<String>,
    /// The action mix.
    pub actions: Actions,
}

fn default_size_gib() -> u64 {
    1
}

/// The ratio between creates, deletes, gets and lists.
#[derive(Debug, Deserialize)]
pub struct Actions {
    /// Weight of claim-create actions.
    pub creates: u8,
    /// Weight of claim-delete actions.
    pub deletes: u8,
    /// Weight of claim/volume read actions.
    pub gets: u8,
    /// Weight of claim/volume list actions.
    pub lists: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let yaml = r#"
namespace: bench
duration: 5m
waits:
  creation: { deadline: 2m, interval: 1700ms }
  deletion: { deadline: 90s, interval: 1400ms }
workloads:
  - name: churn
    concurrency: 8
    storage_class: fast
    size_gib: 2
    name_prefix: rally_run
    actions: { creates: 50, deletes: 30, gets: 15, lists: 5 }
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.namespace, "bench");
        assert_eq!(config.duration, Duration::from_secs(300));
        assert_eq!(config.waits.creation.deadline(), Duration::from_secs(120));
        assert_eq!(config.waits.deletion.deadline(), Duration::from_secs(90));

        let workload = &config.workloads[0];
        assert_eq!(workload.size_gib, 2);
        assert_eq!(workload.name_prefix.as_deref(), Some("rally_run"));
        assert_eq!(workload.actions.creates, 50);
    }

    #[test]
    fn wait_defaults_match_the_lifecycle_tunables() {
        let yaml = r#"
duration: 1m
workloads: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "default");
        assert_eq!(
            config.waits.creation.interval(),
            Duration::from_millis(1700)
        );
        assert_eq!(
            config.waits.deletion.interval(),
            Duration::from_millis(1400)
        );
    }

    #[test]
    fn zero_wait_durations_are_rejected() {
        let yaml = r#"
duration: 1m
waits:
  creation: { deadline: 0s, interval: 1s }
  deletion: { deadline: 1m, interval: 1s }
workloads: []
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
