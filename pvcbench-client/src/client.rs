use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Observation, Result, classify};
use crate::resource::{ObservedStatus, ResourceRef};
use crate::wait::{self, WaitError, WaitPolicy};

/// Legacy annotation selecting a storage class, set alongside the
/// first-class spec field so older provisioners pick up the class too.
pub const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

const NAME_SUFFIX_LEN: usize = 14;
const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Builder for a [`Client`] bound to a target namespace.
///
/// By default the client is built from the ambient kubeconfig; tests point it
/// at an explicit cluster URL instead.
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    namespace: String,
    cluster_url: Option<String>,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] targeting the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cluster_url: None,
        }
    }

    /// Targets an explicit cluster URL instead of the ambient kubeconfig.
    pub fn cluster_url(mut self, url: impl Into<String>) -> Self {
        self.cluster_url = Some(url.into());
        self
    }

    /// Builds the [`Client`].
    pub async fn build(self) -> Result<Client> {
        let kube = match &self.cluster_url {
            Some(url) => {
                let uri = url.parse().map_err(|err| Error::InvalidClusterUrl {
                    message: format!("{err}"),
                })?;
                let mut config = kube::Config::new(uri);
                config.default_namespace = self.namespace.clone();
                kube::Client::try_from(config)?
            }
            None => kube::Client::try_default().await?,
        };

        Ok(Client {
            claims: Api::namespaced(kube.clone(), &self.namespace),
            all_claims: Api::all(kube.clone()),
            volumes: Api::all(kube),
            namespace: self.namespace,
        })
    }
}

/// A client scoped to one namespace, wrapping the Kubernetes API for claim
/// and volume lifecycle operations.
///
/// All operations are thin delegations; the only stateful behavior lives in
/// the [`wait`](crate::wait) primitive the `await_*` functions build on.
#[derive(Clone)]
pub struct Client {
    claims: Api<PersistentVolumeClaim>,
    all_claims: Api<PersistentVolumeClaim>,
    volumes: Api<PersistentVolume>,
    namespace: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// The namespace this client creates claims in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Creates a claim from the given spec, returning a reference to it.
    ///
    /// The claim name is generated from the spec's normalized prefix plus a
    /// random lowercase alphanumeric suffix.
    pub async fn create_claim(&self, spec: ClaimSpec) -> Result<ResourceRef> {
        let name = spec.generate_name();
        let manifest = spec.into_manifest(&name);
        let created = self.claims.create(&PostParams::default(), &manifest).await?;
        Ok(ResourceRef::claim(created.name_any(), self.namespace.clone()))
    }

    /// Fetches a claim; a 404 is reported as [`Observation::Absent`].
    pub async fn get_claim(&self, name: &str) -> Result<Observation<PersistentVolumeClaim>> {
        classify(self.claims.get(name).await)
    }

    /// Observes the current status of a claim.
    pub async fn claim_status(&self, name: &str) -> Result<Observation<ObservedStatus>> {
        Ok(self.get_claim(name).await?.map(|c| ObservedStatus::from(&c)))
    }

    /// Fetches a volume; a 404 is reported as [`Observation::Absent`].
    pub async fn get_volume(&self, name: &str) -> Result<Observation<PersistentVolume>> {
        classify(self.volumes.get(name).await)
    }

    /// Observes the current status of a volume.
    pub async fn volume_status(&self, name: &str) -> Result<Observation<ObservedStatus>> {
        Ok(self
            .get_volume(name)
            .await?
            .map(|v| ObservedStatus::from(&v)))
    }

    /// Lists the names of all claims in the client's namespace.
    pub async fn list_claims(&self) -> Result<Vec<String>> {
        let list = self.claims.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|c| c.name_any()).collect())
    }

    /// Lists the names of claims across all namespaces.
    pub async fn list_all_claims(&self) -> Result<Vec<String>> {
        let list = self.all_claims.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|c| c.name_any()).collect())
    }

    /// Lists the names of all volumes in the cluster.
    pub async fn list_volumes(&self) -> Result<Vec<String>> {
        let list = self.volumes.list(&ListParams::default()).await?;
        Ok(list.into_iter().map(|v| v.name_any()).collect())
    }

    /// Deletes a claim. Deleting an already-absent claim is not an error.
    pub async fn delete_claim(&self, name: &str) -> Result<()> {
        classify(self.claims.delete(name, &DeleteParams::default()).await)?;
        Ok(())
    }

    /// Creation-wait: polls the claim until it reaches the `Bound` phase.
    ///
    /// On timeout the just-created claim is deleted best-effort, exactly
    /// once; a failure of that deletion is attached to the timeout error but
    /// never masks it.
    pub async fn await_claim_bound(
        &self,
        name: &str,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<ObservedStatus, WaitError<Observation<ObservedStatus>>> {
        let observed = wait::wait_until_or_else(
            policy,
            cancel,
            move || self.claim_status(name),
            |observed| matches!(observed, Observation::Present(status) if status.is_bound()),
            move || self.delete_claim(name),
        )
        .await?;

        match observed {
            Observation::Present(status) => Ok(status),
            // the terminal predicate above only matches present claims
            Observation::Absent => unreachable!("bound claim must be present"),
        }
    }

    /// Deletion-wait: polls the volume until it is no longer fetchable.
    ///
    /// A 404 is satisfaction; any other fetch error propagates immediately.
    /// No compensating action runs on timeout.
    pub async fn await_volume_absent(
        &self,
        name: &str,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), WaitError<Observation<ObservedStatus>>> {
        wait::wait_until(
            policy,
            cancel,
            move || self.volume_status(name),
            Observation::is_absent,
        )
        .await?;
        Ok(())
    }

    /// Deletion-wait for claims that were never bound to a volume.
    pub async fn await_claim_absent(
        &self,
        name: &str,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), WaitError<Observation<ObservedStatus>>> {
        wait::wait_until(
            policy,
            cancel,
            move || self.claim_status(name),
            Observation::is_absent,
        )
        .await?;
        Ok(())
    }
}

/// Specification for a new claim.
#[derive(Clone, Debug)]
pub struct ClaimSpec {
    storage_class: String,
    size_gib: u64,
    name_prefix: String,
}

impl ClaimSpec {
    /// Creates a claim spec for the given storage class, requesting 1Gi by
    /// default.
    pub fn new(storage_class: impl Into<String>) -> Self {
        Self {
            storage_class: storage_class.into(),
            size_gib: 1,
            name_prefix: "bench".into(),
        }
    }

    /// The requested storage size in Gi.
    pub fn size_gib(mut self, size_gib: u64) -> Self {
        self.size_gib = size_gib;
        self
    }

    /// The prefix for generated claim names.
    ///
    /// Underscores are mapped to dashes and a trailing dash is appended, so
    /// the generated names are valid DNS-1123 labels.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    fn generate_name(&self) -> String {
        let mut rng = rand::rng();
        let mut name = normalized_prefix(&self.name_prefix);
        for _ in 0..NAME_SUFFIX_LEN {
            name.push(NAME_CHARSET[rng.random_range(0..NAME_CHARSET.len())] as char);
        }
        name
    }

    fn into_manifest(self, name: &str) -> PersistentVolumeClaim {
        let annotations = BTreeMap::from([(
            STORAGE_CLASS_ANNOTATION.to_owned(),
            self.storage_class.clone(),
        )]);
        let requests = BTreeMap::from([(
            "storage".to_owned(),
            Quantity(format!("{}Gi", self.size_gib)),
        )]);

        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
                storage_class_name: Some(self.storage_class),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn normalized_prefix(prefix: &str) -> String {
    let mut prefix = prefix.replace('_', "-");
    if !prefix.is_empty() && !prefix.ends_with('-') {
        prefix.push('-');
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_normalized() {
        assert_eq!(normalized_prefix("bench"), "bench-");
        assert_eq!(normalized_prefix("bench-"), "bench-");
        assert_eq!(normalized_prefix("my_run"), "my-run-");
        assert_eq!(normalized_prefix(""), "");
    }

    #[test]
    fn generated_names_join_prefix_and_random_suffix() {
        let spec = ClaimSpec::new("fast").name_prefix("My_Bench");
        let name = spec.generate_name();

        assert_eq!(name.len(), "My-Bench-".len() + NAME_SUFFIX_LEN);
        assert!(name.starts_with("My-Bench-"));
        let suffix = &name["My-Bench-".len()..];
        assert!(
            suffix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn manifests_carry_class_size_and_access_mode() {
        let spec = ClaimSpec::new("fast").size_gib(5);
        let manifest = spec.into_manifest("bench-abc123");

        assert_eq!(manifest.metadata.name.as_deref(), Some("bench-abc123"));
        let annotations = manifest.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(STORAGE_CLASS_ANNOTATION).map(String::as_str),
            Some("fast")
        );

        let spec = manifest.spec.unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(
            spec.access_modes.as_deref(),
            Some(&["ReadWriteOnce".to_owned()][..])
        );
        let requests = spec.resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("5Gi".into())));
    }
}
