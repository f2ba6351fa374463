//! A module for defining a [`Workload`] of claim lifecycle actions.

use std::thread::available_parallelism;

use pvcbench_client::ClaimSpec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, Zipf};

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    name: String,
    concurrency: usize,
    seed: u64,

    storage_class: String,
    size_gib: u64,
    name_prefix: String,

    create_weight: u8,
    delete_weight: u8,
    get_weight: u8,
    list_weight: u8,
}

impl WorkloadBuilder {
    /// The maximum number of concurrent operations that can be performed within this workload.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Seeds the RNG driving the action distribution, for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The storage class requested for created claims.
    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.storage_class = storage_class.into();
        self
    }

    /// Requested claim size in Gi.
    pub fn claim_size_gib(mut self, size_gib: u64) -> Self {
        self.size_gib = size_gib;
        self
    }

    /// Prefix for generated claim names.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// The ratio between creates, deletes, gets and lists.
    pub fn action_weights(mut self, creates: u8, deletes: u8, gets: u8, lists: u8) -> Self {
        self.create_weight = creates;
        self.delete_weight = deletes;
        self.get_weight = gets;
        self.list_weight = lists;
        self
    }

    /// Creates the workload instance.
    ///
    /// Fails when the action weights sum to zero, since no action could
    /// ever be sampled from such a distribution.
    pub fn build(self) -> Result<Workload, InvalidActionWeights> {
        let rng = SmallRng::seed_from_u64(self.seed);
        let action_distribution = WeightedIndex::new([
            self.create_weight,
            self.delete_weight,
            self.get_weight,
            self.list_weight,
        ])
        .map_err(|_| InvalidActionWeights)?;

        Ok(Workload {
            name: self.name,
            concurrency: self.concurrency,

            storage_class: self.storage_class,
            size_gib: self.size_gib,
            name_prefix: self.name_prefix,

            rng,
            action_distribution,

            existing_claims: Default::default(),
        })
    }
}

/// Rejected workload configuration: all action weights were zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("at least one action weight must be positive")]
pub struct InvalidActionWeights;

/// Specification of a stresstest that can be run against a cluster.
#[derive(Debug)]
pub struct Workload {
    /// Name of the workload for identification in logs and metrics.
    pub(crate) name: String,
    /// The maximum number of concurrent operations that can be performed within this workload.
    pub(crate) concurrency: usize,

    storage_class: String,
    size_gib: u64,
    name_prefix: String,

    /// The RNG driving the action distribution.
    rng: SmallRng,
    /// A distribution that generates actions, such as create/delete/get/list.
    action_distribution: WeightedIndex<u8>,

    /// All the created claims that we can then read or delete.
    existing_claims: Vec<String>,
}

impl Workload {
    /// Constructs a new workload builder with the given name.
    pub fn builder(name: impl Into<String>) -> WorkloadBuilder {
        WorkloadBuilder {
            name: name.into(),
            concurrency: available_parallelism().unwrap().get(),
            seed: rand::random(),

            storage_class: "standard".into(),
            size_gib: 1,
            name_prefix: "bench".into(),

            create_weight: 40,
            delete_weight: 20,
            get_weight: 30,
            list_weight: 10,
        }
    }

    /// The claim spec used for this workload's create actions.
    pub(crate) fn claim_spec(&self) -> ClaimSpec {
        ClaimSpec::new(self.storage_class.clone())
            .size_gib(self.size_gib)
            .name_prefix(self.name_prefix.clone())
    }

    fn sample_existing(&mut self) -> Option<String> {
        if self.existing_claims.is_empty() {
            return None;
        }
        let len = self.existing_claims.len();
        let zipf = Zipf::new(len as f64, 2.0).unwrap();
        let idx = len - self.rng.sample(zipf) as usize;

        Some(self.existing_claims.remove(idx))
    }

    /// Samples the next action, or `None` when the sampled action needs an
    /// existing claim and there is none yet.
    pub(crate) fn next_action(&mut self) -> Option<Action> {
        match self.action_distribution.sample(&mut self.rng) {
            0 => Some(Action::Create),
            1 => self.sample_existing().map(Action::Delete),
            2 => self.sample_existing().map(Action::Get),
            _ => Some(Action::List),
        }
    }

    /// Adds a claim to the internal ledger, so it can be yielded for gets or
    /// deletes.
    ///
    /// This function has to be called when a create or get has completed.
    /// (Claims currently being read will not be concurrently deleted)
    pub(crate) fn push_claim(&mut self, name: String) {
        self.existing_claims.push(name)
    }

    /// Drains the ledger for end-of-run cleanup.
    pub(crate) fn remaining_claims(&mut self) -> impl Iterator<Item = String> + use<> {
        std::mem::take(&mut self.existing_claims).into_iter()
    }
}

/// An action that can be performed by the workload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Action {
    /// Create a claim and wait for it to bind.
    Create,
    /// Delete the given claim and wait for its volume to vanish.
    Delete(String),
    /// Read the given claim and, when bound, its volume.
    Get(String),
    /// List claims and volumes.
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_until_claims_exist() {
        let mut workload = Workload::builder("test")
            .seed(1)
            .action_weights(0, 50, 50, 0)
            .build()
            .unwrap();

        // nothing to delete or get yet
        assert_eq!(workload.next_action(), None);

        workload.push_claim("bench-one".into());
        let action = workload.next_action().unwrap();
        assert!(matches!(
            action,
            Action::Delete(ref name) | Action::Get(ref name) if name == "bench-one"
        ));
        // the claim was taken out of the ledger
        assert_eq!(workload.next_action(), None);
    }

    #[test]
    fn zero_weights_are_never_sampled() {
        let mut workload = Workload::builder("test")
            .seed(42)
            .action_weights(1, 0, 0, 0)
            .build()
            .unwrap();

        for _ in 0..100 {
            assert_eq!(workload.next_action(), Some(Action::Create));
        }
    }

    #[test]
    fn all_zero_weights_are_a_configuration_error() {
        let err = Workload::builder("zero")
            .action_weights(0, 0, 0, 0)
            .build()
            .unwrap_err();
        assert_eq!(err, InvalidActionWeights);
    }

    #[test]
    fn remaining_claims_drain_the_ledger() {
        let mut workload = Workload::builder("test").build().unwrap();
        workload.push_claim("a".into());
        workload.push_claim("b".into());

        let remaining: Vec<_> = workload.remaining_claims().collect();
        assert_eq!(remaining, ["a", "b"]);
        assert!(workload.remaining_claims().next().is_none());
    }
}
