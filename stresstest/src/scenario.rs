//! The timed scenario operations driven by a workload.
//!
//! Each operation is an opaque named unit ([`Op`]); the runner attributes
//! latency and failures to the operation it invoked.

use std::fmt;

use pvcbench_client::{
    ClaimSpec, Client, Observation, ObservedStatus, WaitError, WaitPolicy,
};
use tokio_util::sync::CancellationToken;

/// The named operations whose latency is tracked individually.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// Create a claim and wait for it to reach `Bound`.
    PvcCreate,
    /// Read the status of a claim.
    PvcGet,
    /// List claims in the target namespace.
    PvcList,
    /// Delete a claim and wait for its volume to vanish.
    PvcDelete,
    /// Read the status of a volume.
    PvGet,
    /// List volumes in the cluster.
    PvList,
}

impl Op {
    /// The operation name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::PvcCreate => "pvc_create",
            Op::PvcGet => "pvc_get",
            Op::PvcList => "pvc_list",
            Op::PvcDelete => "pvc_delete",
            Op::PvGet => "pv_get",
            Op::PvList => "pv_list",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scenario failure, with the error kinds kept distinguishable for
/// reporting: unexpected API failures, elapsed wait deadlines, and
/// cancelled runs never collapse into one another.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// Unexpected API failure.
    #[error(transparent)]
    Api(#[from] pvcbench_client::Error),
    /// A wait deadline elapsed; the message carries the last observed
    /// status.
    #[error("{0}")]
    Timeout(String),
    /// The run was cancelled while the operation was in flight.
    #[error("operation cancelled")]
    Cancelled,
}

impl<S: fmt::Debug> From<WaitError<S>> for ScenarioError {
    fn from(err: WaitError<S>) -> Self {
        match err {
            WaitError::Fetch(cause) => Self::Api(cause),
            WaitError::Cancelled => Self::Cancelled,
            timeout @ WaitError::TimedOut { .. } => Self::Timeout(timeout.to_string()),
        }
    }
}

/// The lifecycle scenarios, bound to a client and the per-wait policies.
#[derive(Clone, Debug)]
pub struct Scenarios {
    client: Client,
    creation: WaitPolicy,
    deletion: WaitPolicy,
    cancel: CancellationToken,
}

impl Scenarios {
    /// Creates the scenarios around the given client.
    pub fn new(client: Client, creation: WaitPolicy, deletion: WaitPolicy) -> Self {
        Self {
            client,
            creation,
            deletion,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a copy whose in-flight waits are aborted when `cancel` fires.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// `pvc_create`: creates a claim and waits for it to reach `Bound`.
    ///
    /// On timeout the just-created claim is deleted best-effort before the
    /// error is reported; a cancelled wait also cleans up so the run does
    /// not leak claims.
    pub async fn pvc_create(&self, spec: ClaimSpec) -> Result<String, ScenarioError> {
        let claim = self.client.create_claim(spec).await?;

        match self
            .client
            .await_claim_bound(&claim.name, self.creation, &self.cancel)
            .await
        {
            Ok(_) => Ok(claim.name),
            Err(err) => {
                if matches!(err, WaitError::Cancelled)
                    && let Err(error) = self.client.delete_claim(&claim.name).await
                {
                    tracing::warn!(%error, claim = %claim.name, "cleanup of cancelled claim failed");
                }
                Err(err.into())
            }
        }
    }

    /// `pvc_delete`: deletes a claim and waits for its backing volume to be
    /// gone; claims that never bound are awaited directly.
    pub async fn pvc_delete(&self, name: &str) -> Result<(), ScenarioError> {
        let volume = self
            .client
            .claim_status(name)
            .await?
            .present()
            .and_then(|status| status.volume_name);

        self.client.delete_claim(name).await?;

        match volume {
            Some(volume) => {
                self.client
                    .await_volume_absent(&volume, self.deletion, &self.cancel)
                    .await?
            }
            None => {
                self.client
                    .await_claim_absent(name, self.deletion, &self.cancel)
                    .await?
            }
        }
        Ok(())
    }

    /// `pvc_get`: reads the current status of a claim.
    pub async fn pvc_get(&self, name: &str) -> Result<Observation<ObservedStatus>, ScenarioError> {
        Ok(self.client.claim_status(name).await?)
    }

    /// `pvc_list`: lists claims in the target namespace.
    pub async fn pvc_list(&self) -> Result<usize, ScenarioError> {
        Ok(self.client.list_claims().await?.len())
    }

    /// `pv_get`: reads the current status of a volume.
    pub async fn pv_get(&self, name: &str) -> Result<Observation<ObservedStatus>, ScenarioError> {
        Ok(self.client.volume_status(name).await?)
    }

    /// `pv_list`: lists volumes in the cluster.
    pub async fn pv_list(&self) -> Result<usize, ScenarioError> {
        Ok(self.client.list_volumes().await?.len())
    }
}
