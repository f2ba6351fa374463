use std::fmt;

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};

/// The terminal success phase for a claim: it has been matched to a volume.
pub const BOUND_PHASE: &str = "Bound";

/// Which kind of storage resource a reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// A request for storage, bound to a volume by the cluster.
    PersistentVolumeClaim,
    /// A unit of provisioned storage.
    PersistentVolume,
}

impl ResourceKind {
    /// The Kubernetes kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::PersistentVolume => "PersistentVolume",
        }
    }
}

/// Identifies a remote storage resource. Immutable once constructed.
///
/// Claims are namespaced; volumes are cluster-scoped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// The kind of the referenced resource.
    pub kind: ResourceKind,
    /// The resource name.
    pub name: String,
    /// The namespace, for namespaced kinds.
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// A reference to a claim in the given namespace.
    pub fn claim(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::PersistentVolumeClaim,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// A reference to a cluster-scoped volume.
    pub fn volume(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::PersistentVolume,
            name: name.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {namespace}/{}", self.kind.as_str(), self.name),
            None => write!(f, "{} {}", self.kind.as_str(), self.name),
        }
    }
}

/// A snapshot of a resource's state as last fetched.
///
/// Owned transiently by a wait call and discarded after each poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedStatus {
    /// The reported status phase, e.g. `Pending` or `Bound`.
    pub phase: Option<String>,
    /// For claims, the name of the volume the claim is bound to.
    pub volume_name: Option<String>,
}

impl ObservedStatus {
    /// Case-insensitive comparison against the reported phase.
    pub fn phase_is(&self, phase: &str) -> bool {
        self.phase
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(phase))
    }

    /// Whether the claim has been bound to a volume.
    pub fn is_bound(&self) -> bool {
        self.phase_is(BOUND_PHASE)
    }
}

impl From<&PersistentVolumeClaim> for ObservedStatus {
    fn from(claim: &PersistentVolumeClaim) -> Self {
        Self {
            phase: claim.status.as_ref().and_then(|s| s.phase.clone()),
            volume_name: claim.spec.as_ref().and_then(|s| s.volume_name.clone()),
        }
    }
}

impl From<&PersistentVolume> for ObservedStatus {
    fn from(volume: &PersistentVolume) -> Self {
        Self {
            phase: volume.status.as_ref().and_then(|s| s.phase.clone()),
            volume_name: None,
        }
    }
}
