/// Errors that can happen within the pvcbench client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any unexpected error from the underlying Kubernetes API client.
    ///
    /// A "not found" response is *not* reported through this variant; it is
    /// classified into [`Observation::Absent`] at the API boundary.
    #[error(transparent)]
    Api(#[from] kube::Error),
    /// Error when the configured cluster URL cannot be parsed.
    #[error("invalid cluster url: {message}")]
    InvalidClusterUrl {
        /// The URL error message.
        message: String,
    },
    /// Rejected wait policy configuration.
    #[error(transparent)]
    InvalidWaitPolicy(#[from] crate::wait::InvalidWaitPolicy),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome of fetching a remote resource, with "not found" made explicit.
///
/// Deletion-waits treat [`Absent`](Self::Absent) as their terminal state;
/// creation-waits keep polling through it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation<T> {
    /// The resource exists and was observed in the contained state.
    Present(T),
    /// The API reported the resource as not found.
    Absent,
}

impl<T> Observation<T> {
    /// Returns `true` if the resource was reported as not found.
    pub fn is_absent(&self) -> bool {
        matches!(self, Observation::Absent)
    }

    /// Returns the observed state, if the resource was present.
    pub fn present(self) -> Option<T> {
        match self {
            Observation::Present(value) => Some(value),
            Observation::Absent => None,
        }
    }

    /// Maps the observed state of a present resource.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observation<U> {
        match self {
            Observation::Present(value) => Observation::Present(f(value)),
            Observation::Absent => Observation::Absent,
        }
    }
}

/// Classifies a raw API result at the collaborator boundary.
///
/// A 404 becomes [`Observation::Absent`]; every other error propagates
/// unchanged as [`Error::Api`].
pub(crate) fn classify<T>(result: Result<T, kube::Error>) -> Result<Observation<T>> {
    match result {
        Ok(value) => Ok(Observation::Present(value)),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(Observation::Absent),
        Err(err) => Err(err.into()),
    }
}
