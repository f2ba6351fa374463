//! The PVC Lifecycle Client
//!
//! The Client wraps the Kubernetes API for persistent volume claim (PVC) and
//! persistent volume (PV) lifecycle operations. It exposes thin, one-call
//! delegations for create/fetch/list/delete, plus the wait primitive that
//! polls a resource until it reaches a terminal state, bounded by a deadline
//! and cancellable from the outside.
//!
//! "Not found" is classified explicitly at the API boundary into
//! [`Observation::Absent`], so deletion-waits can treat a vanished resource
//! as satisfaction rather than as a fetch failure.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod client;
mod error;
mod resource;
pub mod wait;

pub use client::*;
pub use error::*;
pub use resource::*;
pub use wait::{InvalidWaitPolicy, WaitError, WaitPolicy};

#[cfg(test)]
mod tests;
