//! This is a stresstest library which can run different [`Workload`]s of
//! persistent volume claim lifecycle operations against a Kubernetes
//! cluster.
//!
//! A [`Workload`] configures a weighted distribution of actions: creating a
//! claim (and waiting for it to bind), deleting one (and waiting for its
//! volume to vanish), reading claims and their volumes, and listing both.
//!
//! *Delete* and *get* actions use a *zipfian* distribution over the claims
//! the workload has created so far, meaning that more recently created
//! claims are the ones that will be read or deleted.
//!
//! Each operation is timed individually under its scenario name
//! (`pvc_create`, `pvc_delete`, `pvc_get`, `pvc_list`, `pv_get`, `pv_list`)
//! and reported as latency percentiles at the end of the run.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod scenario;
pub mod stresstest;
pub mod workload;

pub use crate::stresstest::run;
pub use crate::workload::Workload;

#[cfg(test)]
mod tests;
