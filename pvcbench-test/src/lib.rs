//! Shared tooling for pvcbench tests: tracing initialization and an
//! in-process fake Kubernetes API server.

pub mod cluster;
pub mod tracing;
