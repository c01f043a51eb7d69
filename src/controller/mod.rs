//! Controller module for redis-sentinel-operator.
//!
//! The kube-facing reconciler lives in `cluster_reconciler`. Everything it
//! drives is independent of Kubernetes types where possible:
//! - `engine`: the check-and-heal sequence over observer/healer capabilities
//! - `handler`: one full pass, from cached spec to status and events
//! - `observer`, `healer`: live implementations against Redis and Sentinel
//! - `meta_cache`: last seen spec per cluster and the inferred transition

// Shared modules
pub mod common;
pub mod context;
pub mod error;
pub mod events;
pub mod status;
pub mod topology;
pub mod validation;

// Reconciliation
pub mod cluster_reconciler;
pub mod engine;
pub mod handler;
pub mod healer;
pub mod meta_cache;
pub mod observer;
pub mod workload;
