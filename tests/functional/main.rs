// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the check-and-heal engine and the pass handler.
//!
//! These tests drive the real [`ReconciliationEngine`] and
//! [`ClusterHandler`] against a simulated Redis/Sentinel cluster, WITHOUT
//! requiring Kubernetes or live Redis processes.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_fresh_cluster_converges
//! ```
//!
//! ## Test Categories
//!
//! - **Engine tests**: one `check_and_heal` pass per scenario, asserting the
//!   outcome and the exact healer calls issued
//! - **Handler tests**: full passes with status conditions, events and
//!   metrics
//!
//! Sentinel restore waits run on paused tokio time, so the 5s/30s defaults
//! cost nothing.
//!
//! [`ReconciliationEngine`]: redis_sentinel_operator::controller::engine::ReconciliationEngine
//! [`ClusterHandler`]: redis_sentinel_operator::controller::handler::ClusterHandler

mod engine_tests;
mod handler_tests;

pub use mock_state::*;
