//! Shared test utilities for rdscli
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and unique names for integration tests
//! - [`stub`]: stand-in session CLI scripts and process liveness checks

pub mod aws;
pub mod stub;

pub use aws::{get_test_region, test_run_id};
pub use stub::{StubBehavior, TunnelStub, pid_alive, wait_until_dead};
