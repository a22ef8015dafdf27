//! rdscli - on-demand bastion tunnel into a private database
//!
//! The client side of the bastion lifecycle: makes sure the bastion stack
//! exists, asks the control function to bring the instance up, waits until
//! the instance is reachable and then opens a port-forwarding tunnel to the
//! database through it.

pub mod acquire;
pub mod aws;
pub mod config;
pub mod db_client;
pub mod error;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod template;
pub mod tunnel;
pub mod wait;
pub mod workflow;

pub use error::LifecycleError;
