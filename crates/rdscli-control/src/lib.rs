//! rdscli-control - lifecycle control function for the bastion instance
//!
//! Receives `report`, `activate` and `cleanup` events, keeps the activity
//! record in the scaling group's tags and scales the group down to zero
//! once it has been idle for long enough.
//!
//! Every invocation re-derives its state from the tags; nothing is kept in
//! memory between invocations, and every action is idempotent so that
//! duplicate or interleaved invocations converge.

pub mod asg;
pub mod capacity;
pub mod config;
pub mod handler;
pub mod memory;
pub mod policy;
pub mod store;

pub use asg::AsgClient;
pub use capacity::CapacityControl;
pub use config::ControlConfig;
pub use handler::Controller;
pub use memory::{MemoryCapacity, MemoryStore};
pub use policy::{Decision, Evaluation, IdlePolicy};
pub use store::{ActivityRecord, ActivityStore};
