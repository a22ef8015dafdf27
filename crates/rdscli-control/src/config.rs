//! Configuration for the control function

use crate::policy::IdlePolicy;
use std::time::Duration;

/// Runtime configuration of one control invocation
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Scaling group that owns the activity tags
    pub autoscaling_group: String,
    /// AWS region (falls back to the SDK's resolution chain)
    pub region: Option<String>,
    /// Idle time after which the group is scaled to zero
    pub idle_threshold: Duration,
}

impl ControlConfig {
    pub fn policy(&self) -> IdlePolicy {
        IdlePolicy::new(self.idle_threshold)
    }
}
