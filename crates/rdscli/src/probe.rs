//! Instance liveness probe
//!
//! An instance can be `InService` in its scaling group well before the
//! remote-execution agent on it accepts commands. The probe tells the two
//! apart.

use crate::aws::ssm::{CommandError, RemoteCommand};
use anyhow::Result;
use rdscli_common::defaults::DEFAULT_PROBE_TIMEOUT_SECS;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    NotReadyYet,
}

/// Checks whether an instance is reachable
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
pub trait Probe: Send + Sync {
    async fn probe(&self, instance_id: &str) -> Result<ProbeOutcome>;
}

/// Probes by running `echo` through a [`RemoteCommand`]
pub struct CommandProbe<R> {
    runner: R,
    timeout: Duration,
}

impl<R: RemoteCommand> CommandProbe<R> {
    pub fn new(runner: R) -> Self {
        Self::with_timeout(runner, Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    pub fn with_timeout(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl<R: RemoteCommand> Probe for CommandProbe<R> {
    async fn probe(&self, instance_id: &str) -> Result<ProbeOutcome> {
        match self
            .runner
            .run(instance_id, vec!["echo".to_string()], self.timeout)
            .await
        {
            Ok(_) => Ok(ProbeOutcome::Ready),
            Err(CommandError::NotReadyYet(_)) => {
                debug!(instance_id, "Instance not registered for remote commands yet");
                Ok(ProbeOutcome::NotReadyYet)
            }
            Err(CommandError::Failed(e)) => Err(e),
        }
    }
}
