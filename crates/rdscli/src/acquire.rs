//! Instance acquisition
//!
//! After activation the scaling group starts an instance; acquisition polls
//! the group until exactly one member is in service and answers the probe.

use crate::config::TimingConfig;
use crate::error::LifecycleError;
use crate::probe::{Probe, ProbeOutcome};
use crate::progress::{ProgressReporter, StatusAnnouncer};
use crate::wait::{WaitConfig, WaitError, wait_for_resource};
use anyhow::{Context, Result};
use rdscli_common::defaults::{DEFAULT_ACQUIRE_POLL_INTERVAL_MS, DEFAULT_ACQUIRE_TIMEOUT_SECS};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lifecycle state of a member that can serve traffic
pub const IN_SERVICE: &str = "InService";

const WAITING_FOR_INSTANCE: &str = "Waiting for an instance in the scaling group";

/// A scaling group member as listed by the group API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub instance_id: String,
    pub lifecycle_state: String,
}

impl GroupMember {
    pub fn is_in_service(&self) -> bool {
        self.lifecycle_state == IN_SERVICE
    }
}

/// Lists the members of a scaling group
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
pub trait GroupInstances: Send + Sync {
    async fn list_instances(&self, group: &str) -> Result<Vec<GroupMember>>;
}

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub poll_interval: Duration,
    /// Measured from the start of acquisition
    pub timeout: Duration,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_ACQUIRE_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl From<&TimingConfig> for AcquireConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            poll_interval: timing.acquire_poll_interval,
            timeout: timing.acquire_timeout,
        }
    }
}

pub struct InstanceAcquirer<G, P> {
    instances: G,
    probe: P,
    config: AcquireConfig,
    cancel: Option<CancellationToken>,
}

impl<G: GroupInstances, P: Probe> InstanceAcquirer<G, P> {
    pub fn new(instances: G, probe: P, config: AcquireConfig) -> Self {
        Self {
            instances,
            probe,
            config,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Return the id of the single reachable in-service instance.
    ///
    /// Fails immediately with [`LifecycleError::UnexpectedTopology`] when more
    /// than one member is in service, and with [`LifecycleError::Timeout`]
    /// when the deadline passes first.
    pub async fn acquire(&self, group: &str, reporter: &dyn ProgressReporter) -> Result<String> {
        let announcer = StatusAnnouncer::new(reporter);
        let found: OnceLock<String> = OnceLock::new();
        // Errors raised by the listing or the probe, as opposed to this wait's own deadline
        let check_failed = AtomicBool::new(false);

        let result = wait_for_resource(
            WaitConfig::fixed(self.config.poll_interval, self.config.timeout),
            self.cancel.as_ref(),
            || {
                let announcer = &announcer;
                let found = &found;
                let check_failed = &check_failed;
                async move {
                    let checked = self.poll_once(group, announcer, found).await;
                    if checked.is_err() {
                        check_failed.store(true, Ordering::SeqCst);
                    }
                    checked
                }
            },
            &format!("instance in {group}"),
        )
        .await;

        if let Err(e) = result {
            let own_deadline = !check_failed.load(Ordering::SeqCst)
                && matches!(e.downcast_ref::<WaitError>(), Some(WaitError::Timeout { .. }));
            if own_deadline {
                return Err(LifecycleError::Timeout {
                    group: group.to_string(),
                    timeout: self.config.timeout,
                }
                .into());
            }
            return Err(e);
        }

        let instance_id = found
            .into_inner()
            .context("Acquisition finished without an instance")?;
        info!(group = %group, instance_id = %instance_id, "Instance acquired");
        Ok(instance_id)
    }

    /// One look at the group; `Ok(true)` once `found` holds a reachable instance
    async fn poll_once(
        &self,
        group: &str,
        announcer: &StatusAnnouncer<'_, dyn ProgressReporter + '_>,
        found: &OnceLock<String>,
    ) -> Result<bool> {
        let members = self.instances.list_instances(group).await?;
        let in_service: Vec<&GroupMember> = members.iter().filter(|m| m.is_in_service()).collect();

        match in_service.as_slice() {
            [] => {
                announcer.announce(WAITING_FOR_INSTANCE);
                Ok(false)
            }
            [member] => {
                let id = &member.instance_id;
                announcer.announce(&format!("Waiting for {id} to respond"));
                match self.probe.probe(id).await? {
                    ProbeOutcome::Ready => {
                        let _ = found.set(id.clone());
                        Ok(true)
                    }
                    ProbeOutcome::NotReadyYet => Ok(false),
                }
            }
            many => Err(LifecycleError::UnexpectedTopology {
                group: group.to_string(),
                count: many.len(),
            }
            .into()),
        }
    }
}
