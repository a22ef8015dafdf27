//! Control entry point: dispatches events to the activity store and policy

use crate::capacity::CapacityControl;
use crate::policy::IdlePolicy;
use crate::store::ActivityStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rdscli_common::{ActivityKey, ControlEvent, EventKind, Outcome};
use tracing::info;

/// Stateless event dispatcher.
///
/// Only the idle policy ever lowers capacity, and only `activate` raises it.
pub struct Controller<S, C> {
    store: S,
    capacity: C,
    policy: IdlePolicy,
}

impl<S: ActivityStore, C: CapacityControl> Controller<S, C> {
    pub fn new(store: S, capacity: C, policy: IdlePolicy) -> Self {
        Self {
            store,
            capacity,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn capacity(&self) -> &C {
        &self.capacity
    }

    /// Handle one event.
    ///
    /// Fails with [`rdscli_common::InvalidEvent`] (downcastable from the
    /// returned error) for a missing or unknown action.
    pub async fn handle(&self, event: &ControlEvent, now: DateTime<Utc>) -> Result<Outcome> {
        let kind = event.kind()?;
        info!(event = ?kind, "Handling control event");

        match kind {
            EventKind::Report { active_sessions } if active_sessions > 0 => {
                self.store
                    .set(ActivityKey::LastActivity, now)
                    .await
                    .context("Failed to record activity")?;
                Ok(Outcome::ActivityRecorded)
            }
            EventKind::Report { .. } | EventKind::Cleanup => {
                self.policy.run(&self.store, &self.capacity, now).await
            }
            EventKind::Activate => self.activate(now).await,
        }
    }

    /// Bring the instance up.
    ///
    /// When the group is at zero this starts a new idle episode, so the
    /// previous episode's `FirstCleanup` anchor is cleared before capacity
    /// is raised.
    async fn activate(&self, now: DateTime<Utc>) -> Result<Outcome> {
        self.store
            .set(ActivityKey::LastRequest, now)
            .await
            .context("Failed to record activation request")?;

        let current = self
            .capacity
            .desired_capacity()
            .await
            .context("Failed to read desired capacity")?;

        let rearmed = current == 0;
        if rearmed {
            info!("Group is scaled down, re-arming idle anchor");
            self.store
                .clear(ActivityKey::FirstCleanup)
                .await
                .context("Failed to clear FirstCleanup")?;
        }

        self.capacity
            .set_desired_capacity(1)
            .await
            .context("Failed to set desired capacity to 1")?;

        info!(previous_capacity = current, "Activation requested");
        Ok(Outcome::Activated { rearmed })
    }
}
