//! Stack reconciliation
//!
//! Brings the named bastion stack to the desired template and parameters and
//! waits until it settles. Failures are reported, never remediated: a stack
//! in a failed state has to be inspected (`rdscli events`) and destroyed by
//! the operator.

use crate::error::LifecycleError;
use crate::wait::{WaitConfig, wait_for_resource};
use anyhow::{Context, Result};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Desired state of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    pub name: String,
    pub template_body: String,
    pub parameters: Vec<(String, String)>,
}

/// Result of asking for a stack update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// An update is running and must be waited for
    Started,
    /// The stack already matches; nothing to wait for
    NoChanges,
}

/// Coarse classification of a stack status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    /// Any `*_IN_PROGRESS` status
    InProgress,
    /// Created or updated successfully
    Complete,
    /// A previous update failed and was rolled back; the stack still accepts updates
    UpdateRolledBack,
    /// Terminal failure that needs operator attention
    Failed,
    Deleted,
}

impl StackPhase {
    pub fn classify(status: &str) -> Self {
        match status {
            s if s.ends_with("_IN_PROGRESS") => StackPhase::InProgress,
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackPhase::Complete,
            "UPDATE_ROLLBACK_COMPLETE" => StackPhase::UpdateRolledBack,
            "DELETE_COMPLETE" => StackPhase::Deleted,
            _ => StackPhase::Failed,
        }
    }
}

/// Stack provisioning operations, implemented by the CloudFormation client
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
pub trait StackOperations: Send + Sync {
    /// Current status string, `None` if the stack does not exist
    async fn status(&self, name: &str) -> Result<Option<String>>;

    async fn create(&self, spec: &StackSpec) -> Result<()>;

    async fn update(&self, spec: &StackSpec) -> Result<UpdateOutcome>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// What `ensure` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Idempotent "ensure desired state" over [`StackOperations`].
///
/// Not safe for concurrent reconciliation of the same stack.
pub struct Reconciler<S> {
    stacks: S,
    wait: WaitConfig,
    cancel: Option<CancellationToken>,
}

impl<S: StackOperations> Reconciler<S> {
    /// Poll stack status starting at 1s, giving up after `timeout`
    pub fn new(stacks: S, timeout: Duration) -> Self {
        Self {
            stacks,
            wait: WaitConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(5),
                timeout,
                jitter: false,
            },
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn stacks(&self) -> &S {
        &self.stacks
    }

    /// Create or update the stack and wait until it is ready
    pub async fn ensure(&self, spec: &StackSpec) -> Result<ReconcileOutcome> {
        let name = spec.name.as_str();
        let mut status = self.stacks.status(name).await?;

        if status.as_deref().map(StackPhase::classify) == Some(StackPhase::InProgress) {
            info!(stack = %name, status = ?status, "Stack operation in progress, waiting for it to settle");
            status = self.settle(name).await?;
        }

        let Some(status) = status else {
            info!(stack = %name, "Creating stack");
            self.stacks.create(spec).await?;
            self.expect_complete(name).await?;
            return Ok(ReconcileOutcome::Created);
        };

        match StackPhase::classify(&status) {
            StackPhase::Complete | StackPhase::UpdateRolledBack => {}
            StackPhase::Deleted => {
                info!(stack = %name, "Recreating deleted stack");
                self.stacks.create(spec).await?;
                self.expect_complete(name).await?;
                return Ok(ReconcileOutcome::Created);
            }
            StackPhase::Failed | StackPhase::InProgress => {
                return Err(LifecycleError::InfraReconcileFailure {
                    stack: name.to_string(),
                    state: status,
                }
                .into());
            }
        }

        info!(stack = %name, status = %status, "Stack exists, updating");
        match self.stacks.update(spec).await? {
            UpdateOutcome::NoChanges => {
                info!(stack = %name, "Stack is up to date");
                Ok(ReconcileOutcome::Unchanged)
            }
            UpdateOutcome::Started => {
                self.expect_complete(name).await?;
                Ok(ReconcileOutcome::Updated)
            }
        }
    }

    /// Delete the stack and wait until it is gone.
    ///
    /// Returns `false` when there was no stack to delete.
    pub async fn destroy(&self, name: &str) -> Result<bool> {
        if self.stacks.status(name).await?.is_none() {
            info!(stack = %name, "Stack does not exist, nothing to delete");
            return Ok(false);
        }

        info!(stack = %name, "Deleting stack");
        self.stacks.delete(name).await?;

        match self.settle(name).await? {
            None => Ok(true),
            Some(status) if StackPhase::classify(&status) == StackPhase::Deleted => Ok(true),
            Some(status) => Err(LifecycleError::InfraReconcileFailure {
                stack: name.to_string(),
                state: status,
            }
            .into()),
        }
    }

    /// Wait for a running operation and require that it completed
    async fn expect_complete(&self, name: &str) -> Result<()> {
        match self.settle(name).await? {
            Some(status) if StackPhase::classify(&status) == StackPhase::Complete => {
                info!(stack = %name, status = %status, "Stack ready");
                Ok(())
            }
            status => Err(LifecycleError::InfraReconcileFailure {
                stack: name.to_string(),
                state: status.unwrap_or_else(|| "DOES_NOT_EXIST".to_string()),
            }
            .into()),
        }
    }

    /// Poll until the stack leaves every in-progress state; `None` if it vanished
    async fn settle(&self, name: &str) -> Result<Option<String>> {
        let last: Mutex<Option<String>> = Mutex::new(None);

        wait_for_resource(
            self.wait.clone(),
            self.cancel.as_ref(),
            || {
                let last = &last;
                async move {
                    let status = self.stacks.status(name).await?;
                    let settled = status.as_deref().map(StackPhase::classify)
                        != Some(StackPhase::InProgress);
                    debug!(stack = %name, status = ?status, settled, "Stack status");
                    *last.lock().unwrap_or_else(PoisonError::into_inner) = status;
                    Ok(settled)
                }
            },
            &format!("stack {name}"),
        )
        .await
        .with_context(|| format!("Stack {name} did not settle"))?;

        Ok(last.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
