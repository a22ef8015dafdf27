//! Lifecycle failure taxonomy
//!
//! These are the failures an operator has to act on. Soft conditions such as
//! an instance that is not reachable yet never leave their polling loop and
//! have no variant here.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// More than one in-service instance; the bastion is meant to be a singleton
    #[error("Expected a single in-service instance in {group}, found {count}")]
    UnexpectedTopology { group: String, count: usize },

    /// No reachable instance before the deadline; retrying later may succeed
    #[error("No reachable instance in {group} after {timeout:?}")]
    Timeout { group: String, timeout: Duration },

    /// The stack ended up in a failed state
    #[error("Stack {stack} is in state {state}")]
    InfraReconcileFailure { stack: String, state: String },

    /// The tunnel process never announced its local port
    #[error("Tunnel to {target} did not report a local port: {reason}")]
    TunnelUnresolved { target: String, reason: String },
}

impl LifecycleError {
    /// Whether running the same workflow again later can succeed unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, LifecycleError::Timeout { .. })
    }
}

/// Whether `err` carries a [`LifecycleError`] worth retrying, at any context depth
pub fn is_transient_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LifecycleError>()
        .is_some_and(LifecycleError::is_transient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_resource() {
        let err = LifecycleError::InfraReconcileFailure {
            stack: "rdscli-1-2".into(),
            state: "ROLLBACK_COMPLETE".into(),
        };
        assert_eq!(err.to_string(), "Stack rdscli-1-2 is in state ROLLBACK_COMPLETE");

        let err = LifecycleError::UnexpectedTopology {
            group: "asg".into(),
            count: 2,
        };
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_only_timeout_is_transient() {
        assert!(
            LifecycleError::Timeout {
                group: "asg".into(),
                timeout: Duration::from_secs(90),
            }
            .is_transient()
        );
        assert!(
            !LifecycleError::TunnelUnresolved {
                target: "i-1".into(),
                reason: "exited".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_transient_failure_found_under_context() {
        let err = anyhow::Error::new(LifecycleError::Timeout {
            group: "asg".into(),
            timeout: Duration::from_secs(90),
        })
        .context("Connecting to rdscli-1-2");
        assert!(is_transient_failure(&err));

        let err = anyhow::Error::new(LifecycleError::UnexpectedTopology {
            group: "asg".into(),
            count: 2,
        });
        assert!(!is_transient_failure(&err));
        assert!(!is_transient_failure(&anyhow::anyhow!("Access denied")));
    }
}
