//! Desired-capacity control for the scaling group

use anyhow::Result;

/// Trait for capacity operations that can be mocked in tests.
///
/// Setting capacity is level-triggered: repeating the same value is a no-op
/// on the scaling group side.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait CapacityControl: Send + Sync {
    /// Current desired capacity of the group
    async fn desired_capacity(&self) -> Result<i32>;

    /// Set the desired capacity of the group
    async fn set_desired_capacity(&self, capacity: i32) -> Result<()>;
}
