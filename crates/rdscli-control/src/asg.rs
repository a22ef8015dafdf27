//! Scaling group backend for the activity store and capacity control

use crate::capacity::CapacityControl;
use crate::store::{ActivityRecord, ActivityStore};
use anyhow::{Context, Result};
use aws_sdk_autoscaling::Client;
use aws_sdk_autoscaling::types::{Filter, Tag};
use chrono::{DateTime, Utc};
use rdscli_common::ActivityKey;
use rdscli_common::tags::format_timestamp;
use tracing::debug;

/// Resource type string the tag API expects for scaling groups
const RESOURCE_TYPE: &str = "auto-scaling-group";

/// Activity tag on `group`; deletions only need the key, so `value` is optional
fn activity_tag(group: &str, key: ActivityKey, value: Option<String>) -> Result<Tag> {
    Ok(Tag::builder()
        .resource_id(group)
        .resource_type(RESOURCE_TYPE)
        .key(key.as_str())
        .set_value(value)
        .propagate_at_launch(false)
        .build())
}

/// Scaling group client scoped to one group
#[derive(Debug, Clone)]
pub struct AsgClient {
    client: Client,
    group: String,
}

impl AsgClient {
    pub fn new(client: Client, group: impl Into<String>) -> Self {
        Self {
            client,
            group: group.into(),
        }
    }

    /// Create a client from a loaded SDK config
    pub fn from_config(config: &aws_config::SdkConfig, group: impl Into<String>) -> Self {
        Self::new(Client::new(config), group)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// All tags on the group as key/value pairs
    async fn describe_tags(&self) -> Result<Vec<(String, String)>> {
        let response = self
            .client
            .describe_tags()
            .filters(
                Filter::builder()
                    .name(RESOURCE_TYPE)
                    .values(&self.group)
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("Failed to describe tags of {}", self.group))?;

        Ok(response
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect())
    }
}

impl ActivityStore for AsgClient {
    async fn get(&self, key: ActivityKey) -> Result<Option<DateTime<Utc>>> {
        Ok(self.record().await?.get(key))
    }

    async fn set(&self, key: ActivityKey, value: DateTime<Utc>) -> Result<()> {
        let formatted = format_timestamp(value);
        debug!(group = %self.group, key = %key, value = %formatted, "Writing tag");

        self.client
            .create_or_update_tags()
            .tags(activity_tag(&self.group, key, Some(formatted))?)
            .send()
            .await
            .with_context(|| format!("Failed to write tag {key} on {}", self.group))?;
        Ok(())
    }

    async fn clear(&self, key: ActivityKey) -> Result<()> {
        debug!(group = %self.group, key = %key, "Deleting tag");
        self.client
            .delete_tags()
            .tags(activity_tag(&self.group, key, None)?)
            .send()
            .await
            .with_context(|| format!("Failed to delete tag {key} on {}", self.group))?;
        Ok(())
    }

    async fn record(&self) -> Result<ActivityRecord> {
        let tags = self.describe_tags().await?;
        Ok(ActivityRecord::from_tags(
            tags.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }
}

impl CapacityControl for AsgClient {
    async fn desired_capacity(&self) -> Result<i32> {
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(&self.group)
            .send()
            .await
            .with_context(|| format!("Failed to describe scaling group {}", self.group))?;

        let groups = response.auto_scaling_groups();
        if groups.len() != 1 {
            anyhow::bail!(
                "Wrong number of scaling groups named {}: {}",
                self.group,
                groups.len()
            );
        }

        groups[0]
            .desired_capacity()
            .with_context(|| format!("Scaling group {} has no desired capacity", self.group))
    }

    async fn set_desired_capacity(&self, capacity: i32) -> Result<()> {
        debug!(group = %self.group, capacity, "Setting desired capacity");
        self.client
            .set_desired_capacity()
            .auto_scaling_group_name(&self.group)
            .desired_capacity(capacity)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to set desired capacity of {} to {capacity}",
                    self.group
                )
            })?;
        Ok(())
    }
}
