//! Scaling group instance discovery

use crate::acquire::{GroupInstances, GroupMember};
use crate::aws::context::{AwsContext, FromAwsContext};
use anyhow::{Context, Result};
use aws_sdk_autoscaling::Client;
use tracing::debug;

/// AutoScaling client used by the client side to find the bastion
#[derive(Debug, Clone)]
pub struct GroupClient {
    client: Client,
}

impl FromAwsContext for GroupClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }
}

impl GroupInstances for GroupClient {
    async fn list_instances(&self, group: &str) -> Result<Vec<GroupMember>> {
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group)
            .send()
            .await
            .with_context(|| format!("Failed to describe scaling group {group}"))?;

        let groups = response.auto_scaling_groups();
        if groups.len() != 1 {
            anyhow::bail!("Wrong number of scaling groups named {group}: {}", groups.len());
        }

        let members: Vec<GroupMember> = groups[0]
            .instances()
            .iter()
            .filter_map(|i| {
                Some(GroupMember {
                    instance_id: i.instance_id()?.to_string(),
                    lifecycle_state: i.lifecycle_state()?.as_str().to_string(),
                })
            })
            .collect();

        debug!(group = %group, members = members.len(), "Listed scaling group instances");
        Ok(members)
    }
}
