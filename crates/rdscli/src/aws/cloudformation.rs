//! CloudFormation client for the bastion stack

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::{AwsError, classify_sdk_error};
use crate::reconcile::{StackOperations, StackSpec, UpdateOutcome};
use anyhow::{Context, Result};
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack};
use chrono::{DateTime, Utc};
use rdscli_common::defaults::DEFAULT_STACK_TIMEOUT_MINUTES;
use std::collections::HashMap;
use tracing::debug;

/// One entry of a stack's event history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEventRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub logical_id: String,
    pub status: String,
    pub reason: Option<String>,
}

/// CloudFormation client
#[derive(Debug, Clone)]
pub struct StackClient {
    client: Client,
}

impl FromAwsContext for StackClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudformation_client(),
        }
    }
}

impl StackClient {
    /// Describe a stack, returning `None` if it does not exist
    async fn describe(&self, name: &str) -> Result<Option<Stack>> {
        let response = match self.client.describe_stacks().stack_name(name).send().await {
            Ok(response) => response,
            Err(e) => {
                let classified = classify_sdk_error(&e);
                if classified.is_not_found() {
                    return Ok(None);
                }
                return Err(e).with_context(|| format!("Failed to describe stack {name}"));
            }
        };

        let mut stacks = response.stacks.unwrap_or_default();
        if stacks.len() > 1 {
            anyhow::bail!("Wrong number of stacks named {name}: {}", stacks.len());
        }
        Ok(stacks.pop())
    }

    /// Stack outputs as a key/value map
    pub async fn outputs(&self, name: &str) -> Result<HashMap<String, String>> {
        let stack = self
            .describe(name)
            .await?
            .with_context(|| format!("Stack {name} does not exist"))?;

        Ok(stack
            .outputs()
            .iter()
            .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
            .collect())
    }

    /// Event history, most recent first
    pub async fn events(&self, name: &str) -> Result<Vec<StackEventRecord>> {
        let response = self
            .client
            .describe_stack_events()
            .stack_name(name)
            .send()
            .await
            .with_context(|| format!("Failed to describe events of stack {name}"))?;

        Ok(response
            .stack_events()
            .iter()
            .map(|e| StackEventRecord {
                timestamp: e.timestamp().and_then(|t| {
                    DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())
                }),
                logical_id: e.logical_resource_id().unwrap_or_default().to_string(),
                status: e
                    .resource_status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                reason: e.resource_status_reason().map(str::to_string),
            })
            .collect())
    }
}

fn parameters(spec: &StackSpec) -> Vec<Parameter> {
    spec.parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

impl StackOperations for StackClient {
    async fn status(&self, name: &str) -> Result<Option<String>> {
        Ok(self.describe(name).await?.map(|stack| {
            stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default()
        }))
    }

    async fn create(&self, spec: &StackSpec) -> Result<()> {
        let response = self
            .client
            .create_stack()
            .stack_name(&spec.name)
            .template_body(&spec.template_body)
            .set_parameters(Some(parameters(spec)))
            .timeout_in_minutes(DEFAULT_STACK_TIMEOUT_MINUTES)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .with_context(|| format!("Failed to create stack {}", spec.name))?;

        debug!(stack = %spec.name, stack_id = ?response.stack_id(), "Stack creation started");
        Ok(())
    }

    async fn update(&self, spec: &StackSpec) -> Result<UpdateOutcome> {
        let result = self
            .client
            .update_stack()
            .stack_name(&spec.name)
            .template_body(&spec.template_body)
            .set_parameters(Some(parameters(spec)))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!(stack = %spec.name, stack_id = ?response.stack_id(), "Stack update started");
                Ok(UpdateOutcome::Started)
            }
            Err(e) => match classify_sdk_error(&e) {
                AwsError::NoChanges => Ok(UpdateOutcome::NoChanges),
                _ => Err(e).with_context(|| format!("Failed to update stack {}", spec.name)),
            },
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .with_context(|| format!("Failed to delete stack {name}"))?;
        Ok(())
    }
}
