//! Remote commands through SSM Run Command

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::{AwsError, classify_sdk_error};
use crate::wait::{WaitConfig, wait_for_resource};
use anyhow::Context;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::types::CommandInvocationStatus;
use rdscli_common::defaults::DEFAULT_COMMAND_POLL_INTERVAL_MS;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Document that runs a list of shell commands
const SHELL_DOCUMENT: &str = "AWS-RunShellScript";

/// SSM rejects command timeouts below this
const MIN_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Final state of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: String,
    pub response_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    /// The instance is up but not yet registered with SSM
    #[error("Instance {0} is not ready for remote commands")]
    NotReadyYet(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Runs a short shell script on an instance and waits for it to finish
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait RemoteCommand: Send + Sync {
    async fn run(
        &self,
        instance_id: &str,
        commands: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// SSM-backed [`RemoteCommand`]
#[derive(Debug, Clone)]
pub struct SsmCommandRunner {
    client: Client,
    poll_interval: Duration,
}

impl FromAwsContext for SsmCommandRunner {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ssm_client(),
            poll_interval: Duration::from_millis(DEFAULT_COMMAND_POLL_INTERVAL_MS),
        }
    }
}

fn is_terminal(status: &CommandInvocationStatus) -> bool {
    matches!(
        status,
        CommandInvocationStatus::Success
            | CommandInvocationStatus::Failed
            | CommandInvocationStatus::Cancelled
            | CommandInvocationStatus::TimedOut
    )
}

impl SsmCommandRunner {
    async fn send(
        &self,
        instance_id: &str,
        commands: Vec<String>,
        timeout: Duration,
    ) -> Result<String, CommandError> {
        let timeout_secs = timeout.as_secs().max(MIN_COMMAND_TIMEOUT_SECS);
        let result = self
            .client
            .send_command()
            .instance_ids(instance_id)
            .document_name(SHELL_DOCUMENT)
            .parameters("commands", commands)
            .timeout_seconds(i32::try_from(timeout_secs).unwrap_or(i32::MAX))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return Err(match classify_sdk_error(&e) {
                    AwsError::InstanceNotReady { .. } => {
                        CommandError::NotReadyYet(instance_id.to_string())
                    }
                    _ => CommandError::Failed(
                        anyhow::Error::new(e)
                            .context(format!("Failed to send command to {instance_id}")),
                    ),
                });
            }
        };

        let command_id = response
            .command()
            .and_then(|c| c.command_id())
            .context("SendCommand returned no command id")?;
        Ok(command_id.to_string())
    }
}

impl RemoteCommand for SsmCommandRunner {
    async fn run(
        &self,
        instance_id: &str,
        commands: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let command_id = self.send(instance_id, commands, timeout).await?;
        debug!(instance_id, command_id = %command_id, "Command sent");

        let output: Mutex<Option<CommandOutput>> = Mutex::new(None);

        wait_for_resource(
            WaitConfig::fixed(self.poll_interval, timeout),
            None,
            || {
                let output = &output;
                let command_id = command_id.as_str();
                async move {
                    let result = self
                        .client
                        .get_command_invocation()
                        .command_id(command_id)
                        .instance_id(instance_id)
                        .send()
                        .await;

                    let invocation = match result {
                        Ok(invocation) => invocation,
                        Err(e) => {
                            let classified = classify_sdk_error(&e);
                            if classified.is_retryable() {
                                debug!(command_id, error = %classified, "Invocation not readable yet");
                                return Ok(false);
                            }
                            return Err(anyhow::Error::new(e)
                                .context(format!("Failed to get invocation of {command_id}")));
                        }
                    };

                    let Some(status) = invocation.status() else {
                        return Ok(false);
                    };
                    if !is_terminal(status) {
                        return Ok(false);
                    }

                    *output.lock().unwrap_or_else(PoisonError::into_inner) = Some(CommandOutput {
                        status: status.as_str().to_string(),
                        response_code: invocation.response_code(),
                        stdout: invocation
                            .standard_output_content()
                            .unwrap_or_default()
                            .to_string(),
                        stderr: invocation
                            .standard_error_content()
                            .unwrap_or_default()
                            .to_string(),
                    });
                    Ok(true)
                }
            },
            &format!("command {command_id}"),
        )
        .await
        .with_context(|| format!("Command {command_id} on {instance_id} did not finish"))?;

        let output = output
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .context("Command finished without output")?;

        debug!(
            instance_id,
            command_id = %command_id,
            status = %output.status,
            response_code = output.response_code,
            "Command finished"
        );

        if output.status != CommandInvocationStatus::Success.as_str() {
            return Err(CommandError::Failed(anyhow::anyhow!(
                "Command {command_id} on {instance_id} finished with status {} (exit {}): {}",
                output.status,
                output.response_code,
                output.stderr.trim()
            )));
        }

        Ok(output)
    }
}
