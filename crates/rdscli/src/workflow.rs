//! End-to-end client workflows
//!
//! `connect` runs the whole lifecycle: credentials, stack, activation,
//! acquisition, tunnel and finally the database client. The tunnel is closed
//! on every path once it has been opened.

use crate::acquire::{AcquireConfig, InstanceAcquirer};
use crate::aws::cloudformation::StackEventRecord;
use crate::aws::{
    AwsContext, ControlInvoker, FromAwsContext, GroupClient, SecretsClient, SsmCommandRunner,
    StackClient, get_current_account_id,
};
use crate::config::{AwsConfig, ClientConfig};
use crate::db_client::MysqlClient;
use crate::probe::CommandProbe;
use crate::progress::ProgressReporter;
use crate::reconcile::{Reconciler, StackSpec};
use crate::template::load_template;
use crate::tunnel::{Tunnel, TunnelManager};
use anyhow::{Context, Result};
use rdscli_common::placement::{OUTPUT_AUTOSCALING_GROUP, OUTPUT_CONTROL_FUNCTION};
use rdscli_common::{ControlEvent, Placement};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What to do with the tunnel once it is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Run the database client through it
    Client,
    /// Print the local port and hold the tunnel until Ctrl-C
    Hold,
}

/// Cancels a token on Ctrl-C for as long as it is alive
struct InterruptWatch(JoinHandle<()>);

impl InterruptWatch {
    fn spawn(cancel: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, abandoning the wait");
                cancel.cancel();
            }
        }))
    }
}

impl Drop for InterruptWatch {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Look up a required stack output
pub fn require_output<'a>(
    outputs: &'a HashMap<String, String>,
    stack: &str,
    key: &str,
) -> Result<&'a str> {
    outputs
        .get(key)
        .map(String::as_str)
        .with_context(|| format!("Stack {stack} has no output {key}"))
}

/// Format one stack event the way `events` prints it
pub fn format_event(event: &StackEventRecord) -> String {
    let timestamp = event
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{timestamp} {} {} {}",
        event.logical_id,
        event.status,
        event.reason.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

pub async fn connect(
    config: &ClientConfig,
    mode: SessionMode,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let aws = AwsContext::with_profile(&config.aws.region, config.aws.profile.as_deref()).await;
    get_current_account_id(&aws.sts_client()).await?;

    info!(secret = %config.secret, "Reading database credentials");
    let credentials = SecretsClient::from_context(&aws)
        .db_credentials(&config.secret)
        .await?;

    let stack_name = config.stack_name();
    let template_body = load_template(&config.placement.template)?;
    let spec = StackSpec {
        name: stack_name.clone(),
        template_body,
        parameters: config.placement.placement().stack_parameters(),
    };

    // Ctrl-C stops the stack and instance waits; the tunnel handles it on its own
    let cancel = CancellationToken::new();
    let interrupt = InterruptWatch::spawn(cancel.clone());

    reporter.report("Deploying bastion stack");
    let start = Instant::now();
    let reconciler = Reconciler::new(
        StackClient::from_context(&aws),
        config.timing.stack_wait_timeout,
    )
    .with_cancel(cancel.clone());
    let outcome = reconciler.ensure(&spec).await?;
    info!(
        stack = %stack_name,
        outcome = ?outcome,
        elapsed_secs = start.elapsed().as_secs(),
        "Bastion stack deployed"
    );

    let outputs = reconciler.stacks().outputs(&stack_name).await?;
    let group = require_output(&outputs, &stack_name, OUTPUT_AUTOSCALING_GROUP)?;
    let function = require_output(&outputs, &stack_name, OUTPUT_CONTROL_FUNCTION)?;

    reporter.report("Requesting bastion activation");
    let response = ControlInvoker::from_context(&aws, function)
        .invoke(&ControlEvent::activate())
        .await?;
    info!(function = %function, response = %response, "Activation requested");

    let start = Instant::now();
    let acquirer = InstanceAcquirer::new(
        GroupClient::from_context(&aws),
        CommandProbe::with_timeout(
            SsmCommandRunner::from_context(&aws),
            config.timing.probe_timeout,
        ),
        AcquireConfig::from(&config.timing),
    )
    .with_cancel(cancel);
    let instance_id = acquirer.acquire(group, reporter).await?;
    drop(interrupt);
    info!(
        instance_id = %instance_id,
        elapsed_secs = start.elapsed().as_secs(),
        "Instance acquired"
    );

    let tunnel = TunnelManager::new(config.tunnel.clone())
        .open(&instance_id, &credentials.host, credentials.port)
        .await?;

    let session = match mode {
        SessionMode::Client => MysqlClient::default()
            .run(tunnel.local_port(), &credentials)
            .await
            .map(|status| {
                if !status.success() {
                    warn!(status = %status, "Database client exited with failure");
                }
            }),
        SessionMode::Hold => hold(&tunnel).await,
    };

    let closed = tunnel.close().await;
    session?;
    closed
}

/// Keep the tunnel open until Ctrl-C
async fn hold(tunnel: &Tunnel) -> Result<()> {
    println!("{}", tunnel.local_port());
    info!(
        local_port = tunnel.local_port(),
        "Tunnel open on 127.0.0.1, press Ctrl-C to close"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

/// Delete the bastion stack for `placement`
pub async fn destroy(aws: &AwsConfig, placement: &Placement, timeout: Duration) -> Result<()> {
    let ctx = AwsContext::with_profile(&aws.region, aws.profile.as_deref()).await;
    get_current_account_id(&ctx.sts_client()).await?;

    let stack_name = placement.stack_name();
    let start = Instant::now();
    let cancel = CancellationToken::new();
    let _interrupt = InterruptWatch::spawn(cancel.clone());
    let deleted = Reconciler::new(StackClient::from_context(&ctx), timeout)
        .with_cancel(cancel)
        .destroy(&stack_name)
        .await?;
    if deleted {
        info!(
            stack = %stack_name,
            elapsed_secs = start.elapsed().as_secs(),
            "Bastion stack deleted"
        );
    }
    Ok(())
}

/// Print the event history of the bastion stack for `placement`
pub async fn show_events(aws: &AwsConfig, placement: &Placement) -> Result<()> {
    let ctx = AwsContext::with_profile(&aws.region, aws.profile.as_deref()).await;
    let stack_name = placement.stack_name();

    let events = StackClient::from_context(&ctx).events(&stack_name).await?;
    for event in &events {
        println!("{}", format_event(event));
    }
    Ok(())
}
