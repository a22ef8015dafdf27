//! rdscli-control: lifecycle control function for the bastion scaling group
//!
//! Invoked by the on-instance session reporter, the scheduled cleanup rule
//! and the client. Reads one JSON event, applies it and prints the outcome.

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use rdscli_common::ControlEvent;
use rdscli_common::defaults::DEFAULT_IDLE_THRESHOLD_SECS;
use rdscli_control::{AsgClient, ControlConfig, Controller};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rdscli-control")]
#[command(about = "Activity tracking and idle scale-down for the rdscli bastion")]
#[command(version)]
struct Args {
    /// Scaling group holding the activity tags
    #[arg(long, env = "AUTOSCALING_GROUP")]
    autoscaling_group: String,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Idle time in seconds before scaling to zero
    #[arg(long, env = "IDLE_THRESHOLD_SECS", default_value_t = DEFAULT_IDLE_THRESHOLD_SECS)]
    idle_threshold_secs: u64,

    /// Event JSON, e.g. '{"Action": "cleanup"}' (read from stdin if omitted)
    #[arg(long)]
    event: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "RDSCLI_LOG_JSON")]
    log_json: bool,
}

impl From<&Args> for ControlConfig {
    fn from(args: &Args) -> Self {
        Self {
            autoscaling_group: args.autoscaling_group.clone(),
            region: args.region.clone(),
            idle_threshold: Duration::from_secs(args.idle_threshold_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Targets held at warn regardless of the default level
const QUIET_TARGETS: &[&str] = &["aws_config", "aws_sdk", "aws_smithy"];

fn init_tracing(json: bool) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=warn").parse() {
            filter = filter.add_directive(directive);
        }
    }
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_event(arg: Option<&str>) -> Result<ControlEvent> {
    let raw = match arg {
        Some(raw) => raw.to_string(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read event from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Failed to parse event JSON")
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = ControlConfig::from(&args);
    let event = read_event(args.event.as_deref()).await?;
    info!(
        group = %config.autoscaling_group,
        threshold_secs = config.idle_threshold.as_secs(),
        event = ?event,
        "Event received"
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let asg = AsgClient::from_config(&sdk_config, &config.autoscaling_group);
    let controller = Controller::new(asg.clone(), asg, config.policy());

    let outcome = controller.handle(&event, chrono::Utc::now()).await?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
