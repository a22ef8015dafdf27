//! rdscli: on-demand bastion tunnel into a private database
//!
//! Deploys (or reuses) the bastion stack for a security group and subnet,
//! brings its instance up, and connects through an SSM port-forwarding
//! session.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rdscli::config::{AwsConfig, ClientConfig, PlacementConfig, TimingConfig, TunnelConfig};
use rdscli::error::is_transient_failure;
use rdscli::progress::{ConsoleReporter, LogReporter, ProgressReporter};
use rdscli::workflow::{self, SessionMode};
use rdscli_common::Placement;
use rdscli_common::defaults::{
    DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_REGION, DEFAULT_STACK_WAIT_TIMEOUT_SECS,
    DEFAULT_TUNNEL_STARTUP_TIMEOUT_SECS,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rdscli")]
#[command(about = "Command-line client for databases behind an on-demand bastion")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// AWS selection shared by all commands
#[derive(clap::Args, Debug)]
struct AwsArgs {
    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,
}

/// Network placement of the bastion
#[derive(clap::Args, Debug)]
struct PlacementArgs {
    /// Security group of the bastion instance (must be allowed into the database)
    #[arg(long, env = "RDSCLI_SECURITY_GROUP")]
    security_group: String,

    /// Subnet to launch the bastion instance in
    #[arg(long, env = "RDSCLI_SUBNET")]
    subnet: String,
}

/// Arguments for commands that open a tunnel
#[derive(clap::Args, Debug)]
struct SessionArgs {
    /// Name of a secret in AWS Secrets Manager with the database credentials
    #[arg(long, value_name = "NAME")]
    secret: String,

    #[command(flatten)]
    placement: PlacementArgs,

    #[command(flatten)]
    aws: AwsArgs,

    /// Bastion stack template (included files are looked up next to it)
    #[arg(long, env = "RDSCLI_TEMPLATE", default_value = "files/template.yaml")]
    template: PathBuf,

    /// Seconds to wait for a reachable instance
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS)]
    acquire_timeout: u64,

    /// Seconds to wait for stack operations
    #[arg(long, default_value_t = DEFAULT_STACK_WAIT_TIMEOUT_SECS)]
    stack_timeout: u64,

    /// Seconds to wait for the tunnel to open its local port
    #[arg(long, default_value_t = DEFAULT_TUNNEL_STARTUP_TIMEOUT_SECS)]
    tunnel_timeout: u64,
}

impl From<SessionArgs> for ClientConfig {
    fn from(args: SessionArgs) -> Self {
        Self {
            secret: args.secret,
            aws: args.aws.into(),
            placement: PlacementConfig {
                security_group_id: args.placement.security_group,
                subnet_id: args.placement.subnet,
                template: args.template,
            },
            tunnel: TunnelConfig {
                startup_timeout: Duration::from_secs(args.tunnel_timeout),
                ..TunnelConfig::default()
            },
            timing: TimingConfig {
                acquire_timeout: Duration::from_secs(args.acquire_timeout),
                stack_wait_timeout: Duration::from_secs(args.stack_timeout),
                ..TimingConfig::default()
            },
        }
    }
}

impl From<AwsArgs> for AwsConfig {
    fn from(args: AwsArgs) -> Self {
        Self {
            region: args.region,
            profile: args.aws_profile,
        }
    }
}

impl From<PlacementArgs> for Placement {
    fn from(args: PlacementArgs) -> Self {
        Placement::new(args.security_group, args.subnet)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy and activate the bastion, then run mysql through it
    Connect(Box<SessionArgs>),

    /// Deploy and activate the bastion, then hold a tunnel open until Ctrl-C
    Tunnel(Box<SessionArgs>),

    /// Delete the bastion stack
    Destroy {
        #[command(flatten)]
        placement: PlacementArgs,

        #[command(flatten)]
        aws: AwsArgs,

        /// Seconds to wait for the deletion
        #[arg(long, default_value_t = DEFAULT_STACK_WAIT_TIMEOUT_SECS)]
        stack_timeout: u64,
    },

    /// Print the bastion stack's events
    Events {
        #[command(flatten)]
        placement: PlacementArgs,

        #[command(flatten)]
        aws: AwsArgs,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if is_transient_failure(e) {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mThe bastion may still be starting; running the command again can succeed\x1b[0m"
        );
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Targets held at warn regardless of the default level
const QUIET_TARGETS: &[&str] = &["aws_config", "aws_sdk", "aws_smithy"];

fn init_tracing() {
    // Reduce noise from AWS SDK (show only warnings and errors)
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=warn").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Plain progress lines on a terminal, log events otherwise
fn reporter() -> &'static dyn ProgressReporter {
    if std::io::stderr().is_terminal() {
        &ConsoleReporter
    } else {
        &LogReporter
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Connect(session) => {
            let config: ClientConfig = (*session).into();
            info!(stack = %config.stack_name(), region = %config.aws.region, "Connecting");
            workflow::connect(&config, SessionMode::Client, reporter()).await?;
        }

        Command::Tunnel(session) => {
            let config: ClientConfig = (*session).into();
            info!(stack = %config.stack_name(), region = %config.aws.region, "Opening tunnel");
            workflow::connect(&config, SessionMode::Hold, reporter()).await?;
        }

        Command::Destroy {
            placement,
            aws,
            stack_timeout,
        } => {
            workflow::destroy(
                &aws.into(),
                &placement.into(),
                Duration::from_secs(stack_timeout),
            )
            .await?;
        }

        Command::Events { placement, aws } => {
            workflow::show_events(&aws.into(), &placement.into()).await?;
        }
    }

    Ok(())
}
