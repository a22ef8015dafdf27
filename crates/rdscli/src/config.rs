//! Configuration types for the client

use rdscli_common::Placement;
use rdscli_common::defaults::{
    DEFAULT_ACQUIRE_POLL_INTERVAL_MS, DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_STACK_WAIT_TIMEOUT_SECS, DEFAULT_TUNNEL_CLOSE_GRACE_MS,
    DEFAULT_TUNNEL_STARTUP_TIMEOUT_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// AWS credentials and region selection
#[derive(Debug, Clone)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub profile: Option<String>,
}

/// Where the bastion runs and what it is built from
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    pub security_group_id: String,
    pub subnet_id: String,
    /// Stack template; included files are looked up next to it
    pub template: PathBuf,
}

impl PlacementConfig {
    pub fn placement(&self) -> Placement {
        Placement::new(&self.security_group_id, &self.subnet_id)
    }
}

/// Tunnel process settings
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Session CLI executable
    pub program: String,
    /// How long the tunnel may take to announce its local port
    pub startup_timeout: Duration,
    /// Time between SIGTERM and SIGKILL on close
    pub close_grace: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            startup_timeout: Duration::from_secs(DEFAULT_TUNNEL_STARTUP_TIMEOUT_SECS),
            close_grace: Duration::from_millis(DEFAULT_TUNNEL_CLOSE_GRACE_MS),
        }
    }
}

/// Polling cadences and deadlines
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub acquire_timeout: Duration,
    pub acquire_poll_interval: Duration,
    pub probe_timeout: Duration,
    pub stack_wait_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            acquire_poll_interval: Duration::from_millis(DEFAULT_ACQUIRE_POLL_INTERVAL_MS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            stack_wait_timeout: Duration::from_secs(DEFAULT_STACK_WAIT_TIMEOUT_SECS),
        }
    }
}

/// Configuration for a `connect` or `tunnel` run
///
/// Composed of focused sub-configs, built from the command line in `main`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Secrets Manager secret holding the database credentials
    pub secret: String,
    pub aws: AwsConfig,
    pub placement: PlacementConfig,
    pub tunnel: TunnelConfig,
    pub timing: TimingConfig,
}

impl ClientConfig {
    pub fn stack_name(&self) -> String {
        self.placement.placement().stack_name()
    }
}
