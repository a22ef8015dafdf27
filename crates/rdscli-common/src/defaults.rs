//! Default configuration values shared between the client and control function
//!
//! These constants keep the two sides of the lifecycle in agreement.

/// Default AWS region
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Default idle threshold in seconds before the instance is scaled to zero.
///
/// The deployed cleanup logic has always enforced ten minutes even though
/// its documentation talked about an hour; the enforced value wins.
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 600;

/// Default deadline for acquiring a reachable instance
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 90;

/// Default delay between instance acquisition polls
pub const DEFAULT_ACQUIRE_POLL_INTERVAL_MS: u64 = 1000;

/// Default timeout for the liveness probe command
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Default delay between remote command status polls
pub const DEFAULT_COMMAND_POLL_INTERVAL_MS: u64 = 500;

/// Provisioning timeout passed to the stack on creation
pub const DEFAULT_STACK_TIMEOUT_MINUTES: i32 = 5;

/// Default client-side limit for waiting on stack operations
pub const DEFAULT_STACK_WAIT_TIMEOUT_SECS: u64 = 900;

/// Default time allowed for the tunnel to announce its local port
pub const DEFAULT_TUNNEL_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Grace period between SIGTERM and SIGKILL when closing a tunnel
pub const DEFAULT_TUNNEL_CLOSE_GRACE_MS: u64 = 3000;

/// Default database port on the remote host
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Prefix for derived stack names
pub const STACK_NAME_PREFIX: &str = "rdscli";

// Serde default functions for struct field defaults

/// Returns the default database port
pub fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}
