//! Port-forwarding tunnel through the bastion
//!
//! The tunnel is an `aws ssm start-session` process which in turn runs the
//! session manager plugin. Both live in a dedicated process group so closing
//! the tunnel can signal them together; terminating only the CLI would leave
//! the plugin (and the forwarded port) behind.

use crate::config::TunnelConfig;
use crate::error::LifecycleError;
use anyhow::{Context, Result};
use regex::Regex;
use std::io;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Session document forwarding a local port to a host reachable from the instance
pub const PORT_FORWARDING_DOCUMENT: &str = "AWS-StartPortForwardingSessionToRemoteHost";

static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Port (\d+) opened for sessionId ").expect("port pattern is valid")
});

/// Interval for checking whether the process group is gone during close
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Extract the local port from a session CLI output line
pub fn parse_port_line(line: &str) -> Option<u16> {
    PORT_RE.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Arguments for a port-forwarding session to `host:port` through `instance_id`
pub fn session_args(instance_id: &str, remote_host: &str, remote_port: u16) -> Vec<String> {
    let parameters = serde_json::json!({
        "host": [remote_host],
        "portNumber": [remote_port.to_string()],
        "localPortNumber": ["0"],
    });

    vec![
        "ssm".to_string(),
        "start-session".to_string(),
        "--document-name".to_string(),
        PORT_FORWARDING_DOCUMENT.to_string(),
        "--parameters".to_string(),
        parameters.to_string(),
        "--target".to_string(),
        instance_id.to_string(),
    ]
}

/// Send `signal` to every process in group `pgid`; a vanished group is not an error
fn signal_group(pgid: i32, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Ok(());
    }
    // SAFETY: kill has no memory-safety preconditions; a negative pid
    // addresses the process group, and pgid > 0 keeps us out of our own group.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// Whether any process of group `pgid` still exists
pub fn group_alive(pgid: i32) -> bool {
    if pgid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence and permission
    unsafe { libc::kill(-pgid, 0) == 0 }
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL whatever is left
async fn terminate_group(child: &mut Child, pgid: i32, grace: Duration) -> io::Result<()> {
    signal_group(pgid, libc::SIGTERM)?;
    reap_group(child, pgid, grace).await
}

/// Wait up to `grace` for an already signalled group, SIGKILL the rest and reap the leader
async fn reap_group(child: &mut Child, pgid: i32, grace: Duration) -> io::Result<()> {
    let deadline = Instant::now() + grace;
    if tokio::time::timeout_at(deadline, child.wait()).await.is_err() {
        debug!(pgid, "Tunnel process still running after SIGTERM");
    }
    while group_alive(pgid) && Instant::now() < deadline {
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }

    if group_alive(pgid) {
        warn!(pgid, grace_ms = grace.as_millis(), "Tunnel did not exit after SIGTERM, sending SIGKILL");
        signal_group(pgid, libc::SIGKILL)?;
    }

    // Reap the leader so it does not linger as a zombie
    child.wait().await?;
    Ok(())
}

/// Opens tunnels with a fixed session CLI and timing
#[derive(Debug, Clone)]
pub struct TunnelManager {
    config: TunnelConfig,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    /// Start a session forwarding a local port to `remote_host:remote_port`.
    ///
    /// Fails with [`LifecycleError::TunnelUnresolved`] when the session exits
    /// or stays silent past the startup timeout before announcing its port;
    /// the process group is torn down in that case.
    pub async fn open(&self, instance_id: &str, remote_host: &str, remote_port: u16) -> Result<Tunnel> {
        let args = session_args(instance_id, remote_host, remote_port);
        info!(
            program = %self.config.program,
            instance_id = %instance_id,
            remote = %format!("{remote_host}:{remote_port}"),
            "Opening tunnel"
        );
        debug!(args = ?args, "Tunnel command");

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.config.program))?;

        // process_group(0) makes the child its own group leader
        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .context("Tunnel process exited before it could be tracked")?;
        let stdout = child
            .stdout
            .take()
            .context("Tunnel process stdout was not captured")?;
        let mut lines = BufReader::new(stdout).lines();

        let announced = tokio::time::timeout(self.config.startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                debug!(line = %line, "Tunnel output");
                if let Some(port) = parse_port_line(&line) {
                    return Ok(Some(port));
                }
            }
            Ok::<_, io::Error>(None)
        })
        .await;

        let reason = match announced {
            Ok(Ok(Some(local_port))) => {
                info!(local_port, pgid, "Tunnel ready");
                return Ok(Tunnel {
                    local_port,
                    pgid,
                    grace: self.config.close_grace,
                    child: Some(child),
                    drain: Some(tokio::spawn(drain_output(lines))),
                });
            }
            Ok(Ok(None)) => "session exited before opening a port".to_string(),
            Ok(Err(e)) => format!("failed to read session output: {e}"),
            Err(_) => format!(
                "no port announced within {:?}",
                self.config.startup_timeout
            ),
        };

        warn!(instance_id = %instance_id, reason = %reason, "Tunnel failed to start");
        if let Err(e) = terminate_group(&mut child, pgid, self.config.close_grace).await {
            warn!(pgid, error = %e, "Failed to tear down tunnel process group");
        }

        Err(LifecycleError::TunnelUnresolved {
            target: instance_id.to_string(),
            reason,
        }
        .into())
    }
}

async fn drain_output(mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "Tunnel output");
    }
}

/// An open tunnel.
///
/// Close it with [`Tunnel::close`]; dropping it unclosed still terminates
/// the process group, without waiting for it.
#[derive(Debug)]
pub struct Tunnel {
    local_port: u16,
    pgid: i32,
    grace: Duration,
    child: Option<Child>,
    drain: Option<JoinHandle<()>>,
}

impl Tunnel {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Process group holding the session CLI and its plugin
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Terminate the process group, waiting for it to exit.
    ///
    /// On failure the child stays attached, so dropping the tunnel still
    /// tears the group down.
    pub async fn close(mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            terminate_group(child, self.pgid, self.grace)
                .await
                .with_context(|| format!("Failed to terminate tunnel process group {}", self.pgid))?;
            self.child = None;
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        info!(local_port = self.local_port, "Tunnel closed");
        Ok(())
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }

        let pgid = self.pgid;
        warn!(pgid, "Tunnel dropped without close, terminating");
        if let Err(e) = signal_group(pgid, libc::SIGTERM) {
            warn!(pgid, error = %e, "Failed to signal tunnel process group");
        }

        let grace = self.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = reap_group(&mut child, pgid, grace).await {
                        warn!(pgid, error = %e, "Failed to reap dropped tunnel");
                    }
                });
            }
            Err(_) => {
                // No runtime to wait on; kill_on_drop takes the leader down
                let _ = signal_group(pgid, libc::SIGKILL);
            }
        }
    }
}
