//! Stand-in for the session CLI in tunnel tests
//!
//! A stub is a shell script that records its arguments, starts a helper
//! process in its own process group (like the session manager plugin the
//! real CLI starts) and then behaves as requested.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Session id the stubs announce
pub const STUB_SESSION_ID: &str = "test-0123456789abcdef0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Announce `port` and wait for the helper
    Announce { port: u16 },
    /// Like `Announce`, but the helper ignores SIGTERM
    AnnounceStubborn { port: u16 },
    /// Print a line and exit without announcing a port
    ExitEarly,
    /// Print nothing and wait for the helper
    Silent,
}

#[derive(Debug)]
pub struct TunnelStub {
    dir: TempDir,
    program: PathBuf,
}

impl TunnelStub {
    pub fn new(behavior: StubBehavior) -> io::Result<Self> {
        let dir = TempDir::new()?;
        let program = dir.path().join("session-cli");
        let args_file = dir.path().join("args");
        let pid_file = dir.path().join("helper.pid");

        let (ignore_term, restore_term) = match behavior {
            StubBehavior::AnnounceStubborn { .. } => ("trap '' TERM\n", "trap - TERM\n"),
            _ => ("", ""),
        };
        let body = match behavior {
            StubBehavior::Announce { port } | StubBehavior::AnnounceStubborn { port } => format!(
                "echo 'Starting session with SessionId: {STUB_SESSION_ID}'\n\
                 echo 'Port {port} opened for sessionId {STUB_SESSION_ID}.'\n\
                 echo 'Waiting for connections...'\n\
                 wait\n"
            ),
            StubBehavior::ExitEarly => "echo 'An error occurred (TargetNotConnected)'\nexit 255\n".to_string(),
            StubBehavior::Silent => "wait\n".to_string(),
        };

        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$@\" > '{args}'\n\
             {ignore_term}\
             sleep 300 > /dev/null 2>&1 &\n\
             echo $! > '{pid}'\n\
             {restore_term}\
             {body}",
            args = args_file.display(),
            pid = pid_file.display(),
        );

        fs::write(&program, script)?;
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))?;
        Ok(Self { dir, program })
    }

    /// Path to pass as the session CLI program
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments of the last invocation, one per element
    pub fn recorded_args(&self) -> io::Result<Vec<String>> {
        let content = fs::read_to_string(self.dir.path().join("args"))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Pid of the helper the stub started
    pub fn helper_pid(&self) -> io::Result<u32> {
        fs::read_to_string(self.dir.path().join("helper.pid"))?
            .trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Whether `pid` is a running process; zombies count as gone
pub fn pid_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The state follows the parenthesised command name, which may contain spaces
    match stat.rsplit_once(')') {
        Some((_, rest)) => !matches!(rest.trim_start().chars().next(), Some('Z' | 'X') | None),
        None => false,
    }
}

/// Poll until `pid` is gone; false if it is still running after `timeout`
pub fn wait_until_dead(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while pid_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    true
}
