//! Interactive database client over the tunnel

use crate::aws::secrets::DbCredentials;
use anyhow::{Context, Result};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info};

const PASSWORD_FLAG: &str = "--password=";

/// Quote `arg` for display in a POSIX shell
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

/// Command line as it should appear in logs, with the password masked
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(|arg| {
            if arg.starts_with(PASSWORD_FLAG) {
                "--password=..."
            } else {
                arg.as_str()
            }
        }))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `mysql` command-line client
#[derive(Debug, Clone)]
pub struct MysqlClient {
    program: String,
}

impl Default for MysqlClient {
    fn default() -> Self {
        Self::new("mysql")
    }
}

impl MysqlClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(local_port: u16, credentials: &DbCredentials) -> Vec<String> {
        vec![
            "--host=127.0.0.1".to_string(),
            format!("--port={local_port}"),
            format!("--user={}", credentials.username),
            format!("{PASSWORD_FLAG}{}", credentials.password),
            credentials.dbname.clone(),
        ]
    }

    /// Run the client in the foreground until it exits.
    ///
    /// Ctrl-C is left to the client: the terminal delivers it to the whole
    /// foreground group, and this process swallows its copy.
    pub async fn run(&self, local_port: u16, credentials: &DbCredentials) -> Result<ExitStatus> {
        let args = Self::args(local_port, credentials);
        info!("# {}", display_command(&self.program, &args));

        let mut child = Command::new(&self.program)
            .args(&args)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.with_context(|| format!("Failed to wait for {}", self.program))?;
                    info!(status = %status, "Database client exited");
                    return Ok(status);
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    debug!("Ctrl-C left to the database client");
                }
            }
        }
    }
}
