//! Interactive-session executor
//!
//! Uses `tokio::process::Command` with `sshpass` for password-based SSH.
//! Every command is its own connection: the child process is the session and
//! it is killed if the future is dropped, so nothing outlives a call.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::command::RemoteCommand;
use super::error::RouterError;
use crate::models::DecryptedCredential;

/// sshpass: invalid password
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: host public key is unknown
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;
/// ssh: connection or protocol failure
const SSH_CONNECTION_FAILED: i32 = 255;

/// Raw result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs exactly one command over a freshly authenticated session
#[async_trait]
pub trait SessionExecutor: Send + Sync {
    /// Transport failures (connect, auth) are errors; a remote non-zero exit is not.
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, RouterError>;
}

/// `sshpass -e ssh …` executor
pub struct SshpassExecutor {
    credential: DecryptedCredential,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshpassExecutor {
    pub fn new(
        credential: DecryptedCredential,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            credential,
            connect_timeout,
            command_timeout,
        }
    }

    fn build(&self, command: &RemoteCommand) -> Command {
        let mut cmd = Command::new("sshpass");
        cmd.env("SSHPASS", self.credential.password())
            .arg("-e")
            .arg("ssh")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("LogLevel=ERROR")
            .arg("-o")
            .arg("NumberOfPasswordPrompts=1")
            .arg("-p")
            .arg(self.credential.port.to_string())
            .arg("-l")
            .arg(&self.credential.username)
            // Host after `--` so neither it nor the user can be read as an option
            .arg("--")
            .arg(&self.credential.host)
            .arg(command.render())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SessionExecutor for SshpassExecutor {
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, RouterError> {
        tracing::debug!(
            "[SshSession] {}@{}:{} $ {}",
            self.credential.username,
            self.credential.host,
            self.credential.port,
            command
        );

        let output = collect(self.build(command), self.command_timeout).await?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match exit_code {
            SSHPASS_BAD_PASSWORD => Err(RouterError::TransportUnavailable(
                "SSH authentication rejected".to_string(),
            )),
            SSHPASS_HOST_KEY_UNKNOWN => Err(RouterError::TransportUnavailable(
                "SSH host key could not be accepted".to_string(),
            )),
            SSH_CONNECTION_FAILED => Err(RouterError::TransportUnavailable(format!(
                "SSH connection failed: {}",
                stderr
            ))),
            -1 => Err(RouterError::TransportUnavailable(
                "SSH session terminated by signal".to_string(),
            )),
            _ => Ok(CommandOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr,
            }),
        }
    }
}

/// Wait for the child under a deadline; `kill_on_drop` reaps it on expiry.
async fn collect(mut cmd: Command, deadline: Duration) -> Result<Output, RouterError> {
    match tokio::time::timeout(deadline, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RouterError::TransportUnavailable(format!(
            "SSH exec failed: {} (is sshpass installed?)",
            e
        ))),
        Err(_) => Err(RouterError::TransportUnavailable(format!(
            "SSH session timed out after {}s",
            deadline.as_secs_f32()
        ))),
    }
}
