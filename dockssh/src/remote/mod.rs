//! Remote host access
//!
//! `RemoteSession` runs shell commands on the target host and `FileTransfer`
//! writes files there. Everything that touches a host goes through these two
//! traits so the orchestration code can be driven by `mock::MockSession`
//! in tests (built with the `test` feature) and by [`ssh::SshSession`] in
//! production.

#[cfg(any(test, feature = "test"))]
pub mod mock;
pub mod ssh;
pub mod transfer;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::host::Host;

pub use transfer::FileTransfer;

/// Buffered result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, or -1 when the process never reported one
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turn a failed output into the error reported to the operator
    pub fn into_error(self, command: &str) -> DeployError {
        DeployError::Command {
            command: command.to_string(),
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Synchronous command execution on one remote host.
///
/// Each call returns only once the remote process has exited and its whole
/// output has been buffered.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The host this session is connected to
    fn host(&self) -> &Host;

    /// Run `command` through the remote login shell.
    ///
    /// With `must_succeed` a non-zero exit becomes [`DeployError::Command`].
    /// Without it the call never fails and the output is returned as-is.
    async fn run(&self, command: &str, must_succeed: bool) -> Result<CommandOutput, DeployError>;

    /// Drop the current connection and log in again
    async fn reconnect(&mut self) -> Result<(), DeployError>;

    /// Run a probe command and report whether it exited zero
    async fn probe(&self, command: &str) -> bool {
        match self.run(command, false).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }
}

/// Quote a single shell word with single quotes
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
