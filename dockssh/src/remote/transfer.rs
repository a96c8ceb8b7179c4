//! Writing files on the remote host

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::DeployError;
use crate::remote::shell_quote;
use crate::remote::ssh::SshSession;
use crate::remote::RemoteSession;

/// Byte transfer to a path on the remote host.
///
/// Parent directories are not created and an existing file is overwritten
/// in place (no temp file + rename).
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn put(&self, content: &[u8], remote_path: &str) -> Result<(), DeployError>;
}

#[async_trait]
impl FileTransfer for SshSession {
    async fn put(&self, content: &[u8], remote_path: &str) -> Result<(), DeployError> {
        debug!("[{}] put {} ({} bytes)", self.host().name, remote_path, content.len());

        let transfer_error = |reason: String| DeployError::Transfer {
            path: remote_path.to_string(),
            reason,
        };

        let mut child = self
            .client_command(&format!("cat > {}", shell_quote(remote_path)))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| transfer_error(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content)
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| transfer_error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(transfer_error(format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr
            )));
        }

        Ok(())
    }
}
