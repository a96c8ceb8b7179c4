//! Error types for dockssh

use thiserror::Error;

/// Main error type for remote deployments
#[derive(Error, Debug)]
pub enum DeployError {
    /// The secure shell channel could not be established
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// A remote command exited non-zero where success was required
    #[error(
        "Remote command failed: `{command}` exited with status {status}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}"
    )]
    Command {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    /// Writing a file on the remote host failed
    #[error("Transfer to {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    /// Template and configuration could not be rendered into a manifest
    #[error("Render error: {0}")]
    Render(String),

    /// The launch endpoint never answered successfully
    #[error("Launch of {url} gave up after {attempts} attempts: {last_error}")]
    LaunchRetryExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The launch endpoint answered with a non-retryable failure
    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Host registry error: {0}")]
    RegistryError(String),

    #[error("Invalid state transition: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<serde_yaml::Error> for DeployError {
    fn from(err: serde_yaml::Error) -> Self {
        DeployError::Render(err.to_string())
    }
}

impl DeployError {
    /// True for failures raised before anything changed on the remote host
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            DeployError::Render(_)
                | DeployError::ValidationError(_)
                | DeployError::ConfigError(_)
                | DeployError::Connection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_carries_output() {
        let err = DeployError::Command {
            command: "docker ps".to_string(),
            status: 127,
            stdout: String::new(),
            stderr: "docker: command not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("`docker ps`"));
        assert!(text.contains("127"));
        assert!(text.contains("docker: command not found"));
    }

    #[test]
    fn test_yaml_error_is_render_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err: DeployError = yaml_err.into();
        assert!(matches!(err, DeployError::Render(_)));
        assert!(err.is_pre_flight());
    }
}
