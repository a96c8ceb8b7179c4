//! Deployment models

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::config::{ConfigMap, ConfigValue};

/// Recruitment mode handed to the experiment application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Sandbox,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sandbox => "sandbox",
            Mode::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operator asked to deploy
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    /// Container image reference
    pub image: String,

    /// Public hostname; derived from the host's IP address when unset
    pub dns_host: Option<String>,

    pub mode: Mode,

    /// Entries loaded from the operator's configuration files
    pub user_config: Vec<(String, ConfigValue)>,

    /// `--config KEY VALUE` pairs, applied last
    pub overrides: Vec<(String, String)>,
}

/// A deployment as it exists on the remote host
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Directory name, stack project name and routing fragment name
    pub id: String,

    /// Registry name of the host
    pub host: String,

    /// Hostname the deployment's subdomain hangs off
    pub public_hostname: String,

    pub image: String,

    pub config: ConfigMap,
}

impl Deployment {
    /// `<id>.<public hostname>`
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.id, self.public_hostname)
    }
}

/// Everything the operator needs once a deploy finished
#[derive(Debug)]
pub struct DeployReport {
    pub deployment: Deployment,
    pub public_url: String,
    pub dashboard_url: String,
    pub admin_user: String,
    pub admin_password: SecretString,
    pub recruitment_msg: String,
    pub log_command: String,
    pub deployed_at: DateTime<Utc>,
}
