//! Deployment configuration
//!
//! A deployment's environment is assembled from several typed sources with
//! a fixed precedence: generated secrets, then the operator's configuration
//! files, then command-line overrides. [`merge`] folds them into an
//! immutable [`ConfigMap`] of strings.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::deployment::Mode;
use crate::utils::generate_token;

pub const SECRET_KEY: &str = "FLASK_SECRET_KEY";
pub const ADMIN_USER_KEY: &str = "ADMIN_USER";
pub const ADMIN_PASSWORD_KEY: &str = "dashboard_password";
pub const RUN_ID_KEY: &str = "DALLINGER_UID";
pub const CREATOR_KEY: &str = "CREATOR";
pub const MODE_KEY: &str = "mode";

/// Keys dropped from every merged map. The lowercase host selector would
/// clash with the uppercase variable the stack sets for itself.
pub const RESERVED_KEYS: &[&str] = &["host"];

/// A scalar configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // The experiment application parses booleans in this spelling
            ConfigValue::Bool(true) => f.write_str("True"),
            ConfigValue::Bool(false) => f.write_str("False"),
            ConfigValue::Int(value) => write!(f, "{}", value),
            ConfigValue::Float(value) => write!(f, "{:?}", value),
            ConfigValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl TryFrom<&serde_json::Value> for ConfigValue {
    type Error = DeployError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Bool(b) => Ok(ConfigValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(ConfigValue::Int(i)),
                None => n.as_f64().map(ConfigValue::Float).ok_or_else(|| {
                    DeployError::ConfigError(format!("unsupported number: {}", n))
                }),
            },
            serde_json::Value::String(s) => Ok(ConfigValue::Text(s.clone())),
            other => Err(DeployError::ConfigError(format!(
                "only scalar values are supported, got {}",
                other
            ))),
        }
    }
}

/// Where a set of entries came from; later kinds win on collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceKind {
    Generated,
    User,
    Override,
}

/// One ordered batch of configuration entries
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub kind: SourceKind,
    pub entries: Vec<(String, ConfigValue)>,
}

impl ConfigSource {
    pub fn new(kind: SourceKind, entries: Vec<(String, ConfigValue)>) -> Self {
        Self { kind, entries }
    }

    /// Command-line `KEY VALUE` pairs
    pub fn overrides(pairs: &[(String, String)]) -> Self {
        let entries = pairs
            .iter()
            .map(|(key, value)| (key.clone(), ConfigValue::Text(value.clone())))
            .collect();
        Self::new(SourceKind::Override, entries)
    }

    /// Entries of a JSON object
    pub fn from_json_object(
        kind: SourceKind,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, DeployError> {
        let entries = object
            .iter()
            .map(|(key, value)| {
                ConfigValue::try_from(value)
                    .map(|value| (key.clone(), value))
                    .map_err(|e| DeployError::ConfigError(format!("key '{}': {}", key, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(kind, entries))
    }
}

/// Final string-valued configuration of one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into().to_string()))
            .collect();
        Self { entries }
    }
}

/// Merge sources by precedence, later entries winning, reserved keys removed.
///
/// Sources of the same kind keep their relative order.
pub fn merge(sources: &[ConfigSource]) -> ConfigMap {
    let mut ordered: Vec<&ConfigSource> = sources.iter().collect();
    ordered.sort_by_key(|source| source.kind);

    let mut entries = BTreeMap::new();
    for source in ordered {
        for (key, value) in &source.entries {
            entries.insert(key.clone(), value.to_string());
        }
    }
    for key in RESERVED_KEYS {
        if entries.remove(*key).is_some() {
            debug!("Dropped reserved configuration key '{}'", key);
        }
    }
    ConfigMap { entries }
}

/// Values the orchestrator mints for every deployment
#[derive(Debug)]
pub struct GeneratedSecrets {
    pub secret_key: SecretString,
    pub admin_user: String,
    pub admin_password: SecretString,
    pub run_id: uuid::Uuid,
    pub creator: String,
    pub mode: Mode,
}

impl GeneratedSecrets {
    pub fn new(mode: Mode) -> Self {
        Self {
            secret_key: SecretString::from(generate_token(16)),
            admin_user: "admin".to_string(),
            admin_password: SecretString::from(generate_token(8)),
            run_id: uuid::Uuid::new_v4(),
            creator: creator_tag(),
            mode,
        }
    }

    pub fn to_source(&self) -> ConfigSource {
        let entries = vec![
            (SECRET_KEY.to_string(), self.secret_key.expose_secret().into()),
            (ADMIN_USER_KEY.to_string(), self.admin_user.as_str().into()),
            (ADMIN_PASSWORD_KEY.to_string(), self.admin_password.expose_secret().into()),
            (RUN_ID_KEY.to_string(), self.run_id.to_string().into()),
            (CREATOR_KEY.to_string(), self.creator.as_str().into()),
            (MODE_KEY.to_string(), self.mode.as_str().into()),
        ];
        ConfigSource::new(SourceKind::Generated, entries)
    }
}

/// `user@hostname` of the operator running the deploy
pub fn creator_tag() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string());
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", user, hostname)
}

/// Read the operator's JSON configuration files in order.
///
/// Missing files in `optional` are skipped; missing files in `required`
/// are an error.
pub async fn load_user_config(
    optional: &[impl AsRef<Path>],
    required: &[impl AsRef<Path>],
) -> Result<Vec<(String, ConfigValue)>, DeployError> {
    let mut entries = Vec::new();
    let candidates = optional
        .iter()
        .map(|p| (p.as_ref(), false))
        .chain(required.iter().map(|p| (p.as_ref(), true)));

    for (path, is_required) in candidates {
        let file = File::new(path);
        if !file.exists().await {
            if is_required {
                return Err(DeployError::ConfigError(format!(
                    "configuration file {:?} does not exist",
                    path
                )));
            }
            debug!("Skipping missing configuration file {:?}", path);
            continue;
        }

        let value: serde_json::Value = file.read_json().await.map_err(|e| {
            DeployError::ConfigError(format!("Unable to read {:?}: {}", path, e))
        })?;
        let object = value.as_object().ok_or_else(|| {
            DeployError::ConfigError(format!("{:?} must contain a JSON object", path))
        })?;
        let source = ConfigSource::from_json_object(SourceKind::User, object)?;
        debug!("Loaded {} configuration entries from {:?}", source.entries.len(), path);
        entries.extend(source.entries);
    }
    Ok(entries)
}
