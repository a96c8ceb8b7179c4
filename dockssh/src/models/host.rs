//! Remote host model

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Registry record for one host, keyed by name in `hosts.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// IP address or DNS name
    pub host: String,

    /// Login user, ssh default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A remote machine deployments can target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub address: String,
    pub user: Option<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>, user: Option<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            user,
        }
    }

    pub fn from_entry(name: &str, entry: &HostEntry) -> Self {
        Self::new(name, entry.host.clone(), entry.user.clone())
    }

    pub fn to_entry(&self) -> HostEntry {
        HostEntry {
            host: self.address.clone(),
            user: self.user.clone(),
        }
    }

    /// `user@address`, or just the address when no user is set
    pub fn ssh_target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.address),
            None => self.address.clone(),
        }
    }

    /// Loopback targets get no certificates, so they are served over plain
    /// HTTP and reached without certificate verification.
    pub fn is_local(&self) -> bool {
        if self.address.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.address
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local() {
        assert!(Host::new("a", "localhost", None).is_local());
        assert!(Host::new("a", "127.0.0.1", None).is_local());
        assert!(Host::new("a", "::1", None).is_local());
        assert!(!Host::new("a", "203.0.113.7", None).is_local());
        assert!(!Host::new("a", "lab.example.org", None).is_local());
    }

    #[test]
    fn test_ssh_target() {
        assert_eq!(
            Host::new("a", "10.0.0.1", Some("ubuntu".into())).ssh_target(),
            "ubuntu@10.0.0.1"
        );
        assert_eq!(Host::new("a", "10.0.0.1", None).ssh_target(), "10.0.0.1");
    }

    #[test]
    fn test_entry_serde_omits_missing_user() {
        let entry = HostEntry {
            host: "localhost".to_string(),
            user: None,
        };
        assert_eq!(serde_json::to_string(&entry).unwrap(), r#"{"host":"localhost"}"#);
    }
}
