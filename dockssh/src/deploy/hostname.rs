//! Public hostname derivation
//!
//! Ad-hoc hosts have no DNS of their own, so deployments hang off a wildcard
//! DNS service that resolves `<ip>.<suffix>` back to `<ip>`.

use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, warn};

use crate::errors::DeployError;

/// `<ip>.<suffix>`
pub fn hostname_for_ip(ip: IpAddr, suffix: &str) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}.{}", v4, suffix),
        // Wildcard DNS services spell IPv6 addresses with dashes
        IpAddr::V6(v6) => format!("{}.{}", v6.to_string().replace(':', "-"), suffix),
    }
}

/// Resolve `address` and derive the public hostname from its first IPv4
/// record. Hosts with several records are not disambiguated.
pub async fn derive_public_hostname(address: &str, suffix: &str) -> Result<String, DeployError> {
    let ip = if address.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else if let Ok(ip) = address.parse::<IpAddr>() {
        ip
    } else {
        resolve(address).await?
    };

    let hostname = hostname_for_ip(ip, suffix);
    debug!("Derived public hostname {} for {}", hostname, address);
    Ok(hostname)
}

async fn resolve(address: &str) -> Result<IpAddr, DeployError> {
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((address, 0))
        .await
        .map_err(|e| DeployError::Connection {
            host: address.to_string(),
            reason: format!("Unable to resolve: {}", e),
        })?
        .map(|sock| sock.ip())
        .collect();

    if addrs.len() > 1 {
        warn!(
            "{} resolves to {} addresses, using the first IPv4 one",
            address,
            addrs.len()
        );
    }
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| DeployError::Connection {
            host: address.to_string(),
            reason: "no address records".to_string(),
        })
}
