//! Provider resource shapes.
//!
//! Field names follow the DigitalOcean v2 API so the same types serve as
//! wire format and domain model.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Compute
// =============================================================================

/// Provider-side status of a droplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropletStatus {
    New,
    Active,
    Off,
    Archive,
    #[serde(other)]
    Unknown,
}

/// A compute instance as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: DropletStatus,
    #[serde(default)]
    pub networks: Networks,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Droplet {
    /// The first public IPv4 address, once the provider has assigned one.
    pub fn public_ipv4(&self) -> Option<Ipv4Addr> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == NetworkKind::Public)
            .map(|n| n.ip_address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: Ipv4Addr,
    #[serde(rename = "type")]
    pub kind: NetworkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Public,
    Private,
}

/// Request body for droplet creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDroplet {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    /// Key ids or fingerprints installed for root.
    pub ssh_keys: Vec<String>,
}

// =============================================================================
// Load Balancers
// =============================================================================

/// A load balancer and its backend membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    /// Assigned asynchronously after creation; empty until then.
    #[serde(default, deserialize_with = "empty_ip_as_none")]
    pub ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub droplet_ids: Vec<u64>,
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub redirect_http_to_https: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    pub slug: String,
}

/// One entry-to-target port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub entry_protocol: String,
    pub entry_port: u16,
    pub target_protocol: String,
    pub target_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub tls_passthrough: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Request body for load balancer creation and full updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub algorithm: String,
    pub region: String,
    pub redirect_http_to_https: bool,
    pub forwarding_rules: Vec<ForwardingRule>,
    pub health_check: HealthCheck,
    pub droplet_ids: Vec<u64>,
}

impl LoadBalancerSpec {
    /// Rebuilds the full update body of an existing balancer with new members.
    pub fn from_existing(balancer: &LoadBalancer, droplet_ids: Vec<u64>) -> Self {
        Self {
            name: balancer.name.clone(),
            algorithm: balancer.algorithm.clone(),
            region: balancer
                .region
                .as_ref()
                .map(|r| r.slug.clone())
                .unwrap_or_default(),
            redirect_http_to_https: balancer.redirect_http_to_https,
            forwarding_rules: balancer.forwarding_rules.clone(),
            health_check: balancer.health_check.clone().unwrap_or(HealthCheck {
                protocol: "tcp".to_string(),
                port: 80,
                path: None,
            }),
            droplet_ids,
        }
    }
}

fn empty_ip_as_none<'de, D>(deserializer: D) -> Result<Option<Ipv4Addr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(ip) => ip.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// DNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
}

/// A record inside a domain. `name` is the label, `@` for the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub data: String,
}

impl NewRecord {
    /// An A record pointing `name` at `ip`.
    pub fn a(name: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            kind: "A".to_string(),
            name: name.into(),
            data: ip.to_string(),
        }
    }
}

// =============================================================================
// Certificates and Keys
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCertificate {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub dns_names: Vec<String>,
}

impl NewCertificate {
    /// A provider-managed Let's Encrypt certificate.
    pub fn lets_encrypt(name: impl Into<String>, dns_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: "lets_encrypt".to_string(),
            dns_names,
        }
    }
}

/// An SSH public key registered on the provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
    pub fingerprint: String,
    #[serde(default)]
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSshKey {
    pub name: String,
    pub public_key: String,
}
