//! Operator-facing progress reporting.
//!
//! The engine emits [`FleetEvent`]s at every externally visible step; how
//! they reach a human is up to the [`Progress`] implementation.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tracing::{debug, info, warn};
use upfleet_reconcile::PollObserver;

/// A step the engine took or is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent<'a> {
    CreatingInstance { name: &'a str },
    InstanceCreated { name: &'a str, id: u64 },
    Connected { name: &'a str, address: IpAddr },
    Provisioning { name: &'a str, step: &'a str },
    StepSkipped { name: &'a str, step: &'a str, reason: &'a str },
    InstanceReady { name: &'a str },
    InstanceFailed { name: &'a str, error: &'a str },
    DestroyingInstance { name: &'a str },

    LoadBalancerFound { name: &'a str },
    LoadBalancerCreated { name: &'a str },
    LoadBalancerAddress { name: &'a str, ip: Ipv4Addr },
    MembershipUpdated { name: &'a str, added: &'a [u64], removed: &'a [u64] },

    CertificateFound { name: &'a str },
    CertificateCreated { name: &'a str },
    DomainFound { domain: &'a str },
    DomainCreated { domain: &'a str },
    RecordFound { host: &'a str, ip: &'a str },
    RecordCreated { host: &'a str, ip: Ipv4Addr },
    Unresolved { host: &'a str, nameservers: &'a [String] },
    Resolved { host: &'a str, ip: Ipv4Addr },

    Deploying { name: &'a str },
    Deployed { name: &'a str },
    Restarted { name: &'a str },
}

impl FleetEvent<'_> {
    /// Returns true for events an operator should notice.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::StepSkipped { .. } | Self::InstanceFailed { .. } | Self::Unresolved { .. }
        )
    }
}

impl fmt::Display for FleetEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatingInstance { name } => write!(f, "Creating instance {name}"),
            Self::InstanceCreated { name, id } => write!(f, "Created instance {name} ({id})"),
            Self::Connected { name, address } => write!(f, "Connected to {name} at {address}"),
            Self::Provisioning { name, step } => write!(f, "[{name}] {step}"),
            Self::StepSkipped { name, step, reason } => {
                write!(f, "[{name}] Skipped {step}: {reason}")
            }
            Self::InstanceReady { name } => write!(f, "Instance {name} is ready"),
            Self::InstanceFailed { name, error } => write!(f, "Instance {name} failed: {error}"),
            Self::DestroyingInstance { name } => write!(f, "Destroying instance {name}"),
            Self::LoadBalancerFound { name } => write!(f, "Found load balancer {name}"),
            Self::LoadBalancerCreated { name } => write!(f, "Created load balancer {name}"),
            Self::LoadBalancerAddress { name, ip } => {
                write!(f, "Load balancer {name} is reachable at {ip}")
            }
            Self::MembershipUpdated {
                name,
                added,
                removed,
            } => write!(
                f,
                "Updated load balancer {name} (+{} -{})",
                added.len(),
                removed.len()
            ),
            Self::CertificateFound { name } => write!(f, "Found certificate {name}"),
            Self::CertificateCreated { name } => write!(f, "Requested certificate {name}"),
            Self::DomainFound { domain } => write!(f, "Found domain {domain}"),
            Self::DomainCreated { domain } => write!(f, "Created domain {domain}"),
            Self::RecordFound { host, ip } => write!(f, "Found A record {host} -> {ip}"),
            Self::RecordCreated { host, ip } => write!(f, "Created A record {host} -> {ip}"),
            Self::Unresolved { host, nameservers } => {
                write!(f, "{host} does not resolve yet")?;
                if !nameservers.is_empty() {
                    write!(f, "; its nameservers are {}", nameservers.join(", "))?;
                }
                Ok(())
            }
            Self::Resolved { host, ip } => write!(f, "{host} resolves to {ip}"),
            Self::Deploying { name } => write!(f, "Deploying to {name}"),
            Self::Deployed { name } => write!(f, "Deployed to {name}"),
            Self::Restarted { name } => write!(f, "Restarted {name}"),
        }
    }
}

/// Sink for engine progress, including poll notifications.
pub trait Progress: PollObserver {
    fn event(&self, event: &FleetEvent<'_>);
}

/// Progress sink that writes to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl PollObserver for TracingProgress {
    fn on_retry(&self, name: &str, attempt: u32) {
        debug!(name, attempt, "Waiting");
    }

    fn on_countdown(&self, name: &str, remaining: Duration) {
        debug!(name, remaining_secs = remaining.as_secs(), "Next attempt");
    }

    fn on_ready(&self, name: &str, attempts: u32) {
        debug!(name, attempts, "Ready");
    }
}

impl Progress for TracingProgress {
    fn event(&self, event: &FleetEvent<'_>) {
        if event.is_warning() {
            warn!("{event}");
        } else {
            info!("{event}");
        }
    }
}
