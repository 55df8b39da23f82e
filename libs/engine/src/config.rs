//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use upfleet_reconcile::{PollPolicy, COUNTDOWN_TICK, PROPAGATION_INTERVAL, READINESS_INTERVAL};

/// Default instance image.
pub const DEFAULT_IMAGE: &str = "ubuntu-22-04-x64";

/// Default instance size.
pub const DEFAULT_SIZE: &str = "s-1vcpu-2gb";

/// Default region for instances and the load balancer.
pub const DEFAULT_REGION: &str = "tor1";

/// Everything the engine needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub droplet: DropletTemplate,
    pub provision: ProvisionConfig,
    pub load_balancer: LoadBalancerConfig,

    /// Waits for addresses, SSH and the balancer IP.
    pub readiness: PollPolicy,

    /// Public DNS resolution attempts.
    pub propagation: PollPolicy,

    /// Timeout for a single status probe request.
    pub status_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            droplet: DropletTemplate::default(),
            provision: ProvisionConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            readiness: PollPolicy::fixed(READINESS_INTERVAL),
            propagation: PollPolicy::countdown(PROPAGATION_INTERVAL, COUNTDOWN_TICK),
            status_timeout: Duration::from_secs(5),
        }
    }
}

/// How new instances are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropletTemplate {
    pub region: String,
    pub size: String,
    pub image: String,

    /// Key ids or fingerprints to install. Empty means every key on the
    /// account.
    pub ssh_keys: Vec<String>,
}

impl Default for DropletTemplate {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            size: DEFAULT_SIZE.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            ssh_keys: Vec::new(),
        }
    }
}

/// Host provisioning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub nvm_version: String,
    pub node_version: String,

    /// Port the application serves on.
    pub service_port: u16,

    /// Port of the bootstrap status endpoint.
    pub status_port: u16,

    /// Package registry credentials copied to each host, if present locally.
    pub npmrc: Option<PathBuf>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            nvm_version: "v0.39.7".to_string(),
            node_version: "20".to_string(),
            service_port: 80,
            status_port: 81,
            npmrc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    pub algorithm: String,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            algorithm: "least_connections".to_string(),
        }
    }
}
