//! Fleet members as the engine sees them.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use upfleet_provider::{Droplet, DropletStatus};

/// Engine-level instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning,
    Running,
    Unreachable,
    Terminated,
}

impl From<DropletStatus> for InstanceStatus {
    fn from(status: DropletStatus) -> Self {
        match status {
            DropletStatus::New => Self::Provisioning,
            DropletStatus::Active => Self::Running,
            DropletStatus::Archive => Self::Terminated,
            DropletStatus::Off | DropletStatus::Unknown => Self::Unreachable,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Unreachable => "unreachable",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// One compute instance belonging to a service target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: u64,
    pub name: String,
    pub index: u32,
    pub status: InstanceStatus,
    pub address: Option<Ipv4Addr>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn from_droplet(droplet: &Droplet, index: u32) -> Self {
        Self {
            id: droplet.id,
            name: droplet.name.clone(),
            index,
            status: droplet.status.into(),
            address: droplet.public_ipv4(),
            created_at: droplet.created_at,
        }
    }
}
