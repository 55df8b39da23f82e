#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use upfleet_engine::{EngineConfig, Fleet, FleetContext, FleetEvent, Progress};
use upfleet_naming::ServiceTarget;
use upfleet_provider::Cloud;
use upfleet_reconcile::PollObserver;
use upfleet_testing::{FakeCloud, FakeRemote, FakeResolver};

/// Collects rendered progress events.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.events().iter().filter(|e| e.contains(needle)).count()
    }
}

impl PollObserver for RecordingProgress {}

impl Progress for RecordingProgress {
    fn event(&self, event: &FleetEvent<'_>) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

/// Fakes wired into fleets, shared across runs so state carries over.
pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub remote: FakeRemote,
    pub resolver: Arc<FakeResolver>,
    pub progress: Arc<RecordingProgress>,
    pub cancel: CancellationToken,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        let cloud = Arc::new(FakeCloud::new());
        cloud.add_ssh_key("laptop");

        Self {
            cloud,
            remote: FakeRemote::new(),
            resolver: Arc::new(FakeResolver::new()),
            progress: Arc::new(RecordingProgress::default()),
            cancel: CancellationToken::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn target() -> ServiceTarget {
        ServiceTarget::new("api", "prod").unwrap()
    }

    /// A fresh run against the shared fakes.
    pub fn fleet(&self) -> Fleet {
        self.fleet_for(Self::target())
    }

    pub fn fleet_for(&self, target: ServiceTarget) -> Fleet {
        Fleet::new(FleetContext {
            target,
            cloud: Cloud::from_client(self.cloud.clone()),
            connector: Arc::new(self.remote.clone()),
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
        })
    }

    /// Seeds a running, provisioned instance of the default target.
    pub fn seed_instance(&self, index: u32) -> u64 {
        self.cloud
            .add_droplet(&Self::target().instance_name(index))
    }

    pub fn address(id: u64) -> IpAddr {
        FakeCloud::droplet_address(id).into()
    }
}
