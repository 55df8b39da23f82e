//! # upfleet-engine
//!
//! Converges a small compute fleet, its load balancer and its DNS record on
//! a declared target.
//!
//! ## Architecture
//!
//! - **Registry**: discovers the fleet by parsing provider resource names;
//!   one snapshot per [`Fleet`], never persisted.
//! - **Lifecycle**: drives one instance from creation request to a
//!   provisioned host running the bootstrap entrypoint.
//! - **Scaling**: plans and executes fleet size changes.
//! - **Load balancer**: one balancer per target whose membership mirrors the
//!   registry.
//! - **DNS**: domain and A record pointing at the balancer, plus a watcher
//!   that waits until public resolvers serve it.
//! - **Deploy**: pushes a built bundle to every instance.
//!
//! Every remote call suspends only its own task; waits are unbounded and end
//! only on success, a fatal error, or the run's cancellation token.

mod certificates;
mod config;
mod deploy;
mod dns;
mod env;
mod error;
mod fleet;
mod init;
mod instance;
mod lifecycle;
mod loadbalancer;
mod progress;
mod provision;
mod registry;
mod remote;
mod scaling;
mod status;

pub use certificates::CertificateProvisioner;
pub use config::{
    DropletTemplate, EngineConfig, LoadBalancerConfig, ProvisionConfig, DEFAULT_IMAGE,
    DEFAULT_REGION, DEFAULT_SIZE,
};
pub use deploy::{
    BuildArtifact, DeployReport, DeploymentPipeline, FanOutReport, InstanceLogs, LogsReport,
};
pub use dns::{DnsProvisioner, DomainOutcome, PropagationWatcher, RecordOutcome};
pub use env::{EnvChange, EnvFile};
pub use error::{EngineError, ErrorKind, InstanceFailure};
pub use fleet::{Fleet, FleetContext};
pub use init::{InitReport, Initializer};
pub use instance::{Instance, InstanceStatus};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use loadbalancer::{LoadBalancerReconciler, SyncOutcome};
pub use progress::{FleetEvent, Progress, TracingProgress};
pub use provision::{ProvisionPlan, ProvisionStep, StepAction, APP_DIR, BOOTSTRAP_ENTRYPOINT};
pub use registry::InstanceRegistry;
pub use remote::{Remote, RemoteExecutor};
pub use scaling::{ScaleOutcome, ScalingController};
pub use status::{AppStatus, InstanceReport, StatusProbe};
