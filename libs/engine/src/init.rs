//! First-time setup of a target behind a public host name.

use std::net::Ipv4Addr;

use tracing::info;
use upfleet_naming::Fqdn;
use upfleet_provider::{Certificate, LoadBalancer};

use crate::certificates::CertificateProvisioner;
use crate::dns::{DnsProvisioner, DomainOutcome, PropagationWatcher, RecordOutcome};
use crate::error::EngineError;
use crate::fleet::FleetContext;
use crate::instance::Instance;
use crate::lifecycle::Lifecycle;
use crate::loadbalancer::{LoadBalancerReconciler, SyncOutcome};
use crate::registry::InstanceRegistry;

/// Everything `init` found or created.
#[derive(Debug)]
pub struct InitReport {
    pub fqdn: Fqdn,
    pub instance: Instance,
    pub instance_created: bool,
    pub domain: DomainOutcome,
    pub certificate: Certificate,
    pub load_balancer: LoadBalancer,
    pub membership: SyncOutcome,
    pub address: Ipv4Addr,
    pub record: RecordOutcome,
    /// Resolution attempts before the host was served publicly.
    pub propagation_attempts: u32,
}

pub struct Initializer<'a> {
    ctx: &'a FleetContext,
    registry: &'a InstanceRegistry,
}

impl<'a> Initializer<'a> {
    pub fn new(ctx: &'a FleetContext, registry: &'a InstanceRegistry) -> Self {
        Self { ctx, registry }
    }

    /// Brings up the target at `fqdn`.
    ///
    /// In order: at least one instance, the domain, a certificate, the load
    /// balancer (fronting the whole fleet), its address, the A record, and
    /// finally a wait until public DNS serves it. Every step reuses what
    /// already exists, so running `init` again is safe.
    pub async fn init(&self, fqdn: &Fqdn) -> Result<InitReport, EngineError> {
        info!(target_name = %self.ctx.target, fqdn = %fqdn, "Initializing");

        let (instance, instance_created) = self.first_instance().await?;

        let dns = DnsProvisioner::new(self.ctx);
        let domain = dns.ensure_domain(fqdn.domain()).await?;

        let certificate = CertificateProvisioner::new(self.ctx).ensure(fqdn).await?;

        let balancers = LoadBalancerReconciler::new(self.ctx, self.registry);
        let members: Vec<u64> = self.registry.instances().await?.iter().map(|i| i.id).collect();
        let load_balancer = balancers.ensure(&certificate.id, members).await?;
        let membership = balancers.sync_with(&load_balancer).await?;
        let address = balancers.wait_for_ip(&load_balancer).await?;

        let record = dns.ensure_record(fqdn, address).await?;
        let propagation_attempts = PropagationWatcher::new(self.ctx).wait(fqdn, address).await?;

        Ok(InitReport {
            fqdn: fqdn.clone(),
            instance,
            instance_created,
            domain,
            certificate,
            load_balancer,
            membership,
            address,
            record,
            propagation_attempts,
        })
    }

    async fn first_instance(&self) -> Result<(Instance, bool), EngineError> {
        if let Some(existing) = self.registry.instances().await?.first() {
            return Ok((existing.clone(), false));
        }

        let instance = Lifecycle::new(self.ctx).launch(0).await?;
        self.registry.invalidate().await;
        Ok((instance, true))
    }
}
