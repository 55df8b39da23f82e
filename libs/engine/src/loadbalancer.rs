//! Load balancer reconciliation.
//!
//! Each target has exactly one balancer, named after the target. Its
//! backend membership is a pure function of the registry: every live
//! instance and nothing else.

use std::net::Ipv4Addr;

use tracing::{debug, info};
use upfleet_naming::load_balancer_name;
use upfleet_provider::{ForwardingRule, HealthCheck, LoadBalancer, LoadBalancerSpec, ProviderError};
use upfleet_reconcile::{MembershipDiff, Poller};

use crate::error::EngineError;
use crate::fleet::FleetContext;
use crate::progress::FleetEvent;
use crate::registry::InstanceRegistry;

/// What [`LoadBalancerReconciler::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Membership already matched the fleet.
    Unchanged,
    Updated { added: Vec<u64>, removed: Vec<u64> },
}

pub struct LoadBalancerReconciler<'a> {
    ctx: &'a FleetContext,
    registry: &'a InstanceRegistry,
}

impl<'a> LoadBalancerReconciler<'a> {
    pub fn new(ctx: &'a FleetContext, registry: &'a InstanceRegistry) -> Self {
        Self { ctx, registry }
    }

    pub fn name(&self) -> String {
        load_balancer_name(&self.ctx.target)
    }

    /// The target's balancer, if one exists.
    ///
    /// More than one balancer carrying the target's name is an
    /// inconsistency the engine does not resolve.
    pub async fn find(&self) -> Result<Option<LoadBalancer>, EngineError> {
        let name = self.name();
        let mut matches: Vec<LoadBalancer> = self
            .ctx
            .cloud
            .load_balancers
            .list_load_balancers()
            .await?
            .into_iter()
            .filter(|lb| lb.name == name)
            .collect();

        if matches.len() > 1 {
            return Err(EngineError::Inconsistency(format!(
                "{} load balancers are named {name}",
                matches.len()
            )));
        }
        Ok(matches.pop())
    }

    /// Builds the creation body: HTTPS terminated with `certificate_id`,
    /// plain HTTP redirected, a TCP health check on the service port.
    pub fn create_request(&self, certificate_id: &str, droplet_ids: Vec<u64>) -> LoadBalancerSpec {
        let port = self.ctx.config.provision.service_port;

        LoadBalancerSpec {
            name: self.name(),
            algorithm: self.ctx.config.load_balancer.algorithm.clone(),
            region: self.ctx.config.droplet.region.clone(),
            redirect_http_to_https: true,
            forwarding_rules: vec![
                ForwardingRule {
                    entry_protocol: "https".to_string(),
                    entry_port: 443,
                    target_protocol: "http".to_string(),
                    target_port: port,
                    certificate_id: Some(certificate_id.to_string()),
                    tls_passthrough: false,
                },
                ForwardingRule {
                    entry_protocol: "http".to_string(),
                    entry_port: 80,
                    target_protocol: "http".to_string(),
                    target_port: port,
                    certificate_id: None,
                    tls_passthrough: false,
                },
            ],
            health_check: HealthCheck {
                protocol: "tcp".to_string(),
                port,
                path: None,
            },
            droplet_ids,
        }
    }

    /// Returns the existing balancer, creating it with `droplet_ids` as
    /// initial members if there is none.
    pub async fn ensure(
        &self,
        certificate_id: &str,
        droplet_ids: Vec<u64>,
    ) -> Result<LoadBalancer, EngineError> {
        if let Some(existing) = self.find().await? {
            self.ctx.progress.event(&FleetEvent::LoadBalancerFound {
                name: &existing.name,
            });
            return Ok(existing);
        }

        let request = self.create_request(certificate_id, droplet_ids);
        info!(name = %request.name, members = request.droplet_ids.len(), "Creating load balancer");
        let created = self
            .ctx
            .cloud
            .load_balancers
            .create_load_balancer(&request)
            .await?;

        self.ctx.progress.event(&FleetEvent::LoadBalancerCreated {
            name: &created.name,
        });
        Ok(created)
    }

    /// Waits until the provider assigns `balancer` a public address.
    pub async fn wait_for_ip(&self, balancer: &LoadBalancer) -> Result<Ipv4Addr, EngineError> {
        let ip = match balancer.ip {
            Some(ip) => ip,
            None => {
                let api = self.ctx.cloud.load_balancers.as_ref();
                let id = balancer.id.as_str();
                let poll_name = format!("address of {}", balancer.name);

                Poller::new(self.ctx.config.readiness, &self.ctx.cancel)
                    .with_observer(self.ctx.progress.as_ref())
                    .run(&poll_name, |_| async move {
                        match api.list_load_balancers().await {
                            Ok(all) => Ok(all.into_iter().find(|lb| lb.id == id).and_then(|lb| lb.ip)),
                            Err(ProviderError::Network(e)) => {
                                debug!(error = %e, "Transient error polling load balancer");
                                Ok(None)
                            }
                            Err(e) => Err(EngineError::from(e)),
                        }
                    })
                    .await?
            }
        };

        self.ctx.progress.event(&FleetEvent::LoadBalancerAddress {
            name: &balancer.name,
            ip,
        });
        Ok(ip)
    }

    /// Makes the balancer's members equal to the registry's instances.
    ///
    /// The membership comparison ignores order. A missing balancer is an
    /// inconsistency: it is created by initialization, not here.
    pub async fn sync(&self) -> Result<SyncOutcome, EngineError> {
        let balancer = self.find().await?.ok_or_else(|| {
            EngineError::Inconsistency(format!("load balancer {} does not exist", self.name()))
        })?;
        self.sync_with(&balancer).await
    }

    pub(crate) async fn sync_with(&self, balancer: &LoadBalancer) -> Result<SyncOutcome, EngineError> {
        let desired: Vec<u64> = self.registry.instances().await?.iter().map(|i| i.id).collect();
        let diff = MembershipDiff::between(balancer.droplet_ids.iter().copied(), desired.iter().copied());

        if diff.is_converged() {
            debug!(name = %balancer.name, "Load balancer membership is current");
            return Ok(SyncOutcome::Unchanged);
        }

        info!(
            name = %balancer.name,
            added = ?diff.missing,
            removed = ?diff.extra,
            "Updating load balancer membership"
        );
        self.ctx
            .cloud
            .load_balancers
            .set_droplets(balancer, &desired)
            .await?;

        self.ctx.progress.event(&FleetEvent::MembershipUpdated {
            name: &balancer.name,
            added: &diff.missing,
            removed: &diff.extra,
        });
        Ok(SyncOutcome::Updated {
            added: diff.missing,
            removed: diff.extra,
        })
    }
}
