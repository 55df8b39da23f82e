//! Domain, record and propagation management.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use upfleet_naming::Fqdn;
use upfleet_provider::{DomainRecord, NewRecord, ResolveError};
use upfleet_reconcile::Poller;

use crate::error::EngineError;
use crate::fleet::FleetContext;
use crate::progress::FleetEvent;

/// Record types that cannot share a label with the target's A record.
const CONFLICTING_KINDS: [&str; 3] = ["A", "AAAA", "CNAME"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainOutcome {
    Found,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The exact record already existed.
    Unchanged(DomainRecord),
    Created(DomainRecord),
}

impl RecordOutcome {
    pub fn record(&self) -> &DomainRecord {
        match self {
            Self::Unchanged(record) | Self::Created(record) => record,
        }
    }
}

pub struct DnsProvisioner<'a> {
    ctx: &'a FleetContext,
}

impl<'a> DnsProvisioner<'a> {
    pub fn new(ctx: &'a FleetContext) -> Self {
        Self { ctx }
    }

    /// Makes sure the provider manages `domain`.
    pub async fn ensure_domain(&self, domain: &str) -> Result<DomainOutcome, EngineError> {
        let api = self.ctx.cloud.dns.as_ref();

        if api.list_domains().await?.iter().any(|d| d.name == domain) {
            self.ctx.progress.event(&FleetEvent::DomainFound { domain });
            return Ok(DomainOutcome::Found);
        }

        match api.create_domain(domain).await {
            Ok(_) => {
                self.ctx.progress.event(&FleetEvent::DomainCreated { domain });
                Ok(DomainOutcome::Created)
            }
            Err(e) if e.is_conflict() => {
                debug!(domain, "Domain created concurrently");
                self.ctx.progress.event(&FleetEvent::DomainFound { domain });
                Ok(DomainOutcome::Found)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Points `fqdn` at `ip` with an A record.
    ///
    /// An existing identical record is left alone. Any other address record
    /// at the same label (a different A, an AAAA or a CNAME) is reported as
    /// an inconsistency rather than overwritten.
    pub async fn ensure_record(&self, fqdn: &Fqdn, ip: Ipv4Addr) -> Result<RecordOutcome, EngineError> {
        let api = self.ctx.cloud.dns.as_ref();
        let label = fqdn.record_name();
        let host = fqdn.host();
        let wanted = ip.to_string();

        let records = api.list_records(fqdn.domain()).await?;
        let (matching, conflicting): (Vec<_>, Vec<_>) = records
            .into_iter()
            .filter(|r| r.name == label && CONFLICTING_KINDS.contains(&r.kind.as_str()))
            .partition(|r| r.kind == "A" && r.data == wanted);

        if !conflicting.is_empty() {
            let found: Vec<String> = conflicting
                .iter()
                .map(|r| format!("{} {}", r.kind, r.data))
                .collect();
            return Err(EngineError::Inconsistency(format!(
                "{host} already has {}; expected only A {wanted}",
                found.join(", ")
            )));
        }

        if let Some(existing) = matching.into_iter().next() {
            self.ctx.progress.event(&FleetEvent::RecordFound {
                host: &host,
                ip: &existing.data,
            });
            return Ok(RecordOutcome::Unchanged(existing));
        }

        info!(%host, %ip, "Creating A record");
        let created = api
            .create_record(fqdn.domain(), &NewRecord::a(label, ip))
            .await?;
        self.ctx
            .progress
            .event(&FleetEvent::RecordCreated { host: &host, ip });
        Ok(RecordOutcome::Created(created))
    }
}

/// Waits until public DNS serves the expected address.
pub struct PropagationWatcher<'a> {
    ctx: &'a FleetContext,
}

impl<'a> PropagationWatcher<'a> {
    pub fn new(ctx: &'a FleetContext) -> Self {
        Self { ctx }
    }

    /// Resolves `fqdn` through the public resolver until it includes `ip`.
    ///
    /// After the first miss the domain's nameservers are reported once so
    /// the operator can check delegation. Returns the number of attempts.
    pub async fn wait(&self, fqdn: &Fqdn, ip: Ipv4Addr) -> Result<u32, EngineError> {
        let resolver = self.ctx.resolver.as_ref();
        let progress = self.ctx.progress.as_ref();
        let host = fqdn.host();
        let domain = fqdn.domain();
        let announced = AtomicBool::new(false);

        let poll_name = format!("DNS {host}");
        let attempts = Poller::new(self.ctx.config.propagation, &self.ctx.cancel)
            .with_observer(progress)
            .run(&poll_name, |attempt| {
                let host = host.as_str();
                let announced = &announced;
                async move {
                    let served = match resolver.resolve_a(host).await {
                        Ok(served) => served,
                        Err(e @ ResolveError::Spawn { .. }) => return Err(EngineError::from(e)),
                        Err(e) => {
                            debug!(host, error = %e, "Lookup failed");
                            Vec::new()
                        }
                    };

                    if served.contains(&ip) {
                        return Ok(Some(attempt));
                    }
                    debug!(host, ?served, "Not propagated");

                    if !announced.swap(true, Ordering::Relaxed) {
                        let nameservers = resolver.nameservers(domain).await.unwrap_or_else(|e| {
                            warn!(domain, error = %e, "Nameserver lookup failed");
                            Vec::new()
                        });
                        progress.event(&FleetEvent::Unresolved {
                            host,
                            nameservers: &nameservers,
                        });
                    }
                    Ok(None)
                }
            })
            .await?;

        progress.event(&FleetEvent::Resolved { host: &host, ip });
        Ok(attempts)
    }
}
