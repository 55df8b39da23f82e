//! Fake cloud provider.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use upfleet_provider::{
    Certificate, CertificateApi, ComputeApi, DnsApi, Domain, DomainRecord, Droplet,
    DropletStatus, LoadBalancer, LoadBalancerApi, LoadBalancerSpec, NetworkKind, NetworkV4,
    Networks, NewCertificate, NewDroplet, NewRecord, NewSshKey, ProviderError, RegionRef, SshKey,
    SshKeyApi,
};

use crate::lock;

/// One call made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    ListDroplets,
    CreateDroplet { name: String },
    GetDroplet { id: u64 },
    DestroyDroplet { id: u64 },
    ListLoadBalancers,
    CreateLoadBalancer { name: String, droplet_ids: Vec<u64> },
    SetDroplets { id: String, droplet_ids: Vec<u64> },
    ListDomains,
    CreateDomain { name: String },
    ListRecords { domain: String },
    CreateRecord { domain: String, name: String, data: String },
    ListCertificates,
    CreateCertificate { name: String },
    ListSshKeys,
    CreateSshKey { name: String },
}

impl CloudCall {
    /// Returns true for calls that change provider state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateDroplet { .. }
                | Self::DestroyDroplet { .. }
                | Self::CreateLoadBalancer { .. }
                | Self::SetDroplets { .. }
                | Self::CreateDomain { .. }
                | Self::CreateRecord { .. }
                | Self::CreateCertificate { .. }
                | Self::CreateSshKey { .. }
        )
    }
}

#[derive(Default)]
struct CloudState {
    next_id: u64,
    droplets: Vec<Droplet>,
    /// Remaining `get_droplet` polls before a new droplet gets its address.
    pending_addresses: HashMap<u64, u32>,
    address_delay: u32,
    balancers: Vec<LoadBalancer>,
    pending_balancer_ips: HashMap<String, u32>,
    balancer_ip_delay: u32,
    domains: Vec<Domain>,
    records: BTreeMap<String, Vec<DomainRecord>>,
    certificates: Vec<Certificate>,
    ssh_keys: Vec<SshKey>,
    failing_names: Vec<String>,
    calls: Vec<CloudCall>,
}

impl CloudState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of every provider API.
///
/// New droplets start without an address and receive one after a
/// configurable number of `get_droplet` polls (one by default). New load
/// balancers likewise get an IP after a number of listings.
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState {
                address_delay: 1,
                balancer_ip_delay: 1,
                ..Default::default()
            }),
        }
    }

    /// Address assigned to the droplet with `id`.
    pub fn droplet_address(id: u64) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(Ipv4Addr::new(203, 0, 113, 0)) + id as u32)
    }

    /// Address assigned to the `n`th load balancer.
    pub fn balancer_address(n: u64) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(Ipv4Addr::new(198, 51, 100, 0)) + n as u32)
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Adds a running droplet with an address; returns its id.
    pub fn add_droplet(&self, name: &str) -> u64 {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.droplets.push(Droplet {
            id,
            name: name.to_string(),
            status: DropletStatus::Active,
            networks: public_network(Self::droplet_address(id)),
            created_at: None,
        });
        id
    }

    pub fn add_load_balancer(&self, name: &str, droplet_ids: &[u64]) -> String {
        let mut state = lock(&self.state);
        let n = state.next_id();
        let balancer = balancer(n, name, droplet_ids.to_vec(), Some(Self::balancer_address(n)));
        let id = balancer.id.clone();
        state.balancers.push(balancer);
        id
    }

    pub fn add_domain(&self, name: &str) {
        lock(&self.state).domains.push(Domain {
            name: name.to_string(),
        });
    }

    pub fn add_record(&self, domain: &str, kind: &str, name: &str, data: &str) {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state
            .records
            .entry(domain.to_string())
            .or_default()
            .push(DomainRecord {
                id,
                kind: kind.to_string(),
                name: name.to_string(),
                data: data.to_string(),
            });
    }

    pub fn add_certificate(&self, name: &str, dns_names: &[&str]) -> String {
        let mut state = lock(&self.state);
        let id = format!("cert-{}", state.next_id());
        state.certificates.push(Certificate {
            id: id.clone(),
            name: name.to_string(),
            dns_names: dns_names.iter().map(|n| n.to_string()).collect(),
            kind: "lets_encrypt".to_string(),
            state: "verified".to_string(),
        });
        id
    }

    pub fn add_ssh_key(&self, name: &str) -> u64 {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.ssh_keys.push(SshKey {
            id,
            name: name.to_string(),
            fingerprint: format!("aa:bb:{id:02x}"),
            public_key: format!("ssh-ed25519 AAAA{id} {name}"),
        });
        id
    }

    // -------------------------------------------------------------------------
    // Behavior
    // -------------------------------------------------------------------------

    /// Number of polls before new droplets get an address.
    pub fn set_address_delay(&self, polls: u32) {
        lock(&self.state).address_delay = polls;
    }

    /// Number of listings before new load balancers get an IP.
    pub fn set_balancer_ip_delay(&self, listings: u32) {
        lock(&self.state).balancer_ip_delay = listings;
    }

    /// Makes creation of the droplet called `name` fail.
    pub fn fail_droplet(&self, name: &str) {
        lock(&self.state).failing_names.push(name.to_string());
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<CloudCall> {
        lock(&self.state).calls.clone()
    }

    pub fn writes(&self) -> Vec<CloudCall> {
        self.calls().into_iter().filter(CloudCall::is_write).collect()
    }

    pub fn droplets(&self) -> Vec<Droplet> {
        lock(&self.state).droplets.clone()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> {
        lock(&self.state).balancers.clone()
    }

    pub fn domains(&self) -> Vec<String> {
        lock(&self.state)
            .domains
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn records(&self, domain: &str) -> Vec<DomainRecord> {
        lock(&self.state)
            .records
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        lock(&self.state).certificates.clone()
    }

    fn record(&self, call: CloudCall) -> std::sync::MutexGuard<'_, CloudState> {
        debug!(?call, "[FAKE] cloud call");
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }
}

fn public_network(ip: Ipv4Addr) -> Networks {
    Networks {
        v4: vec![NetworkV4 {
            ip_address: ip,
            kind: NetworkKind::Public,
        }],
    }
}

fn balancer(n: u64, name: &str, droplet_ids: Vec<u64>, ip: Option<Ipv4Addr>) -> LoadBalancer {
    LoadBalancer {
        id: format!("lb-{n}"),
        name: name.to_string(),
        ip,
        status: if ip.is_some() { "active" } else { "new" }.to_string(),
        algorithm: "least_connections".to_string(),
        region: Some(RegionRef {
            slug: "tor1".to_string(),
        }),
        droplet_ids,
        forwarding_rules: Vec::new(),
        health_check: None,
        redirect_http_to_https: true,
    }
}

fn not_found(what: &str) -> ProviderError {
    ProviderError::api(404, "not_found", format!("{what} not found"))
}

#[async_trait]
impl ComputeApi for FakeCloud {
    async fn list_droplets(&self) -> Result<Vec<Droplet>, ProviderError> {
        Ok(self.record(CloudCall::ListDroplets).droplets.clone())
    }

    async fn create_droplet(&self, request: &NewDroplet) -> Result<Droplet, ProviderError> {
        let mut state = self.record(CloudCall::CreateDroplet {
            name: request.name.clone(),
        });

        if state.failing_names.contains(&request.name) {
            return Err(ProviderError::api(
                422,
                "unprocessable_entity",
                format!("cannot create {}", request.name),
            ));
        }

        let id = state.next_id();
        let delay = state.address_delay;
        let droplet = Droplet {
            id,
            name: request.name.clone(),
            status: DropletStatus::New,
            networks: Networks::default(),
            created_at: None,
        };
        state.pending_addresses.insert(id, delay);
        state.droplets.push(droplet.clone());

        if delay == 0 {
            assign_address(&mut state, id);
        }
        Ok(droplet)
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet, ProviderError> {
        let mut state = self.record(CloudCall::GetDroplet { id });

        if let Some(remaining) = state.pending_addresses.get_mut(&id) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                assign_address(&mut state, id);
            }
        }

        state
            .droplets
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| not_found("droplet"))
    }

    async fn destroy_droplet(&self, id: u64) -> Result<(), ProviderError> {
        let mut state = self.record(CloudCall::DestroyDroplet { id });
        let before = state.droplets.len();
        state.droplets.retain(|d| d.id != id);
        if state.droplets.len() == before {
            return Err(not_found("droplet"));
        }
        Ok(())
    }
}

fn assign_address(state: &mut CloudState, id: u64) {
    state.pending_addresses.remove(&id);
    if let Some(droplet) = state.droplets.iter_mut().find(|d| d.id == id) {
        droplet.status = DropletStatus::Active;
        droplet.networks = public_network(FakeCloud::droplet_address(id));
    }
}

#[async_trait]
impl LoadBalancerApi for FakeCloud {
    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ProviderError> {
        let mut state = self.record(CloudCall::ListLoadBalancers);

        let mut ready = Vec::new();
        for (id, remaining) in state.pending_balancer_ips.iter_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                ready.push(id.clone());
            }
        }
        for id in ready {
            state.pending_balancer_ips.remove(&id);
            if let Some(lb) = state.balancers.iter_mut().find(|lb| lb.id == id) {
                let n = id.trim_start_matches("lb-").parse().unwrap_or(0);
                lb.ip = Some(FakeCloud::balancer_address(n));
                lb.status = "active".to_string();
            }
        }

        Ok(state.balancers.clone())
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
    ) -> Result<LoadBalancer, ProviderError> {
        let mut state = self.record(CloudCall::CreateLoadBalancer {
            name: spec.name.clone(),
            droplet_ids: spec.droplet_ids.clone(),
        });

        let n = state.next_id();
        let delay = state.balancer_ip_delay;
        let ip = (delay == 0).then(|| Self::balancer_address(n));

        let mut created = balancer(n, &spec.name, spec.droplet_ids.clone(), ip);
        created.algorithm = spec.algorithm.clone();
        created.region = Some(RegionRef {
            slug: spec.region.clone(),
        });
        created.forwarding_rules = spec.forwarding_rules.clone();
        created.health_check = Some(spec.health_check.clone());
        created.redirect_http_to_https = spec.redirect_http_to_https;

        if delay > 0 {
            state.pending_balancer_ips.insert(created.id.clone(), delay);
        }
        state.balancers.push(created.clone());
        Ok(created)
    }

    async fn set_droplets(
        &self,
        balancer: &LoadBalancer,
        droplet_ids: &[u64],
    ) -> Result<LoadBalancer, ProviderError> {
        let mut state = self.record(CloudCall::SetDroplets {
            id: balancer.id.clone(),
            droplet_ids: droplet_ids.to_vec(),
        });

        let existing = state
            .balancers
            .iter_mut()
            .find(|lb| lb.id == balancer.id)
            .ok_or_else(|| not_found("load balancer"))?;
        existing.droplet_ids = droplet_ids.to_vec();
        Ok(existing.clone())
    }
}

#[async_trait]
impl DnsApi for FakeCloud {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError> {
        Ok(self.record(CloudCall::ListDomains).domains.clone())
    }

    async fn create_domain(&self, name: &str) -> Result<Domain, ProviderError> {
        let mut state = self.record(CloudCall::CreateDomain {
            name: name.to_string(),
        });

        if state.domains.iter().any(|d| d.name == name) {
            return Err(ProviderError::api(
                422,
                "unprocessable_entity",
                "Name already exists",
            ));
        }

        let domain = Domain {
            name: name.to_string(),
        };
        state.domains.push(domain.clone());
        Ok(domain)
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<DomainRecord>, ProviderError> {
        let state = self.record(CloudCall::ListRecords {
            domain: domain.to_string(),
        });
        if !state.domains.iter().any(|d| d.name == domain) {
            return Err(not_found("domain"));
        }
        Ok(state.records.get(domain).cloned().unwrap_or_default())
    }

    async fn create_record(
        &self,
        domain: &str,
        record: &NewRecord,
    ) -> Result<DomainRecord, ProviderError> {
        let mut state = self.record(CloudCall::CreateRecord {
            domain: domain.to_string(),
            name: record.name.clone(),
            data: record.data.clone(),
        });

        let id = state.next_id();
        let created = DomainRecord {
            id,
            kind: record.kind.clone(),
            name: record.name.clone(),
            data: record.data.clone(),
        };
        state
            .records
            .entry(domain.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CertificateApi for FakeCloud {
    async fn list_certificates(&self) -> Result<Vec<Certificate>, ProviderError> {
        Ok(self.record(CloudCall::ListCertificates).certificates.clone())
    }

    async fn create_certificate(
        &self,
        request: &NewCertificate,
    ) -> Result<Certificate, ProviderError> {
        let mut state = self.record(CloudCall::CreateCertificate {
            name: request.name.clone(),
        });

        let certificate = Certificate {
            id: format!("cert-{}", state.next_id()),
            name: request.name.clone(),
            dns_names: request.dns_names.clone(),
            kind: request.kind.clone(),
            state: "pending".to_string(),
        };
        state.certificates.push(certificate.clone());
        Ok(certificate)
    }
}

#[async_trait]
impl SshKeyApi for FakeCloud {
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, ProviderError> {
        Ok(self.record(CloudCall::ListSshKeys).ssh_keys.clone())
    }

    async fn create_ssh_key(&self, request: &NewSshKey) -> Result<SshKey, ProviderError> {
        let mut state = self.record(CloudCall::CreateSshKey {
            name: request.name.clone(),
        });

        let id = state.next_id();
        let key = SshKey {
            id,
            name: request.name.clone(),
            fingerprint: format!("aa:bb:{id:02x}"),
            public_key: request.public_key.clone(),
        };
        state.ssh_keys.push(key.clone());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_droplet(name: &str) -> NewDroplet {
        NewDroplet {
            name: name.to_string(),
            region: "tor1".to_string(),
            size: "s-1vcpu-2gb".to_string(),
            image: "ubuntu-22-04-x64".to_string(),
            ssh_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_address_arrives_after_poll() {
        let cloud = FakeCloud::new();
        let created = cloud.create_droplet(&new_droplet("api-prod-0")).await.unwrap();
        assert!(created.public_ipv4().is_none());

        let polled = cloud.get_droplet(created.id).await.unwrap();
        assert_eq!(polled.public_ipv4(), Some(FakeCloud::droplet_address(created.id)));
        assert_eq!(polled.status, DropletStatus::Active);
    }

    #[tokio::test]
    async fn test_writes_are_recorded() {
        let cloud = FakeCloud::new();
        cloud.add_droplet("api-prod-0");
        cloud.list_droplets().await.unwrap();
        assert!(cloud.writes().is_empty());

        cloud.create_domain("example.com").await.unwrap();
        assert_eq!(
            cloud.writes(),
            vec![CloudCall::CreateDomain {
                name: "example.com".into()
            }]
        );

        let err = cloud.create_domain("example.com").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_failing_droplet() {
        let cloud = FakeCloud::new();
        cloud.fail_droplet("api-prod-1");
        assert!(cloud.create_droplet(&new_droplet("api-prod-1")).await.is_err());
        assert!(cloud.droplets().is_empty());
    }
}
