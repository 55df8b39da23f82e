//! Cloud provider interfaces.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{
    Certificate, Domain, DomainRecord, Droplet, LoadBalancer, LoadBalancerSpec, NewCertificate,
    NewDroplet, NewRecord, NewSshKey, SshKey,
};

/// Compute instances.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// List every droplet on the account.
    async fn list_droplets(&self) -> Result<Vec<Droplet>, ProviderError>;

    /// Submit a creation request; the droplet starts without an address.
    async fn create_droplet(&self, request: &NewDroplet) -> Result<Droplet, ProviderError>;

    /// Fetch one droplet by id.
    async fn get_droplet(&self, id: u64) -> Result<Droplet, ProviderError>;

    /// Destroy a droplet.
    async fn destroy_droplet(&self, id: u64) -> Result<(), ProviderError>;
}

/// Load balancers. There is no lookup-by-name endpoint; callers list and filter.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ProviderError>;

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
    ) -> Result<LoadBalancer, ProviderError>;

    /// Replace the backend membership of `balancer` in a single write.
    async fn set_droplets(
        &self,
        balancer: &LoadBalancer,
        droplet_ids: &[u64],
    ) -> Result<LoadBalancer, ProviderError>;
}

/// Domains and records.
#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError>;

    async fn create_domain(&self, name: &str) -> Result<Domain, ProviderError>;

    async fn list_records(&self, domain: &str) -> Result<Vec<DomainRecord>, ProviderError>;

    async fn create_record(
        &self,
        domain: &str,
        record: &NewRecord,
    ) -> Result<DomainRecord, ProviderError>;
}

/// TLS certificates.
#[async_trait]
pub trait CertificateApi: Send + Sync {
    async fn list_certificates(&self) -> Result<Vec<Certificate>, ProviderError>;

    async fn create_certificate(
        &self,
        request: &NewCertificate,
    ) -> Result<Certificate, ProviderError>;

    /// First certificate whose DNS names contain `domain` exactly.
    async fn find_certificate(&self, domain: &str) -> Result<Option<Certificate>, ProviderError> {
        Ok(self
            .list_certificates()
            .await?
            .into_iter()
            .find(|cert| cert.dns_names.iter().any(|n| n == domain)))
    }
}

/// SSH keys registered on the account.
#[async_trait]
pub trait SshKeyApi: Send + Sync {
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, ProviderError>;

    async fn create_ssh_key(&self, request: &NewSshKey) -> Result<SshKey, ProviderError>;
}

/// Every provider interface, shared by the components of one run.
#[derive(Clone)]
pub struct Cloud {
    pub compute: Arc<dyn ComputeApi>,
    pub load_balancers: Arc<dyn LoadBalancerApi>,
    pub dns: Arc<dyn DnsApi>,
    pub certificates: Arc<dyn CertificateApi>,
    pub ssh_keys: Arc<dyn SshKeyApi>,
}

impl Cloud {
    /// Uses one client for every interface.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: ComputeApi + LoadBalancerApi + DnsApi + CertificateApi + SshKeyApi + 'static,
    {
        Self {
            compute: client.clone(),
            load_balancers: client.clone(),
            dns: client.clone(),
            certificates: client.clone(),
            ssh_keys: client,
        }
    }
}

impl std::fmt::Debug for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloud").finish_non_exhaustive()
    }
}
