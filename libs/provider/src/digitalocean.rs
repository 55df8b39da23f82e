//! DigitalOcean v2 REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{CertificateApi, ComputeApi, DnsApi, LoadBalancerApi, SshKeyApi};
use crate::error::ProviderError;
use crate::types::{
    Certificate, Domain, DomainRecord, Droplet, LoadBalancer, LoadBalancerSpec, NewCertificate,
    NewDroplet, NewRecord, NewSshKey, SshKey,
};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

/// Largest page size the API accepts.
const PAGE_SIZE: u32 = 200;

/// API client authenticated with a single bearer token.
#[derive(Debug, Clone)]
pub struct DigitalOceanClient {
    client: reqwest::Client,
    base_url: String,
}

impl DigitalOceanClient {
    /// Create a client against `base_url` (normally [`DEFAULT_API_URL`]).
    pub fn new(base_url: &str, token: &str) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ProviderError::Unauthenticated)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}/v2{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        debug!(path, "GET");
        let response = self.client.get(self.url(path)).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        debug!(path, "POST");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        debug!(path, "PUT");
        let response = self.client.put(self.url(path)).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        debug!(path, "DELETE");
        let response = self.client.delete(self.url(path)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(response).await
        }
    }

    /// Collects every page of a list endpoint. `key` names the array field.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let body: serde_json::Value = self
                .get(&format!("{path}{separator}per_page={PAGE_SIZE}&page={page}"))
                .await?;

            let batch = body
                .get(key)
                .cloned()
                .ok_or_else(|| ProviderError::Decode(format!("missing '{key}' in {path}")))?;
            let batch: Vec<T> = serde_json::from_value(batch)
                .map_err(|e| ProviderError::Decode(format!("{path}: {e}")))?;
            items.extend(batch);

            let has_next = body
                .pointer("/links/pages/next")
                .and_then(serde_json::Value::as_str)
                .is_some();
            if !has_next {
                return Ok(items);
            }
            page += 1;
        }
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| ProviderError::Decode(e.to_string()))
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, ProviderError> {
        let status = response.status().as_u16();

        // Try to parse error response
        let error_body: ApiErrorResponse =
            response.json().await.unwrap_or_else(|_| ApiErrorResponse {
                id: "unknown".to_string(),
                message: "Unknown error".to_string(),
            });

        if status == 401 {
            return Err(ProviderError::Unauthenticated);
        }

        warn!(status, code = %error_body.id, message = %error_body.message, "Provider API error");
        Err(ProviderError::api(status, error_body.id, error_body.message))
    }
}

/// API error response structure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct LoadBalancerEnvelope {
    load_balancer: LoadBalancer,
}

#[derive(Debug, Deserialize)]
struct DomainEnvelope {
    domain: Domain,
}

#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    domain_record: DomainRecord,
}

#[derive(Debug, Deserialize)]
struct CertificateEnvelope {
    certificate: Certificate,
}

#[derive(Debug, Deserialize)]
struct SshKeyEnvelope {
    ssh_key: SshKey,
}

#[derive(Debug, Serialize)]
struct NewDomain<'a> {
    name: &'a str,
}

#[async_trait]
impl ComputeApi for DigitalOceanClient {
    async fn list_droplets(&self) -> Result<Vec<Droplet>, ProviderError> {
        self.list_all("/droplets", "droplets").await
    }

    async fn create_droplet(&self, request: &NewDroplet) -> Result<Droplet, ProviderError> {
        let envelope: DropletEnvelope = self.post("/droplets", request).await?;
        Ok(envelope.droplet)
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet, ProviderError> {
        let envelope: DropletEnvelope = self.get(&format!("/droplets/{id}")).await?;
        Ok(envelope.droplet)
    }

    async fn destroy_droplet(&self, id: u64) -> Result<(), ProviderError> {
        self.delete(&format!("/droplets/{id}")).await
    }
}

#[async_trait]
impl LoadBalancerApi for DigitalOceanClient {
    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ProviderError> {
        self.list_all("/load_balancers", "load_balancers").await
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
    ) -> Result<LoadBalancer, ProviderError> {
        let envelope: LoadBalancerEnvelope = self.post("/load_balancers", spec).await?;
        Ok(envelope.load_balancer)
    }

    async fn set_droplets(
        &self,
        balancer: &LoadBalancer,
        droplet_ids: &[u64],
    ) -> Result<LoadBalancer, ProviderError> {
        // PUT replaces the whole balancer, so the existing settings ride along.
        let spec = LoadBalancerSpec::from_existing(balancer, droplet_ids.to_vec());
        let envelope: LoadBalancerEnvelope = self
            .put(&format!("/load_balancers/{}", balancer.id), &spec)
            .await?;
        Ok(envelope.load_balancer)
    }
}

#[async_trait]
impl DnsApi for DigitalOceanClient {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError> {
        self.list_all("/domains", "domains").await
    }

    async fn create_domain(&self, name: &str) -> Result<Domain, ProviderError> {
        let envelope: DomainEnvelope = self.post("/domains", &NewDomain { name }).await?;
        Ok(envelope.domain)
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<DomainRecord>, ProviderError> {
        self.list_all(&format!("/domains/{domain}/records"), "domain_records")
            .await
    }

    async fn create_record(
        &self,
        domain: &str,
        record: &NewRecord,
    ) -> Result<DomainRecord, ProviderError> {
        let envelope: RecordEnvelope = self
            .post(&format!("/domains/{domain}/records"), record)
            .await?;
        Ok(envelope.domain_record)
    }
}

#[async_trait]
impl CertificateApi for DigitalOceanClient {
    async fn list_certificates(&self) -> Result<Vec<Certificate>, ProviderError> {
        self.list_all("/certificates", "certificates").await
    }

    async fn create_certificate(
        &self,
        request: &NewCertificate,
    ) -> Result<Certificate, ProviderError> {
        debug!(name = %request.name, dns_names = ?request.dns_names, "Requesting certificate");
        let envelope: CertificateEnvelope = self.post("/certificates", request).await?;
        Ok(envelope.certificate)
    }
}

#[async_trait]
impl SshKeyApi for DigitalOceanClient {
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, ProviderError> {
        self.list_all("/account/keys", "ssh_keys").await
    }

    async fn create_ssh_key(&self, request: &NewSshKey) -> Result<SshKey, ProviderError> {
        let envelope: SshKeyEnvelope = self.post("/account/keys", request).await?;
        Ok(envelope.ssh_key)
    }
}
