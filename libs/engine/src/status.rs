//! Application status probes.
//!
//! Every host's bootstrap entrypoint serves a small JSON document on the
//! status port describing the running build.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::instance::Instance;

/// The status document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    /// Seconds since the entrypoint started.
    pub uptime: f64,
    pub version: Option<String>,
    /// Hex SHA-256 of the running bundle.
    pub hash: Option<String>,
}

/// Probe result for one instance.
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub instance: Instance,
    pub status: Result<AppStatus, String>,
}

#[derive(Debug, Clone)]
pub struct StatusProbe {
    client: reqwest::Client,
    port: u16,
}

impl StatusProbe {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, port })
    }

    pub async fn probe(&self, address: Ipv4Addr) -> Result<AppStatus, reqwest::Error> {
        let url = format!("http://{address}:{}/", self.port);
        debug!(%url, "Probing status");
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Probes every instance concurrently; failures are per instance.
    pub async fn probe_all(&self, instances: &[Instance]) -> Vec<InstanceReport> {
        join_all(instances.iter().map(|instance| async move {
            let status = match instance.address {
                Some(address) => self.probe(address).await.map_err(|e| e.to_string()),
                None => Err("no public address".to_string()),
            };
            InstanceReport {
                instance: instance.clone(),
                status,
            }
        }))
        .await
    }
}
