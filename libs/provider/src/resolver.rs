//! Public DNS resolution that bypasses the local resolver and its cache.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("lookup of {name} failed: {stderr}")]
    Lookup { name: String, stderr: String },
}

/// Queries an external resolver directly.
#[async_trait]
pub trait PublicResolver: Send + Sync {
    /// A records currently served for `host`; empty if none.
    async fn resolve_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError>;

    /// Authoritative nameservers for `domain`.
    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, ResolveError>;
}

/// Resolver shelling out to `dig` against a fixed server.
#[derive(Debug, Clone)]
pub struct DigResolver {
    server: IpAddr,
}

impl DigResolver {
    pub fn new(server: IpAddr) -> Self {
        Self { server }
    }

    async fn query(&self, kind: &str, name: &str) -> Result<String, ResolveError> {
        let server = format!("@{}", self.server);
        debug!(server = %self.server, kind, name, "dig");

        let output = Command::new("dig")
            .args(["+short", kind, &server, name])
            .output()
            .await
            .map_err(|source| ResolveError::Spawn {
                program: "dig",
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::Lookup {
                name: name.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DigResolver {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)))
    }
}

#[async_trait]
impl PublicResolver for DigResolver {
    async fn resolve_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        Ok(parse_a_records(&self.query("A", host).await?))
    }

    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, ResolveError> {
        let stdout = self.query("NS", domain).await?;
        Ok(stdout
            .lines()
            .map(|l| l.trim().trim_end_matches('.').to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

/// Extracts addresses from `dig +short` output; CNAME hops are skipped.
pub fn parse_a_records(stdout: &str) -> Vec<Ipv4Addr> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_a_records() {
        let out = "app.example.com.cdn.net.\n203.0.113.10\n\n203.0.113.11\n";
        assert_eq!(
            parse_a_records(out),
            vec![
                Ipv4Addr::new(203, 0, 113, 10),
                Ipv4Addr::new(203, 0, 113, 11)
            ]
        );
        assert!(parse_a_records("").is_empty());
    }

    #[test]
    fn test_default_server() {
        assert_eq!(
            DigResolver::default().server,
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))
        );
    }
}
