use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use upfleet_provider::{PublicResolver, ResolveError};

use crate::lock;

#[derive(Debug, Default)]
struct ResolverState {
    answers: HashMap<String, Vec<Ipv4Addr>>,
    /// Lookups that come back empty before the answer is served.
    misses: HashMap<String, u32>,
    nameservers: HashMap<String, Vec<String>>,
    lookups: HashMap<String, u32>,
    nameserver_lookups: u32,
}

/// Scripted public DNS.
#[derive(Debug, Default)]
pub struct FakeResolver {
    state: Mutex<ResolverState>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `ip` for `host` immediately.
    pub fn serve(&self, host: &str, ip: Ipv4Addr) {
        self.serve_after(host, ip, 0);
    }

    /// Serves `ip` for `host` once `misses` lookups have come back empty.
    pub fn serve_after(&self, host: &str, ip: Ipv4Addr, misses: u32) {
        let mut state = lock(&self.state);
        state.answers.insert(host.to_string(), vec![ip]);
        state.misses.insert(host.to_string(), misses);
    }

    pub fn set_nameservers(&self, domain: &str, nameservers: &[&str]) {
        lock(&self.state).nameservers.insert(
            domain.to_string(),
            nameservers.iter().map(|n| n.to_string()).collect(),
        );
    }

    /// A record lookups made for `host`.
    pub fn lookups(&self, host: &str) -> u32 {
        lock(&self.state).lookups.get(host).copied().unwrap_or(0)
    }

    pub fn nameserver_lookups(&self) -> u32 {
        lock(&self.state).nameserver_lookups
    }
}

#[async_trait]
impl PublicResolver for FakeResolver {
    async fn resolve_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let mut state = lock(&self.state);
        *state.lookups.entry(host.to_string()).or_default() += 1;

        if let Some(misses) = state.misses.get_mut(host).filter(|m| **m > 0) {
            *misses -= 1;
            return Ok(Vec::new());
        }
        Ok(state.answers.get(host).cloned().unwrap_or_default())
    }

    async fn nameservers(&self, domain: &str) -> Result<Vec<String>, ResolveError> {
        let mut state = lock(&self.state);
        state.nameserver_lookups += 1;
        Ok(state.nameservers.get(domain).cloned().unwrap_or_default())
    }
}
