//! # upfleet-provider
//!
//! The remote systems an upfleet fleet is built from, each behind an async
//! trait so the engine can be driven against in-memory fakes:
//!
//! - [`ComputeApi`], [`LoadBalancerApi`], [`DnsApi`], [`CertificateApi`],
//!   [`SshKeyApi`]: the cloud provider, implemented for DigitalOcean by
//!   [`DigitalOceanClient`].
//! - [`Connector`] / [`RemoteSession`]: command execution on instances,
//!   implemented over libssh2 by [`SshConnector`].
//! - [`PublicResolver`]: DNS lookups through a public resolver, bypassing
//!   local caches, implemented by [`DigResolver`].

mod api;
mod digitalocean;
mod error;
mod remote;
mod resolver;
mod ssh;
mod types;

pub use api::{CertificateApi, Cloud, ComputeApi, DnsApi, LoadBalancerApi, SshKeyApi};
pub use digitalocean::{DigitalOceanClient, DEFAULT_API_URL};
pub use error::ProviderError;
pub use remote::{CommandOutput, ConnectError, Connector, RemoteCommand, RemoteError, RemoteSession};
pub use resolver::{parse_a_records, DigResolver, PublicResolver, ResolveError};
pub use ssh::{SshConfig, SshConnector};
pub use types::*;
