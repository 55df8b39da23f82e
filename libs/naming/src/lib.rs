//! # upfleet-naming
//!
//! Canonical names for every provider resource an upfleet fleet owns.
//!
//! There is no datastore recording fleet membership: the names the compute
//! provider hands back on a listing ARE the state. A resource belongs to a
//! fleet exactly when [`match_name`] parses an ordinal out of it, so the
//! encoding here must stay stable across releases. Changing it orphans live
//! instances.
//!
//! ## Name Format
//!
//! Instances are named `{service}-{environment}-{index}`, load balancers
//! `{service}-{environment}`:
//!
//! - `api-production-0`
//! - `acme-web-staging-2` (from the scoped package name `@acme/web`)
//!
//! Scoped service identifiers (`@scope/name`) are flattened to `scope-name`
//! since neither `@` nor `/` is valid in a droplet hostname. Environments are
//! plain alphanumerics, so a name always splits from the right into
//! `(service, environment, index)`.

mod error;
mod fqdn;
mod target;

pub use error::NamingError;
pub use fqdn::Fqdn;
pub use target::{
    certificate_name, flatten_service, load_balancer_name, make_name, match_name, ServiceTarget,
};
