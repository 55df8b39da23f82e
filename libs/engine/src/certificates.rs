//! TLS certificates for the load balancer's HTTPS rule.
//!
//! One Let's Encrypt certificate per host, found by exact DNS name so a
//! rerun of `init` reuses it.

use tracing::info;
use upfleet_naming::{certificate_name, Fqdn};
use upfleet_provider::{Certificate, NewCertificate};

use crate::error::EngineError;
use crate::fleet::FleetContext;
use crate::progress::FleetEvent;

/// Ensures a provider-managed TLS certificate exists for a host.
pub struct CertificateProvisioner<'a> {
    ctx: &'a FleetContext,
}

impl<'a> CertificateProvisioner<'a> {
    pub fn new(ctx: &'a FleetContext) -> Self {
        Self { ctx }
    }

    /// Returns the certificate covering `fqdn`, requesting one if needed.
    pub async fn ensure(&self, fqdn: &Fqdn) -> Result<Certificate, EngineError> {
        let host = fqdn.host();
        let api = self.ctx.cloud.certificates.as_ref();

        if let Some(existing) = api.find_certificate(&host).await? {
            self.ctx.progress.event(&FleetEvent::CertificateFound {
                name: &existing.name,
            });
            return Ok(existing);
        }

        let request = NewCertificate::lets_encrypt(certificate_name(&host), vec![host.clone()]);
        info!(name = %request.name, %host, "Requesting certificate");

        match api.create_certificate(&request).await {
            Ok(created) => {
                self.ctx.progress.event(&FleetEvent::CertificateCreated {
                    name: &created.name,
                });
                Ok(created)
            }
            // Lost a race with a concurrent run.
            Err(e) if e.is_conflict() => api.find_certificate(&host).await?.ok_or_else(|| {
                EngineError::Inconsistency(format!(
                    "certificate {} conflicts but covers no {host}",
                    request.name
                ))
            }),
            Err(e) => Err(e.into()),
        }
    }
}
