//! Splitting target hosts into subdomain label and registrable domain.

use serde::{Deserialize, Serialize};

use crate::NamingError;

/// A target host of the form `domain.tld` or `label.domain.tld`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fqdn {
    subdomain: Option<String>,
    domain: String,
}

impl Fqdn {
    /// Parses a host name; a trailing dot is tolerated. Labels are
    /// lowercased, as DNS providers report them.
    pub fn parse(host: &str) -> Result<Self, NamingError> {
        let lowered = host.trim().trim_end_matches('.').to_ascii_lowercase();
        let labels: Vec<&str> = lowered.split('.').collect();

        if labels.iter().any(|l| l.is_empty() || !is_label(l)) {
            return Err(NamingError::InvalidFqdn(host.to_string()));
        }

        match labels.as_slice() {
            [name, tld] => Ok(Self {
                subdomain: None,
                domain: format!("{name}.{tld}"),
            }),
            [sub, name, tld] => Ok(Self {
                subdomain: Some((*sub).to_string()),
                domain: format!("{name}.{tld}"),
            }),
            _ => Err(NamingError::InvalidFqdn(host.to_string())),
        }
    }

    /// The subdomain label, if any.
    pub fn subdomain(&self) -> Option<&str> {
        self.subdomain.as_deref()
    }

    /// The registrable domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The record name as DNS providers spell it: the label, or `@` for the root.
    pub fn record_name(&self) -> &str {
        self.subdomain.as_deref().unwrap_or("@")
    }

    /// The full host name.
    pub fn host(&self) -> String {
        match &self.subdomain {
            Some(sub) => format!("{sub}.{}", self.domain),
            None => self.domain.clone(),
        }
    }
}

impl std::fmt::Display for Fqdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host())
    }
}

impl std::str::FromStr for Fqdn {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_label(label: &str) -> bool {
    label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}
