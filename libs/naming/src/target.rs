//! Service targets and the instance naming scheme.

use serde::{Deserialize, Serialize};

use crate::NamingError;

/// The unit of reconciliation: one service deployed to one environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTarget {
    service: String,
    environment: String,
}

impl ServiceTarget {
    /// Creates a target, validating that both halves produce legal names.
    pub fn new(
        service: impl Into<String>,
        environment: impl Into<String>,
    ) -> Result<Self, NamingError> {
        let service = service.into();
        let environment = environment.into();

        flatten_service(&service)?;
        validate_environment(&environment)?;

        Ok(Self {
            service,
            environment,
        })
    }

    /// The service name as declared (possibly scoped, e.g. `@acme/web`).
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The environment name.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The service name with scope syntax flattened.
    pub fn flat_service(&self) -> String {
        // validated in `new`
        flatten_lossy(&self.service)
    }

    /// Canonical name of the instance holding `index`.
    pub fn instance_name(&self, index: u32) -> String {
        format!("{}-{}", self.prefix(), index)
    }

    /// Parses the ordinal out of `name` if it belongs to this target.
    pub fn match_instance(&self, name: &str) -> Option<u32> {
        let rest = name.strip_prefix(&self.prefix())?.strip_prefix('-')?;
        parse_index(rest)
    }

    fn prefix(&self) -> String {
        format!("{}-{}", self.flat_service(), self.environment)
    }
}

impl std::fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.flat_service(), self.environment)
    }
}

/// Flattens a service identifier into a resource-name-safe form.
///
/// `@scope/name` becomes `scope-name`; underscores become hyphens. Anything
/// else outside `[A-Za-z0-9.-]` is rejected.
pub fn flatten_service(service: &str) -> Result<String, NamingError> {
    if service.is_empty() || service == "@" {
        return Err(NamingError::EmptyService);
    }

    let flat = flatten_lossy(service);
    if let Some(character) = flat.chars().find(|c| !is_name_char(*c)) {
        return Err(NamingError::InvalidCharacter {
            field: "service",
            value: service.to_string(),
            character,
        });
    }

    Ok(flat)
}

fn flatten_lossy(service: &str) -> String {
    service
        .strip_prefix('@')
        .unwrap_or(service)
        .chars()
        .map(|c| match c {
            '/' | '_' => '-',
            c => c,
        })
        .collect()
}

/// Environments may not contain `-`: the service half of a name can, so the
/// last two fields must always decode as environment and index.
fn validate_environment(environment: &str) -> Result<(), NamingError> {
    if environment.is_empty() {
        return Err(NamingError::EmptyEnvironment);
    }

    if let Some(character) = environment.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(NamingError::InvalidCharacter {
            field: "environment",
            value: environment.to_string(),
            character,
        });
    }

    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

/// Only canonical decimal renderings are accepted, so `app-prod-01` is not
/// mistaken for index 1.
fn parse_index(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return None;
    }
    raw.parse().ok()
}

/// Builds the canonical instance name for `(service, environment, index)`.
pub fn make_name(service: &str, environment: &str, index: u32) -> Result<String, NamingError> {
    Ok(ServiceTarget::new(service, environment)?.instance_name(index))
}

/// Returns the ordinal encoded in `resource_name` iff [`make_name`] produced it
/// for this service and environment.
pub fn match_name(resource_name: &str, service: &str, environment: &str) -> Option<u32> {
    ServiceTarget::new(service, environment)
        .ok()?
        .match_instance(resource_name)
}

/// Canonical load balancer name: exactly one per target.
pub fn load_balancer_name(target: &ServiceTarget) -> String {
    target.to_string()
}

/// Certificate name for a host (`app.example.com` -> `app-example-com`).
pub fn certificate_name(host: &str) -> String {
    host.split('.').collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("api", "production", 0, "api-production-0")]
    #[case("@acme/web", "staging", 3, "acme-web-staging-3")]
    #[case("my_service", "dev", 12, "my-service-dev-12")]
    #[case("@acme/web_app", "prod", 1, "acme-web-app-prod-1")]
    fn test_make_name(
        #[case] service: &str,
        #[case] environment: &str,
        #[case] index: u32,
        #[case] expected: &str,
    ) {
        assert_eq!(make_name(service, environment, index).unwrap(), expected);
    }

    #[rstest]
    #[case("api-production-0", Some(0))]
    #[case("api-production-17", Some(17))]
    #[case("api-production-", None)]
    #[case("api-production-01", None)]
    #[case("api-production-1a", None)]
    #[case("api-production-canary-1", None)]
    #[case("api-staging-1", None)]
    #[case("xapi-production-1", None)]
    #[case("api-production", None)]
    fn test_match_name(#[case] name: &str, #[case] expected: Option<u32>) {
        assert_eq!(match_name(name, "api", "production"), expected);
    }

    #[test]
    fn test_match_name_does_not_match_longer_environment() {
        assert_eq!(match_name("api-production-0", "api", "prod"), None);
    }

    #[test]
    fn test_rejects_invalid_names() {
        assert_eq!(
            ServiceTarget::new("", "prod").unwrap_err(),
            NamingError::EmptyService
        );
        assert_eq!(
            ServiceTarget::new("api", "").unwrap_err(),
            NamingError::EmptyEnvironment
        );
        assert!(matches!(
            ServiceTarget::new("api service", "prod").unwrap_err(),
            NamingError::InvalidCharacter { character: ' ', .. }
        ));
        assert!(matches!(
            ServiceTarget::new("api", "prod.eu").unwrap_err(),
            NamingError::InvalidCharacter {
                field: "environment",
                ..
            }
        ));
        assert!(matches!(
            ServiceTarget::new("web", "staging-eu").unwrap_err(),
            NamingError::InvalidCharacter {
                field: "environment",
                character: '-',
                ..
            }
        ));
    }

    #[rstest]
    #[case("web-staging", "eu", "web", "staging")]
    #[case("web-staging", "eu", "web-staging-eu", "prod")]
    #[case("acme-web", "prod", "acme", "prod")]
    #[case("api", "prod", "api", "prod1")]
    fn test_names_do_not_collide_across_targets(
        #[case] service: &str,
        #[case] environment: &str,
        #[case] other_service: &str,
        #[case] other_environment: &str,
    ) {
        let name = make_name(service, environment, 0).unwrap();
        assert_eq!(match_name(&name, other_service, other_environment), None);
    }

    #[test]
    fn test_load_balancer_and_certificate_names() {
        let target = ServiceTarget::new("@acme/web", "production").unwrap();
        assert_eq!(load_balancer_name(&target), "acme-web-production");
        assert_eq!(certificate_name("app.example.com"), "app-example-com");
    }

    #[test]
    fn test_target_serde() {
        let target = ServiceTarget::new("@acme/web", "staging").unwrap();
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["service"], "@acme/web");
        assert_eq!(json["environment"], "staging");
    }

    fn service_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z][a-z0-9-]{0,20}",
            "@[a-z]{1,8}/[a-z][a-z0-9_-]{0,12}",
        ]
    }

    proptest! {
        #[test]
        fn prop_match_inverts_make(
            service in service_strategy(),
            environment in "[a-z][a-z0-9]{0,12}",
            index in 0u32..100_000,
        ) {
            let name = make_name(&service, &environment, index).unwrap();
            prop_assert_eq!(match_name(&name, &service, &environment), Some(index));
        }

        #[test]
        fn prop_names_are_unique_per_target(
            service in service_strategy(),
            environment in "[a-z][a-z0-9]{0,8}",
            other_service in service_strategy(),
            other_environment in "[a-z][a-z0-9]{0,8}",
            index in 0u32..1000,
        ) {
            let same_target = flatten_service(&service).unwrap()
                == flatten_service(&other_service).unwrap()
                && environment == other_environment;
            prop_assume!(!same_target);

            let name = make_name(&service, &environment, index).unwrap();
            prop_assert_eq!(match_name(&name, &other_service, &other_environment), None);
        }

        #[test]
        fn prop_scoped_names_are_flattened(
            scope in "[a-zA-Z]{1,10}",
            name in "[a-zA-Z][a-zA-Z_-]{0,10}",
            environment in "[a-z]{1,8}",
            index in 0u32..1000,
        ) {
            let service = format!("@{scope}/{name}");
            let generated = make_name(&service, &environment, index).unwrap();
            prop_assert!(!generated.contains('@'));
            prop_assert!(!generated.contains('/'));
            let expected_prefix = format!("{}-", scope);
            prop_assert!(generated.starts_with(&expected_prefix));
        }
    }
}
