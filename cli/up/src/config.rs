//! Configuration discovery.
//!
//! Three sources feed one [`EngineConfig`]:
//! - the project's `package.json` (service name and an optional `up` object)
//! - the global `config.json` in the platform config directory
//! - command-line flags
//!
//! Flags win over the project, the project over the global file, and the
//! global file over built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use upfleet_engine::EngineConfig;
use upfleet_provider::DEFAULT_API_URL;

use crate::error::CliError;

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Project manifest searched for from the working directory upwards.
const PROJECT_FILE: &str = "package.json";

/// Environment variable overriding the stored token.
pub const TOKEN_ENV: &str = "DIGITALOCEAN_TOKEN";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "upfleet", "up")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Global settings shared by every project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Account SSH key ids or fingerprints installed on new instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Private key used to log in to instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<PathBuf>,

    /// Package registry credentials copied to instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npmrc: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// The API base URL.
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

/// Stored provider credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// DigitalOcean personal access token.
    pub token: String,
}

impl Credentials {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    /// Load credentials from disk.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&config_dir()?.join(CREDENTIALS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {:?}", path))?;

        let creds = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {:?}", path))?;

        Ok(Some(creds))
    }

    /// Save credentials to disk.
    pub fn save(&self) -> Result<PathBuf> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(CREDENTIALS_FILE);
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        write_private(path, &contents)
            .with_context(|| format!("Failed to write credentials to {:?}", path))
    }
}

/// Picks the token: the environment variable wins over the stored file.
pub fn resolve_token(env_token: Option<String>, stored: Option<&Credentials>) -> Option<String> {
    env_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| stored.map(|c| c.token.clone()))
}

/// Writes `contents` readable by the owner only.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)?;
    }

    Ok(())
}

/// The `up` object of `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    /// Environment name to the host it is served on.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub ssh_keys: Option<Vec<String>>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    #[serde(default)]
    up: ProjectSettings,
}

/// The project being operated on.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Directory holding `package.json`.
    pub root: PathBuf,
    /// Service name, possibly scoped.
    pub name: String,
    pub settings: ProjectSettings,
}

impl Project {
    /// Finds the nearest `package.json` at or above `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = start
            .ancestors()
            .find(|dir| dir.join(PROJECT_FILE).is_file())
            .ok_or_else(|| CliError::NoProject(start.to_path_buf()))?;
        Self::load(root)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(PROJECT_FILE);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        let package: PackageJson = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        let name = package
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| CliError::NoServiceName(path.clone()))?;

        Ok(Self {
            root: root.to_path_buf(),
            name,
            settings: package.up,
        })
    }

    /// The host configured for `environment`.
    pub fn domain_for(&self, environment: &str) -> Option<&str> {
        self.settings.targets.get(environment).map(String::as_str)
    }
}

/// Settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub size: Option<String>,
    pub image: Option<String>,
    pub ssh_keys: Vec<String>,
    pub ssh_private_key: Option<PathBuf>,
}

/// Merges every source into the engine's configuration.
pub fn engine_config(project: &Project, global: &GlobalConfig, overrides: &Overrides) -> EngineConfig {
    let mut config = EngineConfig::default();
    let settings = &project.settings;
    let droplet = &mut config.droplet;

    if let Some(region) = pick(&overrides.region, &settings.region, &global.region) {
        droplet.region = region;
    }
    if let Some(size) = overrides.size.clone().or_else(|| settings.size.clone()) {
        droplet.size = size;
    }
    if let Some(image) = overrides.image.clone().or_else(|| settings.image.clone()) {
        droplet.image = image;
    }
    droplet.ssh_keys = if !overrides.ssh_keys.is_empty() {
        overrides.ssh_keys.clone()
    } else {
        settings
            .ssh_keys
            .clone()
            .unwrap_or_else(|| global.ssh_keys.clone())
    };

    config.provision.npmrc = global
        .npmrc
        .clone()
        .or_else(|| home_dir().map(|home| home.join(".npmrc")));

    config
}

/// Private key for instance logins.
pub fn ssh_private_key(global: &GlobalConfig, overrides: &Overrides) -> Result<PathBuf> {
    if let Some(path) = overrides
        .ssh_private_key
        .clone()
        .or_else(|| global.ssh_private_key.clone())
    {
        return Ok(path);
    }
    home_dir()
        .map(|home| home.join(".ssh").join("id_rsa"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

fn pick(flag: &Option<String>, project: &Option<String>, global: &Option<String>) -> Option<String> {
    flag.clone().or_else(|| project.clone()).or_else(|| global.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use upfleet_engine::{DEFAULT_IMAGE, DEFAULT_REGION};

    fn write_package(dir: &Path, json: serde_json::Value) {
        fs::write(dir.join(PROJECT_FILE), json.to_string()).unwrap();
    }

    #[test]
    fn test_discover_walks_up() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            serde_json::json!({
                "name": "@acme/web",
                "up": {
                    "targets": { "production": "app.example.com" },
                    "sshKeys": ["12"],
                    "region": "nyc3"
                }
            }),
        );
        let nested = tmp.path().join("src").join("routes");
        fs::create_dir_all(&nested).unwrap();

        let project = Project::discover(&nested).unwrap();
        assert_eq!(project.root, tmp.path());
        assert_eq!(project.name, "@acme/web");
        assert_eq!(project.domain_for("production"), Some("app.example.com"));
        assert_eq!(project.domain_for("staging"), None);
        assert_eq!(project.settings.ssh_keys, Some(vec!["12".to_string()]));
    }

    #[test]
    fn test_discover_without_project() {
        let tmp = TempDir::new().unwrap();
        let err = Project::discover(tmp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::NoProject(_))
        ));
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_package(tmp.path(), serde_json::json!({ "version": "1.0.0" }));
        let err = Project::load(tmp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::NoServiceName(_))
        ));
    }

    #[test]
    fn test_precedence() {
        let project = Project {
            root: PathBuf::from("/srv/app"),
            name: "api".into(),
            settings: ProjectSettings {
                region: Some("nyc3".into()),
                size: Some("s-2vcpu-4gb".into()),
                ..Default::default()
            },
        };
        let global = GlobalConfig {
            region: Some("ams3".into()),
            ssh_keys: vec!["global-key".into()],
            ..Default::default()
        };

        let config = engine_config(&project, &global, &Overrides::default());
        assert_eq!(config.droplet.region, "nyc3");
        assert_eq!(config.droplet.size, "s-2vcpu-4gb");
        assert_eq!(config.droplet.image, DEFAULT_IMAGE);
        assert_eq!(config.droplet.ssh_keys, vec!["global-key".to_string()]);

        let overrides = Overrides {
            region: Some("sfo3".into()),
            ssh_keys: vec!["flag-key".into()],
            ..Default::default()
        };
        let config = engine_config(&project, &global, &overrides);
        assert_eq!(config.droplet.region, "sfo3");
        assert_eq!(config.droplet.ssh_keys, vec!["flag-key".to_string()]);
    }

    #[test]
    fn test_defaults_without_any_source() {
        let project = Project {
            root: PathBuf::from("/srv/app"),
            name: "api".into(),
            settings: ProjectSettings::default(),
        };
        let config = engine_config(&project, &GlobalConfig::default(), &Overrides::default());
        assert_eq!(config.droplet.region, DEFAULT_REGION);
        assert!(config.droplet.ssh_keys.is_empty());
    }

    #[test]
    fn test_global_config_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        assert_eq!(GlobalConfig::load_from(&path).unwrap(), GlobalConfig::default());

        fs::write(
            &path,
            r#"{"region":"lon1","api_url":"http://localhost:9000","npmrc":"/tmp/npmrc"}"#,
        )
        .unwrap();
        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.region.as_deref(), Some("lon1"));
        assert_eq!(config.api_url(), "http://localhost:9000");
        assert_eq!(config.npmrc, Some(PathBuf::from("/tmp/npmrc")));
    }

    #[test]
    fn test_credentials_are_private() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CREDENTIALS_FILE);
        Credentials::new("dop_v1_abc".into()).save_to(&path).unwrap();

        let loaded = Credentials::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.token, "dop_v1_abc");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_env_token_wins() {
        let stored = Credentials::new("stored".into());
        assert_eq!(
            resolve_token(Some("env".into()), Some(&stored)).as_deref(),
            Some("env")
        );
        assert_eq!(
            resolve_token(Some("  ".into()), Some(&stored)).as_deref(),
            Some("stored")
        );
        assert_eq!(resolve_token(None, None), None);
    }
}
