//! CLI commands.

mod deploy;
mod env;
mod init;
mod keys;
mod list;
mod login;
mod logs;
mod restart;
mod scale;
mod setup;
mod status;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use upfleet_engine::{Fleet, FleetContext, FleetEvent, InstanceFailure};
use upfleet_naming::ServiceTarget;
use upfleet_provider::{Cloud, DigResolver, DigitalOceanClient, SshConfig, SshConnector};

use crate::config::{self, Credentials, GlobalConfig, Overrides, Project};
use crate::error::CliError;
use crate::output::{print_warning, ConsoleProgress, OutputFormat};

/// Public resolver queried while waiting for DNS propagation.
const PUBLIC_RESOLVER: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

/// up - Deploy a Node.js service to a fleet of droplets behind a load balancer.
#[derive(Debug, Parser)]
#[command(name = "up")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Environment to operate on (e.g. production, staging).
    #[arg(short, long, global = true, env = "UP_TARGET")]
    target: Option<String>,

    /// Enable debug logging and print full error chains.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    /// Region for new instances and the load balancer.
    #[arg(long, global = true)]
    region: Option<String>,

    /// Size slug for new instances.
    #[arg(long, global = true)]
    size: Option<String>,

    /// Image slug for new instances.
    #[arg(long, global = true)]
    image: Option<String>,

    /// Account SSH key id or fingerprint to install (repeatable).
    #[arg(long = "ssh-key", global = true)]
    ssh_keys: Vec<String>,

    /// Private key used to log in to instances.
    #[arg(short = 'i', long, global = true)]
    identity: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy the built application to every instance (default).
    Deploy(deploy::DeployCommand),

    /// Scale the fleet: `+N`, `-N` or an absolute size.
    Scale(scale::ScaleCommand),

    /// List the target's instances.
    List(list::ListCommand),

    /// Create the first instance, load balancer, certificate and DNS record.
    Init(init::InitCommand),

    /// Restart the application on every instance.
    Restart(restart::RestartCommand),

    /// Print the application's log from every instance.
    Logs(logs::LogsCommand),

    /// Query the status endpoint of every instance.
    Status(status::StatusCommand),

    /// Read or change the application's environment file.
    Env(env::EnvCommand),

    /// Manage account SSH keys.
    Keys(keys::KeysCommand),

    /// Store a DigitalOcean API token.
    Login(login::LoginCommand),

    /// Re-run provisioning on an instance.
    Setup(setup::SetupCommand),
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn json_logs(&self) -> bool {
        self.log_json
    }

    /// Run the CLI command.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let global = GlobalConfig::load()?;
        let credentials = Credentials::load()?;

        let ctx = CommandContext {
            global,
            credentials,
            format: self.format,
            target: self.target,
            overrides: Overrides {
                region: self.region,
                size: self.size,
                image: self.image,
                ssh_keys: self.ssh_keys,
                ssh_private_key: self.identity,
            },
            cancel,
        };

        match self.command {
            Some(Commands::Deploy(cmd)) => cmd.run(ctx).await,
            None => deploy::DeployCommand::default().run(ctx).await,
            Some(Commands::Scale(cmd)) => cmd.run(ctx).await,
            Some(Commands::List(cmd)) => cmd.run(ctx).await,
            Some(Commands::Init(cmd)) => cmd.run(ctx).await,
            Some(Commands::Restart(cmd)) => cmd.run(ctx).await,
            Some(Commands::Logs(cmd)) => cmd.run(ctx).await,
            Some(Commands::Status(cmd)) => cmd.run(ctx).await,
            Some(Commands::Env(cmd)) => cmd.run(ctx).await,
            Some(Commands::Keys(cmd)) => cmd.run(ctx).await,
            Some(Commands::Login(cmd)) => cmd.run(ctx).await,
            Some(Commands::Setup(cmd)) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub global: GlobalConfig,
    pub credentials: Option<Credentials>,
    pub format: OutputFormat,
    pub target: Option<String>,
    pub overrides: Overrides,
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// The API token, from the environment or the credentials file.
    pub fn token(&self) -> Result<String> {
        config::resolve_token(
            std::env::var(config::TOKEN_ENV).ok(),
            self.credentials.as_ref(),
        )
        .ok_or_else(|| CliError::NotAuthenticated.into())
    }

    /// Get an authenticated API client.
    pub fn client(&self) -> Result<Arc<DigitalOceanClient>> {
        let client = DigitalOceanClient::new(self.global.api_url(), &self.token()?)?;
        Ok(Arc::new(client))
    }

    pub fn cloud(&self) -> Result<Cloud> {
        Ok(Cloud::from_client(self.client()?))
    }

    /// The project around the working directory.
    pub fn project(&self) -> Result<Project> {
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        Project::discover(&cwd)
    }

    pub fn require_target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .ok_or_else(|| CliError::NoTarget.into())
    }

    /// Builds the fleet for the selected target of the current project.
    pub fn fleet(&self) -> Result<(Project, Fleet)> {
        let project = self.project()?;
        let target = ServiceTarget::new(project.name.as_str(), self.require_target()?)
            .with_context(|| format!("Invalid service target for {}", project.name))?;

        let private_key = config::ssh_private_key(&self.global, &self.overrides)?;
        let engine_config = config::engine_config(&project, &self.global, &self.overrides);
        tracing::debug!(
            target_name = %target,
            region = %engine_config.droplet.region,
            key = %private_key.display(),
            "Resolved configuration"
        );

        let ctx = FleetContext {
            target,
            cloud: self.cloud()?,
            connector: Arc::new(SshConnector::new(SshConfig::root(private_key))),
            resolver: Arc::new(DigResolver::new(PUBLIC_RESOLVER)),
            config: engine_config,
            cancel: self.cancel.clone(),
            progress: Arc::new(ConsoleProgress::new()),
        };

        Ok((project, Fleet::new(ctx)))
    }
}

/// Prints per-instance failures of a fleet-wide operation.
fn report_failures(failures: &[InstanceFailure]) {
    for failure in failures {
        let error = failure.error.to_string();
        let event = FleetEvent::InstanceFailed {
            name: &failure.instance,
            error: &error,
        };
        print_warning(&event.to_string());
    }
}
