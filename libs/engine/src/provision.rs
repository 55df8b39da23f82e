//! Host provisioning.
//!
//! A fresh instance is turned into an application host by a fixed sequence
//! of steps. Every step is safe to repeat, so an instance that failed midway
//! is recovered by applying the whole plan again.

use std::path::PathBuf;

use upfleet_provider::RemoteCommand;

use crate::config::ProvisionConfig;
use crate::error::EngineError;
use crate::progress::{FleetEvent, Progress};
use crate::remote::Remote;

/// Directory, relative to the login home, holding the application.
pub const APP_DIR: &str = "app";

/// Entrypoint supervised on every host. Serves the status document and then
/// loads the deployed bundle.
pub const BOOTSTRAP_ENTRYPOINT: &str = include_str!("../assets/bootstrap.js");

const PLACEHOLDER_APP: &str = include_str!("../assets/placeholder.js");

const NVM: &str = ". ~/.nvm/nvm.sh";

/// What a step does on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Run(RemoteCommand),
    Write { path: String, contents: Vec<u8> },

    /// Copies a local file; skipped with a warning if it does not exist.
    Upload { local: PathBuf, remote: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionStep {
    pub label: &'static str,
    pub action: StepAction,
}

impl ProvisionStep {
    fn run(label: &'static str, command: RemoteCommand) -> Self {
        Self {
            label,
            action: StepAction::Run(command),
        }
    }

    fn write(label: &'static str, path: String, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            label,
            action: StepAction::Write {
                path,
                contents: contents.into(),
            },
        }
    }
}

/// Ordered provisioning steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    steps: Vec<ProvisionStep>,
}

impl ProvisionPlan {
    /// The standard plan: system packages, a Node.js toolchain, the
    /// supervised bootstrap entrypoint and a firewall.
    pub fn standard(config: &ProvisionConfig) -> Self {
        let apt = |line: &str| {
            RemoteCommand::new(line).env("DEBIAN_FRONTEND", "noninteractive")
        };

        let mut steps = vec![
            ProvisionStep::run("Updating package index", apt("apt-get update -yq")),
            ProvisionStep::run(
                "Installing build tools",
                apt("apt-get install -yq git build-essential curl"),
            ),
            ProvisionStep::run(
                "Installing nvm",
                RemoteCommand::new(format!(
                    "curl -fsSL https://raw.githubusercontent.com/nvm-sh/nvm/{}/install.sh | bash",
                    config.nvm_version
                )),
            ),
            ProvisionStep::run(
                "Installing Node.js",
                RemoteCommand::new(format!(
                    "{NVM} && nvm install {v} && nvm alias default {v} && npm install -g forever",
                    v = config.node_version
                )),
            ),
            ProvisionStep::run(
                "Creating app directory",
                RemoteCommand::new(format!("mkdir -p ~/{APP_DIR}")),
            ),
            ProvisionStep::write(
                "Writing bootstrap entrypoint",
                format!("{APP_DIR}/index.js"),
                BOOTSTRAP_ENTRYPOINT,
            ),
            ProvisionStep::write(
                "Writing placeholder app",
                format!("{APP_DIR}/placeholder.js"),
                PLACEHOLDER_APP,
            ),
            ProvisionStep::write(
                "Writing default environment",
                format!("{APP_DIR}/.env.defaults"),
                default_env(config),
            ),
            // Never clobber a deployed bundle or operator-set variables.
            ProvisionStep::run(
                "Installing defaults",
                RemoteCommand::new(format!(
                    "cd ~/{APP_DIR} && ([ -f app.js ] || cp placeholder.js app.js) && ([ -f .env ] || cp .env.defaults .env)"
                )),
            ),
        ];

        if let Some(npmrc) = &config.npmrc {
            steps.push(ProvisionStep {
                label: "Copying registry credentials",
                action: StepAction::Upload {
                    local: npmrc.clone(),
                    remote: ".npmrc".to_string(),
                },
            });
        }

        steps.extend([
            ProvisionStep::run(
                "Installing runtime dependencies",
                RemoteCommand::new(format!(
                    "cd ~/{APP_DIR} && {NVM} && npm install --no-save dotenv"
                )),
            ),
            ProvisionStep::run(
                "Starting application",
                RemoteCommand::new(format!(
                    "{NVM} && forever stopall && forever start --minUptime 5000 --spinSleepTime 1000 --workingDir ~/{APP_DIR} ~/{APP_DIR}/index.js"
                )),
            ),
            ProvisionStep::run(
                "Configuring firewall",
                RemoteCommand::new(format!(
                    "ufw allow {} && ufw allow {} && ufw allow OpenSSH && ufw --force enable",
                    config.service_port, config.status_port
                )),
            ),
        ]);

        Self { steps }
    }

    pub fn steps(&self) -> &[ProvisionStep] {
        &self.steps
    }

    /// Applies every step in order, stopping at the first failure.
    pub async fn apply(&self, remote: &mut Remote, progress: &dyn Progress) -> Result<(), EngineError> {
        for step in &self.steps {
            let name = remote.instance().to_string();
            progress.event(&FleetEvent::Provisioning {
                name: &name,
                step: step.label,
            });

            match &step.action {
                StepAction::Run(command) => {
                    remote.exec(command).await?;
                }
                StepAction::Write { path, contents } => {
                    remote.write(path, contents).await?;
                }
                StepAction::Upload { local, remote: path } => {
                    if !tokio::fs::try_exists(local).await.unwrap_or(false) {
                        let reason = format!("{} not found", local.display());
                        progress.event(&FleetEvent::StepSkipped {
                            name: &name,
                            step: step.label,
                            reason: &reason,
                        });
                        continue;
                    }
                    remote.upload(local, path).await?;
                }
            }
        }
        Ok(())
    }
}

fn default_env(config: &ProvisionConfig) -> String {
    format!(
        "NODE_ENV=production\nPORT={}\nSTATUS_PORT={}\n",
        config.service_port, config.status_port
    )
}

/// Installs the deployed manifest's production dependencies.
pub(crate) fn install_command() -> RemoteCommand {
    RemoteCommand::new(format!(
        "cd ~/{APP_DIR} && {NVM} && npm install --production"
    ))
}

/// Restarts the supervised entrypoint.
pub(crate) fn restart_command() -> RemoteCommand {
    RemoteCommand::new(format!("{NVM} && forever restart 0"))
}

pub(crate) fn logs_command() -> RemoteCommand {
    RemoteCommand::new(format!("{NVM} && forever logs 0"))
}
