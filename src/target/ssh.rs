// ABOUTME: Target controller that drives the Docker CLI over SSH.
// ABOUTME: Keeps one session per target and reconnects when the transport drops.

use super::{CommandOutput, ContainerStatus, StartContainer, TargetController, TargetError};
use crate::config::{TargetConfig, resolve_env_map};
use crate::ssh::{Session, SessionConfig, SshError};
use crate::types::{ContainerId, ContainerName, TargetId};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

struct Target {
    config: TargetConfig,
    /// Resolved once; merged under each request's own env.
    env: BTreeMap<String, String>,
}

pub struct SshTargetController {
    targets: HashMap<TargetId, Target>,
    sessions: Mutex<HashMap<TargetId, Arc<Session>>>,
    command_timeout: Duration,
}

impl std::fmt::Debug for SshTargetController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTargetController")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SshTargetController {
    /// Build a controller for `targets`, resolving their env references now.
    pub fn new<'a>(
        targets: impl IntoIterator<Item = &'a TargetConfig>,
        command_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let targets = targets
            .into_iter()
            .map(|config| {
                let env = resolve_env_map(&config.env)?;
                let target = Target {
                    config: config.clone(),
                    env,
                };
                Ok((TargetId::new(config.id.as_str()), target))
            })
            .collect::<crate::error::Result<_>>()?;

        Ok(Self {
            targets,
            sessions: Mutex::new(HashMap::new()),
            command_timeout,
        })
    }

    fn target(&self, id: &TargetId) -> Result<&Target, TargetError> {
        self.targets
            .get(id)
            .ok_or_else(|| TargetError::UnknownTarget(id.clone()))
    }

    async fn session(&self, id: &TargetId) -> Result<Arc<Session>, TargetError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(id)
            && session.is_alive()
        {
            return Ok(Arc::clone(session));
        }

        let config = &self.target(id)?.config;
        let mut session_config = SessionConfig::new(config.host.clone(), config.ssh_user())
            .port(config.ssh_port)
            .trust_on_first_use(config.trust_first_connection)
            .command_timeout(self.command_timeout);
        if let Some(key) = &config.key_path {
            session_config = session_config.key_path(key);
        }

        let session = Arc::new(
            Session::connect(session_config)
                .await
                .map_err(|e| map_ssh_error(id, e))?,
        );
        sessions.insert(id.clone(), Arc::clone(&session));
        Ok(session)
    }

    async fn exec(&self, id: &TargetId, command: &str) -> Result<CommandOutput, TargetError> {
        let session = self.session(id).await?;
        match session.exec(command).await {
            Ok(output) => Ok(output),
            Err(e) => {
                if e.is_transient() {
                    self.sessions.lock().await.remove(id);
                }
                Err(map_ssh_error(id, e))
            }
        }
    }

    /// Like `exec`, but a non-zero exit is an error.
    async fn exec_ok(&self, id: &TargetId, command: &str) -> Result<CommandOutput, TargetError> {
        let output = self.exec(id, command).await?;
        if !output.success() {
            return Err(TargetError::CommandFailed {
                target: id.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn map_ssh_error(target: &TargetId, e: SshError) -> TargetError {
    let target = target.clone();
    match e {
        SshError::ConnectTimeout { timeout, .. } | SshError::CommandTimeout(timeout) => {
            TargetError::Timeout { target, timeout }
        }
        SshError::AuthenticationFailed { .. }
        | SshError::AgentUnavailable(_)
        | SshError::KeyLoadFailed { .. } => TargetError::Auth {
            target,
            reason: e.to_string(),
        },
        SshError::Connection { .. }
        | SshError::Channel(_)
        | SshError::ChannelClosed
        | SshError::Protocol(_) => TargetError::Connection {
            target,
            reason: e.to_string(),
        },
    }
}

fn is_missing_container(output: &CommandOutput) -> bool {
    output.stderr.contains("No such container") || output.stderr.contains("no such container")
}

fn run_command_line(
    request: &StartContainer,
    container_port: u16,
    env: &BTreeMap<String, String>,
) -> String {
    let mut cmd = format!(
        "docker run -d --name {} --restart unless-stopped -p {}:{}",
        shell_quote(request.name.as_str()),
        request.port,
        container_port
    );
    for (key, value) in env {
        cmd.push_str(" -e ");
        cmd.push_str(&shell_quote(&format!("{key}={value}")));
    }
    cmd.push(' ');
    cmd.push_str(&shell_quote(&request.image.to_string()));
    cmd
}

/// Parse `id|status|running|started_at` from `docker inspect --format`.
fn parse_inspect(line: &str) -> Option<ContainerStatus> {
    let mut parts = line.trim().splitn(4, '|');
    let id = parts.next()?;
    let status = parts.next()?;
    let running = parts.next()?.parse::<bool>().ok()?;
    let started_at = parts
        .next()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1);

    Some(ContainerStatus {
        running,
        container_id: Some(ContainerId::new(id)),
        status: status.to_string(),
        started_at,
    })
}

#[async_trait]
impl TargetController for SshTargetController {
    async fn start_container(
        &self,
        target: &TargetId,
        request: &StartContainer,
    ) -> Result<ContainerId, TargetError> {
        let entry = self.target(target)?;

        if request.stop_existing {
            let output = self
                .exec(
                    target,
                    &format!("docker rm -f {}", shell_quote(request.name.as_str())),
                )
                .await?;
            if !output.success() && !is_missing_container(&output) {
                return Err(TargetError::CommandFailed {
                    target: target.clone(),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }

        let mut env = entry.env.clone();
        env.extend(request.env.clone());

        let output = self
            .exec_ok(target, &run_command_line(request, entry.config.container_port, &env))
            .await?;
        let id = output.stdout.trim();
        if id.is_empty() {
            return Err(TargetError::Protocol {
                target: target.clone(),
                detail: "docker run printed no container id".to_string(),
            });
        }

        tracing::info!(
            target = %target,
            container = %request.name,
            image = %request.image,
            port = request.port,
            "container started"
        );
        Ok(ContainerId::new(id))
    }

    async fn stop_container(
        &self,
        target: &TargetId,
        name: &ContainerName,
        force: bool,
    ) -> Result<bool, TargetError> {
        let name = shell_quote(name.as_str());
        let command = if force {
            format!("docker rm -f {name}")
        } else {
            format!("docker stop {name} && docker rm {name}")
        };

        let output = self.exec(target, &command).await?;
        if output.success() {
            tracing::info!(target = %target, container = %name, "container stopped");
            return Ok(true);
        }
        if is_missing_container(&output) {
            return Ok(false);
        }
        Err(TargetError::CommandFailed {
            target: target.clone(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn run_command(
        &self,
        target: &TargetId,
        command: &str,
    ) -> Result<CommandOutput, TargetError> {
        self.exec(target, command).await
    }

    async fn resolve_address(&self, target: &TargetId) -> Result<Option<String>, TargetError> {
        Ok(Some(self.target(target)?.config.probe_address().to_string()))
    }

    async fn container_status(
        &self,
        target: &TargetId,
        name: &ContainerName,
    ) -> Result<ContainerStatus, TargetError> {
        let command = format!(
            "docker inspect --format '{{{{.Id}}}}|{{{{.State.Status}}}}|{{{{.State.Running}}}}|{{{{.State.StartedAt}}}}' {}",
            shell_quote(name.as_str())
        );
        let output = self.exec(target, &command).await?;
        if !output.success() {
            if is_missing_container(&output) {
                return Ok(ContainerStatus::missing());
            }
            return Err(TargetError::CommandFailed {
                target: target.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        parse_inspect(&output.stdout).ok_or_else(|| TargetError::Protocol {
            target: target.clone(),
            detail: format!("unparseable inspect output: {}", output.stdout.trim()),
        })
    }
}
