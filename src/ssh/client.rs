// ABOUTME: One authenticated russh session per deployment target.
// ABOUTME: Runs shell commands and reports exit status with captured output.

use super::error::SshError;
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::ChannelMsg;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

type Result<T> = std::result::Result<T, SshError>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Key files tried under `~/.ssh` when neither a key nor an agent is available.
const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Explicit private key; otherwise the agent, then the default key files.
    pub key_path: Option<PathBuf>,
    /// Record unknown host keys instead of rejecting them.
    pub trust_on_first_use: bool,
    /// Upper bound for one command, image pulls included.
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, trust: bool) -> Self {
        self.trust_on_first_use = trust;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Exit status and captured streams of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Host key verification against `~/.ssh/known_hosts`.
pub(crate) struct HostKeys {
    host: String,
    port: u16,
    trust_on_first_use: bool,
}

impl client::Handler for HostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match check_known_hosts(&self.host, self.port, key) {
            Ok(true) => Ok(true),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(host = %self.host, "host key changed; refusing connection");
                Ok(false)
            }
            _ if self.trust_on_first_use => {
                tracing::warn!(host = %self.host, port = self.port, "recording unknown host key");
                if let Err(e) = learn_known_hosts(&self.host, self.port, key) {
                    tracing::warn!(host = %self.host, "could not write known_hosts: {}", e);
                }
                Ok(true)
            }
            _ => {
                tracing::error!(host = %self.host, "unknown host key; set trust_first_connection to accept it");
                Ok(false)
            }
        }
    }
}

enum Credentials {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

impl Credentials {
    async fn discover(config: &SessionConfig) -> Result<Self> {
        if let Some(path) = &config.key_path {
            return load_key(path.clone()).map(Self::Key);
        }
        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Self::Agent(agent));
        }

        let home = std::env::var("HOME")
            .map_err(|_| SshError::AgentUnavailable("no agent and HOME is not set".to_string()))?;
        DEFAULT_KEYS
            .iter()
            .find_map(|name| load_key(PathBuf::from(format!("{home}/.ssh/{name}"))).ok())
            .map(Self::Key)
            .ok_or_else(|| SshError::AgentUnavailable("no agent and no default key".to_string()))
    }

    /// Try every identity; true once the server accepts one.
    async fn offer(self, handle: &mut Handle<HostKeys>, user: &str) -> Result<bool> {
        match self {
            Self::Agent(mut agent) => {
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|e| SshError::AgentUnavailable(e.to_string()))?;
                for identity in identities {
                    let accepted = handle
                        .authenticate_publickey_with(user, identity, None, &mut agent)
                        .await
                        .is_ok_and(|r| r.success());
                    if accepted {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Key(key) => {
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                let auth = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                    .await?;
                Ok(auth.success())
            }
        }
    }
}

fn load_key(path: PathBuf) -> Result<Arc<ssh_key::PrivateKey>> {
    load_secret_key(&path, None)
        .map(Arc::new)
        .map_err(|e| SshError::KeyLoadFailed {
            path,
            reason: e.to_string(),
        })
}

/// Accumulates channel messages until both the exit status and EOF (or a
/// close) have been seen.
#[derive(Default)]
struct Collected {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
    eof: bool,
}

impl Collected {
    /// Returns true when the command is finished.
    fn accept(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => self.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => self.stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => self.exit_code = Some(exit_status),
            ChannelMsg::Eof => self.eof = true,
            ChannelMsg::Close => return true,
            _ => {}
        }
        self.eof && self.exit_code.is_some()
    }

    fn finish(self) -> Result<CommandOutput> {
        Ok(CommandOutput {
            exit_code: self.exit_code.ok_or(SshError::ChannelClosed)?,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }
}

/// An authenticated connection to one target.
pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeys>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({}@{}:{})", self.config.user, self.config.host, self.config.port)
    }
}

impl Session {
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let credentials = Credentials::discover(&config).await?;
        let host_keys = HostKeys {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
        };
        let russh_config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        });

        let connecting = client::connect(russh_config, (config.host.as_str(), config.port), host_keys);
        let mut handle = match tokio::time::timeout(CONNECT_TIMEOUT, connecting).await {
            Err(_) => {
                return Err(SshError::ConnectTimeout {
                    host: config.host.clone(),
                    port: config.port,
                    timeout: CONNECT_TIMEOUT,
                });
            }
            Ok(connected) => connected.map_err(|e| SshError::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            })?,
        };

        if !credentials.offer(&mut handle, &config.user).await? {
            return Err(SshError::AuthenticationFailed {
                user: config.user.clone(),
                host: config.host.clone(),
            });
        }

        tracing::debug!(host = %config.host, user = %config.user, "ssh session established");
        Ok(Self { config, handle })
    }

    /// False once the transport has dropped.
    pub fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    /// Run `command` under the configured command timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tracing::trace!(host = %self.config.host, command, "exec");
        tokio::time::timeout(timeout, self.run(command))
            .await
            .map_err(|_| SshError::CommandTimeout(timeout))?
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        let mut collected = Collected::default();
        while let Some(msg) = channel.wait().await {
            if collected.accept(msg) {
                break;
            }
        }
        collected.finish()
    }
}
