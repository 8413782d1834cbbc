// ABOUTME: Deployment target configuration for SSH-reachable hosts.
// ABOUTME: Parses shorthand like "host", "user@host", "host:port", "user@host:port".

use super::env_value::EnvValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Unique identifier used in requests and lock names. Defaults to `host`.
    #[serde(default)]
    pub id: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Address health probes connect to. Defaults to `host`.
    #[serde(default)]
    pub address: Option<String>,
    /// Port the application listens on inside its container.
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default)]
    pub trust_first_connection: bool,
    /// Environment injected into every container started on this target.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_container_port() -> u16 {
    8080
}

impl TargetConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("target address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(format!("missing user before '@' in {s}")),
            None => (None, s),
        };

        let (host, ssh_port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {port}"))?;
                (host, port)
            }
            None => (rest, default_ssh_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(TargetConfig {
            id: host.to_string(),
            host: host.to_string(),
            ssh_port,
            user,
            key_path: None,
            address: None,
            container_port: default_container_port(),
            trust_first_connection: false,
            env: BTreeMap::new(),
        })
    }

    /// Fill derived defaults after deserialization.
    pub(crate) fn normalized(mut self) -> Self {
        if self.id.trim().is_empty() {
            self.id = self.host.clone();
        }
        self
    }

    /// Address health probes and the traffic proxy should use.
    pub fn probe_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.host)
    }

    /// SSH user, falling back to `$USER` and then `root`.
    pub fn ssh_user(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }
}
