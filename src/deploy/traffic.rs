// ABOUTME: Traffic split between production and canary as an nginx upstream block.
// ABOUTME: Each update is one shell command that writes the file and reloads the proxy.

use crate::config::{CanaryStage, ProxyConfig};
use crate::target::shell_quote;

/// Renders and applies the upstream for one production/canary pair.
#[derive(Debug, Clone)]
pub struct TrafficSplit {
    upstream: String,
    host: String,
    config_path: String,
    reload_command: String,
    prod_port: u16,
    canary_port: u16,
}

impl TrafficSplit {
    pub fn new(proxy: &ProxyConfig, upstream: &str, prod_port: u16, canary_port: u16) -> Self {
        Self {
            upstream: upstream.to_string(),
            host: proxy.upstream_host.clone(),
            config_path: proxy.config_path.clone(),
            reload_command: proxy.reload_command.clone(),
            prod_port,
            canary_port,
        }
    }

    /// Weighted production and canary servers. A zero weight marks the
    /// server `down`.
    pub fn render_stage(&self, stage: &CanaryStage) -> String {
        let server = |port: u16, weight: u32| {
            if weight == 0 {
                format!("    server {}:{} down;\n", self.host, port)
            } else {
                format!("    server {}:{} weight={};\n", self.host, port, weight)
            }
        };
        format!(
            "upstream {} {{\n{}{}}}\n",
            self.upstream,
            server(self.prod_port, stage.prod_weight),
            server(self.canary_port, stage.canary_weight)
        )
    }

    /// Production only.
    pub fn render_single(&self) -> String {
        format!(
            "upstream {} {{\n    server {}:{};\n}}\n",
            self.upstream, self.host, self.prod_port
        )
    }

    /// Shell command that installs `rendered` and reloads the proxy.
    pub fn apply_command(&self, rendered: &str) -> String {
        format!(
            "printf '%s' {} > {} && {}",
            shell_quote(rendered),
            shell_quote(&self.config_path),
            self.reload_command
        )
    }
}
