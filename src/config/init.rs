// ABOUTME: Config scaffolding for new installations.
// ABOUTME: Writes a commented convoy.yml template.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, target: Option<&str>, store_url: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(t) = target {
        let parsed = super::TargetConfig::parse(t).map_err(Error::InvalidConfig)?;
        config.targets = nonempty::NonEmpty::new(parsed);
    }

    if let Some(url) = store_url {
        config.store.url = url.to_string();
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let target = config.targets.first();
    format!(
        r#"targets:
  - id: {}
    host: {}
    ssh_port: {}
    user: {}
    container_port: {}
    # Accept unknown host keys on first connection
    # trust_first_connection: true

store:
  # memory:// keeps everything in one process; use redis:// for several workers
  url: {}

rolling:
  check_interval: 10s
  check_duration: 2m
  success_threshold: 0.8

canary:
  canary_port: {}
  error_rate_threshold: 0.05
"#,
        target.id,
        target.host,
        target.ssh_port,
        target.user.as_deref().unwrap_or("deploy"),
        target.container_port,
        config.store.url,
        config.canary.canary_port,
    )
}
