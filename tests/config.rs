// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, env interpolation, overrides, and discovery.

use convoy::config::*;
use convoy::error::Error;
use convoy::resilience::ErrorClass;
use std::collections::BTreeMap;
use std::time::Duration;

const MINIMAL: &str = r#"
targets:
  - web-1.example.com
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets.first().id, "web-1.example.com");
        assert_eq!(config.store.url, "memory://");
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
targets:
  - id: web-1
    host: 10.0.0.5
    user: deploy
    ssh_port: 2222
    address: 10.1.0.5
    container_port: 3000
  - deploy@web2.example.com:22

store:
  url: redis://cache:6379/2

queue:
  prefix: deploys
  block_timeout: 2s
  stale_after: 15m

lock:
  ttl: 20m
  acquire_timeout: 1m
  retry_interval: 250ms

rolling:
  startup_grace: 5s
  check_interval: 5s
  check_duration: 1m
  success_threshold: 0.9

canary:
  canary_port: 9091
  error_rate_threshold: 0.01
  stages:
    - { canary_weight: 1, prod_weight: 3, duration: 2m }
    - { canary_weight: 1, prod_weight: 1, duration: 2m }
    - { canary_weight: 1, prod_weight: 0, duration: 0s }
  proxy:
    config_path: /etc/nginx/upstreams/app.conf
    reload_command: systemctl reload nginx

resilience:
  failure_threshold: 3
  recovery_timeout: 30s
  retry:
    attempts: 5
    delay: 200ms
    backoff: ~
    retry_on: [connection, timeout, command]

health:
  timeout: 2s
"#;
        let config = Config::from_yaml(yaml).unwrap();

        let web1 = config.target("web-1").unwrap();
        assert_eq!(web1.host, "10.0.0.5");
        assert_eq!(web1.ssh_port, 2222);
        assert_eq!(web1.probe_address(), "10.1.0.5");
        assert_eq!(web1.container_port, 3000);
        let web2 = config.target("web2.example.com").unwrap();
        assert_eq!(web2.user.as_deref(), Some("deploy"));

        assert_eq!(config.store.url, "redis://cache:6379/2");
        assert_eq!(config.queue.prefix, "deploys");
        assert_eq!(config.queue.block_timeout, Duration::from_secs(2));
        assert_eq!(config.queue.stale_after, Duration::from_secs(900));
        assert_eq!(config.lock.ttl, Duration::from_secs(1200));
        assert_eq!(config.lock.retry_interval, Duration::from_millis(250));

        assert_eq!(config.rolling.check_duration, Duration::from_secs(60));
        assert_eq!(config.rolling.success_threshold, 0.9);

        assert_eq!(config.canary.canary_port, 9091);
        assert_eq!(config.canary.stages[0].canary_percentage(), 25);
        assert_eq!(config.canary.stages[2].duration, Duration::ZERO);
        assert_eq!(config.canary.proxy.reload_command, "systemctl reload nginx");
        assert_eq!(config.canary.proxy.upstream_host, "127.0.0.1");

        let breaker = config.resilience.breaker();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(30));
        let policy = config.resilience.retry.policy();
        assert_eq!(policy.attempts, 5);
        assert!(policy.backoff.is_none());
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
        assert_eq!(
            config.resilience.retry.retry_on,
            vec![ErrorClass::Connection, ErrorClass::Timeout, ErrorClass::Command]
        );
        assert_eq!(config.health.timeout, Duration::from_secs(2));
    }

    #[test]
    fn missing_targets_returns_error() {
        let result = Config::from_yaml("store:\n  url: memory://\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn empty_targets_returns_error() {
        let err = Config::from_yaml("targets: []\n").unwrap_err();
        assert!(err.to_string().contains("at least one target"));
    }

    #[test]
    fn template_is_valid() {
        let config = Config::template();
        config.validate().unwrap();
        assert_eq!(config.targets.first().id, "web-1");
    }
}

mod defaults {
    use super::*;

    #[test]
    fn strategy_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.rolling.startup_grace, Duration::from_secs(10));
        assert_eq!(config.rolling.check_interval, Duration::from_secs(10));
        assert_eq!(config.rolling.check_duration, Duration::from_secs(120));
        assert_eq!(config.rolling.success_threshold, 0.8);

        assert_eq!(config.canary.canary_port, 8081);
        assert_eq!(config.canary.error_rate_threshold, 0.05);
        let percentages: Vec<_> = config
            .canary
            .stages
            .iter()
            .map(|s| s.canary_percentage())
            .collect();
        assert_eq!(percentages, [10, 50, 100]);
    }

    #[test]
    fn coordination_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.queue.prefix, "queue");
        assert_eq!(config.queue.block_timeout, Duration::from_secs(5));
        assert_eq!(config.queue.processing_ttl, Duration::from_secs(3600));
        assert_eq!(config.queue.stale_after, Duration::from_secs(600));
        assert_eq!(config.queue.watchdog_interval, Duration::from_secs(60));

        assert_eq!(config.lock.ttl, Duration::from_secs(600));
        assert_eq!(config.lock.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.lock.retry_interval, Duration::from_millis(500));
    }

    #[test]
    fn resilience_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.resilience.failure_threshold, 5);
        assert_eq!(config.resilience.recovery_timeout, Duration::from_secs(60));
        let policy = config.resilience.retry.policy();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(
            config.resilience.retry.retry_on,
            vec![ErrorClass::Connection, ErrorClass::Timeout]
        );
    }
}

mod target_parsing {
    use super::*;

    #[test]
    fn shorthand_targets() {
        let yaml = r#"
targets:
  - web-1
  - deploy@web-2
  - web-3:2222
  - ops@web-4:2200
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let targets: Vec<_> = config.targets.iter().collect();

        assert_eq!(targets[0].ssh_port, 22);
        assert_eq!(targets[1].user.as_deref(), Some("deploy"));
        assert_eq!(targets[2].ssh_port, 2222);
        assert_eq!(targets[3].id, "web-4");
        assert_eq!(targets[3].ssh_port, 2200);
    }

    #[test]
    fn detailed_target_id_defaults_to_host() {
        let yaml = r#"
targets:
  - host: api.internal
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.target("api.internal").is_some());
        assert!(config.target("web-1").is_none());
    }

    #[test]
    fn bad_shorthand_is_rejected() {
        assert!(Config::from_yaml("targets:\n  - \"web:ssh\"\n").is_err());
    }
}

mod validation {
    use super::*;

    fn invalid(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(message)) => message,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_target_ids() {
        let message = invalid(
            r#"
targets:
  - web-1
  - id: web-1
    host: 10.0.0.9
"#,
        );
        assert!(message.contains("duplicate target id: web-1"));
    }

    #[test]
    fn zero_container_port() {
        let message = invalid(
            r#"
targets:
  - host: web-1
    container_port: 0
"#,
        );
        assert!(message.contains("container_port 0"));
    }

    #[test]
    fn canary_stage_without_canary_traffic() {
        let message = invalid(
            r#"
targets: [web-1]
canary:
  stages:
    - { canary_weight: 1, prod_weight: 9, duration: 5m }
    - { canary_weight: 0, prod_weight: 1, duration: 5m }
    - { canary_weight: 1, prod_weight: 0, duration: 0s }
"#,
        );
        assert!(message.contains("no traffic to the canary"));
    }

    #[test]
    fn zero_check_interval() {
        let message = invalid(
            r#"
targets: [web-1]
rolling:
  check_interval: 0s
"#,
        );
        assert!(message.contains("interval"));
    }

    #[test]
    fn zero_failure_threshold() {
        let message = invalid(
            r#"
targets: [web-1]
resilience:
  failure_threshold: 0
"#,
        );
        assert!(message.contains("failure_threshold"));
    }

    #[test]
    fn fraction_out_of_range() {
        let err = Config::from_yaml(
            r#"
targets: [web-1]
rolling:
  success_threshold: 1.5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("between 0 and 1"));
    }

    #[test]
    fn canary_needs_exactly_three_stages() {
        let result = Config::from_yaml(
            r#"
targets: [web-1]
canary:
  stages:
    - { canary_weight: 1, prod_weight: 1, duration: 1m }
"#,
        );
        assert!(matches!(result, Err(Error::Yaml(_))));
    }
}

mod env_vars {
    use super::*;

    #[test]
    fn target_env_values() {
        let yaml = r#"
targets:
  - host: web-1
    env:
      MODE: production
      SECRET:
        env: CONVOY_TEST_SECRET
      OPTIONAL:
        env: CONVOY_TEST_OPTIONAL
        default: fallback
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let env = &config.targets.first().env;

        assert_eq!(env["MODE"], EnvValue::Literal("production".to_string()));
        assert_eq!(
            env["SECRET"],
            EnvValue::FromEnv {
                var: "CONVOY_TEST_SECRET".to_string(),
                default: None
            }
        );
        assert!(matches!(
            &env["OPTIONAL"],
            EnvValue::FromEnv { default: Some(d), .. } if d == "fallback"
        ));
    }

    #[test]
    fn resolve_env_values() {
        let mut env_map = BTreeMap::new();
        env_map.insert("KEY".to_string(), EnvValue::Literal("literal".to_string()));
        env_map.insert(
            "FROM_ENV".to_string(),
            EnvValue::FromEnv {
                var: "CONVOY_TEST_VAR".to_string(),
                default: None,
            },
        );
        env_map.insert(
            "WITH_DEFAULT".to_string(),
            EnvValue::FromEnv {
                var: "CONVOY_MISSING_VAR".to_string(),
                default: Some("default_value".to_string()),
            },
        );

        temp_env::with_var("CONVOY_TEST_VAR", Some("from_environment"), || {
            let resolved = resolve_env_map(&env_map).unwrap();

            assert_eq!(resolved["KEY"], "literal");
            assert_eq!(resolved["FROM_ENV"], "from_environment");
            assert_eq!(resolved["WITH_DEFAULT"], "default_value");
        });
    }

    #[test]
    fn unset_variable_without_default_fails() {
        let mut env_map = BTreeMap::new();
        env_map.insert(
            "TOKEN".to_string(),
            EnvValue::FromEnv {
                var: "CONVOY_UNSET_TOKEN".to_string(),
                default: None,
            },
        );

        temp_env::with_var_unset("CONVOY_UNSET_TOKEN", || {
            let err = resolve_env_map(&env_map).unwrap_err();
            assert!(matches!(err, Error::MissingEnvVar(var) if var == "CONVOY_UNSET_TOKEN"));
        });
    }

    #[test]
    fn store_url_override() {
        temp_env::with_var(STORE_URL_ENV, Some("redis://override:6379/0"), || {
            let config = Config::from_yaml(MINIMAL).unwrap().with_env_overrides();
            assert_eq!(config.store.url, "redis://override:6379/0");
        });
    }

    #[test]
    fn blank_override_is_ignored() {
        temp_env::with_var(STORE_URL_ENV, Some("  "), || {
            let config = Config::from_yaml(MINIMAL).unwrap().with_env_overrides();
            assert_eq!(config.store.url, "memory://");
        });
    }
}

mod discovery {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_primary_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), MINIMAL).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.targets.first().id, "web-1.example.com");
    }

    #[test]
    fn falls_back_to_dot_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".convoy")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), MINIMAL).unwrap();

        assert!(Config::discover(dir.path()).is_ok());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(path) if path == dir.path()));
    }

    #[test]
    fn init_writes_a_loadable_file() {
        let dir = TempDir::new().unwrap();
        init_config(
            dir.path(),
            Some("ops@api.internal:2200"),
            Some("redis://127.0.0.1:6379/1"),
            false,
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        let target = config.target("api.internal").unwrap();
        assert_eq!(target.user.as_deref(), Some("ops"));
        assert_eq!(target.ssh_port, 2200);
        assert_eq!(config.store.url, "redis://127.0.0.1:6379/1");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        init_config(dir.path(), None, None, false).unwrap();

        let err = init_config(dir.path(), None, None, false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        init_config(dir.path(), None, None, true).unwrap();
    }
}
