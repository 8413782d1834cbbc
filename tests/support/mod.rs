// ABOUTME: Test support utilities.
// ABOUTME: Recording fakes for the target controller and health prober, plus tracing setup.

use async_trait::async_trait;
use convoy::health::{HealthCheck, HealthProber, ProbeError};
use convoy::target::{CommandOutput, ContainerStatus, StartContainer, TargetController, TargetError};
use convoy::types::{ContainerId, ContainerName, TargetId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("convoy=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// One recorded target controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Call {
    Start {
        name: String,
        image: String,
        port: u16,
    },
    Stop {
        name: String,
        force: bool,
    },
    Command(String),
    Resolve,
    Status(String),
}

/// Target controller that records every call and succeeds unless told
/// otherwise.
#[allow(dead_code)]
pub struct FakeController {
    calls: Mutex<Vec<Call>>,
    address: Option<String>,
    failing_images: Mutex<Vec<String>>,
    failing_once: Mutex<Vec<String>>,
    failing_commands: Mutex<Vec<String>>,
    failing_stops: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeController {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            address: Some("10.0.0.5".to_string()),
            failing_images: Mutex::new(Vec::new()),
            failing_once: Mutex::new(Vec::new()),
            failing_commands: Mutex::new(Vec::new()),
            failing_stops: Mutex::new(Vec::new()),
        }
    }

    pub fn without_address() -> Self {
        Self {
            address: None,
            ..Self::new()
        }
    }

    /// Starting this image fails with a command error.
    pub fn fail_start(&self, image: &str) {
        self.failing_images.lock().push(image.to_string());
    }

    /// The next start of container `name` fails; later ones succeed.
    pub fn fail_start_once(&self, name: &str) {
        self.failing_once.lock().push(name.to_string());
    }

    /// Commands containing `needle` exit non-zero.
    pub fn fail_commands_containing(&self, needle: &str) {
        self.failing_commands.lock().push(needle.to_string());
    }

    /// Stopping this container fails with a connection error.
    pub fn fail_stop(&self, name: &str) {
        self.failing_stops.lock().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls that change the target (starts and stops), in order.
    pub fn lifecycle(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Start { .. } | Call::Stop { .. }))
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Command(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TargetController for FakeController {
    async fn start_container(
        &self,
        target: &TargetId,
        request: &StartContainer,
    ) -> Result<ContainerId, TargetError> {
        let image = request.image.to_string();
        self.calls.lock().push(Call::Start {
            name: request.name.to_string(),
            image: image.clone(),
            port: request.port,
        });
        let once = {
            let mut once = self.failing_once.lock();
            let pos = once.iter().position(|n| n == request.name.as_str());
            pos.map(|i| once.remove(i)).is_some()
        };
        if once || self.failing_images.lock().contains(&image) {
            return Err(TargetError::CommandFailed {
                target: target.clone(),
                exit_code: 125,
                stderr: format!("cannot start {image}"),
            });
        }
        Ok(ContainerId::new(format!("{}-id", request.name)))
    }

    async fn stop_container(
        &self,
        target: &TargetId,
        name: &ContainerName,
        force: bool,
    ) -> Result<bool, TargetError> {
        self.calls.lock().push(Call::Stop {
            name: name.to_string(),
            force,
        });
        if self.failing_stops.lock().iter().any(|n| n == name.as_str()) {
            return Err(TargetError::Connection {
                target: target.clone(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(true)
    }

    async fn run_command(
        &self,
        _target: &TargetId,
        command: &str,
    ) -> Result<CommandOutput, TargetError> {
        self.calls.lock().push(Call::Command(command.to_string()));
        let failing = self
            .failing_commands
            .lock()
            .iter()
            .any(|needle| command.contains(needle.as_str()));
        if failing {
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "nginx: configuration test failed".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }

    async fn resolve_address(&self, _target: &TargetId) -> Result<Option<String>, TargetError> {
        self.calls.lock().push(Call::Resolve);
        Ok(self.address.clone())
    }

    async fn container_status(
        &self,
        _target: &TargetId,
        name: &ContainerName,
    ) -> Result<ContainerStatus, TargetError> {
        self.calls.lock().push(Call::Status(name.to_string()));
        Ok(ContainerStatus::missing())
    }
}

/// Scripted probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Probe {
    Healthy,
    Unhealthy,
    Error,
}

/// Health prober that replays a script, then repeats a fallback result.
#[allow(dead_code)]
pub struct ScriptedProber {
    script: Mutex<VecDeque<Probe>>,
    fallback: Probe,
    urls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedProber {
    pub fn always(probe: Probe) -> Self {
        Self::script(Vec::new(), probe)
    }

    pub fn script(script: Vec<Probe>, fallback: Probe) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            urls: Mutex::new(Vec::new()),
        }
    }

    /// `healthy` passing probes, then `unhealthy` failing ones, then healthy.
    pub fn healthy_then_failing(healthy: usize, unhealthy: usize) -> Self {
        let mut script = vec![Probe::Healthy; healthy];
        script.extend(std::iter::repeat_n(Probe::Unhealthy, unhealthy));
        Self::script(script, Probe::Healthy)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.urls.lock().len()
    }

    fn next(&self, url: &str) -> Probe {
        self.urls.lock().push(url.to_string());
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

#[async_trait]
impl HealthProber for ScriptedProber {
    async fn check_http(&self, url: &str) -> Result<HealthCheck, ProbeError> {
        match self.next(url) {
            Probe::Healthy => Ok(HealthCheck::passed(Some(200), 3)),
            Probe::Unhealthy => Ok(HealthCheck {
                healthy: false,
                status_code: Some(503),
                response_time_ms: 3,
                error_message: None,
            }),
            Probe::Error => Err(ProbeError::Connection("connection refused".to_string())),
        }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<HealthCheck, ProbeError> {
        self.check_http(&format!("tcp://{host}:{port}")).await
    }
}

/// Health prober whose every check panics, standing in for a bug inside a
/// strategy run.
#[allow(dead_code)]
pub struct PanickingProber;

#[async_trait]
impl HealthProber for PanickingProber {
    async fn check_http(&self, url: &str) -> Result<HealthCheck, ProbeError> {
        panic!("health check of {url} blew up");
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<HealthCheck, ProbeError> {
        panic!("tcp check of {host}:{port} blew up");
    }
}
