// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use crate::deploy::{DeploymentOutcome, DeploymentResult};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({elapsed:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => emit(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
                data: None::<()>,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                    data: None::<()>,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print a structured value: pretty lines in normal mode, one JSON
    /// event otherwise.
    pub fn data<T: Serialize>(&self, event: &str, message: &str, value: &T) {
        match self.mode {
            OutputMode::Json => emit(&JsonEvent {
                event,
                message,
                duration_secs: self.duration(),
                data: Some(value),
            }),
            OutputMode::Normal | OutputMode::Quiet => {
                println!("{message}");
                if let Ok(yaml) = serde_yaml::to_string(value) {
                    for line in yaml.lines() {
                        println!("  {line}");
                    }
                }
            }
        }
    }

    /// Report a finished deployment.
    pub fn deployment(&self, result: &DeploymentResult) {
        if self.mode == OutputMode::Json {
            emit(&JsonEvent {
                event: "deployment",
                message: outcome_label(result.outcome),
                duration_secs: Some(result.duration_seconds),
                data: Some(result),
            });
            return;
        }

        let summary = format!(
            "{} {} on {}: {}",
            result.deployment_id,
            result.image_tag,
            result.target_id,
            outcome_label(result.outcome)
        );
        if result.success {
            self.success(&summary);
        } else {
            eprintln!("{summary}");
            if let (Some(phase), Some(message)) = (result.error_phase, &result.error_message) {
                eprintln!("  {phase:?}: {message}");
            }
        }

        if self.mode == OutputMode::Normal {
            if let Some(canary) = result.canary() {
                println!(
                    "  stages completed: {} (canary at {}%)",
                    canary.stages_completed, canary.final_percentage
                );
            }
            if let Some(health) = result.health_check_result() {
                println!(
                    "  health checks: {}/{} passed",
                    health.passed, health.total
                );
            }
        }
    }
}

fn outcome_label(outcome: DeploymentOutcome) -> &'static str {
    match outcome {
        DeploymentOutcome::Succeeded => "succeeded",
        DeploymentOutcome::RolledBack => "failed, rolled back",
        DeploymentOutcome::FailedNoRollback => "failed, nothing to roll back to",
        DeploymentOutcome::RollbackFailed => "failed, rollback failed",
    }
}

fn emit<T: Serialize>(event: &JsonEvent<'_, T>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a, T> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}
