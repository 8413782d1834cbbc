// ABOUTME: Integration tests for the rolling deployer.
// ABOUTME: Drives a recording controller and scripted prober on a paused clock.

mod support;

use convoy::config::RollingConfig;
use convoy::deploy::{DeployRequest, DeploymentOutcome, ErrorPhase, RollingDeployer};
use support::{Call, FakeController, PanickingProber, Probe, ScriptedProber};
use std::sync::Arc;
use std::time::Duration;

fn deployer(controller: &Arc<FakeController>, prober: &Arc<ScriptedProber>) -> RollingDeployer {
    support::init_tracing();
    RollingDeployer::new(controller.clone(), prober.clone(), RollingConfig::default())
}

fn request() -> DeployRequest {
    DeployRequest::new("web-1", "app:v2", "app", 8080).with_deployment_id("dep-1")
}

fn start(image: &str) -> Call {
    Call::Start {
        name: "app".into(),
        image: image.into(),
        port: 8080,
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_deployment_is_kept() {
    let controller = Arc::new(FakeController::new());
    let prober = Arc::new(ScriptedProber::always(Probe::Healthy));

    let started = tokio::time::Instant::now();
    let result = deployer(&controller, &prober).deploy(&request()).await;

    assert!(result.success);
    assert_eq!(result.outcome, DeploymentOutcome::Succeeded);
    assert!(!result.rollback_performed);
    assert_eq!(result.error_phase, None);
    assert_eq!(result.container_id.as_ref().unwrap().as_str(), "app-id");
    assert!(result.completed_at.is_some());

    let summary = result.health_check_result().unwrap();
    assert_eq!((summary.passed, summary.total), (12, 12));
    assert_eq!(summary.success_rate, 1.0);

    assert_eq!(controller.lifecycle(), vec![start("app:v2")]);
    assert!(
        prober
            .urls()
            .iter()
            .all(|u| u == "http://10.0.0.5:8080/health")
    );
    // Grace period plus eleven pauses between twelve probes.
    assert!(started.elapsed() >= Duration::from_secs(10 + 110));
}

#[tokio::test(start_paused = true)]
async fn just_enough_passing_probes_promote() {
    let controller = Arc::new(FakeController::new());
    // 10 of 12 is above the 80% threshold.
    let prober = Arc::new(ScriptedProber::healthy_then_failing(10, 2));

    let result = deployer(&controller, &prober).deploy(&request()).await;

    assert_eq!(result.outcome, DeploymentOutcome::Succeeded);
    assert_eq!(result.health_check_result().unwrap().passed, 10);
}

#[tokio::test(start_paused = true)]
async fn unhealthy_deployment_rolls_back_to_previous_image() {
    let controller = Arc::new(FakeController::new());
    let prober = Arc::new(ScriptedProber::always(Probe::Unhealthy));
    let request = request().with_previous_image("app:v1");

    let result = deployer(&controller, &prober).deploy(&request).await;

    assert!(!result.success);
    assert_eq!(result.outcome, DeploymentOutcome::RolledBack);
    assert!(result.rollback_performed);
    assert_eq!(result.error_phase, Some(ErrorPhase::HealthCheck));
    assert!(result.error_message.as_deref().unwrap().contains("0/12"));
    assert_eq!(
        controller.lifecycle(),
        vec![
            start("app:v2"),
            Call::Stop {
                name: "app".into(),
                force: true
            },
            start("app:v1"),
        ]
    );
    assert_eq!(
        result.health_check_result().unwrap().last_error.as_deref(),
        Some("HTTP 503")
    );
}

#[tokio::test(start_paused = true)]
async fn probe_errors_count_as_failures() {
    let controller = Arc::new(FakeController::new());
    let prober = Arc::new(ScriptedProber::always(Probe::Error));

    let result = deployer(&controller, &prober)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert_eq!(result.outcome, DeploymentOutcome::RolledBack);
    assert_eq!(prober.probe_count(), 12);
    let summary = result.health_check_result().unwrap();
    assert_eq!(summary.passed, 0);
    assert!(summary.last_error.as_deref().unwrap().contains("refused"));
}

#[tokio::test(start_paused = true)]
async fn without_previous_image_there_is_nothing_to_restore() {
    let controller = Arc::new(FakeController::new());
    let prober = Arc::new(ScriptedProber::always(Probe::Unhealthy));

    let result = deployer(&controller, &prober).deploy(&request()).await;

    assert_eq!(result.outcome, DeploymentOutcome::FailedNoRollback);
    assert!(!result.rollback_performed);
    assert_eq!(
        controller.lifecycle(),
        vec![
            start("app:v2"),
            Call::Stop {
                name: "app".into(),
                force: true
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_restore_is_reported_separately() {
    let controller = Arc::new(FakeController::new());
    controller.fail_start("app:v1");
    let prober = Arc::new(ScriptedProber::always(Probe::Unhealthy));

    let result = deployer(&controller, &prober)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert_eq!(result.outcome, DeploymentOutcome::RollbackFailed);
    assert!(result.rollback_performed);
    // The health check failure stays the headline.
    assert_eq!(result.error_phase, Some(ErrorPhase::HealthCheck));
}

#[tokio::test(start_paused = true)]
async fn start_failure_stops_before_probing() {
    let controller = Arc::new(FakeController::new());
    controller.fail_start("app:v2");
    let prober = Arc::new(ScriptedProber::always(Probe::Healthy));

    let result = deployer(&controller, &prober)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert_eq!(result.outcome, DeploymentOutcome::FailedNoRollback);
    assert_eq!(result.error_phase, Some(ErrorPhase::StartContainer));
    assert_eq!(prober.probe_count(), 0);
    assert_eq!(controller.lifecycle(), vec![start("app:v2")]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_rolls_back() {
    let controller = Arc::new(FakeController::without_address());
    let prober = Arc::new(ScriptedProber::always(Probe::Healthy));

    let result = deployer(&controller, &prober)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert_eq!(result.outcome, DeploymentOutcome::RolledBack);
    assert_eq!(result.error_phase, Some(ErrorPhase::ResolveAddress));
    assert_eq!(prober.probe_count(), 0);
}

fn panicking_deployer(controller: &Arc<FakeController>) -> RollingDeployer {
    support::init_tracing();
    RollingDeployer::new(
        controller.clone(),
        Arc::new(PanickingProber),
        RollingConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn panic_while_observing_restores_previous_image() {
    let controller = Arc::new(FakeController::new());

    let result = panicking_deployer(&controller)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert!(!result.success);
    assert_eq!(result.outcome, DeploymentOutcome::RolledBack);
    assert!(result.rollback_performed);
    assert_eq!(result.error_phase, Some(ErrorPhase::Unknown));
    assert!(result.error_message.as_deref().unwrap().contains("panicked"));
    assert_eq!(result.container_id.as_ref().unwrap().as_str(), "app-id");
    assert_eq!(
        controller.lifecycle(),
        vec![
            start("app:v2"),
            Call::Stop {
                name: "app".into(),
                force: true
            },
            start("app:v1"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn panic_without_previous_image_still_stops_new_container() {
    let controller = Arc::new(FakeController::new());

    let result = panicking_deployer(&controller).deploy(&request()).await;

    assert_eq!(result.outcome, DeploymentOutcome::FailedNoRollback);
    assert_eq!(result.error_phase, Some(ErrorPhase::Unknown));
    assert_eq!(
        controller.lifecycle(),
        vec![
            start("app:v2"),
            Call::Stop {
                name: "app".into(),
                force: true
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn panic_with_failed_restore_is_rollback_failure() {
    let controller = Arc::new(FakeController::new());
    controller.fail_start("app:v1");

    let result = panicking_deployer(&controller)
        .deploy(&request().with_previous_image("app:v1"))
        .await;

    assert_eq!(result.outcome, DeploymentOutcome::RollbackFailed);
    // The panic stays the headline.
    assert_eq!(result.error_phase, Some(ErrorPhase::Unknown));
}

#[tokio::test(start_paused = true)]
async fn invalid_request_touches_nothing() {
    let controller = Arc::new(FakeController::new());
    let prober = Arc::new(ScriptedProber::always(Probe::Healthy));
    let mut request = request();
    request.image_tag = String::new();

    let result = deployer(&controller, &prober).deploy(&request).await;

    assert_eq!(result.outcome, DeploymentOutcome::FailedNoRollback);
    assert_eq!(result.error_phase, Some(ErrorPhase::Validation));
    assert!(controller.calls().is_empty());
}

mod manual_rollback {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn redeploys_previous_image() {
        let controller = Arc::new(FakeController::new());
        let prober = Arc::new(ScriptedProber::always(Probe::Healthy));

        let result = deployer(&controller, &prober)
            .rollback(&request().with_previous_image("app:v1"))
            .await;

        assert!(result.success);
        assert!(result.rollback_performed);
        assert_eq!(result.image_tag, "app:v1");
        assert_eq!(controller.lifecycle(), vec![start("app:v1")]);
        assert_eq!(prober.probe_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn requires_previous_image() {
        let controller = Arc::new(FakeController::new());
        let prober = Arc::new(ScriptedProber::always(Probe::Healthy));

        let result = deployer(&controller, &prober).rollback(&request()).await;

        assert_eq!(result.outcome, DeploymentOutcome::FailedNoRollback);
        assert_eq!(result.error_phase, Some(ErrorPhase::Validation));
        assert!(controller.calls().is_empty());
    }
}
