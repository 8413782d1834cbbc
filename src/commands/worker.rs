// ABOUTME: Long-running worker and watchdog commands.
// ABOUTME: Both stop on Ctrl-C; workers finish their in-flight deployment first.

use super::warn_if_ephemeral;
use convoy::config::Config;
use convoy::error::Result;
use convoy::orchestrator::Orchestrator;
use convoy::output::Output;
use tokio::sync::watch;
use tokio::task::JoinSet;

pub async fn worker(config: &Config, workers: usize, output: &Output) -> Result<()> {
    warn_if_ephemeral(config);
    let orchestrator = Orchestrator::from_config(config).await?;
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let (stop, stopped) = watch::channel(false);

    let mut tasks = JoinSet::new();
    for n in 0..workers.max(1) {
        let worker = orchestrator.worker(format!("{host}-{n}"));
        let mut stopped = stopped.clone();
        tasks.spawn(async move {
            worker
                .run(async move {
                    // A dropped sender also means stop.
                    let _ = stopped.changed().await;
                })
                .await
        });
    }
    output.progress(&format!(
        "{} worker(s) running; press Ctrl-C to stop",
        workers.max(1)
    ));

    tokio::signal::ctrl_c().await?;
    output.progress("Stopping after in-flight deployments finish...");
    let _ = stop.send(true);

    let mut handled = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(count) => handled += count,
            Err(e) => tracing::error!("worker task failed: {}", e),
        }
    }
    output.success(&format!("Workers stopped after {handled} job(s)"));
    Ok(())
}

pub async fn watchdog(config: &Config, once: bool, output: &Output) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let watchdog = orchestrator.watchdog();

    let requeued = if once {
        watchdog.sweep().await
    } else {
        output.progress("Watchdog running; press Ctrl-C to stop");
        watchdog
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
    };
    output.success(&format!("Requeued {requeued} stale job(s)"));
    Ok(())
}
