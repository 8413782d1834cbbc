// ABOUTME: Health observation window: probe at a fixed interval for a fixed duration.
// ABOUTME: Probe errors count as failed probes; the window always runs to the end.

use super::HealthSummary;
use crate::health::HealthProber;
use std::time::Duration;

/// Number of probes a window of `window` at `interval` performs (at least one).
pub(crate) fn probe_count(window: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let n = window.as_nanos().div_ceil(interval.as_nanos());
    u32::try_from(n).unwrap_or(u32::MAX).max(1)
}

/// Probe `url` `probe_count(window, interval)` times, sleeping `interval`
/// between probes.
pub(crate) async fn observe(
    prober: &dyn HealthProber,
    url: &str,
    window: Duration,
    interval: Duration,
) -> HealthSummary {
    let total = probe_count(window, interval);
    let mut passed = 0;
    let mut last_error = None;

    for n in 0..total {
        match prober.check_http(url).await {
            Ok(check) if check.healthy => passed += 1,
            Ok(check) => {
                last_error = check
                    .error_message
                    .or_else(|| check.status_code.map(|code| format!("HTTP {code}")));
            }
            Err(e) => last_error = Some(e.to_string()),
        }
        tracing::debug!(url, probe = n + 1, total, passed, "health probe");

        if n + 1 < total {
            tokio::time::sleep(interval).await;
        }
    }

    HealthSummary {
        passed,
        total,
        success_rate: f64::from(passed) / f64::from(total),
        last_error,
    }
}
