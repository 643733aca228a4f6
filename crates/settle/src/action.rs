//! Follow-up waits for after an action.
//!
//! Lighter than the full detector: each one watches a single condition with
//! its own budget. All of them give up quietly at the deadline and only
//! fail when the page is gone.

use crate::config::SettleConfig;
use crate::detector::degrade;
use crate::page::{LoadState, SettlePage};
use crate::probe::{
    self, ActionReading, LoaderReading, LoaderSelectors, Probe, QuickReading, ResourceReading,
};
use crate::report::StageOutcome;
use crate::result::SettleResult;
use crate::window::Deadline;
use std::time::Duration;
use tokio::time::Instant;

/// XHR/fetch entries younger than this without a response count as activity
pub const ACTION_RECENT_WINDOW_MS: u64 = 1_000;

/// Poll interval for [`wait_for_quick_action`]
pub const QUICK_POLL_INTERVAL_MS: u64 = 50;

/// Network idle fallback when the quick check cannot be evaluated
pub const QUICK_FALLBACK_IDLE_MS: u64 = 2_000;

/// Poll interval for [`wait_for_api_endpoints`] and [`wait_for_network_response`]
pub const ENDPOINT_POLL_INTERVAL_MS: u64 = 100;

/// Wait until no loader is visible and the network has been quiet for the
/// action idle threshold.
///
/// A failed probe falls back to one network idle wait.
pub async fn wait_for_action_complete<P, S>(
    page: &P,
    timeout: Duration,
    extra_loaders: &[S],
    config: &SettleConfig,
) -> SettleResult<StageOutcome>
where
    P: SettlePage + ?Sized,
    S: AsRef<str>,
{
    let mut loaders = LoaderSelectors::with_extra(&config.extra_loaders);
    for pattern in extra_loaders {
        loaders.push(pattern.as_ref());
    }
    let deadline = Deadline::after(timeout);
    let outcome = action_complete_until(page, &loaders, &deadline, config).await?;
    if outcome == StageOutcome::DeadlineReached {
        tracing::warn!(
            timeout_ms = deadline.budget().as_millis() as u64,
            "wait_for_action_complete timed out, continuing"
        );
    }
    Ok(outcome)
}

pub(crate) async fn action_complete_until<P: SettlePage + ?Sized>(
    page: &P,
    loaders: &LoaderSelectors,
    deadline: &Deadline,
    config: &SettleConfig,
) -> SettleResult<StageOutcome> {
    let probe = Probe::Action {
        loaders,
        recent_window_ms: ACTION_RECENT_WINDOW_MS,
    };
    let mut last_activity = Instant::now();

    while !deadline.is_expired() {
        match probe::read::<ActionReading, _>(page, &probe).await {
            Ok(reading) => {
                if reading.network_active {
                    last_activity = Instant::now();
                }
                if reading.is_complete()
                    && last_activity.elapsed() >= config.action_idle_threshold()
                {
                    return Ok(StageOutcome::Settled);
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "action probe failed, falling back to network idle");
                return match page
                    .wait_for_load_state(LoadState::NetworkIdle, deadline.remaining())
                    .await
                {
                    Ok(()) => Ok(StageOutcome::degraded(err)),
                    Err(idle_err) => degrade(idle_err),
                };
            }
        }
        pause(page, config.action_poll_interval(), deadline).await;
    }
    Ok(StageOutcome::DeadlineReached)
}

/// Poll until no loader is visible. A failed probe means the loaders are
/// assumed gone.
pub async fn wait_for_loaders_to_disappear<P, S>(
    page: &P,
    extra_loaders: &[S],
    timeout: Duration,
    config: &SettleConfig,
) -> SettleResult<StageOutcome>
where
    P: SettlePage + ?Sized,
    S: AsRef<str>,
{
    let mut loaders = LoaderSelectors::with_extra(&config.extra_loaders);
    for pattern in extra_loaders {
        loaders.push(pattern.as_ref());
    }
    let probe = Probe::Loaders { loaders: &loaders };
    let deadline = Deadline::after(timeout);

    while !deadline.is_expired() {
        match probe::read::<LoaderReading, _>(page, &probe).await {
            Ok(reading) if !reading.visible_loaders => return Ok(StageOutcome::Settled),
            Ok(_) => {}
            Err(err) => return degrade(err),
        }
        pause(page, config.loader_poll_interval(), &deadline).await;
    }
    tracing::warn!(timeout_ms = deadline.budget().as_millis() as u64, "loaders still visible");
    Ok(StageOutcome::DeadlineReached)
}

/// Cheap check for the common case: no obvious loader and no tracked
/// request in flight.
pub async fn wait_for_quick_action<P: SettlePage + ?Sized>(
    page: &P,
    timeout: Duration,
) -> SettleResult<StageOutcome> {
    let deadline = Deadline::after(timeout);
    let interval = Duration::from_millis(QUICK_POLL_INTERVAL_MS);

    while !deadline.is_expired() {
        match probe::read::<QuickReading, _>(page, &Probe::QuickAction).await {
            Ok(reading) if reading.ready => return Ok(StageOutcome::Settled),
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let fallback = Duration::from_millis(QUICK_FALLBACK_IDLE_MS);
                return match page.wait_for_load_state(LoadState::NetworkIdle, fallback).await {
                    Ok(()) => Ok(StageOutcome::degraded(err)),
                    Err(idle_err) => degrade(idle_err),
                };
            }
        }
        pause(page, interval, &deadline).await;
    }
    Ok(StageOutcome::DeadlineReached)
}

/// Wait until a finished request has been seen for every endpoint pattern.
///
/// Matching is by substring of the resource URL, and entries that finished
/// before the call count. Returns the endpoints still pending when the
/// budget ran out; empty when all completed.
pub async fn wait_for_api_endpoints<P, S>(
    page: &P,
    endpoints: &[S],
    timeout: Duration,
) -> SettleResult<Vec<String>>
where
    P: SettlePage + ?Sized,
    S: AsRef<str>,
{
    let mut pending: Vec<String> = endpoints.iter().map(|e| e.as_ref().to_string()).collect();
    let deadline = Deadline::after(timeout);
    let interval = Duration::from_millis(ENDPOINT_POLL_INTERVAL_MS);

    loop {
        match probe::read::<ResourceReading, _>(page, &Probe::CompletedResources).await {
            Ok(reading) => {
                pending.retain(|endpoint| !reading.names.iter().any(|url| url.contains(endpoint)));
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::debug!(error = %err, "resource probe failed"),
        }
        if pending.is_empty() || deadline.is_expired() {
            break;
        }
        pause(page, interval, &deadline).await;
    }

    if !pending.is_empty() {
        tracing::warn!(pending = %pending.join(", "), "some API endpoints did not complete");
    }
    Ok(pending)
}

/// Wait for a response whose URL contains `pattern`.
///
/// Matching entries already complete at the first successful poll are the
/// baseline; only a further one counts. Returns `false` when the budget ran
/// out first.
pub async fn wait_for_network_response<P>(
    page: &P,
    pattern: &str,
    timeout: Duration,
) -> SettleResult<bool>
where
    P: SettlePage + ?Sized,
{
    let deadline = Deadline::after(timeout);
    let interval = Duration::from_millis(ENDPOINT_POLL_INTERVAL_MS);
    let mut baseline = None;

    loop {
        match probe::read::<ResourceReading, _>(page, &Probe::CompletedResources).await {
            Ok(reading) => {
                let seen = reading.names.iter().filter(|url| url.contains(pattern)).count();
                match baseline {
                    Some(before) if seen > before => return Ok(true),
                    Some(_) => {}
                    None => baseline = Some(seen),
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::debug!(error = %err, "resource probe failed"),
        }
        if deadline.is_expired() {
            break;
        }
        pause(page, interval, &deadline).await;
    }

    tracing::warn!(
        pattern,
        timeout_ms = timeout.as_millis() as u64,
        "timed out waiting for network response"
    );
    Ok(false)
}

async fn pause<P: SettlePage + ?Sized>(page: &P, interval: Duration, deadline: &Deadline) {
    let wait = interval.min(deadline.remaining());
    if !wait.is_zero() {
        page.pause(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPage;
    use crate::result::SettleError;

    const NO_EXTRAS: &[&str] = &[];

    mod action_complete_tests {
        use super::*;

        async fn complete(page: &MockPage, timeout: Duration) -> StageOutcome {
            wait_for_action_complete(page, timeout, NO_EXTRAS, &SettleConfig::default())
                .await
                .unwrap()
        }

        #[tokio::test(start_paused = true)]
        async fn test_quiet_page_completes_after_threshold() {
            let page = MockPage::new();
            let start = Instant::now();
            let outcome = complete(&page, Duration::from_secs(5)).await;
            assert_eq!(outcome, StageOutcome::Settled);
            assert!(start.elapsed() >= Duration::from_millis(300));
            assert!(start.elapsed() < Duration::from_millis(500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_requests_extend_the_wait() {
            let page = MockPage::new().with_requests(Duration::ZERO, Duration::from_secs(1));
            let start = Instant::now();
            let outcome = complete(&page, Duration::from_secs(5)).await;
            assert_eq!(outcome, StageOutcome::Settled);
            assert!(start.elapsed() >= Duration::from_millis(1200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_times_out_without_error() {
            let page = MockPage::new().with_loader_for(Duration::from_secs(60));
            let outcome = complete(&page, Duration::from_secs(1)).await;
            assert_eq!(outcome, StageOutcome::DeadlineReached);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_probe_falls_back_to_network_idle() {
            let page = MockPage::new().with_failing_probe("action");
            let outcome = complete(&page, Duration::from_secs(5)).await;
            assert!(matches!(outcome, StageOutcome::Degraded { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_extra_loader_is_honored() {
            let page = MockPage::new().with_element(
                ".busy-overlay",
                Duration::ZERO,
                Some(Duration::from_secs(1)),
            );
            let start = Instant::now();
            let outcome = wait_for_action_complete(
                &page,
                Duration::from_secs(5),
                &["busy-overlay"],
                &SettleConfig::default(),
            )
            .await
            .unwrap();
            assert_eq!(outcome, StageOutcome::Settled);
            assert!(start.elapsed() >= Duration::from_secs(1));
        }
    }

    mod loader_tests {
        use super::*;

        async fn loaders_gone(page: &MockPage, timeout: Duration) -> StageOutcome {
            wait_for_loaders_to_disappear(page, NO_EXTRAS, timeout, &SettleConfig::default())
                .await
                .unwrap()
        }

        #[tokio::test(start_paused = true)]
        async fn test_returns_once_loader_hidden() {
            let page = MockPage::new().with_loader_for(Duration::from_millis(700));
            let start = Instant::now();
            let outcome = loaders_gone(&page, Duration::from_secs(5)).await;
            assert_eq!(outcome, StageOutcome::Settled);
            assert_eq!(start.elapsed(), Duration::from_millis(800));
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_probe_assumes_gone() {
            let page = MockPage::new()
                .with_loader_for(Duration::from_secs(60))
                .with_failing_probe("loaders");
            let outcome = loaders_gone(&page, Duration::from_secs(5)).await;
            assert!(matches!(outcome, StageOutcome::Degraded { .. }));
        }
    }

    mod quick_action_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_ready_immediately() {
            let page = MockPage::new();
            let outcome = wait_for_quick_action(&page, Duration::from_secs(10)).await.unwrap();
            assert_eq!(outcome, StageOutcome::Settled);
        }

        #[tokio::test(start_paused = true)]
        async fn test_waits_for_requests() {
            let page = MockPage::new().with_requests(Duration::ZERO, Duration::from_millis(400));
            let start = Instant::now();
            wait_for_quick_action(&page, Duration::from_secs(10)).await.unwrap();
            assert_eq!(start.elapsed(), Duration::from_millis(400));
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_page_is_fatal() {
            let page = MockPage::new().closing_after(Duration::ZERO);
            let err = wait_for_quick_action(&page, Duration::from_secs(1)).await.unwrap_err();
            assert!(matches!(err, SettleError::PageClosed { .. }));
        }
    }

    mod endpoint_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_reports_pending_endpoints() {
            let page = MockPage::new().with_completed_resource(
                "https://app.test/api/users?page=1",
                Duration::from_millis(300),
            );
            let pending = wait_for_api_endpoints(
                &page,
                &["/api/users", "/api/orders"],
                Duration::from_secs(1),
            )
            .await
            .unwrap();
            assert_eq!(pending, vec!["/api/orders".to_string()]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_all_endpoints_complete() {
            let page = MockPage::new()
                .with_completed_resource("https://app.test/api/users", Duration::from_millis(200))
                .with_completed_resource("https://app.test/api/orders", Duration::from_millis(500));
            let start = Instant::now();
            let pending = wait_for_api_endpoints(
                &page,
                &["/api/users", "/api/orders"],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
            assert!(pending.is_empty());
            assert_eq!(start.elapsed(), Duration::from_millis(500));
        }
    }

    mod network_response_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_returns_when_response_arrives() {
            let page = MockPage::new()
                .with_completed_resource("https://app.test/api/save", Duration::from_millis(300));
            let start = Instant::now();
            let seen = wait_for_network_response(&page, "/api/save", Duration::from_secs(5))
                .await
                .unwrap();
            assert!(seen);
            assert_eq!(start.elapsed(), Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_earlier_response_is_not_counted() {
            let page = MockPage::new()
                .with_completed_resource("https://app.test/api/save", Duration::ZERO);
            let start = Instant::now();
            let seen = wait_for_network_response(&page, "/api/save", Duration::from_secs(1))
                .await
                .unwrap();
            assert!(!seen);
            assert_eq!(start.elapsed(), Duration::from_secs(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_repeated_request_counts() {
            let page = MockPage::new()
                .with_completed_resource("https://app.test/api/save", Duration::ZERO)
                .with_completed_resource("https://app.test/api/save", Duration::from_millis(400));
            let seen = wait_for_network_response(&page, "/api/save", Duration::from_secs(5))
                .await
                .unwrap();
            assert!(seen);
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_page_is_fatal() {
            let page = MockPage::new().closing_after(Duration::from_millis(250));
            let err = wait_for_network_response(&page, "/api/save", Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(err.is_fatal());
        }
    }
}
