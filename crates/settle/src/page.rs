//! Page capability consumed by the settlement waits.
//!
//! The detector never talks to a browser directly. Anything that can wait
//! for lifecycle milestones and evaluate a snippet in the page context can
//! be settled: the Chromium backend, a WebDriver bridge, or the scripted
//! [`MockPage`](crate::MockPage) used in tests.

use crate::probe::Probe;
use crate::result::SettleResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

const READY_STATE_JS: &str = "document.readyState";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page lifecycle milestones (Playwright parity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// `load` fired, all subresources fetched
    #[default]
    Load,
    /// No network requests for 500ms
    NetworkIdle,
}

impl LoadState {
    /// Get the JavaScript event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::Load => "load",
            Self::NetworkIdle => "networkidle",
        }
    }

    /// `document.readyState` values that satisfy this state
    #[must_use]
    pub const fn ready_states(&self) -> &'static [&'static str] {
        match self {
            Self::DomContentLoaded => &["interactive", "complete"],
            Self::Load | Self::NetworkIdle => &["complete"],
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// PAGE TRAIT
// =============================================================================

/// A live page the settlement waits can observe.
///
/// Implementations must report a vanished page as
/// [`SettleError::PageClosed`](crate::SettleError::PageClosed); every other
/// error is treated as transient.
#[async_trait]
pub trait SettlePage: Send + Sync {
    /// Wait until the page reaches `state`, failing after `timeout`
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> SettleResult<()>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate(&self, script: &str) -> SettleResult<serde_json::Value>;

    /// Run one indicator probe
    async fn probe(&self, probe: &Probe<'_>) -> SettleResult<serde_json::Value> {
        self.evaluate(&probe.script()).await
    }

    /// Sleep between polls without blocking other pages
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// EVALUATE-BACKED LIFECYCLE
// =============================================================================

/// Poll `document.readyState` until it satisfies `state`.
///
/// Non-fatal evaluation failures (a navigation destroying the execution
/// context) are retried every `poll`. Runs until satisfied; callers bound it
/// with a timeout.
///
/// # Errors
///
/// Returns only fatal errors (closed page)
pub async fn poll_ready_state<P>(page: &P, state: LoadState, poll: Duration) -> SettleResult<()>
where
    P: SettlePage + ?Sized,
{
    loop {
        match page.evaluate(READY_STATE_JS).await {
            Ok(value) => {
                if state.ready_states().contains(&value.as_str().unwrap_or_default()) {
                    return Ok(());
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::debug!(error = %err, %state, "readyState read failed, retrying"),
        }
        page.pause(poll).await;
    }
}

/// Wait for `load`, then for the resource-timing entry count to stay
/// unchanged for `quiet`.
///
/// A failed count read restarts the quiet period. Runs until idle; callers
/// bound it with a timeout.
///
/// # Errors
///
/// Returns only fatal errors (closed page)
pub async fn poll_network_idle<P>(page: &P, poll: Duration, quiet: Duration) -> SettleResult<()>
where
    P: SettlePage + ?Sized,
{
    poll_ready_state(page, LoadState::Load, poll).await?;
    let mut count = None;
    let mut since = Instant::now();
    loop {
        match page.evaluate(RESOURCE_COUNT_JS).await {
            Ok(value) => {
                let next = value.as_u64().unwrap_or_default();
                if count == Some(next) {
                    if since.elapsed() >= quiet {
                        return Ok(());
                    }
                } else {
                    count = Some(next);
                    since = Instant::now();
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "resource count read failed, retrying");
                count = None;
                since = Instant::now();
            }
        }
        page.pause(poll).await;
    }
}
