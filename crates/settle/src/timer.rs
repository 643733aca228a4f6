//! Element load timing.
//!
//! Unlike the settle waits, a selector that never shows up is an error.

use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::page::SettlePage;
use crate::probe::{self, Probe, VisibilityReading};
use crate::result::{SettleError, SettleResult};
use crate::window::Deadline;
use serde::Serialize;
use std::time::Duration;

/// Default budget per element
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// One measured step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementLoadEntry {
    /// Step label
    pub step: String,
    /// Selector that was awaited
    pub selector: String,
    /// Time until visible, rounded to two decimals
    pub duration_ms: f64,
}

/// Records how long selectors take to become visible on one page
#[derive(Debug)]
pub struct ElementLoadTimer<'p, P: SettlePage + ?Sized> {
    page: &'p P,
    timeout: Duration,
    poll_interval: Duration,
    entries: Vec<ElementLoadEntry>,
}

impl<'p, P: SettlePage + ?Sized> ElementLoadTimer<'p, P> {
    /// Timer with the default 10s budget
    #[must_use]
    pub fn new(page: &'p P) -> Self {
        Self {
            page,
            timeout: Duration::from_millis(DEFAULT_ELEMENT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            entries: Vec::new(),
        }
    }

    /// Set the per-element budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for `selector` to become visible and record the time it took.
    ///
    /// # Errors
    ///
    /// [`SettleError::Timeout`] when the element is not visible within the
    /// budget, [`SettleError::PageClosed`] when the page goes away.
    pub async fn time_to_load(&mut self, selector: &str, step: &str) -> SettleResult<f64> {
        let deadline = Deadline::after(self.timeout);
        let probe = Probe::SelectorVisible { selector };

        loop {
            match probe::read::<VisibilityReading, _>(self.page, &probe).await {
                Ok(reading) if reading.visible => break,
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::trace!(error = %err, selector, "visibility probe failed"),
            }
            if deadline.is_expired() {
                tracing::error!(step, selector, "[Timeout] selector not found");
                return Err(SettleError::Timeout {
                    ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            let wait = self.poll_interval.min(deadline.remaining());
            if !wait.is_zero() {
                self.page.pause(wait).await;
            }
        }

        let duration_ms = round2(deadline.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(step, selector, duration_ms, "element visible");
        self.entries.push(ElementLoadEntry {
            step: step.to_string(),
            selector: selector.to_string(),
            duration_ms,
        });
        Ok(duration_ms)
    }

    /// Entries recorded so far, in order
    #[must_use]
    pub fn results(&self) -> &[ElementLoadEntry] {
        &self.entries
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
