//! Scripted page for tests.
//!
//! A [`MockPage`] answers probes from a timeline measured from its creation
//! on the tokio clock, so paused-time tests drive it without a browser.
//!
//! ```
//! use settle::MockPage;
//! use std::time::Duration;
//!
//! let page = MockPage::new()
//!     .with_content("Orders")
//!     .with_loader_for(Duration::from_secs(2))
//!     .with_requests(Duration::ZERO, Duration::from_millis(800));
//! assert_eq!(page.probe_calls(), 0);
//! ```

use crate::page::{LoadState, SettlePage};
use crate::probe::{LoaderSelectors, Probe};
use crate::result::{SettleError, SettleResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Selector used by [`MockPage::with_loader_for`]
pub const MOCK_LOADER_SELECTOR: &str = ".spinner-border";

/// Quiet period before the mock reports network idle
const MOCK_NETWORK_IDLE_MS: u64 = 500;

#[derive(Debug, Clone, Copy)]
struct Span {
    from: Duration,
    until: Option<Duration>,
}

impl Span {
    fn contains(self, at: Duration) -> bool {
        at >= self.from && self.until.map_or(true, |until| at < until)
    }
}

#[derive(Debug, Clone)]
struct MockElement {
    selector: String,
    span: Span,
}

/// Timeline-driven [`SettlePage`] double
#[derive(Debug)]
pub struct MockPage {
    created: Instant,
    content: String,
    churn: bool,
    renders: AtomicU64,
    requests: Vec<Span>,
    timers: Vec<Span>,
    elements: Vec<MockElement>,
    document_ready_at: Duration,
    closes_at: Option<Duration>,
    failing_load_states: bool,
    failing: Vec<String>,
    completed: Vec<(String, Duration)>,
    probe_calls: AtomicU64,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    /// A fully loaded, quiet page
    #[must_use]
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            content: "Welcome".to_string(),
            churn: false,
            renders: AtomicU64::new(0),
            requests: Vec::new(),
            timers: Vec::new(),
            elements: Vec::new(),
            document_ready_at: Duration::ZERO,
            closes_at: None,
            failing_load_states: false,
            failing: Vec::new(),
            completed: Vec::new(),
            probe_calls: AtomicU64::new(0),
        }
    }

    /// Main-region text
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Re-render the main region on every UI probe, forever
    #[must_use]
    pub const fn with_churning_content(mut self) -> Self {
        self.churn = true;
        self
    }

    /// One request in flight between `from` and `until`
    #[must_use]
    pub fn with_requests(mut self, from: Duration, until: Duration) -> Self {
        self.requests.push(Span {
            from,
            until: Some(until),
        });
        self
    }

    /// One pending timer between `from` and `until`
    #[must_use]
    pub fn with_timers(mut self, from: Duration, until: Duration) -> Self {
        self.timers.push(Span {
            from,
            until: Some(until),
        });
        self
    }

    /// Show a built-in loader for `duration`
    #[must_use]
    pub fn with_loader_for(self, duration: Duration) -> Self {
        self.with_element(MOCK_LOADER_SELECTOR, Duration::ZERO, Some(duration))
    }

    /// Element matching `selector` visible from `from` until `until`
    /// (or forever)
    #[must_use]
    pub fn with_element(
        mut self,
        selector: impl Into<String>,
        from: Duration,
        until: Option<Duration>,
    ) -> Self {
        self.elements.push(MockElement {
            selector: selector.into(),
            span: Span { from, until },
        });
        self
    }

    /// `document.readyState` stays `loading` until `at`
    #[must_use]
    pub const fn with_document_loading_until(mut self, at: Duration) -> Self {
        self.document_ready_at = at;
        self
    }

    /// The page goes away at `at`
    #[must_use]
    pub const fn closing_after(mut self, at: Duration) -> Self {
        self.closes_at = Some(at);
        self
    }

    /// Lifecycle waits fail at once with an evaluation error
    #[must_use]
    pub const fn with_failing_load_states(mut self) -> Self {
        self.failing_load_states = true;
        self
    }

    /// Probes with this name fail with an evaluation error
    #[must_use]
    pub fn with_failing_probe(mut self, name: impl Into<String>) -> Self {
        self.failing.push(name.into());
        self
    }

    /// A resource entry for `url` finishes at `at`
    #[must_use]
    pub fn with_completed_resource(mut self, url: impl Into<String>, at: Duration) -> Self {
        self.completed.push((url.into(), at));
        self
    }

    /// Number of probes answered so far
    #[must_use]
    pub fn probe_calls(&self) -> u64 {
        self.probe_calls.load(Ordering::Relaxed)
    }

    fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    fn is_closed_at(&self, at: Duration) -> bool {
        self.closes_at.is_some_and(|closes| at >= closes)
    }

    fn check_open(&self) -> SettleResult<()> {
        if self.is_closed_at(self.elapsed()) {
            Err(SettleError::page_closed("Target closed"))
        } else {
            Ok(())
        }
    }

    fn active(spans: &[Span], at: Duration) -> usize {
        spans.iter().filter(|span| span.contains(at)).count()
    }

    fn visible(&self, at: Duration, matches: impl Fn(&str) -> bool) -> bool {
        self.elements
            .iter()
            .any(|el| el.span.contains(at) && matches(&el.selector))
    }

    fn loaders_visible(&self, loaders: &LoaderSelectors, at: Duration) -> bool {
        self.visible(at, |selector| loaders.contains(selector))
    }

    fn content_sample(&self, sample_chars: usize) -> String {
        let text = if self.churn {
            let render = self.renders.fetch_add(1, Ordering::Relaxed);
            format!("{} {render}", self.content)
        } else {
            self.content.clone()
        };
        text.chars().take(sample_chars).collect()
    }

    fn ready_at(&self, state: LoadState) -> Duration {
        match state {
            LoadState::DomContentLoaded | LoadState::Load => self.document_ready_at,
            LoadState::NetworkIdle => {
                let last_request = self
                    .requests
                    .iter()
                    .filter_map(|span| span.until)
                    .max()
                    .map_or(Duration::ZERO, |until| {
                        until + Duration::from_millis(MOCK_NETWORK_IDLE_MS)
                    });
                self.document_ready_at.max(last_request)
            }
        }
    }
}

#[async_trait]
impl SettlePage for MockPage {
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> SettleResult<()> {
        self.check_open()?;
        if self.failing_load_states {
            return Err(SettleError::evaluation(format!(
                "{state} wait failed: Execution context was destroyed"
            )));
        }
        let now = self.elapsed();
        let wait = self.ready_at(state).saturating_sub(now);

        if let Some(closes) = self.closes_at {
            let until_close = closes.saturating_sub(now);
            if until_close < wait && until_close < timeout {
                tokio::time::sleep(until_close).await;
                return Err(SettleError::page_closed("Target closed"));
            }
        }
        if wait > timeout {
            tokio::time::sleep(timeout).await;
            return Err(SettleError::Timeout {
                ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        tokio::time::sleep(wait).await;
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> SettleResult<Value> {
        self.check_open()?;
        Err(SettleError::evaluation("mock page only answers probes"))
    }

    async fn probe(&self, probe: &Probe<'_>) -> SettleResult<Value> {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
        self.check_open()?;
        if self.failing.iter().any(|name| name == probe.name()) {
            return Err(SettleError::evaluation(format!(
                "{} probe failed: Execution context was destroyed",
                probe.name()
            )));
        }

        let at = self.elapsed();
        let requests = Self::active(&self.requests, at);
        let value = match probe {
            Probe::Network { .. } => json!({ "activeRequests": requests }),
            Probe::Script => json!({
                "activeTimeouts": Self::active(&self.timers, at),
                "documentComplete": at >= self.document_ready_at,
            }),
            Probe::Ui {
                loaders,
                sample_chars,
            } => json!({
                "visibleLoaders": self.loaders_visible(loaders, at),
                "content": self.content_sample(*sample_chars),
            }),
            Probe::Action { loaders, .. } => json!({
                "networkActive": requests > 0,
                "visibleLoaders": self.loaders_visible(loaders, at),
            }),
            Probe::Loaders { loaders } => json!({
                "visibleLoaders": self.loaders_visible(loaders, at),
            }),
            Probe::QuickAction => {
                let loader = self.visible(at, |selector| {
                    ["loading", "spinner", "fa-spin"]
                        .iter()
                        .any(|needle| selector.contains(needle))
                });
                json!({ "ready": !loader && requests == 0 })
            }
            Probe::CompletedResources => {
                let names: Vec<&str> = self
                    .completed
                    .iter()
                    .filter(|(_, done)| at >= *done)
                    .map(|(url, _)| url.as_str())
                    .collect();
                json!({ "names": names })
            }
            Probe::SelectorVisible { selector } => json!({
                "visible": self.visible(at, |candidate| candidate == *selector),
            }),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{self, NetworkReading, UiReading};

    #[tokio::test(start_paused = true)]
    async fn test_request_window() {
        let page =
            MockPage::new().with_requests(Duration::from_millis(100), Duration::from_millis(300));
        let probe = Probe::Network {
            recent_window_ms: 2_000,
        };
        let idle: NetworkReading = probe::read(&page, &probe).await.unwrap();
        assert!(idle.is_idle());
        tokio::time::sleep(Duration::from_millis(150)).await;
        let busy: NetworkReading = probe::read(&page, &probe).await.unwrap();
        assert_eq!(busy.active_requests, 1);
        assert_eq!(page.probe_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_churn_changes_content() {
        let page = MockPage::new().with_churning_content();
        let loaders = LoaderSelectors::default();
        let probe = Probe::Ui {
            loaders: &loaders,
            sample_chars: 500,
        };
        let first: UiReading = probe::read(&page, &probe).await.unwrap();
        let second: UiReading = probe::read(&page, &probe).await.unwrap();
        assert_ne!(first.content_hash(), second.content_hash());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_state_timeout() {
        let page = MockPage::new().with_document_loading_until(Duration::from_secs(3));
        let err = page
            .wait_for_load_state(LoadState::Load, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::Timeout { ms: 1000 }));
        page.wait_for_load_state(LoadState::Load, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_during_wait() {
        let page = MockPage::new()
            .with_document_loading_until(Duration::from_secs(10))
            .closing_after(Duration::from_secs(1));
        let err = page
            .wait_for_load_state(LoadState::Load, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(page.evaluate("1").await.unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_probe() {
        let page = MockPage::new().with_failing_probe("script");
        let err = page.probe(&Probe::Script).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
