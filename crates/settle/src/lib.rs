//! Settle: best-effort page settlement detection for browser end-to-end tests
//!
//! After a navigation or click a single-page application keeps working for a
//! while: XHR/fetch calls, timers, spinners, re-renders. Settle watches those
//! signals through a small page capability ([`SettlePage`]) and decides when
//! the page has gone quiet enough for the next action.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      SETTLE Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────────────┐     │
//! │   │ Detector   │    │ Probes     │    │ SettlePage         │     │
//! │   │ (7 stages, │───►│ (network,  │───►│ Chromium / Mock    │     │
//! │   │  deadline) │    │  script,ui)│    │                    │     │
//! │   └────────────┘    └────────────┘    └────────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use settle::{wait_for_settled, MockPage};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> settle::SettleResult<()> {
//! let page = MockPage::new();
//! let report = wait_for_settled(&page, Duration::from_secs(5), &["busy-overlay"]).await?;
//! assert!(report.is_settled());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod action;
mod browser;
mod config;
mod detector;
mod mock;
mod page;
/// Page-side indicator probes and their readings
pub mod probe;
mod report;
mod result;
mod timer;
mod window;

pub use action::{
    wait_for_action_complete, wait_for_api_endpoints, wait_for_loaders_to_disappear,
    wait_for_network_response, wait_for_quick_action, ACTION_RECENT_WINDOW_MS,
};
pub use browser::BrowserConfig;
#[cfg(feature = "browser")]
pub use browser::{Browser, Page};
pub use config::{
    SettleConfig, ACTION_IDLE_THRESHOLD_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLE_TIMEOUT_MS,
    NETWORK_IDLE_THRESHOLD_MS, TIMEOUT_ENV_VAR,
};
pub use detector::{wait_for_settled, SettlementDetector};
pub use mock::{MockPage, MOCK_LOADER_SELECTOR};
pub use page::{poll_network_idle, poll_ready_state, LoadState, SettlePage};
pub use probe::{ContentHash, LoaderSelectors, Probe, BUILTIN_LOADER_SELECTORS};
pub use report::{SettleReport, Stage, StageOutcome, StageReport};
pub use result::{SettleError, SettleResult};
pub use timer::{ElementLoadEntry, ElementLoadTimer, DEFAULT_ELEMENT_TIMEOUT_MS};
pub use window::{Deadline, StabilityWindow};
