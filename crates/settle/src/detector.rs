//! Page Settlement Detector.
//!
//! Decides when a page has stopped reacting to the previous action
//! (navigation or click) so the next action can run reliably. Seven
//! bounded stages run strictly in order against one shared deadline:
//!
//! 1. lifecycle milestones (`DOMContentLoaded`, `load`)
//! 2. browser-level network idle signal
//! 3. polled network activity (request counters, unfinished resource entries)
//! 4. polled script activity (timers, intervals, animation frames, readiness)
//! 5. polled UI stability (no visible loaders, content fingerprint steady)
//! 6. final browser-level network idle signal
//! 7. combined loader and network quiet check
//!
//! This is a best-effort heuristic. A stage that cannot reach its condition
//! ends at the deadline and later stages run on the remaining time (never
//! less than the stage floor, never past `deadline + floor`). A page that
//! re-renders forever, such as a ticking clock widget, cannot be told apart
//! from one that is still loading and will run the UI stage to the deadline.
//!
//! Only a closed page is reported as an error.

use crate::action::action_complete_until;
use crate::config::SettleConfig;
use crate::page::{LoadState, SettlePage};
use crate::probe::{
    self, ContentHash, LoaderSelectors, NetworkReading, Probe, ScriptReading, UiReading,
};
use crate::report::{SettleReport, Stage, StageOutcome};
use crate::result::{SettleError, SettleResult};
use crate::window::{Deadline, StabilityWindow};
use std::time::Duration;
use tokio::time::Instant;

/// Settle `page` with the default tunables, `timeout` as the budget and
/// `extra_loaders` appended to the built-in loader patterns
pub async fn wait_for_settled<P, S>(
    page: &P,
    timeout: Duration,
    extra_loaders: &[S],
) -> SettleResult<SettleReport>
where
    P: SettlePage + ?Sized,
    S: AsRef<str>,
{
    let config = SettleConfig {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        ..SettleConfig::default()
    };
    SettlementDetector::new(config)
        .with_extra_loaders(extra_loaders)
        .run(page)
        .await
}

/// Multi-stage settle heuristic.
///
/// One detector may be reused across pages and runs; each [`run`] owns its
/// own deadline and counters.
///
/// [`run`]: SettlementDetector::run
#[derive(Debug, Clone)]
pub struct SettlementDetector {
    config: SettleConfig,
    loaders: LoaderSelectors,
}

impl Default for SettlementDetector {
    fn default() -> Self {
        Self::new(SettleConfig::default())
    }
}

impl SettlementDetector {
    /// Detector using `config`, including its `extra_loaders`
    #[must_use]
    pub fn new(config: SettleConfig) -> Self {
        let loaders = LoaderSelectors::with_extra(&config.extra_loaders);
        Self { config, loaders }
    }

    /// Append loader patterns
    #[must_use]
    pub fn with_extra_loaders<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        for pattern in patterns {
            self.loaders.push(pattern.as_ref());
        }
        self
    }

    /// Tunables in use
    #[must_use]
    pub const fn config(&self) -> &SettleConfig {
        &self.config
    }

    /// Loader patterns in use
    #[must_use]
    pub const fn loaders(&self) -> &LoaderSelectors {
        &self.loaders
    }

    /// Run every stage against `page`.
    ///
    /// Returns `Ok` whether or not the page settled; inspect the report for
    /// details. Fails only when the page handle is gone.
    pub async fn run<P: SettlePage + ?Sized>(&self, page: &P) -> SettleResult<SettleReport> {
        let deadline = Deadline::after(self.config.timeout());
        let mut report = SettleReport::new(deadline.budget());

        for stage in Stage::ALL {
            let started = Instant::now();
            let outcome = match stage {
                Stage::Lifecycle => self.lifecycle(page, &deadline).await,
                Stage::NetworkSignal => self.network_signal(page, &deadline).await,
                Stage::NetworkActivity => self.network_activity(page, &deadline).await,
                Stage::Scripts => self.scripts(page, &deadline).await,
                Stage::UiStability => self.ui_stability(page, &deadline).await,
                Stage::FinalNetworkIdle => self.network_signal(page, &deadline).await,
                Stage::ActionComplete => {
                    let stage_deadline = deadline.stage(self.config.min_stage_floor());
                    action_complete_until(page, &self.loaders, &stage_deadline, &self.config).await
                }
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(stage = %stage, error = %err, "page closed while settling");
                    return Err(err);
                }
            };
            match &outcome {
                StageOutcome::Settled => {
                    tracing::debug!(
                        stage = %stage,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "stage settled"
                    );
                }
                StageOutcome::DeadlineReached => {
                    tracing::warn!(
                        stage = %stage,
                        timeout_ms = report.timeout_ms,
                        "stage hit the settle deadline, continuing"
                    );
                }
                StageOutcome::Degraded { reason } => {
                    tracing::warn!(
                        stage = %stage,
                        %reason,
                        "stage could not be evaluated, continuing"
                    );
                }
            }
            report.record(stage, outcome, started.elapsed());
        }

        report.finish(deadline.elapsed());
        if report.is_settled() {
            tracing::info!(elapsed_ms = report.elapsed_ms, "page settled");
        } else {
            tracing::warn!(
                elapsed_ms = report.elapsed_ms,
                timeout_ms = report.timeout_ms,
                "wait_for_settled finished without every stage settling, proceeding anyway"
            );
        }
        Ok(report)
    }

    async fn lifecycle<P: SettlePage + ?Sized>(
        &self,
        page: &P,
        deadline: &Deadline,
    ) -> SettleResult<StageOutcome> {
        for state in [LoadState::DomContentLoaded, LoadState::Load] {
            if deadline.is_expired() {
                return Ok(StageOutcome::DeadlineReached);
            }
            if let Err(err) = page.wait_for_load_state(state, deadline.remaining()).await {
                if !err.is_fatal() {
                    self.pause(page, deadline).await;
                }
                return degrade(err);
            }
        }
        Ok(StageOutcome::Settled)
    }

    async fn network_signal<P: SettlePage + ?Sized>(
        &self,
        page: &P,
        deadline: &Deadline,
    ) -> SettleResult<StageOutcome> {
        let budget = deadline
            .stage_budget(self.config.min_stage_floor())
            .min(self.config.network_idle_cap());
        if budget.is_zero() {
            return Ok(StageOutcome::DeadlineReached);
        }
        match page.wait_for_load_state(LoadState::NetworkIdle, budget).await {
            Ok(()) => Ok(StageOutcome::Settled),
            Err(err) => degrade(err),
        }
    }

    async fn network_activity<P: SettlePage + ?Sized>(
        &self,
        page: &P,
        deadline: &Deadline,
    ) -> SettleResult<StageOutcome> {
        let probe = Probe::Network {
            recent_window_ms: self.config.recent_request_window_ms,
        };
        let mut window = StabilityWindow::new(self.config.network_idle_polls);
        let mut last_activity = Instant::now();

        while !deadline.is_expired() {
            match probe::read::<NetworkReading, _>(page, &probe).await {
                Ok(reading) if reading.is_idle() => {
                    window.observe(true);
                }
                Ok(reading) => {
                    tracing::trace!(activity = reading.total(), "network busy");
                    window.observe(false);
                    last_activity = Instant::now();
                }
                Err(err) if err.is_fatal() => return Err(err),
                // An unreadable page counts towards idleness
                Err(err) => {
                    tracing::debug!(error = %err, "network probe failed");
                    window.observe(true);
                }
            }
            if window.is_stable() && last_activity.elapsed() >= self.config.network_idle_threshold()
            {
                return Ok(StageOutcome::Settled);
            }
            self.pause(page, deadline).await;
        }
        Ok(StageOutcome::DeadlineReached)
    }

    async fn scripts<P: SettlePage + ?Sized>(
        &self,
        page: &P,
        deadline: &Deadline,
    ) -> SettleResult<StageOutcome> {
        let mut window = StabilityWindow::new(self.config.script_idle_polls);

        while !deadline.is_expired() {
            match probe::read::<ScriptReading, _>(page, &Probe::Script).await {
                Ok(reading) => {
                    if window.observe(reading.is_idle()) {
                        return Ok(StageOutcome::Settled);
                    }
                }
                Err(err) => {
                    if !err.is_fatal() {
                        self.pause(page, deadline).await;
                    }
                    return degrade(err);
                }
            }
            self.pause(page, deadline).await;
        }
        Ok(StageOutcome::DeadlineReached)
    }

    async fn ui_stability<P: SettlePage + ?Sized>(
        &self,
        page: &P,
        deadline: &Deadline,
    ) -> SettleResult<StageOutcome> {
        let probe = Probe::Ui {
            loaders: &self.loaders,
            sample_chars: self.config.content_sample_chars,
        };
        let mut window = StabilityWindow::new(self.config.ui_stable_polls);
        let mut previous: Option<ContentHash> = None;

        while !deadline.is_expired() {
            match probe::read::<UiReading, _>(page, &probe).await {
                Ok(reading) => {
                    let hash = reading.content_hash();
                    let stable = !reading.visible_loaders && previous.as_ref() == Some(&hash);
                    if !stable {
                        tracing::trace!(
                            content = %hash,
                            loaders = reading.visible_loaders,
                            "ui changing"
                        );
                        previous = Some(hash);
                    }
                    if window.observe(stable) {
                        return Ok(StageOutcome::Settled);
                    }
                }
                Err(err) => {
                    if !err.is_fatal() {
                        self.pause(page, deadline).await;
                    }
                    return degrade(err);
                }
            }
            self.pause(page, deadline).await;
        }
        Ok(StageOutcome::DeadlineReached)
    }

    /// One poll interval, cut short at the deadline
    async fn pause<P: SettlePage + ?Sized>(&self, page: &P, deadline: &Deadline) {
        let wait = self.config.poll_interval().min(deadline.remaining());
        if !wait.is_zero() {
            page.pause(wait).await;
        }
    }
}

/// Fatal errors propagate, everything else degrades the stage
pub(crate) fn degrade(err: SettleError) -> SettleResult<StageOutcome> {
    if err.is_fatal() {
        Err(err)
    } else {
        Ok(StageOutcome::degraded(err))
    }
}
