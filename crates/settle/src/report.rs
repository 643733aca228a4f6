//! Outcome of a settle run.

use serde::Serialize;
use std::time::Duration;

/// Detector stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// `DOMContentLoaded` and `load`
    Lifecycle,
    /// Browser-level network idle signal
    NetworkSignal,
    /// Polled request counters and resource timing
    NetworkActivity,
    /// Pending timers, intervals and animation frames
    Scripts,
    /// Loaders gone and content fingerprint steady
    UiStability,
    /// Last browser-level network idle signal
    FinalNetworkIdle,
    /// Combined loader and network quiet check
    ActionComplete,
}

impl Stage {
    /// All stages in order
    pub const ALL: [Self; 7] = [
        Self::Lifecycle,
        Self::NetworkSignal,
        Self::NetworkActivity,
        Self::Scripts,
        Self::UiStability,
        Self::FinalNetworkIdle,
        Self::ActionComplete,
    ];

    /// Name used in logs and reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::NetworkSignal => "network_signal",
            Self::NetworkActivity => "network_activity",
            Self::Scripts => "scripts",
            Self::UiStability => "ui_stability",
            Self::FinalNetworkIdle => "final_network_idle",
            Self::ActionComplete => "action_complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a bounded wait ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The condition held for the required window
    Settled,
    /// The budget ran out first
    DeadlineReached,
    /// The condition could not be evaluated; moved on anyway
    Degraded {
        /// What went wrong
        reason: String,
    },
}

impl StageOutcome {
    /// Degraded outcome from any displayable cause
    #[must_use]
    pub fn degraded(reason: impl std::fmt::Display) -> Self {
        Self::Degraded {
            reason: reason.to_string(),
        }
    }

    /// The condition was met
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled)
    }
}

/// One stage's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Which stage
    pub stage: Stage,
    /// How it ended
    pub outcome: StageOutcome,
    /// Wall-clock time spent in the stage
    pub elapsed_ms: u64,
}

/// Result of [`wait_for_settled`](crate::wait_for_settled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    /// Budget the run started with
    pub timeout_ms: u64,
    /// Total wall-clock time
    pub elapsed_ms: u64,
    /// Per-stage results in execution order
    pub stages: Vec<StageReport>,
}

impl SettleReport {
    /// Empty report for a run with `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout_ms: duration_ms(timeout),
            elapsed_ms: 0,
            stages: Vec::with_capacity(Stage::ALL.len()),
        }
    }

    /// Append a stage result
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome, elapsed: Duration) {
        self.stages.push(StageReport {
            stage,
            outcome,
            elapsed_ms: duration_ms(elapsed),
        });
    }

    /// Set the total elapsed time
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = duration_ms(elapsed);
    }

    /// Every stage settled
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.outcome.is_settled())
    }

    /// Some stage ran into the deadline
    #[must_use]
    pub fn hit_deadline(&self) -> bool {
        self.stages
            .iter()
            .any(|s| s.outcome == StageOutcome::DeadlineReached)
    }

    /// Outcome of `stage`, if it ran
    #[must_use]
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| &s.outcome)
    }

    /// Total elapsed time
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::ALL.first(), Some(&Stage::Lifecycle));
        assert_eq!(Stage::ALL.last(), Some(&Stage::ActionComplete));
        assert_eq!(Stage::UiStability.to_string(), "ui_stability");
    }

    #[test]
    fn test_empty_report_is_not_settled() {
        assert!(!SettleReport::new(Duration::from_secs(1)).is_settled());
    }

    #[test]
    fn test_report_settled_and_deadline() {
        let mut report = SettleReport::new(Duration::from_secs(5));
        report.record(Stage::Lifecycle, StageOutcome::Settled, Duration::from_millis(3));
        assert!(report.is_settled());
        report.record(
            Stage::UiStability,
            StageOutcome::DeadlineReached,
            Duration::from_secs(5),
        );
        report.finish(Duration::from_millis(5012));
        assert!(!report.is_settled());
        assert!(report.hit_deadline());
        assert_eq!(report.elapsed(), Duration::from_millis(5012));
        assert_eq!(
            report.outcome(Stage::UiStability),
            Some(&StageOutcome::DeadlineReached)
        );
        assert!(report.outcome(Stage::Scripts).is_none());
    }

    #[test]
    fn test_report_serializes_status_tags() {
        let mut report = SettleReport::new(Duration::from_millis(100));
        report.record(
            Stage::Scripts,
            StageOutcome::degraded("Evaluation failed: boom"),
            Duration::from_millis(50),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["timeout_ms"], 100);
        assert_eq!(json["stages"][0]["stage"], "scripts");
        assert_eq!(json["stages"][0]["outcome"]["status"], "degraded");
        assert_eq!(
            json["stages"][0]["outcome"]["reason"],
            "Evaluation failed: boom"
        );
    }
}
