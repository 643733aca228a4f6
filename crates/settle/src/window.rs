//! Stability windows and deadlines.
//!
//! Both use the tokio clock so paused-time tests advance them
//! deterministically.

use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// STABILITY WINDOW
// =============================================================================

/// Counts consecutive quiet observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityWindow {
    required: u32,
    consecutive: u32,
}

impl StabilityWindow {
    /// Window that is stable after `required` consecutive quiet observations
    #[must_use]
    pub const fn new(required: u32) -> Self {
        Self {
            required,
            consecutive: 0,
        }
    }

    /// Record one observation, returning whether the window is now stable
    pub fn observe(&mut self, quiet: bool) -> bool {
        if quiet {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        self.is_stable()
    }

    /// Forget all quiet observations
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Reached the required count
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        self.consecutive >= self.required
    }

    /// Current consecutive quiet count
    #[must_use]
    pub const fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Required consecutive count
    #[must_use]
    pub const fn required(&self) -> u32 {
        self.required
    }
}

// =============================================================================
// DEADLINE
// =============================================================================

/// Absolute end of a wait budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            at: start + timeout,
        }
    }

    /// The deadline instant
    #[must_use]
    pub const fn at(&self) -> Instant {
        self.at
    }

    /// Initial budget
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.at - self.start
    }

    /// Time since the deadline was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left, zero once expired
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// The deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Budget for the next stage: `max(floor, remaining)`, but never
    /// reaching past `deadline + floor`.
    ///
    /// Stages that start after the deadline therefore share one floor
    /// between them instead of each getting a fresh one.
    #[must_use]
    pub fn stage_budget(&self, floor: Duration) -> Duration {
        let hard_stop = self.at + floor;
        let ceiling = hard_stop.saturating_duration_since(Instant::now());
        self.remaining().max(floor).min(ceiling)
    }

    /// A nested deadline ending after `budget` or at this deadline's
    /// floor-extended hard stop, whichever comes first
    #[must_use]
    pub fn stage(&self, floor: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            at: now + self.stage_budget(floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod stability_window_tests {
        use super::*;

        #[test]
        fn test_stable_after_required_quiet_observations() {
            let mut window = StabilityWindow::new(3);
            assert!(!window.observe(true));
            assert!(!window.observe(true));
            assert!(window.observe(true));
            assert_eq!(window.consecutive(), 3);
        }

        #[test]
        fn test_activity_resets() {
            let mut window = StabilityWindow::new(2);
            window.observe(true);
            assert!(!window.observe(false));
            assert_eq!(window.consecutive(), 0);
            assert!(!window.observe(true));
            assert!(window.observe(true));
        }

        #[test]
        fn test_reset() {
            let mut window = StabilityWindow::new(1);
            window.observe(true);
            window.reset();
            assert!(!window.is_stable());
            assert_eq!(window.required(), 1);
        }

        proptest! {
            #[test]
            fn prop_stable_iff_trailing_run_long_enough(
                required in 1u32..8,
                observations in proptest::collection::vec(any::<bool>(), 0..64),
            ) {
                let mut window = StabilityWindow::new(required);
                let mut last = false;
                for quiet in &observations {
                    last = window.observe(*quiet);
                }
                let trailing = observations.iter().rev().take_while(|q| **q).count() as u32;
                prop_assert_eq!(window.consecutive(), trailing);
                if !observations.is_empty() {
                    prop_assert_eq!(last, trailing >= required);
                }
            }
        }
    }

    mod deadline_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_remaining_counts_down() {
            let deadline = Deadline::after(Duration::from_secs(2));
            assert_eq!(deadline.remaining(), Duration::from_secs(2));
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(deadline.remaining(), Duration::from_millis(1500));
            assert_eq!(deadline.elapsed(), Duration::from_millis(500));
            assert!(!deadline.is_expired());
        }

        #[tokio::test(start_paused = true)]
        async fn test_expired_remaining_is_zero() {
            let deadline = Deadline::after(Duration::from_millis(100));
            tokio::time::sleep(Duration::from_millis(250)).await;
            assert!(deadline.is_expired());
            assert_eq!(deadline.remaining(), Duration::ZERO);
            assert_eq!(deadline.budget(), Duration::from_millis(100));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stage_budget_uses_floor_near_deadline() {
            let deadline = Deadline::after(Duration::from_millis(300));
            let floor = Duration::from_secs(1);
            assert_eq!(deadline.stage_budget(floor), floor);
            let roomy = Deadline::after(Duration::from_secs(10));
            assert_eq!(roomy.stage_budget(floor), Duration::from_secs(10));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stage_budget_shrinks_after_deadline() {
            let deadline = Deadline::after(Duration::from_millis(100));
            let floor = Duration::from_secs(1);
            tokio::time::sleep(Duration::from_millis(600)).await;
            assert_eq!(deadline.stage_budget(floor), Duration::from_millis(500));
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(deadline.stage_budget(floor), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_nested_stage_deadline() {
            let deadline = Deadline::after(Duration::from_secs(5));
            let stage = deadline.stage(Duration::from_secs(1));
            assert_eq!(stage.at(), deadline.at());
        }
    }

    proptest! {
        #[test]
        fn prop_stage_budget_bounded(timeout_ms in 0u64..10_000, floor_ms in 0u64..5_000) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(async {
                let deadline = Deadline::after(Duration::from_millis(timeout_ms));
                let floor = Duration::from_millis(floor_ms);
                let budget = deadline.stage_budget(floor);
                assert!(budget >= floor.min(Duration::from_millis(timeout_ms + floor_ms)));
                assert!(budget <= Duration::from_millis(timeout_ms.max(floor_ms)));
            });
        }
    }
}
