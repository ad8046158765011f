//! Adaptive pacing for a fixed-window acquisition.
//!
//! A session must collect `target_count` samples within `window`. Sleeping a fixed
//! `window / target_count` between samples accumulates drift, because parsing, I/O and
//! scheduling add latency to every sample. [`PaceScheduler`] instead recomputes the
//! wait after every sample from the time actually left and the samples still missing,
//! so the session lands close to the end of the window.
//!
//! ```
//! use std::time::Duration;
//! use volta_daq::pacing::{AcquisitionPlan, PaceScheduler};
//!
//! let plan = AcquisitionPlan::new(Duration::from_secs(300), 30_000)?;
//! let pace = PaceScheduler::new(plan);
//!
//! // Nothing collected yet: even distribution.
//! assert_eq!(pace.wait(Duration::ZERO, 0), Duration::from_millis(10));
//!
//! // Halfway through the window with only a third collected: speed up.
//! let wait = pace.wait(Duration::from_secs(150), 10_000);
//! assert_eq!(wait, Duration::from_millis(7));
//! # Ok::<(), volta_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use std::time::Duration;
use tokio::time::Instant;

/// Largest sample count a plan accepts. The buffer is allocated up front, so this caps
/// it at a few hundred MiB.
pub const MAX_TARGET_COUNT: usize = 10_000_000;

/// Fixed parameters of an acquisition: how long, and how many samples.
///
/// Both values are validated once at construction and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionPlan {
    window: Duration,
    target_count: usize,
}

impl AcquisitionPlan {
    /// Create a plan, rejecting an empty window or a sample count outside
    /// `1..=MAX_TARGET_COUNT`.
    pub fn new(window: Duration, target_count: usize) -> AppResult<Self> {
        if window.is_zero() {
            return Err(DaqError::Configuration(
                "acquisition window must be longer than zero".into(),
            ));
        }
        if target_count == 0 {
            return Err(DaqError::Configuration(
                "target sample count must be at least 1".into(),
            ));
        }
        if target_count > MAX_TARGET_COUNT {
            return Err(DaqError::Configuration(format!(
                "target sample count {target_count} exceeds the maximum of {MAX_TARGET_COUNT}"
            )));
        }
        Ok(Self {
            window,
            target_count,
        })
    }

    /// Convenience constructor for a window given in whole minutes.
    pub fn from_minutes(minutes: u64, target_count: usize) -> AppResult<Self> {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)), target_count)
    }

    /// Total time budget of the session.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of samples the session expects.
    pub fn target_count(&self) -> usize {
        self.target_count
    }
}

/// Computes how long to wait before processing the next sample.
///
/// Stateless and `Copy`: the consumer task and the host loop each hold their own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaceScheduler {
    plan: AcquisitionPlan,
}

impl PaceScheduler {
    /// Create a scheduler for the given plan.
    pub fn new(plan: AcquisitionPlan) -> Self {
        Self { plan }
    }

    /// The plan this scheduler paces.
    pub fn plan(&self) -> AcquisitionPlan {
        self.plan
    }

    /// Wait assuming zero drift: `window / target_count`, in whole milliseconds.
    pub fn baseline(&self) -> Duration {
        truncate_to_millis(self.plan.window / self.divisor(self.plan.target_count))
    }

    /// Wait before the next sample given the time spent so far and the samples collected.
    ///
    /// Before the first sample and once the target is reached this is the baseline.
    /// In between, the time left in the window is split evenly across the samples still
    /// missing; an overrun window yields zero. More samples than planned count as none
    /// remaining.
    pub fn wait(&self, elapsed: Duration, collected: usize) -> Duration {
        let target = self.plan.target_count;
        let remaining = target.saturating_sub(collected);
        if remaining == 0 || remaining == target {
            return self.baseline();
        }

        let left = self.plan.window.saturating_sub(elapsed);
        truncate_to_millis(left / self.divisor(remaining))
    }

    /// Same as [`wait`](Self::wait), measuring elapsed time from `opened_at` to now.
    pub fn wait_since(&self, opened_at: Instant, collected: usize) -> Duration {
        self.wait(opened_at.elapsed(), collected)
    }

    // Duration division takes u32; counts past u32::MAX saturate.
    fn divisor(&self, count: usize) -> u32 {
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn truncate_to_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
