//! Human-readable view of session progress.
//!
//! Pure formatting helpers; the host decides where the status line goes.

use std::fmt;
use std::time::Duration;

/// Whole-percent completion, rounded down. A zero target reports 0.
pub fn percent(collected: usize, target: usize) -> usize {
    if target == 0 {
        return 0;
    }
    collected.saturating_mul(100) / target
}

/// Format an elapsed duration as `mm:ss` (minutes keep growing past 59).
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Snapshot of a running session, rendered as
/// `42% - 12600 / 30000 (02:06): 3.14`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStatus {
    /// Samples collected so far
    pub collected: usize,
    /// Samples expected in total
    pub target: usize,
    /// Time since the transport opened
    pub elapsed: Duration,
    /// Most recent reading, if any
    pub last_value: Option<f64>,
}

impl ProgressStatus {
    /// Completion percentage of this snapshot.
    pub fn percent(&self) -> usize {
        percent(self.collected, self.target)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% - {} / {} ({})",
            self.percent(),
            self.collected,
            self.target,
            format_elapsed(self.elapsed)
        )?;
        match self.last_value {
            Some(value) => write!(f, ": {value:.2}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::approx_constant)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down() {
        assert_eq!(percent(0, 30_000), 0);
        assert_eq!(percent(299, 30_000), 0);
        assert_eq!(percent(300, 30_000), 1);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(1, 0), 0);
    }

    #[test]
    fn elapsed_is_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(65_900)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(299)), "04:59");
        assert_eq!(format_elapsed(Duration::from_secs(3_600)), "60:00");
    }

    #[test]
    fn status_line() {
        let status = ProgressStatus {
            collected: 12_600,
            target: 30_000,
            elapsed: Duration::from_secs(126),
            last_value: Some(3.14159),
        };
        assert_eq!(status.to_string(), "42% - 12600 / 30000 (02:06): 3.14");

        let empty = ProgressStatus {
            collected: 0,
            target: 3,
            elapsed: Duration::ZERO,
            last_value: None,
        };
        assert_eq!(empty.to_string(), "0% - 0 / 3 (00:00)");
    }
}
