//! Replay pacing
//!
//! The wait after a frame is the gap between its time stamp and the next
//! one, bounded by `[min, max]`. A missing or non-positive gap waits `min`.

use std::time::Duration;

/// Bounds applied to recorded inter-frame gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl PacingPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Wait before the next frame, given the gap `delta` in seconds.
    ///
    /// `min` wins when it exceeds `max`.
    pub fn delay(&self, delta: Option<f64>) -> Duration {
        let gap = match delta {
            Some(d) if d.is_finite() && d > 0.0 => d,
            Some(d) => {
                tracing::debug!(delta = d, "Non-increasing time stamps, using minimum delay");
                return self.min;
            }
            None => return self.min,
        };

        let mut wait = Duration::try_from_secs_f64(gap).unwrap_or(self.max);
        if wait > self.max {
            tracing::debug!(
                gap_secs = gap,
                max_secs = self.max.as_secs_f64(),
                "Possible data gap, clamping delay"
            );
            wait = self.max;
        }
        wait.max(self.min)
    }
}
