//! Time Budget
//!
//! Wall-clock allowance for one import pass. The run loop asks the budget
//! between rows, so a pass may overrun the limit by one row.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TimeBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl TimeBudget {
    /// Start measuring now. `None` never runs out.
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn from_seconds(seconds: Option<u64>) -> Self {
        Self::start(seconds.map(Duration::from_secs))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// True once the elapsed time has reached the limit
    pub fn exhausted(&self) -> bool {
        match self.limit {
            Some(limit) => self.elapsed() >= limit,
            None => false,
        }
    }
}
