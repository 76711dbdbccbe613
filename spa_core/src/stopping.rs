//! Fully sequential stopping rule.
//!
//! After every single observation, the exact two-sided interval for the current statistics
//! is computed and compared against the target precision.

use crate::config::SessionConfig;
use crate::interval::{ConfidenceInterval, estimate};
use crate::stats::RunningStatistics;
use serde::{Deserialize, Serialize};

/// What the session should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StoppingDecision {
    /// Precision not reached yet: sample again.
    Continue,
    /// The interval's half-width is within the target precision.
    Converged(ConfidenceInterval),
    /// The sample budget is spent without reaching the target precision.
    BudgetExhausted(ConfidenceInterval),
}

impl StoppingDecision {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StoppingDecision::Continue)
    }
}

/// Decides whether to stop, given the statistics gathered so far.
///
/// Always [`StoppingDecision::Continue`] with no samples.
/// Deterministic: the same statistics and configuration yield the same decision.
pub fn check(stats: &RunningStatistics, config: &SessionConfig) -> StoppingDecision {
    let Some(interval) = estimate(stats, config) else {
        return StoppingDecision::Continue;
    };
    if interval.half_width() <= config.precision {
        StoppingDecision::Converged(interval)
    } else if config.max_samples.is_some_and(|max| stats.n() >= max) {
        StoppingDecision::BudgetExhausted(interval)
    } else {
        StoppingDecision::Continue
    }
}
