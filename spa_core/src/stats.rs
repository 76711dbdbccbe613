//! Incremental sufficient statistics.
//!
//! Updates are O(1) and monotone: there is no rollback.
//! Real-valued outcomes use Welford's running mean/variance recurrence,
//! which does not suffer from the cancellation of naive sum-of-squares accumulation.

use crate::config::Mode;
use crate::property::{Outcome, RangeViolation};
use serde::{Deserialize, Serialize};

/// Counts of Bernoulli trials.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BernoulliCounter {
    n: u64,
    successes: u64,
}

impl BernoulliCounter {
    pub fn update(&mut self, success: bool) {
        self.n += 1;
        if success {
            self.successes += 1;
        }
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.n - self.successes
    }

    /// Observed success rate, `None` before the first trial.
    pub fn proportion(&self) -> Option<f64> {
        (self.n > 0).then(|| self.successes as f64 / self.n as f64)
    }
}

/// Welford's online mean and variance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Welford {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then_some(self.mean)
    }

    /// Unbiased sample variance, `None` with fewer than two samples.
    pub fn sample_variance(&self) -> Option<f64> {
        (self.n > 1).then(|| (self.m2 / (self.n - 1) as f64).max(0f64))
    }

    pub fn population_variance(&self) -> Option<f64> {
        (self.n > 0).then(|| (self.m2 / self.n as f64).max(0f64))
    }
}

/// Running statistics of a session, one variant per [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RunningStatistics {
    Bernoulli(BernoulliCounter),
    BoundedMean { lo: f64, hi: f64, moments: Welford },
}

impl RunningStatistics {
    pub fn new(mode: Mode) -> Self {
        match mode {
            Mode::Bernoulli => RunningStatistics::Bernoulli(BernoulliCounter::default()),
            Mode::BoundedMean { lo, hi } => RunningStatistics::BoundedMean {
                lo,
                hi,
                moments: Welford::default(),
            },
        }
    }

    /// Admits the outcome into the statistics.
    ///
    /// A rejected outcome leaves the statistics untouched.
    pub fn update(&mut self, outcome: Outcome) -> Result<(), RangeViolation> {
        match self {
            RunningStatistics::Bernoulli(counter) => counter.update(outcome.as_bernoulli()?),
            RunningStatistics::BoundedMean { lo, hi, moments } => {
                moments.update(outcome.within(*lo, *hi)?)
            }
        }
        Ok(())
    }

    /// Number of admitted outcomes.
    pub fn n(&self) -> u64 {
        match self {
            RunningStatistics::Bernoulli(counter) => counter.n(),
            RunningStatistics::BoundedMean { moments, .. } => moments.n(),
        }
    }

    /// The point estimate of the quantity under estimation, clamped to its domain.
    pub fn point_estimate(&self) -> Option<f64> {
        match self {
            RunningStatistics::Bernoulli(counter) => counter.proportion(),
            RunningStatistics::BoundedMean { lo, hi, moments } => {
                moments.mean().map(|mean| mean.clamp(*lo, *hi))
            }
        }
    }
}
