//! Confidence interval estimation.
//!
//! Bernoulli proportions use the exact Clopper–Pearson interval,
//! which keeps its nominal coverage at small sample counts and at proportions `0` and `1`.
//! Bounded means use non-asymptotic concentration inequalities
//! (Hoeffding, or the empirical Bernstein bound of Maurer and Pontil, 2009),
//! valid for any distribution supported on the declared range.
//!
//! All bounds are clamped to the domain of the estimated quantity.

use crate::config::{BoundedMethod, SessionConfig};
use crate::special::beta_quantile;
use crate::stats::{BernoulliCounter, RunningStatistics, Welford};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Point estimate, within `[lower, upper]`.
    pub estimate: f64,
    /// Nominal confidence level `1 - α`.
    pub confidence: f64,
    /// Number of samples the interval is computed from.
    pub samples: u64,
}

impl ConfidenceInterval {
    fn clamped(lower: f64, upper: f64, estimate: f64, domain: (f64, f64)) -> (f64, f64, f64) {
        let estimate = estimate.clamp(domain.0, domain.1);
        let lower = lower.clamp(domain.0, domain.1).min(estimate);
        let upper = upper.clamp(domain.0, domain.1).max(estimate);
        (lower, upper, estimate)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn half_width(&self) -> f64 {
        self.width() / 2f64
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Which side a one-sided bound constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    Lower,
    Upper,
}

/// One-sided exact binomial bound at the given confidence.
///
/// The boundary cases `successes = 0` (lower) and `successes = n` (upper) are exact,
/// and the opposite boundaries have closed forms.
pub fn clopper_pearson_bound(successes: u64, n: u64, confidence: f64, tail: Tail) -> f64 {
    debug_assert!(successes <= n && n > 0);
    let alpha = 1f64 - confidence;
    let k = successes as f64;
    let n_f = n as f64;
    match tail {
        Tail::Lower if successes == 0 => 0f64,
        Tail::Lower if successes == n => alpha.powf(1f64 / n_f),
        Tail::Lower => beta_quantile(alpha, k, n_f - k + 1f64),
        Tail::Upper if successes == n => 1f64,
        Tail::Upper if successes == 0 => 1f64 - alpha.powf(1f64 / n_f),
        Tail::Upper => beta_quantile(1f64 - alpha, k + 1f64, n_f - k),
    }
}

/// Two-sided Clopper–Pearson interval, `None` before the first trial.
pub fn clopper_pearson(counter: &BernoulliCounter, confidence: f64) -> Option<ConfidenceInterval> {
    let n = counter.n();
    let estimate = counter.proportion()?;
    let tail_confidence = 1f64 - (1f64 - confidence) / 2f64;
    let lower = clopper_pearson_bound(counter.successes(), n, tail_confidence, Tail::Lower);
    let upper = clopper_pearson_bound(counter.successes(), n, tail_confidence, Tail::Upper);
    let (lower, upper, estimate) = ConfidenceInterval::clamped(lower, upper, estimate, (0f64, 1f64));
    Some(ConfidenceInterval {
        lower,
        upper,
        estimate,
        confidence,
        samples: n,
    })
}

/// Two-sided Hoeffding half-width for `n` samples on a range of the given length.
pub fn hoeffding_half_width(n: u64, range: f64, confidence: f64) -> f64 {
    let alpha = 1f64 - confidence;
    range * ((2f64 / alpha).ln() / (2f64 * n as f64)).sqrt()
}

/// Two-sided empirical Bernstein half-width.
///
/// From Maurer and Pontil (2009), Theorem 4, applied to both tails at `α / 2` each,
/// and rescaled from `[0, 1]` to a range of the given length.
/// Undefined (`None`) for fewer than two samples.
pub fn empirical_bernstein_half_width(
    n: u64,
    sample_variance: f64,
    range: f64,
    confidence: f64,
) -> Option<f64> {
    if n < 2 {
        return None;
    }
    let alpha = 1f64 - confidence;
    let log_term = (4f64 / alpha).ln();
    let n = n as f64;
    Some(
        (2f64 * sample_variance * log_term / n).sqrt()
            + 7f64 * range * log_term / (3f64 * (n - 1f64)),
    )
}

/// Concentration interval for a mean of outcomes in `[lo, hi]`, `None` before the first sample.
pub fn bounded_mean(
    moments: &Welford,
    lo: f64,
    hi: f64,
    confidence: f64,
    method: BoundedMethod,
) -> Option<ConfidenceInterval> {
    let n = moments.n();
    let mean = moments.mean()?;
    let range = hi - lo;
    let half_width = match method {
        BoundedMethod::Hoeffding => hoeffding_half_width(n, range, confidence),
        BoundedMethod::EmpiricalBernstein => moments
            .sample_variance()
            .and_then(|var| empirical_bernstein_half_width(n, var, range, confidence))
            // A single sample says nothing about the spread: the whole range.
            .unwrap_or(range),
    };
    let (lower, upper, estimate) =
        ConfidenceInterval::clamped(mean - half_width, mean + half_width, mean, (lo, hi));
    Some(ConfidenceInterval {
        lower,
        upper,
        estimate,
        confidence,
        samples: n,
    })
}

/// Interval for the current statistics, according to the configured mode.
///
/// `None` with no samples: an interval at `n = 0` is undefined.
pub fn estimate(stats: &RunningStatistics, config: &SessionConfig) -> Option<ConfidenceInterval> {
    match stats {
        RunningStatistics::Bernoulli(counter) => clopper_pearson(counter, config.confidence),
        RunningStatistics::BoundedMean { lo, hi, moments } => {
            bounded_mean(moments, *lo, *hi, config.confidence, config.bounded_method)
        }
    }
}
