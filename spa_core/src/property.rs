//! Properties map raw observations to outcomes.
//!
//! A [`Property`] is a pure function of a single observation:
//! in Bernoulli mode it decides whether the property holds,
//! in bounded-mean mode it computes a real value within the declared range.
//! The library provides the benchmark-oriented properties
//! [`Threshold`], [`Between`], [`Ratio`] and [`Implication`],
//! the identity [`Value`] and the closure adapter [`from_fn`].
//! Properties over runs recorded as event logs live in [`crate::events`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The result of evaluating a property on an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Bool(bool),
    Real(f64),
}

impl From<bool> for Outcome {
    fn from(value: bool) -> Self {
        Outcome::Bool(value)
    }
}

impl From<f64> for Outcome {
    fn from(value: f64) -> Self {
        Outcome::Real(value)
    }
}

/// An outcome that does not belong to the domain of the session's mode.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("outcome {outcome:?} outside of declared range [{lo}, {hi}]")]
pub struct RangeViolation {
    pub outcome: Outcome,
    pub lo: f64,
    pub hi: f64,
}

impl Outcome {
    /// Admits the outcome as a Bernoulli trial.
    ///
    /// Reals are accepted only if they are exactly `0` or `1`.
    pub fn as_bernoulli(self) -> Result<bool, RangeViolation> {
        match self {
            Outcome::Bool(b) => Ok(b),
            Outcome::Real(x) if x == 1f64 => Ok(true),
            Outcome::Real(x) if x == 0f64 => Ok(false),
            outcome => Err(RangeViolation {
                outcome,
                lo: 0f64,
                hi: 1f64,
            }),
        }
    }

    /// Admits the outcome as a real value in `[lo, hi]`.
    ///
    /// Booleans count as `0` and `1`. NaN is always rejected.
    pub fn within(self, lo: f64, hi: f64) -> Result<f64, RangeViolation> {
        let x = match self {
            Outcome::Bool(b) => f64::from(u8::from(b)),
            Outcome::Real(x) => x,
        };
        if lo <= x && x <= hi {
            Ok(x)
        } else {
            Err(RangeViolation {
                outcome: self,
                lo,
                hi,
            })
        }
    }
}

/// A stateless, deterministic function from observations to outcomes.
pub trait Property<O: ?Sized> {
    fn evaluate(&self, observation: &O) -> Outcome;
}

impl<O: ?Sized, P: Property<O> + ?Sized> Property<O> for &P {
    fn evaluate(&self, observation: &O) -> Outcome {
        (**self).evaluate(observation)
    }
}

/// Properties defined by comparing a (derived) value against a mutable threshold.
///
/// Used by [`crate::search`] to scan thresholds.
pub trait ThresholdProperty<O>: Property<O> {
    fn threshold(&self) -> f64;

    fn set_threshold(&mut self, threshold: f64);

    /// The verdict the property tends to when the threshold is very high.
    fn high_threshold_outcome(&self) -> bool;

    /// The value compared against the threshold.
    fn statistic(&self, observation: &O) -> f64;

    /// Estimates where the true threshold lies, as the empirical quantile `1 - proportion` of the data.
    fn start_point_estimate(&self, data: &[O], proportion: f64) -> Option<f64> {
        let mut values = data
            .iter()
            .map(|o| self.statistic(o))
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        values.sort_unstable_by(f64::total_cmp);
        quantile_sorted(&values, 1f64 - proportion)
    }
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0f64..=1f64).contains(&q) {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let below = pos.floor() as usize;
    let above = pos.ceil() as usize;
    let frac = pos - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * frac)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Greater,
    Less,
}

impl Comparison {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::Less => value < threshold,
        }
    }

    // A large threshold makes `>` fail and `<` hold.
    pub(crate) fn high_threshold_outcome(self) -> bool {
        matches!(self, Comparison::Less)
    }
}

/// Holds if the observed value compares to the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub threshold: f64,
    pub op: Comparison,
}

impl Threshold {
    pub fn new(threshold: f64, op: Comparison) -> Self {
        Self { threshold, op }
    }
}

impl Property<f64> for Threshold {
    fn evaluate(&self, observation: &f64) -> Outcome {
        Outcome::Bool(self.op.compare(*observation, self.threshold))
    }
}

impl ThresholdProperty<f64> for Threshold {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn high_threshold_outcome(&self) -> bool {
        self.op.high_threshold_outcome()
    }

    fn statistic(&self, observation: &f64) -> f64 {
        *observation
    }
}

/// Holds if the observed value lies strictly between the two bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Between {
    pub lower: f64,
    pub upper: f64,
}

impl Property<f64> for Between {
    fn evaluate(&self, observation: &f64) -> Outcome {
        Outcome::Bool(self.lower < *observation && *observation < self.upper)
    }
}

/// Compares the ratio of paired observations (e.g. a speedup) against the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratio {
    pub threshold: f64,
    pub op: Comparison,
}

impl Property<(f64, f64)> for Ratio {
    fn evaluate(&self, observation: &(f64, f64)) -> Outcome {
        Outcome::Bool(self.op.compare(self.statistic(observation), self.threshold))
    }
}

impl ThresholdProperty<(f64, f64)> for Ratio {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn high_threshold_outcome(&self) -> bool {
        self.op.high_threshold_outcome()
    }

    fn statistic(&self, &(a, b): &(f64, f64)) -> f64 {
        a / b
    }
}

/// Conditional `(a > antecedent) → (b > consequent)` over paired observations
/// (e.g. power and cycles of the same run).
///
/// A run only satisfies the property if it triggers the condition: when
/// `a <= antecedent` the outcome is `false`, not vacuously `true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Implication {
    pub antecedent: f64,
    pub consequent: f64,
}

impl Property<(f64, f64)> for Implication {
    fn evaluate(&self, &(a, b): &(f64, f64)) -> Outcome {
        Outcome::Bool(a > self.antecedent && b > self.consequent)
    }
}

/// The observation itself, for bounded-mean estimation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Value;

impl Property<f64> for Value {
    fn evaluate(&self, observation: &f64) -> Outcome {
        Outcome::Real(*observation)
    }
}

/// See [`from_fn`].
#[derive(Debug, Clone, Copy)]
pub struct FnProperty<F>(F);

/// Turns a closure into a [`Property`].
pub fn from_fn<O, T, F>(f: F) -> FnProperty<F>
where
    F: Fn(&O) -> T,
    T: Into<Outcome>,
{
    FnProperty(f)
}

impl<O, T, F> Property<O> for FnProperty<F>
where
    F: Fn(&O) -> T,
    T: Into<Outcome>,
{
    fn evaluate(&self, observation: &O) -> Outcome {
        (self.0)(observation).into()
    }
}
