//! Sequential hypothesis testing of a probability threshold.
//!
//! Tests whether a Boolean property holds with probability above a threshold `θ`,
//! stopping as soon as the Clopper–Pearson confidence in the current lean
//! reaches the requested level.
//! This is the building block of the threshold [`crate::search`].

use crate::config::ConfigError;
use crate::property::Property;
use crate::session::SessionError;
use crate::source::{SampleSource, SourceError};
use crate::special::beta_cdf;
use crate::stats::BernoulliCounter;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTest {
    /// Probability threshold `θ`.
    pub prob_threshold: f64,
    /// Confidence required to conclude.
    pub confidence: f64,
    /// Keep sampling until the source is exhausted, even after concluding.
    #[serde(default)]
    pub continuous: bool,
}

/// The outcome of a [`HypothesisTest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// `Some(true)` if the probability exceeds the threshold, `Some(false)` if not,
    /// `None` if the confidence was not reached before the source ran out.
    pub verdict: Option<bool>,
    /// Confidence in the final lean.
    pub confidence: f64,
    pub trials: u64,
    pub successes: u64,
    /// Confidence after every trial.
    pub confidence_history: Vec<f64>,
    /// Lean (`k / n > θ`) after every trial.
    pub lean_history: Vec<bool>,
}

/// Confidence that the true probability lies on the side of `θ` the observed rate leans to.
pub fn lean_confidence(successes: u64, n: u64, prob_threshold: f64) -> f64 {
    if n == 0 {
        return 0f64;
    }
    let (a, b) = if (successes as f64 / n as f64) < prob_threshold {
        (0f64, prob_threshold)
    } else {
        (prob_threshold, 1f64)
    };
    let k = successes as f64;
    let n_f = n as f64;
    let exponent = i32::try_from(n).unwrap_or(i32::MAX);
    let confidence = if successes == 0 {
        (1f64 - a).powi(exponent) - (1f64 - b).powi(exponent)
    } else if successes == n {
        b.powi(exponent) - a.powi(exponent)
    } else {
        beta_cdf(b, k + 1f64, n_f - k) - beta_cdf(a, k, n_f - k + 1f64)
    };
    confidence.clamp(0f64, 1f64)
}

impl HypothesisTest {
    pub fn new(prob_threshold: f64, confidence: f64) -> Result<Self, ConfigError> {
        let test = Self {
            prob_threshold,
            confidence,
            continuous: false,
        };
        test.validate()?;
        Ok(test)
    }

    pub fn continuous(mut self) -> Self {
        self.continuous = true;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.confidence > 0f64 && self.confidence < 1f64) {
            Err(ConfigError::Confidence(self.confidence))
        } else if !(0f64..=1f64).contains(&self.prob_threshold) {
            Err(ConfigError::ProbThreshold(self.prob_threshold))
        } else {
            Ok(())
        }
    }

    /// Runs the test, consuming observations from the source.
    pub fn run<S, P>(&self, property: &P, source: &mut S) -> Result<TestResult, SessionError>
    where
        S: SampleSource + ?Sized,
        P: Property<S::Observation> + ?Sized,
    {
        self.validate()?;
        let mut counter = BernoulliCounter::default();
        let mut confidence = 0f64;
        let mut confidence_history = Vec::new();
        let mut lean_history = Vec::new();
        while confidence < self.confidence || self.continuous {
            let observation = match source.next_observation() {
                Ok(observation) => observation,
                Err(SourceError::Exhausted) => {
                    let verdict = (confidence >= self.confidence)
                        .then(|| lean_history.last().copied())
                        .flatten();
                    debug!(target: "smc", "source exhausted after {} trials, verdict {verdict:?}", counter.n());
                    return Ok(TestResult {
                        verdict,
                        confidence,
                        trials: counter.n(),
                        successes: counter.successes(),
                        confidence_history,
                        lean_history,
                    });
                }
                Err(err) => {
                    return Err(SessionError::Source {
                        samples: counter.n(),
                        err,
                    });
                }
            };
            let success = property
                .evaluate(&observation)
                .as_bernoulli()
                .map_err(|violation| SessionError::PropertyRangeViolation {
                    sample: counter.n() + 1,
                    violation,
                })?;
            counter.update(success);
            confidence = lean_confidence(counter.successes(), counter.n(), self.prob_threshold);
            confidence_history.push(confidence);
            lean_history.push(counter.successes() as f64 / counter.n() as f64 > self.prob_threshold);
        }
        let verdict = lean_history.last().copied();
        info!(
            target: "smc",
            "concluded {verdict:?} with confidence {confidence} after {} trials",
            counter.n()
        );
        Ok(TestResult {
            verdict,
            confidence,
            trials: counter.n(),
            successes: counter.successes(),
            confidence_history,
            lean_history,
        })
    }
}
