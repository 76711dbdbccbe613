//! Session configuration.
//!
//! A [`SessionConfig`] fixes the statistical target of an estimation run:
//! the confidence level `1 - α`, the precision (half-width) `ε`,
//! an optional sample budget and the analysis [`Mode`].
//! Configurations are validated before any sampling begins,
//! and invalid values are reported as [`ConfigError`] rather than replaced by defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Outcomes are Boolean and the engine estimates the probability of success.
    Bernoulli,
    /// Outcomes are reals in the declared range `[lo, hi]` and the engine estimates their mean.
    BoundedMean {
        /// Lower end of the declared range.
        lo: f64,
        /// Upper end of the declared range.
        hi: f64,
    },
}

impl Mode {
    /// The domain the estimated quantity lives in.
    pub fn domain(&self) -> (f64, f64) {
        match *self {
            Mode::Bernoulli => (0f64, 1f64),
            Mode::BoundedMean { lo, hi } => (lo, hi),
        }
    }
}

/// Concentration inequality used for bounded-mean intervals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedMethod {
    /// Hoeffding's inequality: depends on the range only.
    Hoeffding,
    /// Maurer–Pontil empirical Bernstein bound: tightens with small observed variance.
    #[default]
    EmpiricalBernstein,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("confidence level {0} is not in (0, 1)")]
    Confidence(f64),
    #[error("precision {0} is not strictly positive")]
    Precision(f64),
    #[error("declared range [{lo}, {hi}] is empty or not finite")]
    Range { lo: f64, hi: f64 },
    #[error("sample budget must be positive")]
    ZeroBudget,
    #[error("probability threshold {0} is not in [0, 1]")]
    ProbThreshold(f64),
}

/// Immutable configuration of a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target confidence level `1 - α`.
    pub confidence: f64,
    /// Target half-width `ε` of the two-sided interval.
    pub precision: f64,
    /// Maximum number of samples, `None` for unbounded.
    #[serde(default)]
    pub max_samples: Option<u64>,
    pub mode: Mode,
    #[serde(default)]
    pub bounded_method: BoundedMethod,
}

impl SessionConfig {
    /// Creates an unbounded configuration, failing on invalid parameters.
    pub fn new(confidence: f64, precision: f64, mode: Mode) -> Result<Self, ConfigError> {
        let config = Self {
            confidence,
            precision,
            max_samples: None,
            mode,
            bounded_method: BoundedMethod::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the sample budget.
    pub fn with_max_samples(mut self, max_samples: u64) -> Result<Self, ConfigError> {
        self.max_samples = Some(max_samples);
        self.validate()?;
        Ok(self)
    }

    pub fn with_bounded_method(mut self, method: BoundedMethod) -> Self {
        self.bounded_method = method;
        self
    }

    /// Significance level `α = 1 - confidence`.
    pub fn alpha(&self) -> f64 {
        1f64 - self.confidence
    }

    /// Checks every invariant of the configuration.
    ///
    /// NaN values fail every check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.confidence > 0f64 && self.confidence < 1f64) {
            return Err(ConfigError::Confidence(self.confidence));
        }
        if !(self.precision > 0f64 && self.precision.is_finite()) {
            return Err(ConfigError::Precision(self.precision));
        }
        if self.max_samples == Some(0) {
            return Err(ConfigError::ZeroBudget);
        }
        if let Mode::BoundedMean { lo, hi } = self.mode {
            if !(lo < hi && lo.is_finite() && hi.is_finite()) {
                return Err(ConfigError::Range { lo, hi });
            }
        }
        Ok(())
    }
}
