//! The session controller.
//!
//! A [`Session`] drives the estimation loop for a single experiment:
//! pull an observation, evaluate the property, update the running statistics,
//! check the stopping rule, and repeat until a terminal state is reached.
//!
//! ```text
//! Idle ──▶ Sampling ──▶ Converged
//!             │  ▲  ├──▶ Exhausted
//!             └──┘  └──▶ Failed
//! ```
//!
//! Sessions are single-use: once terminal they produce exactly one [`Report`]
//! and refuse further observations.
//! A fresh session must be created for every estimation run.

use crate::config::{ConfigError, SessionConfig};
use crate::interval::{ConfidenceInterval, estimate};
use crate::property::{Property, RangeViolation};
use crate::source::{SampleSource, SourceError};
use crate::stats::RunningStatistics;
use crate::stopping::{StoppingDecision, check};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Sampling,
    Converged,
    Exhausted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Converged | SessionState::Exhausted | SessionState::Failed
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration")]
    Config(#[from] ConfigError),
    #[error("property outcome out of range at sample {sample}")]
    PropertyRangeViolation {
        sample: u64,
        #[source]
        violation: RangeViolation,
    },
    #[error("sample source failed after {samples} samples")]
    Source {
        samples: u64,
        #[source]
        err: SourceError,
    },
    #[error("session cancelled after {0} samples")]
    Cancelled(u64),
    #[error("session already terminated in state {0:?}")]
    Terminated(SessionState),
}

/// Final status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The precision target was met.
    Converged,
    /// Budget or source exhausted before the precision target was met.
    Exhausted,
    /// The session was aborted and carries no valid interval.
    Failed,
}

/// The final result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub status: Status,
    /// Lower bound, absent when no valid interval exists.
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub estimate: Option<f64>,
    pub confidence_level: f64,
    /// Target half-width.
    pub precision: f64,
    pub sample_count: u64,
}

impl Report {
    /// Whether the interval meets the requested precision.
    pub fn precision_met(&self) -> bool {
        self.status == Status::Converged
    }

    pub fn interval(&self) -> Option<(f64, f64)> {
        self.lower.zip(self.upper)
    }

    pub fn half_width(&self) -> Option<f64> {
        self.interval().map(|(lower, upper)| (upper - lower) / 2f64)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.interval()
            .is_some_and(|(lower, upper)| lower <= value && value <= upper)
    }
}

/// A single sequential estimation run.
#[derive(Debug)]
pub struct Session<P> {
    config: SessionConfig,
    property: P,
    stats: RunningStatistics,
    state: SessionState,
    interval: Option<ConfidenceInterval>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<P> Session<P> {
    /// Creates a session in the `Idle` state, failing fast on an invalid configuration.
    pub fn new(config: SessionConfig, property: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            property,
            stats: RunningStatistics::new(config.mode),
            state: SessionState::Idle,
            interval: None,
            cancel: None,
        })
    }

    /// Makes the session check the given flag between samples.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The statistics gathered so far, also available for unfinalized sessions.
    pub fn statistics(&self) -> &RunningStatistics {
        &self.stats
    }

    pub fn samples(&self) -> u64 {
        self.stats.n()
    }

    /// The final report, available only once the session is terminal.
    pub fn report(&self) -> Option<Report> {
        self.state.is_terminal().then(|| self.terminal_report())
    }

    fn terminal_report(&self) -> Report {
        let status = match self.state {
            SessionState::Converged => Status::Converged,
            SessionState::Failed => Status::Failed,
            _ => Status::Exhausted,
        };
        // A failed session never exposes its partial interval.
        let interval = self.interval.filter(|_| status != Status::Failed);
        Report {
            status,
            lower: interval.map(|ci| ci.lower),
            upper: interval.map(|ci| ci.upper),
            estimate: interval.map(|ci| ci.estimate),
            confidence_level: self.config.confidence,
            precision: self.config.precision,
            sample_count: self.stats.n(),
        }
    }

    fn activate(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {
                info!(target: "session", "start sampling with {:?}", self.config);
                self.state = SessionState::Sampling;
                Ok(())
            }
            SessionState::Sampling => Ok(()),
            state => Err(SessionError::Terminated(state)),
        }
    }

    /// Processes exactly one observation.
    pub fn observe<O>(&mut self, observation: &O) -> Result<StoppingDecision, SessionError>
    where
        P: Property<O>,
    {
        self.activate()?;
        let outcome = self.property.evaluate(observation);
        if let Err(violation) = self.stats.update(outcome) {
            self.state = SessionState::Failed;
            self.interval = None;
            warn!(target: "session", "session failed: {violation}");
            return Err(SessionError::PropertyRangeViolation {
                sample: self.stats.n() + 1,
                violation,
            });
        }
        let decision = check(&self.stats, &self.config);
        trace!(target: "session", "sample {}: {outcome:?} -> {decision:?}", self.stats.n());
        match decision {
            StoppingDecision::Continue => {}
            StoppingDecision::Converged(interval) => {
                info!(
                    target: "session",
                    "converged after {} samples: [{}, {}]",
                    interval.samples, interval.lower, interval.upper
                );
                self.interval = Some(interval);
                self.state = SessionState::Converged;
            }
            StoppingDecision::BudgetExhausted(interval) => {
                warn!(
                    target: "session",
                    "sample budget exhausted after {} samples, precision not met: [{}, {}]",
                    interval.samples, interval.lower, interval.upper
                );
                self.interval = Some(interval);
                self.state = SessionState::Exhausted;
            }
        }
        Ok(decision)
    }

    /// Terminates the session because no more observations are obtainable.
    ///
    /// The report carries the best available interval, if any sample was taken.
    pub fn exhaust(&mut self) -> Result<Report, SessionError> {
        self.activate()?;
        self.interval = estimate(&self.stats, &self.config);
        self.state = SessionState::Exhausted;
        warn!(
            target: "session",
            "sample source exhausted after {} samples, precision not met",
            self.stats.n()
        );
        Ok(self.terminal_report())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Samples from the source until the session terminates.
    ///
    /// On cancellation the session stays in `Sampling` with consistent statistics,
    /// and `run` may be called again to resume.
    pub fn run<S>(&mut self, source: &mut S) -> Result<Report, SessionError>
    where
        S: SampleSource + ?Sized,
        P: Property<S::Observation>,
    {
        self.activate()?;
        loop {
            if self.is_cancelled() {
                info!(target: "session", "cancelled after {} samples", self.stats.n());
                return Err(SessionError::Cancelled(self.stats.n()));
            }
            match source.next_observation() {
                Ok(observation) => {
                    if self.observe(&observation)?.is_terminal() {
                        return Ok(self.terminal_report());
                    }
                }
                Err(SourceError::Exhausted) => return self.exhaust(),
                Err(err) => {
                    self.state = SessionState::Failed;
                    self.interval = None;
                    warn!(target: "session", "session failed: {err}");
                    return Err(SessionError::Source {
                        samples: self.stats.n(),
                        err,
                    });
                }
            }
        }
    }
}
